//! steamcmd-link - SteamCMD installation, workshop downloads and mods-folder linking
//!
//! Main entry point for the command line application.
//!
//! # Overview
//!
//! This binary is the composition root. It initializes:
//! - Configuration loading ([`ConfigManager`], `Settings.yaml`)
//! - Logging infrastructure (file rotation + optional console output)
//! - Tokio runtime (helper subprocess, Ctrl-C handling, event listener)
//! - State management ([`StateManager`]) and run [`Metrics`]
//! - The [`HelperInstaller`] that owns the installation state
//!
//! # Execution Flow
//!
//! 1. Parse the command line and load `Settings.yaml`
//! 2. Initialize logging → logs/steamcmd-link.<date>
//! 3. Resolve the platform (unsupported platforms exit here)
//! 4. Adopt an existing linked installation, if any
//! 5. Run the command on a blocking worker thread; Ctrl-C cancels a running
//!    helper and exits otherwise
//! 6. Log the metrics summary and shut the runtime down

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use steamcmd_link::models::{Operation, UserConfig};
use steamcmd_link::services::{
    ContentRemover, DeletionMode, DownloadOutcome, HttpFetcher, InstalledItem, MetadataStore,
    SetupAnswer, is_redirect, on_helper_not_found, redirect_target,
};
use steamcmd_link::ui::{
    AssumeYes, CancelHandle, ConsoleRunner, DecisionProvider, Interaction, LogReporter, NonInteractive, Reporter,
    TerminalPrompt,
};
use steamcmd_link::{
    APP_NAME, BatchJob, ConfigManager, DepotCacheManager, DownloadOrchestrator, HelperInstaller,
    InstallationState, Metrics, Platform, StateChange, StateManager, VERSION,
};
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(name = "steamcmd-link", version, about)]
struct Cli {
    /// Directory holding Settings.yaml
    #[arg(long, default_value = "steamcmd-link Data")]
    config_dir: Utf8PathBuf,

    /// Answer every prompt with its affirmative choice
    #[arg(short, long)]
    yes: bool,

    /// Debug logging, also echoed to the console
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Install SteamCMD and link its workshop folder to the local mods folder
    Setup {
        /// Delete the existing installation first
        #[arg(long)]
        reinstall: bool,

        /// Local mods folder; saved to Settings.yaml
        #[arg(long)]
        mods: Option<Utf8PathBuf>,
    },

    /// Download workshop items by published file id
    Download {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Ask SteamCMD to validate each item
        #[arg(long)]
        validate: bool,

        /// Clear the depot cache before downloading
        #[arg(long)]
        clear_cache: bool,
    },

    /// Remove the SteamCMD depot cache
    ClearCache,

    /// Delete SteamCMD's workshop metadata (appworkshop_294100.acf)
    ResetMetadata,

    /// Delete mod folders, or only some of their files
    Remove {
        #[arg(required = true)]
        paths: Vec<Utf8PathBuf>,

        /// What to delete from each folder
        #[arg(long, value_enum, default_value_t = RemoveMode::Full)]
        mode: RemoveMode,
    },

    /// Show the resolved installation paths and status
    Paths,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum RemoveMode {
    /// The whole folder
    Full,
    /// Only optimized textures (.dds)
    TexturesOnly,
    /// Everything except optimized textures (.dds)
    KeepTextures,
}

impl From<RemoveMode> for DeletionMode {
    fn from(mode: RemoveMode) -> Self {
        match mode {
            RemoveMode::Full => Self::Full,
            RemoveMode::TexturesOnly => Self::TexturesOnly,
            RemoveMode::KeepTextures => Self::KeepTextures,
        }
    }
}

impl Command {
    fn needs_helper(&self) -> bool {
        matches!(self, Self::Download { .. } | Self::ClearCache)
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let user_config = config_manager.load_user_config()?;
    let debug = cli.debug || user_config.steamcmd.debug_mode;

    let _log_guard = steamcmd_link::logging::setup_logging("logs", APP_NAME, debug, debug, false)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("steamcmd-link-worker")
        .build()?;

    let platform = match Platform::current() {
        Ok(platform) => platform,
        Err(e) => {
            LogReporter.fatal("SteamcmdInterface", &e.to_string(), "");
            return Ok(ExitCode::FAILURE);
        }
    };

    let prefix = absolute(&user_config.steamcmd.prefix)?;
    let state = InstallationState::new(&prefix, platform, user_config.steamcmd.validate_downloads);
    let events = StateManager::new();

    let metrics = Arc::new(Metrics::new());
    let listener = runtime.spawn(observe_events(events.subscribe(), Arc::clone(&metrics)));

    // Once registered, the handler owns SIGINT for the rest of the run
    let cancel = CancelHandle::new();
    let interrupts = Arc::clone(&cancel);
    runtime.spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupts.interrupt() {
                tracing::warn!("Ctrl-C received, stopping SteamCMD");
            } else {
                tracing::warn!("Ctrl-C received, exiting");
                std::process::exit(130);
            }
        }
    });

    let mut installer = HelperInstaller::new(state, Box::new(HttpFetcher::new()?), events);
    installer.adopt_existing();

    let interactive = cli.yes || std::io::stdin().is_terminal();
    let decider: Box<dyn DecisionProvider + Send> = if cli.yes {
        Box::new(AssumeYes)
    } else if interactive {
        Box::new(TerminalPrompt)
    } else {
        Box::new(NonInteractive)
    };

    let session = Session {
        installer,
        config_manager,
        user_config,
        decider,
        runner: ConsoleRunner::new(runtime.handle().clone(), cancel),
        interactive,
    };

    let command = cli.command;
    let result = runtime.block_on(async move {
        tokio::task::spawn_blocking(move || session.run(command)).await
    });

    // The session owned the last event sender, so the listener drains and stops
    let _ = runtime.block_on(async { tokio::time::timeout(Duration::from_secs(1), listener).await });
    metrics.log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");

    result.context("Worker thread panicked")?
}

async fn observe_events(mut rx: broadcast::Receiver<StateChange>, metrics: Arc<Metrics>) {
    loop {
        match rx.recv().await {
            Ok(change) => metrics.observe(&change),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Metrics listener lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve path: {}", path))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|p| anyhow::anyhow!("Path is not valid UTF-8: {}", p.display()))
}

/// Everything one command needs, moved onto the blocking worker.
struct Session {
    installer: HelperInstaller,
    config_manager: ConfigManager,
    user_config: UserConfig,
    decider: Box<dyn DecisionProvider + Send>,
    runner: ConsoleRunner,
    interactive: bool,
}

impl Session {
    fn interaction(&self) -> Interaction<'_> {
        let io = Interaction::new(&self.runner, &*self.decider, &LogReporter);
        if self.interactive { io } else { io.without_dialogues() }
    }

    fn events(&self) -> StateManager {
        self.installer.events().clone()
    }

    fn run(mut self, command: Command) -> Result<ExitCode> {
        if command.needs_helper() && !self.installer.state().is_ready && !self.user_config.steamcmd.ignore {
            let events = self.events();
            let answer = on_helper_not_found(
                &self.installer.state().prefix_path,
                &self.interaction(),
                &events,
                true,
            );
            match answer {
                SetupAnswer::Setup => {
                    if !self.setup(false, None)? {
                        return Ok(ExitCode::FAILURE);
                    }
                }
                SetupAnswer::DontAskAgain => {
                    self.config_manager.set_ignore(true)?;
                    self.user_config.steamcmd.ignore = true;
                    return Ok(ExitCode::FAILURE);
                }
                SetupAnswer::Declined => return Ok(ExitCode::FAILURE),
            }
        }

        let ok = match command {
            Command::Setup { reinstall, mods } => self.setup(reinstall, mods)?,
            Command::Download {
                ids,
                validate,
                clear_cache,
            } => self.download(ids, validate, clear_cache)?,
            Command::ClearCache => self.clear_cache(),
            Command::ResetMetadata => {
                let removed = self.installer.reset_workshop_metadata();
                if removed {
                    println!("Deleted {}", self.installer.state().appworkshop_acf_path());
                } else {
                    println!("SteamCMD ACF data does not exist. Nothing to reset.");
                }
                true
            }
            Command::Remove { paths, mode } => self.remove(paths, mode.into())?,
            Command::Paths => {
                self.print_paths();
                true
            }
        };

        Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }

    fn setup(&mut self, reinstall: bool, mods: Option<Utf8PathBuf>) -> Result<bool> {
        if let Some(mods) = mods {
            let mods = absolute(&mods)?;
            self.user_config.steamcmd.local_mods_path = Some(mods);
            self.config_manager.save_user_config(&self.user_config)?;
        }

        let Some(mods) = self.user_config.steamcmd.local_mods_path.clone() else {
            LogReporter.fatal(
                "SteamcmdInterface",
                "Local mods path is not configured.",
                &format!(
                    "Pass --mods <DIR> or set \"Local Mods Path\" in {}",
                    self.config_manager.user_config_path()
                ),
            );
            return Ok(false);
        };

        let events = self.events();
        if let Err(active) = events.begin_operation(Operation::Setup, 0) {
            LogReporter.warning(
                "SteamcmdInterface",
                &format!("Unable to start setup: {active} is already running."),
                "",
            );
            return Ok(false);
        }

        let decider = &*self.decider;
        let io = {
            let io = Interaction::new(&self.runner, decider, &LogReporter);
            if self.interactive { io } else { io.without_dialogues() }
        };
        self.installer.ensure_installed(&mods, reinstall, &io);
        events.finish_operation();

        Ok(self.installer.state().is_ready)
    }

    fn download(&mut self, ids: Vec<String>, validate: bool, clear_cache: bool) -> Result<bool> {
        let settings = &self.user_config.steamcmd;
        let job = BatchJob::from_raw(
            ids,
            validate || settings.validate_downloads,
            clear_cache || settings.auto_clear_depot_cache,
        );

        let events = self.events();
        let mut setup_requests = events.subscribe();

        let outcome = self.run_batch(&job, &events);

        // The not-found prompt was answered with "setup": install, then retry once
        if outcome == Some(DownloadOutcome::NotReady) && drain_setup_requested(&mut setup_requests) {
            if !self.setup(false, None)? {
                return Ok(false);
            }
            return Ok(matches!(
                self.run_batch(&job, &events),
                Some(DownloadOutcome::Finished { exit_code: Some(0) })
            ));
        }

        Ok(matches!(
            outcome,
            Some(DownloadOutcome::Finished { exit_code: Some(0) })
        ))
    }

    fn run_batch(&self, job: &BatchJob, events: &StateManager) -> Option<DownloadOutcome> {
        if let Err(active) = events.begin_operation(Operation::Download, job.len()) {
            LogReporter.warning(
                "SteamcmdInterface",
                &format!("Unable to start download: {active} is already running."),
                "",
            );
            return None;
        }

        let outcome =
            DownloadOrchestrator::new(self.installer.state(), events).download(job, &self.interaction());
        events.finish_operation();
        tracing::info!("Download finished: {:?}", outcome);
        Some(outcome)
    }

    fn clear_cache(&self) -> bool {
        let events = self.events();
        if let Err(active) = events.begin_operation(Operation::ClearCache, 0) {
            LogReporter.warning(
                "SteamcmdInterface",
                &format!("Unable to clear the depot cache: {active} is already running."),
                "",
            );
            return false;
        }

        let cleared = DepotCacheManager::new(self.installer.state(), &events).clear(&self.interaction());
        events.finish_operation();
        cleared
    }

    fn remove(&self, paths: Vec<Utf8PathBuf>, mode: DeletionMode) -> Result<bool> {
        let mods_root = self.user_config.steamcmd.local_mods_path.as_deref();
        let items = paths
            .iter()
            .map(|path| Ok::<_, anyhow::Error>(InstalledItem::from_path(absolute(path)?, mods_root)))
            .collect::<Result<Vec<_>>>()?;

        let events = self.events();
        if let Err(active) = events.begin_operation(Operation::Removal, items.len()) {
            LogReporter.warning(
                "SteamcmdInterface",
                &format!("Unable to remove mods: {active} is already running."),
                "",
            );
            return Ok(false);
        }

        let summary = ContentRemover::new(&events, Some(&PurgeNotice))
            .delete_items(&items, mode, &self.interaction());
        events.finish_operation();

        println!("Removed {} of {} mods", summary.removed.len(), items.len());
        Ok(summary.removed.len() == items.len())
    }

    fn print_paths(&self) {
        let state = self.installer.state();
        let destination = state.redirect_destination();

        println!("Platform:            {}", state.platform);
        println!("Prefix:              {}", state.prefix_path);
        println!("Install path:        {}", state.install_path);
        println!("Executable:          {}", state.executable_path);
        println!("Steam root:          {}", state.steam_root_path);
        println!("Depot cache:         {}", state.cache_path);
        println!("Workshop metadata:   {}", state.appworkshop_acf_path());
        println!("Redirect:            {}", destination);
        if is_redirect(&destination) {
            if let Some(target) = redirect_target(&destination) {
                println!("Redirect target:     {}", target);
            }
        }
        println!("Phase:               {}", state.phase);
        println!("Ready:               {}", state.is_ready);
    }
}

/// Tells the user which helper downloads SteamCMD still has on record.
struct PurgeNotice;

impl MetadataStore for PurgeNotice {
    fn purge_items(&self, ids: &BTreeSet<String>) {
        tracing::info!("Removed SteamCMD downloads: {:?}", ids);
        println!(
            "SteamCMD still lists {} removed item(s) in its workshop metadata; run `reset-metadata` to clear it.",
            ids.len()
        );
    }
}

fn drain_setup_requested(rx: &mut broadcast::Receiver<StateChange>) -> bool {
    let mut requested = false;
    loop {
        match rx.try_recv() {
            Ok(StateChange::SetupRequested) => requested = true,
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    requested
}
