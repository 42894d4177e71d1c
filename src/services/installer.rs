use crate::models::{InstallPhase, InstallationState, RedirectRequest};
use crate::services::archive::{self, ArchiveFetcher};
use crate::services::conflict::ConflictResolver;
use crate::services::redirect::is_redirect;
use crate::services::removal::remove_tree;
use crate::state::{StateChange, StateManager};
use crate::ui::{DONT_ASK_AGAIN, Interaction, Prompt};
use camino::Utf8Path;
use std::fs;

const SYMLINK_PURPOSE: &str = "The symlink makes SteamCMD download mods to the local mods folder and is required for SteamCMD mod downloads to work correctly.";

/// Answer to the "SteamCMD was not found" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupAnswer {
    Setup,
    Declined,
    DontAskAgain,
}

/// Ask whether the helper should be set up because an operation needed it.
///
/// An affirmative answer publishes [`StateChange::SetupRequested`]. The sink
/// is closed either way. "Don't Ask Again" is only offered with `ask_ignore`;
/// persisting it is up to the caller.
pub fn on_helper_not_found(
    prefix: &Utf8Path,
    io: &Interaction,
    events: &StateManager,
    ask_ignore: bool,
) -> SetupAnswer {
    let shown_prefix = if prefix.as_str().is_empty() {
        "<None>"
    } else {
        prefix.as_str()
    };

    let mut prompt = Prompt::yes_no(
        "SteamCMD setup",
        "Unable to find SteamCMD installed in the configured prefix:\n",
        format!("{shown_prefix}\n\nDo you want to setup SteamCMD?"),
    );
    if ask_ignore {
        prompt = prompt.with_button(DONT_ASK_AGAIN);
    }

    let answer = io.decider.ask(&prompt);
    let result = if prompt.is_affirmative(&answer) {
        events.publish(StateChange::SetupRequested);
        SetupAnswer::Setup
    } else if ask_ignore && answer == DONT_ASK_AGAIN {
        SetupAnswer::DontAskAgain
    } else {
        SetupAnswer::Declined
    };

    io.sink.close();
    result
}

/// Installs the helper into its prefix and links its workshop content
/// directory to the user's mods folder.
///
/// Phases: `Uninitialized -> Installing -> Installed -> Linked`, with
/// `Failed` reachable from `Installing`. Only a fresh install links.
pub struct HelperInstaller {
    state: InstallationState,
    fetcher: Box<dyn ArchiveFetcher>,
    resolver: ConflictResolver,
    events: StateManager,
}

impl HelperInstaller {
    pub fn new(state: InstallationState, fetcher: Box<dyn ArchiveFetcher>, events: StateManager) -> Self {
        events.reset_installation(state.prefix_path.clone());
        tracing::debug!(
            "Initialized helper installer for {} ({})",
            state.prefix_path,
            state.platform
        );

        Self {
            state,
            fetcher,
            resolver: ConflictResolver::default(),
            events,
        }
    }

    pub fn state(&self) -> &InstallationState {
        &self.state
    }

    pub fn events(&self) -> &StateManager {
        &self.events
    }

    /// Re-resolve every path for a new prefix. Readiness is lost.
    pub fn set_prefix(&mut self, prefix: &Utf8Path, validate_downloads: bool) {
        if self.state.prefix_path == prefix {
            self.state.validate_downloads = validate_downloads;
            return;
        }

        tracing::info!("Helper prefix changed: {} -> {}", self.state.prefix_path, prefix);
        self.state = InstallationState::new(prefix, self.state.platform, validate_downloads);
        self.events.reset_installation(prefix.to_path_buf());
    }

    fn set_phase(&mut self, phase: InstallPhase) {
        tracing::debug!("Installer phase: {} -> {}", self.state.phase, phase);
        self.state.phase = phase;
        self.events.set_phase(phase);
    }

    fn set_ready(&mut self, is_ready: bool) {
        self.state.is_ready = is_ready;
        self.events.set_ready(is_ready);
    }

    /// Create the install root and the helper's steam root if missing.
    pub fn prepare_prefix(&self) -> std::io::Result<()> {
        for dir in [&self.state.install_path, &self.state.steam_root_path] {
            if !dir.exists() {
                tracing::debug!("Creating helper directory: {}", dir);
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Pick up an installation left by an earlier run.
    ///
    /// Ready only when the executable is present and the content directory is
    /// already a redirect.
    pub fn adopt_existing(&mut self) -> bool {
        if !self.state.executable_present() {
            return false;
        }

        if is_redirect(&self.state.redirect_destination()) {
            tracing::info!("Found linked helper installation at {}", self.state.install_path);
            self.set_phase(InstallPhase::Linked);
            self.set_ready(true);
            true
        } else {
            tracing::info!(
                "Found helper at {} but {} is not linked",
                self.state.executable_path,
                self.state.redirect_destination()
            );
            self.set_phase(InstallPhase::Installed);
            false
        }
    }

    /// Make sure the helper is installed, linking `source` after a fresh install.
    ///
    /// With `reinstall` the install directory is wiped first. An existing
    /// install without `reinstall` offers a reinstall instead.
    pub fn ensure_installed(&mut self, source: &Utf8Path, reinstall: bool, io: &Interaction) {
        if let Err(e) = self.prepare_prefix() {
            io.reporter.fatal(
                "SteamcmdInterface",
                &format!("Failed to prepare SteamCMD prefix: {}", self.state.prefix_path),
                &format!("Error: {e}"),
            );
            self.set_phase(InstallPhase::Failed);
            return;
        }

        if reinstall {
            io.message("Existing steamcmd installation found!");
            if !self.wipe(io) {
                return;
            }
        } else if self.state.executable_present() {
            io.message("SteamCMD already installed...");
            io.reporter.warning(
                "SteamcmdInterface",
                &format!("A steamcmd runner already exists at: {}", self.state.executable_path),
                "",
            );
            if matches!(self.state.phase, InstallPhase::Uninitialized | InstallPhase::Failed) {
                self.set_phase(InstallPhase::Installed);
            }

            let prompt = Prompt::yes_no(
                "Reinstall?",
                "Would you like to reinstall SteamCMD?",
                format!("Existing install: {}", self.state.install_path),
            );
            if !io.confirm(&prompt) {
                return;
            }

            io.message(&format!("Reinstalling SteamCMD: {}", self.state.install_path));
            if !self.wipe(io) {
                return;
            }
        }

        if self.install_fresh(io) {
            self.establish_redirect(source, io);
        }
    }

    /// Remove the install directory and recreate it empty.
    pub fn wipe(&mut self, io: &Interaction) -> bool {
        self.set_ready(false);
        self.set_phase(InstallPhase::Installing);

        let install_path = self.state.install_path.clone();
        io.message(&format!("Deleting existing installation from: {install_path}"));

        match remove_tree(&install_path) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                io.reporter.warning(
                    "SteamcmdInterface",
                    &format!("Failed to delete existing installation: {install_path}"),
                    &format!("Error: {e}"),
                );
                self.set_phase(InstallPhase::Failed);
                return false;
            }
        }

        if let Err(e) = fs::create_dir_all(&install_path) {
            io.reporter.fatal(
                "SteamcmdInterface",
                &format!("Failed to recreate installation directory: {install_path}"),
                &format!("Error: {e}"),
            );
            self.set_phase(InstallPhase::Failed);
            return false;
        }

        true
    }

    /// Download the platform archive and unpack it into the install directory.
    pub fn install_fresh(&mut self, io: &Interaction) -> bool {
        self.set_phase(InstallPhase::Installing);

        let url = self.state.download_url.clone();
        let platform = self.state.platform;
        io.message(&format!("Downloading & extracting steamcmd release from: {url}"));

        let result = self.fetcher.fetch(&url).and_then(|bytes| {
            archive::extract(&bytes, platform.archive_format(), &self.state.install_path)
        });

        let failure = match result {
            Ok(_) if self.state.executable_present() => None,
            Ok(_) => Some(format!(
                "Archive did not contain {}",
                platform.executable_name()
            )),
            Err(e) => Some(format!("Error: {e}")),
        };

        if let Some(details) = failure {
            io.message("Installation failed");
            io.reporter.fatal(
                "SteamcmdInterface",
                &format!("Failed to download steamcmd for {platform}"),
                &format!(
                    "Did the file/url change?\nDoes your environment have access to the internet?\nURL: {url}\n{details}"
                ),
            );
            self.set_phase(InstallPhase::Failed);
            return false;
        }

        io.message("Installation completed");
        self.set_phase(InstallPhase::Installed);
        true
    }

    /// Ask for and create the redirect from the content directory to `source`.
    pub fn establish_redirect(&mut self, source: &Utf8Path, io: &Interaction) -> bool {
        let content_root = self.state.content_root();
        if !content_root.exists() {
            if let Err(e) = fs::create_dir_all(&content_root) {
                io.reporter.warning(
                    "SteamcmdInterface",
                    &format!("Failed to create workshop content path: {content_root}"),
                    &format!("Error: {e}"),
                );
                return false;
            }
            io.message(&format!(
                "Workshop content path does not exist. Creating for symlinking:\n\n{content_root}\n"
            ));
        }

        let destination = self.state.redirect_destination();
        io.message(&format!("Symlink source : {source}"));
        io.message(&format!("Symlink destination: {destination}"));

        let new_link = format!("[{source}] -> {destination}");
        let (prompt, force) = if is_redirect(&destination) {
            io.message(&format!(
                "Symlink destination already exists! Please remove existing destination:\n\n{destination}\n"
            ));
            let prompt = Prompt::yes_no(
                "Re-create Symlink?",
                "An existing symlink already exists. Would you like to delete and re-create the symlink?",
                SYMLINK_PURPOSE,
            )
            .with_details(format!("Existing symlink: {destination}\n\nNew symlink:\n{new_link}"));
            (prompt, true)
        } else if destination.exists() {
            io.message(&format!(
                "Symlink destination already exists! Please remove existing destination:\n\n{destination}\n"
            ));
            let prompt = Prompt::yes_no(
                "Re-create Symlink?",
                "The symlink destination path already exists. Would you like to remove the existing destination and create a new symlink in it's place?",
                SYMLINK_PURPOSE,
            )
            .with_details(format!("Existing destination: {destination}\n\nNew symlink:\n{new_link}"));
            (prompt, true)
        } else {
            let prompt = Prompt::yes_no("Create Symlink?", "Do you want to create a symlink?", SYMLINK_PURPOSE)
                .with_details(format!("New symlink:\n{new_link}"));
            (prompt, false)
        };

        if !io.confirm(&prompt) {
            io.message("Symlink was not created. SteamCMD downloads stay disabled until it is.");
            return false;
        }

        let request = RedirectRequest::new(source, destination, force);
        if !self.resolver.create_with_recovery(&request, io) {
            return false;
        }

        self.set_phase(InstallPhase::Linked);
        self.set_ready(true);
        true
    }

    /// Delete the helper's workshop metadata file. Returns whether one existed.
    pub fn reset_workshop_metadata(&self) -> bool {
        let acf = self.state.appworkshop_acf_path();
        if !acf.exists() {
            tracing::debug!("SteamCMD ACF data does not exist. Skipping action.");
            return false;
        }

        tracing::debug!("Deleting SteamCMD ACF data: {}", acf);
        match fs::remove_file(&acf) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to delete {}: {}", acf, e);
                false
            }
        }
    }
}
