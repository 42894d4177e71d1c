use crate::models::{BatchJob, CONTENT_SET_ID, InstallationState};
use crate::services::depot_cache::DepotCacheManager;
use crate::services::installer::on_helper_not_found;
use crate::state::StateManager;
use crate::ui::Interaction;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// How a download batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Installation is not linked; the setup prompt was shown instead
    NotReady,

    /// The batch had no items
    NothingToDo,

    /// The batch script could not be written
    ScriptFailed,

    /// The helper ran to exit, or was cancelled when `exit_code` is `None`
    Finished { exit_code: Option<i32> },
}

/// Batch script for `job`, one download command per item in input order.
///
/// Duplicate ids are kept; the helper downloads them twice.
pub fn build_script(steam_root: &Utf8Path, job: &BatchJob) -> String {
    let mut script = Vec::with_capacity(job.len() + 3);
    script.push(format!("force_install_dir \"{steam_root}\""));
    script.push("login anonymous".to_string());

    for id in &job.item_ids {
        if job.validate {
            script.push(format!("workshop_download_item {CONTENT_SET_ID} {id} validate"));
        } else {
            script.push(format!("workshop_download_item {CONTENT_SET_ID} {id}"));
        }
    }

    script.push("quit\n".to_string());
    script.join("\n")
}

/// Runs download batches through the installed helper.
pub struct DownloadOrchestrator<'a> {
    state: &'a InstallationState,
    events: &'a StateManager,
    script_dir: Utf8PathBuf,
}

impl<'a> DownloadOrchestrator<'a> {
    pub fn new(state: &'a InstallationState, events: &'a StateManager) -> Self {
        let temp = std::env::temp_dir();
        let script_dir = Utf8PathBuf::from_path_buf(temp)
            .unwrap_or_else(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()));

        Self {
            state,
            events,
            script_dir,
        }
    }

    pub fn with_script_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.script_dir = dir.into();
        self
    }

    /// Script location for this process. Rewritten by every batch.
    pub fn script_path(&self) -> Utf8PathBuf {
        self.script_dir
            .join(format!("steamcmd_script_{}.txt", std::process::id()))
    }

    pub fn download(&self, job: &BatchJob, io: &Interaction) -> DownloadOutcome {
        io.message("Checking for steamcmd...");
        if !self.state.is_ready {
            io.message("SteamCMD was not found. Please setup SteamCMD first!");
            on_helper_not_found(&self.state.prefix_path, io, self.events, false);
            return DownloadOutcome::NotReady;
        }

        if job.is_empty() {
            io.reporter.warning(
                "SteamcmdInterface",
                "No mods were selected for download.",
                "",
            );
            return DownloadOutcome::NothingToDo;
        }

        io.message(&format!(
            "Got it: {}\nDownloading list of {} publishedfileids to: {}",
            self.state.executable_path,
            job.len(),
            self.state.steam_root_path
        ));

        if job.clear_cache_first {
            DepotCacheManager::new(self.state, self.events).clear_before_batch(io);
        }

        let script_path = self.script_path();
        let script = build_script(&self.state.steam_root_path, job);
        if let Err(e) = fs::write(&script_path, script) {
            io.reporter.fatal(
                "SteamcmdInterface",
                "Failed to write the SteamCMD script.",
                &format!("Path: {script_path}\nError: {e}"),
            );
            return DownloadOutcome::ScriptFailed;
        }
        io.message(&format!("Compiled & using script: {script_path}"));

        let args = vec![format!("+runscript \"{script_path}\"")];
        let exit_code = io
            .sink
            .execute(&self.state.executable_path, &args, job.len());

        match exit_code {
            Some(code) => tracing::info!("SteamCMD exited with code {}", code),
            None => tracing::warn!("SteamCMD did not run to completion"),
        }

        if let Err(e) = fs::remove_file(&script_path) {
            tracing::debug!("Failed to remove script {}: {}", script_path, e);
        }

        DownloadOutcome::Finished { exit_code }
    }
}
