use crate::models::InstallPhase;
use camino::Utf8PathBuf;
use std::fmt;

/// Long-running operations the application serializes.
///
/// Only one runs at a time: the helper locks its own install directory, so a
/// second instance against the same prefix fails in unpredictable ways.
/// Enforced by [`StateManager::begin_operation`](crate::state::StateManager::begin_operation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Setup,
    Download,
    ClearCache,
    Removal,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Setup => "SteamCMD setup",
            Self::Download => "SteamCMD downloader",
            Self::ClearCache => "depot cache clear",
            Self::Removal => "mod removal",
        };
        f.write_str(name)
    }
}

/// Observable application state.
///
/// The installer owns the authoritative [`InstallationState`](crate::models::InstallationState);
/// this is the view of it published to listeners through
/// [`StateManager`](crate::state::StateManager).
#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub prefix: Option<Utf8PathBuf>,
    pub phase: InstallPhase,
    pub is_ready: bool,

    pub active_operation: Option<Operation>,
    pub last_batch_size: usize,
}

impl AppState {
    pub fn is_busy(&self) -> bool {
        self.active_operation.is_some()
    }

    /// Reset the per-installation fields, e.g. after the prefix changed.
    pub fn reset_installation(&mut self) {
        self.phase = InstallPhase::Uninitialized;
        self.is_ready = false;
        self.last_batch_size = 0;
    }
}
