//! Data models for steamcmd-link.
//!
//! - [`InstallationState`]: resolved helper paths, platform, phase and readiness for one prefix
//! - [`Platform`]: fixed platform table (release archive URL, archive format, executable name)
//! - [`RedirectRequest`], [`BatchJob`], [`ContentItemId`]: inputs of the link and download operations
//! - [`AppState`]: the observable view published by [`StateManager`](crate::state::StateManager)
//! - [`UserConfig`]: user preferences loaded from `Settings.yaml`

pub mod app_state;
pub mod config;
pub mod installation;

pub use app_state::{AppState, Operation};
pub use config::{SteamcmdSettings, UserConfig};
pub use installation::{
    ArchiveFormat, BatchJob, CONTENT_SET_ID, ContentItemId, EmptyItemId, HELPER_DIR_NAME,
    InstallPhase, InstallationState, Platform, RedirectRequest, UnsupportedPlatform,
};
