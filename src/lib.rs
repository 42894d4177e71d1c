// steamcmd-link - SteamCMD installation, workshop downloads and mods-folder linking
//
// This is the library crate containing the core logic and data structures.
// The binary crate (main.rs) provides the command line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{AppState, BatchJob, InstallPhase, InstallationState, Platform, UserConfig};
pub use services::{DepotCacheManager, DownloadOrchestrator, HelperInstaller};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
