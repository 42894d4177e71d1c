use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// User configuration from `Settings.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "SteamCMD", default)]
    pub steamcmd: SteamcmdSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteamcmdSettings {
    /// Directory holding `steamcmd/` and `steam/`
    #[serde(rename = "Prefix", default = "default_prefix")]
    pub prefix: Utf8PathBuf,

    /// Local mods folder the workshop content directory is redirected to
    #[serde(rename = "Local Mods Path", default)]
    pub local_mods_path: Option<Utf8PathBuf>,

    #[serde(rename = "Validate Downloads", default)]
    pub validate_downloads: bool,

    #[serde(rename = "Auto Clear Depot Cache", default)]
    pub auto_clear_depot_cache: bool,

    /// "Don't ask again" answer to the setup prompt
    #[serde(rename = "Ignore", default)]
    pub ignore: bool,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for SteamcmdSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            local_mods_path: None,
            validate_downloads: false,
            auto_clear_depot_cache: false,
            ignore: false,
            debug_mode: false,
        }
    }
}

fn default_prefix() -> Utf8PathBuf {
    Utf8PathBuf::from("steamcmd-prefix")
}
