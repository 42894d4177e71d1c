use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use thiserror::Error;

/// Workshop app id every download and the redirect destination are keyed by.
pub const CONTENT_SET_ID: &str = "294100";

/// Directory name of the helper installation inside the prefix.
pub const HELPER_DIR_NAME: &str = "steamcmd";

/// Platforms the helper publishes release archives for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
}

/// Container format of a helper release archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Found platform {0}. steamcmd is not supported on this platform.")]
pub struct UnsupportedPlatform(pub String);

impl Platform {
    /// Platform of the running process.
    pub fn current() -> Result<Self, UnsupportedPlatform> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an `std::env::consts::OS` style name onto a supported platform.
    pub fn from_os(os: &str) -> Result<Self, UnsupportedPlatform> {
        match os {
            "macos" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            other => Err(UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn archive_url(self) -> &'static str {
        match self {
            Self::MacOs => "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_osx.tar.gz",
            Self::Linux => "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz",
            Self::Windows => "https://steamcdn-a.akamaihd.net/client/installer/steamcmd.zip",
        }
    }

    pub fn archive_format(self) -> ArchiveFormat {
        match self {
            Self::MacOs | Self::Linux => ArchiveFormat::TarGz,
            Self::Windows => ArchiveFormat::Zip,
        }
    }

    pub fn executable_name(self) -> &'static str {
        match self {
            Self::MacOs | Self::Linux => "steamcmd.sh",
            Self::Windows => "steamcmd.exe",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MacOs => "Darwin",
            Self::Linux => "Linux",
            Self::Windows => "Windows",
        };
        f.write_str(name)
    }
}

/// Lifecycle of the helper installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallPhase {
    #[default]
    Uninitialized,
    Installing,
    Installed,
    Linked,
    Failed,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Linked => "linked",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Resolved paths and status of one helper installation.
///
/// Only [`HelperInstaller`](crate::services::HelperInstaller) mutates this;
/// the download orchestrator and the depot cache manager borrow it.
#[derive(Debug, Clone)]
pub struct InstallationState {
    pub prefix_path: Utf8PathBuf,
    pub install_path: Utf8PathBuf,
    pub cache_path: Utf8PathBuf,
    pub steam_root_path: Utf8PathBuf,
    pub platform: Platform,
    pub executable_path: Utf8PathBuf,
    pub download_url: String,
    pub validate_downloads: bool,
    pub is_ready: bool,
    pub phase: InstallPhase,
}

impl InstallationState {
    /// Resolve every path for `prefix` on `platform`. Nothing is touched on disk.
    pub fn new(prefix: impl AsRef<Utf8Path>, platform: Platform, validate_downloads: bool) -> Self {
        let prefix_path = prefix.as_ref().to_path_buf();
        let install_path = prefix_path.join(HELPER_DIR_NAME);

        Self {
            cache_path: install_path.join("depotcache"),
            steam_root_path: prefix_path.join("steam"),
            executable_path: install_path.join(platform.executable_name()),
            download_url: platform.archive_url().to_string(),
            install_path,
            prefix_path,
            platform,
            validate_downloads,
            is_ready: false,
            phase: InstallPhase::Uninitialized,
        }
    }

    /// Same as [`new`](Self::new) for the platform of the running process.
    pub fn for_current_platform(
        prefix: impl AsRef<Utf8Path>,
        validate_downloads: bool,
    ) -> Result<Self, UnsupportedPlatform> {
        Ok(Self::new(prefix, Platform::current()?, validate_downloads))
    }

    pub fn workshop_path(&self) -> Utf8PathBuf {
        self.steam_root_path.join("steamapps").join("workshop")
    }

    /// `appworkshop_<id>.acf`, read by the metadata collaborator.
    pub fn appworkshop_acf_path(&self) -> Utf8PathBuf {
        self.workshop_path()
            .join(format!("appworkshop_{}.acf", CONTENT_SET_ID))
    }

    /// Root the helper downloads workshop content into.
    pub fn content_root(&self) -> Utf8PathBuf {
        self.workshop_path().join("content")
    }

    /// Path re-pointed at the user's mods folder.
    pub fn redirect_destination(&self) -> Utf8PathBuf {
        self.content_root().join(CONTENT_SET_ID)
    }

    pub fn executable_present(&self) -> bool {
        self.executable_path.exists()
    }
}

/// A request to point `destination` at `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRequest {
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub force: bool,
}

impl RedirectRequest {
    pub fn new(source: impl Into<Utf8PathBuf>, destination: impl Into<Utf8PathBuf>, force: bool) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            force,
        }
    }

    pub fn forced(&self) -> Self {
        Self {
            force: true,
            ..self.clone()
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("content item id must not be empty")]
pub struct EmptyItemId;

/// Opaque workshop item id (a published file id in practice).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentItemId(String);

impl ContentItemId {
    pub fn new(id: impl Into<String>) -> Result<Self, EmptyItemId> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(EmptyItemId);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ContentItemId {
    type Error = EmptyItemId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for ContentItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One helper invocation worth of downloads. Order is kept, duplicates too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub item_ids: Vec<ContentItemId>,
    pub validate: bool,
    pub clear_cache_first: bool,
}

impl BatchJob {
    pub fn new(item_ids: Vec<ContentItemId>, validate: bool, clear_cache_first: bool) -> Self {
        Self {
            item_ids,
            validate,
            clear_cache_first,
        }
    }

    /// Build a job from raw strings, dropping blank ids.
    pub fn from_raw<I, S>(ids: I, validate: bool, clear_cache_first: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let item_ids = ids
            .into_iter()
            .filter_map(|id| ContentItemId::new(id).ok())
            .collect();
        Self::new(item_ids, validate, clear_cache_first)
    }

    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_table() {
        assert_eq!(Platform::Linux.executable_name(), "steamcmd.sh");
        assert_eq!(Platform::MacOs.executable_name(), "steamcmd.sh");
        assert_eq!(Platform::Windows.executable_name(), "steamcmd.exe");

        assert_eq!(Platform::Linux.archive_format(), ArchiveFormat::TarGz);
        assert_eq!(Platform::MacOs.archive_format(), ArchiveFormat::TarGz);
        assert_eq!(Platform::Windows.archive_format(), ArchiveFormat::Zip);

        assert!(Platform::Linux.archive_url().ends_with("steamcmd_linux.tar.gz"));
        assert!(Platform::MacOs.archive_url().ends_with("steamcmd_osx.tar.gz"));
        assert!(Platform::Windows.archive_url().ends_with("steamcmd.zip"));
    }

    #[test]
    fn test_unsupported_platform() {
        let err = Platform::from_os("freebsd").unwrap_err();
        assert_eq!(err, UnsupportedPlatform("freebsd".to_string()));
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_state_layout() {
        let state = InstallationState::new("/opt/prefix", Platform::Linux, true);

        assert_eq!(state.install_path, Utf8PathBuf::from("/opt/prefix/steamcmd"));
        assert_eq!(state.cache_path, Utf8PathBuf::from("/opt/prefix/steamcmd/depotcache"));
        assert_eq!(state.steam_root_path, Utf8PathBuf::from("/opt/prefix/steam"));
        assert_eq!(
            state.executable_path,
            Utf8PathBuf::from("/opt/prefix/steamcmd/steamcmd.sh")
        );
        assert_eq!(
            state.redirect_destination(),
            Utf8PathBuf::from("/opt/prefix/steam/steamapps/workshop/content/294100")
        );
        assert_eq!(
            state.appworkshop_acf_path(),
            Utf8PathBuf::from("/opt/prefix/steam/steamapps/workshop/appworkshop_294100.acf")
        );
        assert!(state.validate_downloads);
        assert!(!state.is_ready);
        assert_eq!(state.phase, InstallPhase::Uninitialized);
    }

    #[test]
    fn test_item_id_rejects_blank() {
        assert!(ContentItemId::new("").is_err());
        assert!(ContentItemId::new("   ").is_err());
        assert_eq!(ContentItemId::new("123").unwrap().as_str(), "123");
        assert_eq!(ContentItemId::new(" 456\n").unwrap().as_str(), "456");
    }

    #[test]
    fn test_batch_from_raw_keeps_order_and_duplicates() {
        let job = BatchJob::from_raw(["2", "", "1", "2"], false, false);
        let ids: Vec<_> = job.item_ids.iter().map(ContentItemId::as_str).collect();
        assert_eq!(ids, vec!["2", "1", "2"]);
    }
}
