//! Directory redirects: a symlink on POSIX, a junction on Windows.

use crate::models::RedirectRequest;
use crate::services::removal::{self, remove_tree};
use crate::ui::ExecutionSink;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

/// Why a redirect could not be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    DestinationNonEmptyDirectory,
    DestinationIsFile,
    DestinationParentMissing,
    Unknown,
}

#[derive(Error, Debug)]
pub enum RedirectError {
    #[error("The symlink destination exists and is a non-empty directory: {0}")]
    DestinationNonEmptyDirectory(Utf8PathBuf),

    #[error("The symlink destination exists and is a file: {0}")]
    DestinationIsFile(Utf8PathBuf),

    #[error("The symlink destination parent directory does not exist: {0}")]
    DestinationParentMissing(Utf8PathBuf),

    #[error("The symlink source does not exist or is not a directory: {0}")]
    SourceNotDirectory(Utf8PathBuf),

    #[error("Failed to create symlink at {destination}: {source}")]
    Io {
        destination: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RedirectError {
    pub fn kind(&self) -> ConflictKind {
        match self {
            Self::DestinationNonEmptyDirectory(_) => ConflictKind::DestinationNonEmptyDirectory,
            Self::DestinationIsFile(_) => ConflictKind::DestinationIsFile,
            Self::DestinationParentMissing(_) => ConflictKind::DestinationParentMissing,
            Self::SourceNotDirectory(_) | Self::Io { .. } => ConflictKind::Unknown,
        }
    }

    fn io(destination: &Utf8Path, source: io::Error) -> Self {
        Self::Io {
            destination: destination.to_path_buf(),
            source,
        }
    }
}

/// Creates and replaces directory redirects.
///
/// Paths are used as given. A relative `source` is resolved by the OS
/// relative to the link's directory, so pass absolute paths when the
/// working directory may change.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectManager;

impl RedirectManager {
    pub fn new() -> Self {
        Self
    }

    /// Point `request.destination` at `request.source`.
    ///
    /// Without `force` only an absent destination, an existing redirect or an
    /// empty directory is replaced; anything else fails with a typed conflict.
    /// With `force` whatever sits at the destination is removed first.
    pub fn create_redirect(
        &self,
        request: &RedirectRequest,
        sink: Option<&dyn ExecutionSink>,
    ) -> Result<(), RedirectError> {
        let source = &request.source;
        let destination = &request.destination;

        if let Some(sink) = sink {
            sink.message(&format!("[{}] -> {}", source, destination));
        }

        if !source.is_dir() {
            return Err(RedirectError::SourceNotDirectory(source.clone()));
        }

        if request.force {
            return self.force_create(source, destination);
        }

        if destination
            .parent()
            .is_some_and(|parent| !parent.as_str().is_empty() && !parent.is_dir())
        {
            return Err(RedirectError::DestinationParentMissing(destination.clone()));
        }

        match fs::symlink_metadata(destination) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(RedirectError::io(destination, e)),
            Ok(meta) if removal::is_link(destination.as_std_path(), &meta) => {
                tracing::debug!("Replacing existing redirect at {}", destination);
                removal::remove_link(destination.as_std_path())
                    .map_err(|e| RedirectError::io(destination, e))?;
            }
            Ok(meta) if meta.is_dir() => {
                let is_empty = fs::read_dir(destination)
                    .map_err(|e| RedirectError::io(destination, e))?
                    .next()
                    .is_none();
                if !is_empty {
                    return Err(RedirectError::DestinationNonEmptyDirectory(destination.clone()));
                }
                tracing::debug!("Removing empty directory at {}", destination);
                fs::remove_dir(destination).map_err(|e| RedirectError::io(destination, e))?;
            }
            Ok(_) => return Err(RedirectError::DestinationIsFile(destination.clone())),
        }

        create_link(source, destination).map_err(|e| RedirectError::io(destination, e))?;
        tracing::info!("Created redirect {} -> {}", destination, source);
        Ok(())
    }

    fn force_create(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<(), RedirectError> {
        if fs::symlink_metadata(destination).is_ok() {
            tracing::warn!("Force removing existing destination {}", destination);
            remove_tree(destination).map_err(|e| RedirectError::io(destination, e.source))?;
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RedirectError::io(destination, e))?;
        }

        create_link(source, destination).map_err(|e| RedirectError::io(destination, e))?;
        tracing::info!("Created redirect {} -> {} (forced)", destination, source);
        Ok(())
    }
}

/// Whether `path` itself is a symlink or junction (not what it points to).
pub fn is_redirect(path: &Utf8Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| removal::is_link(path.as_std_path(), &meta))
        .unwrap_or(false)
}

/// Target a redirect points to, as stored in the link.
pub fn redirect_target(path: &Utf8Path) -> Option<Utf8PathBuf> {
    let target = fs::read_link(path).ok()?;
    Utf8PathBuf::from_path_buf(target).ok()
}

#[cfg(windows)]
fn create_link(source: &Utf8Path, destination: &Utf8Path) -> io::Result<()> {
    let out = std::process::Command::new("cmd")
        .args(["/C", "mklink", "/J", destination.as_str(), source.as_str()])
        .output()?;

    if !out.status.success() {
        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(io::Error::other(format!("mklink /J failed: {stdout}{stderr}")));
    }
    Ok(())
}

#[cfg(unix)]
fn create_link(source: &Utf8Path, destination: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, destination)
}

#[cfg(not(any(unix, windows)))]
fn create_link(_source: &Utf8Path, _destination: &Utf8Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "directory redirects are not supported on this platform",
    ))
}
