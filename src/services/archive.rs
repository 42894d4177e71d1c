//! Fetching and unpacking the helper release archive.
//!
//! The archive is held in memory in full before it is unpacked; helper
//! releases are a few megabytes.

use crate::models::ArchiveFormat;
use camino::Utf8Path;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use thiserror::Error;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to extract {path}: {source}")]
    Extract {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    fn extract(path: &Path, source: io::Error) -> Self {
        Self::Extract {
            path: path.to_string_lossy().into_owned(),
            source,
        }
    }
}

/// Downloads a release archive into memory.
pub trait ArchiveFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ArchiveError>;
}

/// [`ArchiveFetcher`] over HTTPS.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ArchiveError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("steamcmd-link/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ArchiveError::Fetch {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ArchiveError> {
        let fetch_err = |source| ArchiveError::Fetch {
            url: url.to_string(),
            source,
        };

        tracing::info!("Downloading {}", url);
        let bytes = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.bytes())
            .map_err(fetch_err)?;

        tracing::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

/// Unpack `bytes` into `dest_dir`, skipping entries that would escape it.
pub fn extract(bytes: &[u8], format: ArchiveFormat, dest_dir: &Utf8Path) -> Result<usize, ArchiveError> {
    fs::create_dir_all(dest_dir).map_err(|e| ArchiveError::extract(dest_dir.as_std_path(), e))?;

    let count = match format {
        ArchiveFormat::Zip => extract_zip(bytes, dest_dir.as_std_path())?,
        ArchiveFormat::TarGz => extract_tar_gz(bytes, dest_dir.as_std_path())?,
    };

    tracing::info!("Extracted {} entries into {}", count, dest_dir);
    Ok(count)
}

fn extract_zip(bytes: &[u8], dest_dir: &Path) -> Result<usize, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut extracted = 0usize;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        // Prevent Zip Slip (path traversal). Skip unsafe paths.
        let Some(safe_rel) = entry.enclosed_name() else {
            tracing::warn!("Skipped unsafe zip path: {}", entry.name());
            continue;
        };
        let out_path = dest_dir.join(safe_rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| ArchiveError::extract(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::extract(parent, e))?;
        }

        let mut out_file = File::create(&out_path).map_err(|e| ArchiveError::extract(&out_path, e))?;
        io::copy(&mut entry, &mut out_file).map_err(|e| ArchiveError::extract(&out_path, e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))
                .map_err(|e| ArchiveError::extract(&out_path, e))?;
        }

        extracted += 1;
    }

    Ok(extracted)
}

fn extract_tar_gz(bytes: &[u8], dest_dir: &Path) -> Result<usize, ArchiveError> {
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(bytes)));
    let mut extracted = 0usize;

    // We unpack entries manually so we can sanitize paths (avoid Tar Slip).
    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::extract(dest_dir, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiveError::extract(dest_dir, e))?;
        let raw_path = entry
            .path()
            .map_err(|e| ArchiveError::extract(dest_dir, e))?
            .to_path_buf();

        let Some(rel) = sanitize_rel_path(&raw_path) else {
            tracing::warn!("Skipped unsafe tar path: {}", raw_path.display());
            continue;
        };

        // A link could point later entries outside dest_dir
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            tracing::warn!("Skipped tar link entry: {}", raw_path.display());
            continue;
        }

        let out_path = dest_dir.join(&rel);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::extract(parent, e))?;
        }
        entry
            .unpack(&out_path)
            .map_err(|e| ArchiveError::extract(&out_path, e))?;

        if entry_type.is_file() {
            extracted += 1;
        }
    }

    Ok(extracted)
}

/// Relative path with only normal components, or `None` if it could escape.
fn sanitize_rel_path(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}
