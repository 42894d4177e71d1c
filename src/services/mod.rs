//! Services module - the helper lifecycle, independent of any front end.
//!
//! # Components
//!
//! - [`HelperInstaller`]: owns the [`InstallationState`](crate::models::InstallationState).
//!   Downloads and unpacks the platform release, then links the helper's workshop
//!   content directory to the user's mods folder.
//! - [`RedirectManager`]: creates symlinks (POSIX) and junctions (Windows), failing
//!   with a typed [`RedirectError`] when something is in the way.
//! - [`ConflictResolver`]: turns a typed conflict into a single confirmation prompt
//!   and at most one forced retry.
//! - [`DownloadOrchestrator`]: writes the batch script and runs the helper through
//!   the [`ExecutionSink`](crate::ui::ExecutionSink).
//! - [`DepotCacheManager`]: removes the helper's depot cache.
//! - [`ContentRemover`]: deletes installed items and purges their helper metadata.
//!
//! All operations are synchronous. The binary runs them on a blocking worker
//! thread; the only long wait is the helper subprocess, which the sink can cancel.
//! No operation returns an error across its public surface: failures end in a
//! report through the [`Interaction`](crate::ui::Interaction) and a `false` or
//! outcome value.

pub mod archive;
pub mod conflict;
pub mod depot_cache;
pub mod download;
pub mod installer;
pub mod redirect;
pub mod removal;

pub use archive::{ArchiveError, ArchiveFetcher, HttpFetcher};
pub use conflict::ConflictResolver;
pub use depot_cache::DepotCacheManager;
pub use download::{DownloadOrchestrator, DownloadOutcome, build_script};
pub use installer::{HelperInstaller, SetupAnswer, on_helper_not_found};
pub use redirect::{ConflictKind, RedirectError, RedirectManager, is_redirect, redirect_target};
pub use removal::{
    ContentRemover, DeletionMode, InstalledItem, MetadataStore, RemovalError, RemovalSummary,
    remove_files_filtered, remove_tree,
};
