//! Recursive removal that tolerates read-only entries, and the delete-and-purge
//! flow for installed workshop items.
//!
//! Items can be deleted whole, or filtered by the `.dds` texture extension:
//! only the textures, or everything except the textures.

use crate::models::ContentItemId;
use crate::state::{StateChange, StateManager};
use crate::ui::{Interaction, Prompt};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Failed to remove {path}: {source}")]
pub struct RemovalError {
    pub path: Utf8PathBuf,
    #[source]
    pub source: io::Error,
}

impl RemovalError {
    fn new(path: &Path, source: io::Error) -> Self {
        Self {
            path: Utf8PathBuf::from(path.to_string_lossy().into_owned()),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.source.kind() == io::ErrorKind::NotFound
    }

    pub fn is_not_empty(&self) -> bool {
        self.source.kind() == io::ErrorKind::DirectoryNotEmpty
    }
}

/// Remove whatever is at `path`. Directories are removed recursively, links
/// are removed without following them.
///
/// An entry that cannot be removed because of its permissions gets its
/// read-only attribute cleared and is retried once.
pub fn remove_tree(path: &Utf8Path) -> Result<(), RemovalError> {
    remove_path(path.as_std_path())
}

fn remove_path(path: &Path) -> Result<(), RemovalError> {
    let meta = fs::symlink_metadata(path).map_err(|e| RemovalError::new(path, e))?;

    if is_link(path, &meta) {
        return retry_read_only(path, remove_link);
    }

    if !meta.is_dir() {
        return retry_read_only(path, |p| fs::remove_file(p));
    }

    let entries = fs::read_dir(path).map_err(|e| RemovalError::new(path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RemovalError::new(path, e))?;
        remove_path(&entry.path())?;
    }

    retry_read_only(path, |p| fs::remove_dir(p))
}

fn retry_read_only<F>(path: &Path, remove: F) -> Result<(), RemovalError>
where
    F: Fn(&Path) -> io::Result<()>,
{
    match remove(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            tracing::debug!("Permission denied removing {}, clearing read-only", path.display());
            if let Err(chmod_err) = clear_read_only(path) {
                tracing::warn!(
                    "Failed to clear read-only attribute on {}: {}",
                    path.display(),
                    chmod_err
                );
            }
            remove(path).map_err(|e| RemovalError::new(path, e))
        }
        Err(e) => Err(RemovalError::new(path, e)),
    }
}

#[cfg(unix)]
fn clear_read_only(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    // Unlinking needs write access on the containing directory too.
    if let Some(parent) = path.parent() {
        if let Ok(meta) = fs::metadata(parent) {
            let mode = meta.permissions().mode() | 0o700;
            fs::set_permissions(parent, fs::Permissions::from_mode(mode))?;
        }
    }

    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mode = meta.permissions().mode() | 0o600 | if meta.is_dir() { 0o100 } else { 0 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn clear_read_only(path: &Path) -> io::Result<()> {
    let mut permissions = fs::symlink_metadata(path)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

#[cfg(windows)]
pub(crate) fn is_link(_path: &Path, meta: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    (meta.file_attributes() & 0x400) != 0 // FILE_ATTRIBUTE_REPARSE_POINT
}

#[cfg(not(windows))]
pub(crate) fn is_link(_path: &Path, meta: &fs::Metadata) -> bool {
    meta.file_type().is_symlink()
}

#[cfg(windows)]
pub(crate) fn remove_link(path: &Path) -> io::Result<()> {
    // Junctions are removed via remove_dir on Windows.
    fs::remove_dir(path).or_else(|_| fs::remove_file(path))
}

#[cfg(not(windows))]
pub(crate) fn remove_link(path: &Path) -> io::Result<()> {
    // Symlinks to directories are removed via remove_file on Unix.
    fs::remove_file(path)
}

/// Extension of the optimized texture files that can be kept or dropped on their own.
pub const TEXTURE_EXTENSION: &str = "dds";

/// What to delete from each selected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletionMode {
    /// The whole item directory
    #[default]
    Full,
    /// Only the optimized textures
    TexturesOnly,
    /// Everything except the optimized textures
    KeepTextures,
}

impl DeletionMode {
    fn prompt(self, count: usize) -> Prompt {
        match self {
            Self::Full => Prompt::yes_no(
                "Are you sure?",
                format!("You have selected {count} mods for deletion."),
                "\nThis operation delete a mod's directory from the filesystem.\nDo you want to proceed?",
            ),
            Self::TexturesOnly => Prompt::yes_no(
                "Are you sure?",
                format!(
                    "You have selected {count} mods to Delete optimized textures (.dds files only)"
                ),
                "\nThis operation will only delete optimized textures (.dds files only) from mod files.\nDo you want to proceed?",
            ),
            Self::KeepTextures => Prompt::yes_no(
                "Are you sure?",
                format!("You have selected {count} mods for deletion."),
                "\nThis operation will recursively delete all mod files, except for .dds textures found.\nDo you want to proceed?",
            ),
        }
    }

    /// Whether a filtered walk removes the file at `path`.
    fn removes_file(self, path: &Path) -> bool {
        let is_texture = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(TEXTURE_EXTENSION));
        match self {
            Self::Full => true,
            Self::TexturesOnly => is_texture,
            Self::KeepTextures => !is_texture,
        }
    }
}

/// Remove the files under `path` selected by `mode`, leaving directories in
/// place. Subdirectories emptied by [`DeletionMode::KeepTextures`] are pruned.
/// Returns the number of files removed; a [`DeletionMode::Full`] removal
/// counts as one.
pub fn remove_files_filtered(path: &Utf8Path, mode: DeletionMode) -> Result<usize, RemovalError> {
    if mode == DeletionMode::Full {
        remove_tree(path)?;
        return Ok(1);
    }

    let root = path.as_std_path();
    let meta = fs::symlink_metadata(root).map_err(|e| RemovalError::new(root, e))?;
    if !meta.is_dir() {
        return Err(RemovalError::new(
            root,
            io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
        ));
    }
    remove_filtered(root, mode)
}

fn remove_filtered(dir: &Path, mode: DeletionMode) -> Result<usize, RemovalError> {
    let mut removed = 0usize;

    let entries = fs::read_dir(dir).map_err(|e| RemovalError::new(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RemovalError::new(dir, e))?;
        let path = entry.path();
        let meta = fs::symlink_metadata(&path).map_err(|e| RemovalError::new(&path, e))?;

        if meta.is_dir() && !is_link(&path, &meta) {
            removed += remove_filtered(&path, mode)?;
            if mode == DeletionMode::KeepTextures && is_empty_dir(&path) {
                retry_read_only(&path, |p| fs::remove_dir(p))?;
            }
            continue;
        }

        if mode.removes_file(&path) {
            if is_link(&path, &meta) {
                retry_read_only(&path, remove_link)?;
            } else {
                retry_read_only(&path, |p| fs::remove_file(p))?;
            }
            removed += 1;
        }
    }

    Ok(removed)
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}

/// Receives the ids whose helper download records must be dropped.
pub trait MetadataStore {
    fn purge_items(&self, ids: &BTreeSet<String>);
}

/// An installed content item as seen by the removal flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledItem {
    pub path: Utf8PathBuf,
    pub published_file_id: Option<ContentItemId>,

    /// Downloaded through the helper (and therefore tracked in its metadata)
    pub from_helper: bool,

    /// Shipped with the game; never deleted
    pub protected: bool,
}

impl InstalledItem {
    /// Describe the item directory at `path`.
    ///
    /// A directory directly inside `mods_root` whose name is a published file
    /// id was put there by the helper through the workshop redirect.
    pub fn from_path(path: impl Into<Utf8PathBuf>, mods_root: Option<&Utf8Path>) -> Self {
        let path = path.into();
        let published_file_id = path
            .file_name()
            .filter(|name| name.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|name| ContentItemId::new(name).ok());
        let from_helper = published_file_id.is_some()
            && mods_root.is_some_and(|root| path.parent() == Some(root));

        Self {
            path,
            published_file_id,
            from_helper,
            protected: false,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemovalSummary {
    pub removed: Vec<Utf8PathBuf>,
    pub purged: BTreeSet<String>,
}

/// Delete item directories and purge helper metadata for the ones that were
/// downloaded by the helper.
pub struct ContentRemover<'a> {
    events: &'a StateManager,
    store: Option<&'a dyn MetadataStore>,
}

impl<'a> ContentRemover<'a> {
    pub fn new(events: &'a StateManager, store: Option<&'a dyn MetadataStore>) -> Self {
        Self { events, store }
    }

    /// Delete `items` as selected by `mode`, after one confirmation.
    ///
    /// Every item something was deleted from counts as removed. Helper
    /// downloads among them are purged from the metadata store in one call.
    pub fn delete_items(
        &self,
        items: &[InstalledItem],
        mode: DeletionMode,
        io: &Interaction,
    ) -> RemovalSummary {
        let mut summary = RemovalSummary::default();

        if !io.confirm(&mode.prompt(items.len())) {
            tracing::info!("Deletion of {} mods declined", items.len());
            return summary;
        }

        for item in items {
            if item.protected {
                tracing::debug!("Skipping protected item: {}", item.path);
                continue;
            }

            match remove_files_filtered(&item.path, mode) {
                Ok(count) => {
                    tracing::info!("Deleted mod at {} ({:?}, {} entries)", item.path, mode, count);
                    summary.removed.push(item.path.clone());
                    if item.from_helper {
                        if let Some(id) = &item.published_file_id {
                            summary.purged.insert(id.to_string());
                        }
                    }
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!("Unable to delete mod. Path does not exist: {}", item.path);
                }
                Err(e) => {
                    let warning_text = if e.is_not_empty() {
                        "Mod directory was not empty. Please close all programs accessing files or subfolders in the directory (including your file manager) and try again."
                    } else {
                        "An OSError occurred while deleting mod."
                    };
                    tracing::warn!("Unable to delete mod located at the path: {}", item.path);
                    io.reporter.warning("Unable to delete mod", warning_text, &e.to_string());
                }
            }
        }

        if !summary.purged.is_empty() {
            if let Some(store) = self.store {
                store.purge_items(&summary.purged);
            }
            self.events.publish(StateChange::ItemsPurged {
                ids: summary.purged.clone(),
            });
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::{AssumeYes, ExecutionSink, LogReporter, NonInteractive};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct NullSink;

    impl ExecutionSink for NullSink {
        fn message(&self, _text: &str) {}

        fn execute(&self, _program: &Utf8Path, _args: &[String], _expected_units: usize) -> Option<i32> {
            None
        }

        fn close(&self) {}
    }

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<BTreeSet<String>>>,
    }

    impl MetadataStore for RecordingStore {
        fn purge_items(&self, ids: &BTreeSet<String>) {
            self.calls.lock().unwrap().push(ids.clone());
        }
    }

    fn item(path: Utf8PathBuf, id: Option<&str>, from_helper: bool, protected: bool) -> InstalledItem {
        InstalledItem {
            path,
            published_file_id: id.map(|id| ContentItemId::new(id).unwrap()),
            from_helper,
            protected,
        }
    }

    fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, path)
    }

    #[test]
    fn test_remove_tree_nested() {
        let (_guard, root) = utf8_tempdir();
        let tree = root.join("tree");
        fs::create_dir_all(tree.join("a/b")).unwrap();
        fs::write(tree.join("a/b/file.txt"), "x").unwrap();
        fs::write(tree.join("top.txt"), "y").unwrap();

        remove_tree(&tree).unwrap();
        assert!(!tree.exists());
    }

    #[test]
    fn test_remove_tree_single_file() {
        let (_guard, root) = utf8_tempdir();
        let file = root.join("file.txt");
        fs::write(&file, "x").unwrap();

        remove_tree(&file).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_remove_tree_missing_is_not_found() {
        let (_guard, root) = utf8_tempdir();
        let err = remove_tree(&root.join("missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remove_tree_read_only_file() {
        let (_guard, root) = utf8_tempdir();
        let tree = root.join("ro");
        fs::create_dir_all(&tree).unwrap();
        let file = tree.join("locked.txt");
        fs::write(&file, "x").unwrap();

        let mut permissions = fs::metadata(&file).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&file, permissions).unwrap();

        remove_tree(&tree).unwrap();
        assert!(!tree.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_retry_clears_read_only_parent() {
        use std::os::unix::fs::PermissionsExt;

        let (_guard, root) = utf8_tempdir();
        let locked = root.join("locked");
        fs::create_dir_all(&locked).unwrap();
        let file = locked.join("file.txt");
        fs::write(&file, "x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // First attempt is denied the way a non-privileged unlink would be
        let attempts = Mutex::new(0usize);
        let result = retry_read_only(file.as_std_path(), |p| {
            let mut attempts = attempts.lock().unwrap();
            *attempts += 1;
            if *attempts == 1 {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                fs::remove_file(p)
            }
        });

        result.unwrap();
        assert_eq!(*attempts.lock().unwrap(), 2);
        assert!(!file.exists());
        let mode = fs::metadata(&locked).unwrap().permissions().mode();
        assert_eq!(mode & 0o700, 0o700);
    }

    #[test]
    fn test_retry_gives_up_after_second_failure() {
        let (_guard, root) = utf8_tempdir();
        let file = root.join("file.txt");
        fs::write(&file, "x").unwrap();

        let attempts = Mutex::new(0usize);
        let err = retry_read_only(file.as_std_path(), |_| {
            *attempts.lock().unwrap() += 1;
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        })
        .unwrap_err();

        assert_eq!(*attempts.lock().unwrap(), 2);
        assert_eq!(err.source.kind(), io::ErrorKind::PermissionDenied);
        assert!(file.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_tree_read_only_directory() {
        use std::os::unix::fs::PermissionsExt;

        let (_guard, root) = utf8_tempdir();
        let tree = root.join("tree");
        let locked = tree.join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("file.txt"), "x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        remove_tree(&tree).unwrap();
        assert!(!tree.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_tree_does_not_follow_links() {
        let (_guard, root) = utf8_tempdir();
        let target = root.join("target");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("keep.txt"), "x").unwrap();

        let tree = root.join("tree");
        fs::create_dir_all(&tree).unwrap();
        std::os::unix::fs::symlink(&target, tree.join("link")).unwrap();

        remove_tree(&tree).unwrap();
        assert!(!tree.exists());
        assert!(target.join("keep.txt").exists());
    }

    #[test]
    fn test_delete_items_purges_helper_downloads_once() {
        let (_guard, root) = utf8_tempdir();
        for name in ["helper", "local", "core"] {
            fs::create_dir_all(root.join(name)).unwrap();
            fs::write(root.join(name).join("About.xml"), "x").unwrap();
        }

        let items = vec![
            item(root.join("helper"), Some("2009463077"), true, false),
            item(root.join("local"), Some("818773962"), false, false),
            item(root.join("core"), None, false, true),
            item(root.join("missing"), Some("1"), true, false),
        ];

        let events = StateManager::new();
        let mut rx = events.subscribe();
        let store = RecordingStore::default();
        let sink = NullSink;
        let io = Interaction::new(&sink, &AssumeYes, &LogReporter);

        let summary = ContentRemover::new(&events, Some(&store)).delete_items(&items, DeletionMode::Full, &io);

        assert_eq!(summary.removed, vec![root.join("helper"), root.join("local")]);
        assert_eq!(summary.purged, BTreeSet::from(["2009463077".to_string()]));
        assert!(root.join("core").is_dir());
        assert_eq!(*store.calls.lock().unwrap(), vec![summary.purged.clone()]);
        assert_eq!(
            rx.try_recv().unwrap(),
            StateChange::ItemsPurged {
                ids: summary.purged.clone()
            }
        );
    }

    fn textured_mod(root: &Utf8Path) -> Utf8PathBuf {
        let dir = root.join("2009463077");
        fs::create_dir_all(dir.join("Textures/Things")).unwrap();
        fs::create_dir_all(dir.join("About")).unwrap();
        fs::write(dir.join("About/About.xml"), "<ModMetaData/>").unwrap();
        fs::write(dir.join("Textures/Things/gun.png"), "png").unwrap();
        fs::write(dir.join("Textures/Things/gun.dds"), "dds").unwrap();
        fs::write(dir.join("Textures/Things/hat.DDS"), "dds").unwrap();
        dir
    }

    #[test]
    fn test_delete_textures_only() {
        let (_guard, root) = utf8_tempdir();
        let dir = textured_mod(&root);

        let events = StateManager::new();
        let store = RecordingStore::default();
        let sink = NullSink;
        let io = Interaction::new(&sink, &AssumeYes, &LogReporter);

        let summary = ContentRemover::new(&events, Some(&store)).delete_items(
            &[item(dir.clone(), Some("2009463077"), true, false)],
            DeletionMode::TexturesOnly,
            &io,
        );

        assert!(!dir.join("Textures/Things/gun.dds").exists());
        assert!(!dir.join("Textures/Things/hat.DDS").exists());
        assert!(dir.join("Textures/Things/gun.png").is_file());
        assert!(dir.join("About/About.xml").is_file());
        assert_eq!(summary.removed, vec![dir]);
        assert_eq!(*store.calls.lock().unwrap(), vec![summary.purged.clone()]);
    }

    #[test]
    fn test_delete_keeping_textures() {
        let (_guard, root) = utf8_tempdir();
        let dir = textured_mod(&root);

        let events = StateManager::new();
        let store = RecordingStore::default();
        let sink = NullSink;
        let io = Interaction::new(&sink, &AssumeYes, &LogReporter);

        let summary = ContentRemover::new(&events, Some(&store)).delete_items(
            &[item(dir.clone(), Some("2009463077"), true, false)],
            DeletionMode::KeepTextures,
            &io,
        );

        assert!(dir.join("Textures/Things/gun.dds").is_file());
        assert!(dir.join("Textures/Things/hat.DDS").is_file());
        assert!(!dir.join("Textures/Things/gun.png").exists());
        assert!(!dir.join("About").exists());
        assert_eq!(summary.purged, BTreeSet::from(["2009463077".to_string()]));
        assert_eq!(store.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_full_removes_textures_too() {
        let (_guard, root) = utf8_tempdir();
        let dir = textured_mod(&root);

        let events = StateManager::new();
        let sink = NullSink;
        let io = Interaction::new(&sink, &AssumeYes, &LogReporter);

        let summary = ContentRemover::new(&events, None).delete_items(
            &[item(dir.clone(), Some("2009463077"), false, false)],
            DeletionMode::Full,
            &io,
        );

        assert!(!dir.exists());
        assert_eq!(summary.removed, vec![dir]);
        assert!(summary.purged.is_empty());
    }

    #[test]
    fn test_mode_prompts_differ() {
        let mut decider = crate::ui::MockDecisionProvider::new();
        decider
            .expect_ask()
            .withf(|prompt| prompt.information.contains("only delete optimized textures"))
            .times(1)
            .returning(|prompt| prompt.negative().to_string());

        let (_guard, root) = utf8_tempdir();
        let dir = textured_mod(&root);
        let events = StateManager::new();
        let sink = NullSink;
        let io = Interaction::new(&sink, &decider, &LogReporter);

        let summary = ContentRemover::new(&events, None).delete_items(
            &[item(dir.clone(), None, false, false)],
            DeletionMode::TexturesOnly,
            &io,
        );

        assert_eq!(summary, RemovalSummary::default());
        assert!(dir.join("Textures/Things/gun.dds").is_file());
    }

    #[test]
    fn test_item_from_path() {
        let mods = Utf8Path::new("/games/RimWorld/Mods");

        let helper = InstalledItem::from_path(mods.join("2009463077"), Some(mods));
        assert!(helper.from_helper);
        assert_eq!(helper.published_file_id.unwrap().as_str(), "2009463077");

        let local = InstalledItem::from_path(mods.join("MyMod"), Some(mods));
        assert!(!local.from_helper);
        assert_eq!(local.published_file_id, None);

        let elsewhere = InstalledItem::from_path("/other/2009463077", Some(mods));
        assert!(!elsewhere.from_helper);

        let unconfigured = InstalledItem::from_path(mods.join("2009463077"), None);
        assert!(!unconfigured.from_helper);
        assert!(!unconfigured.protected);
    }

    #[test]
    fn test_delete_items_declined() {
        let (_guard, root) = utf8_tempdir();
        fs::create_dir_all(root.join("helper")).unwrap();

        let events = StateManager::new();
        let store = RecordingStore::default();
        let sink = NullSink;
        let io = Interaction::new(&sink, &NonInteractive, &LogReporter);

        let summary = ContentRemover::new(&events, Some(&store))
            .delete_items(
                &[item(root.join("helper"), Some("5"), true, false)],
                DeletionMode::Full,
                &io,
            );

        assert_eq!(summary, RemovalSummary::default());
        assert!(root.join("helper").is_dir());
        assert!(store.calls.lock().unwrap().is_empty());
    }
}
