//! Recursive operations over pairs of a local directory and a Drive folder.
//!
//! Sync passes ([`upload_folder`], [`download_folder`]) stop at the first
//! failure and return it. Cleanup passes ([`delete_duplicates`],
//! [`prune_empty_folders`], [`prune_remote_orphans`]) only fail when a
//! listing fails; a delete that does not go through is logged and counted in
//! the returned [`CleanupReport`].
//!
//! Every walk is sequential: one request at a time, depth first.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::drive::{RemoteFile, RemoteFolder};
use crate::error::{IgiturError, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub folders_created: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.uploaded += other.uploaded;
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.folders_created += other.folders_created;
    }
}

/// Outcome of a best-effort cleanup pass.
///
/// In dry-run mode `removed` counts the items that would have been deleted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
}

impl CleanupReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn merge(&mut self, other: CleanupReport) {
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

/// Maps a local file to the download name it is published under on the
/// Drive, or `None` if the file is not published at all.
pub trait TargetNaming {
    fn target_name(&self, local_file: &Path) -> Option<String>;
}

/// Files are published under their own name, as [`upload_folder`] does.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerbatimNaming;

impl TargetNaming for VerbatimNaming {
    fn target_name(&self, local_file: &Path) -> Option<String> {
        local_file.file_name()?.to_str().map(str::to_string)
    }
}

// --- Local side ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LocalEntry {
    File(PathBuf),
    Dir(PathBuf),
}

/// Immediate children of `dir`, sorted by file name. Anything that is
/// neither a file nor a directory is left out, and so are symlinks whose
/// target cannot be reached. Failing to read `dir` itself is an error.
pub(crate) fn local_entries(dir: &Path) -> Result<Vec<LocalEntry>> {
    let mut entries = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if let Some(link) = unreachable_link(&err) {
                    warn!("Skipping '{}': link target cannot be reached ({err})", link.display());
                    continue;
                }
                return Err(std::io::Error::from(err).into());
            }
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            entries.push(LocalEntry::Dir(entry.into_path()));
        } else if file_type.is_file() {
            entries.push(LocalEntry::File(entry.into_path()));
        }
    }
    Ok(entries)
}

/// The path of a child entry that is a symlink which could not be followed.
fn unreachable_link(err: &walkdir::Error) -> Option<&Path> {
    if err.depth() == 0 {
        return None;
    }
    let path = err.path()?;
    let metadata = std::fs::symlink_metadata(path).ok()?;
    metadata.file_type().is_symlink().then_some(path)
}

pub(crate) fn file_name_of(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IgiturError::InvalidPath(path.display().to_string()))
}

pub(crate) fn require_local_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(IgiturError::Filesystem(format!(
            "Local path is not a directory: {}",
            path.display()
        )))
    }
}

/// Remote names are used as local path components; refuse anything that
/// would escape the destination directory.
fn safe_component(name: &str) -> Option<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || (cfg!(windows) && name.contains('\\'));
    (!invalid).then_some(name)
}

// --- Upload ---

/// Reuses the sub-folder called `name` from `existing`, or creates it.
/// The flag tells whether a folder was created.
pub(crate) async fn reuse_or_create_sub_folder(
    folder: &mut RemoteFolder,
    existing: &[RemoteFolder],
    name: &str,
) -> Result<(RemoteFolder, bool)> {
    if let Some(found) = existing.iter().find(|f| f.name() == Some(name)) {
        info!("Sub-folder already exists in remote folder, using existing folder: {name}");
        return Ok((found.clone(), false));
    }
    info!("Creating sub-folder: {name} in folder: {}", folder.label());
    let created = folder.create_sub_folder(name, "").await.inspect_err(|e| {
        error!("Failed to create sub-folder '{name}': {e}");
    })?;
    Ok((created, true))
}

/// Uploads the contents of `local` into `folder`, recursively.
///
/// A file is skipped when the folder already holds a file with the same
/// download name; a directory is matched to the sub-folder of the same name
/// and created when missing. The first failed upload ends the walk.
pub fn upload_folder<'a>(local: &'a Path, folder: &'a mut RemoteFolder) -> BoxFuture<'a, Result<SyncReport>> {
    async move {
        require_local_dir(local)?;
        let mut report = SyncReport::default();

        for entry in local_entries(local)? {
            match entry {
                LocalEntry::File(path) => {
                    let name = file_name_of(&path)?;
                    let remote_files = folder.files().await?;
                    if remote_files.iter().any(|f| f.download_name() == Some(name)) {
                        info!("File already exists in remote folder, skipping upload: {}", path.display());
                        report.skipped += 1;
                        continue;
                    }
                    info!("Uploading file: {} to folder: {}", path.display(), folder.label());
                    folder.upload_file(&path).await.inspect_err(|e| {
                        error!("Failed to upload file {}: {e}", path.display());
                    })?;
                    report.uploaded += 1;
                }
                LocalEntry::Dir(path) => {
                    let name = file_name_of(&path)?;
                    let existing = folder.sub_folders().await?;
                    let (mut target, created) = reuse_or_create_sub_folder(folder, &existing, name).await?;
                    if created {
                        report.folders_created += 1;
                    }
                    report.merge(upload_folder(&path, &mut target).await?);
                }
            }
        }
        Ok(report)
    }
    .boxed()
}

// --- Download ---

/// Mirrors `folder` into `local`, creating directories as needed.
///
/// Files that already exist locally under their download name are left
/// alone; their content is not compared.
pub fn download_folder<'a>(folder: &'a RemoteFolder, local: &'a Path) -> BoxFuture<'a, Result<SyncReport>> {
    async move {
        if !local.exists() {
            info!("Destination does not exist yet, creating '{}'", local.display());
            tokio::fs::create_dir_all(local).await?;
        }
        if !local.is_dir() {
            return Err(IgiturError::Filesystem(format!(
                "Destination path is not a directory: {}",
                local.display()
            )));
        }

        let mut report = SyncReport::default();

        for sub_folder in folder.sub_folders().await? {
            let Some(name) = sub_folder.name().and_then(safe_component) else {
                warn!("Skipping sub-folder '{}' of '{}': unusable name", sub_folder.id(), folder.label());
                continue;
            };
            let destination = local.join(name);
            report.merge(download_folder(&sub_folder, &destination).await?);
        }

        for file in folder.files().await? {
            let Some(name) = file.download_name().and_then(safe_component) else {
                warn!("Skipping file '{}' of '{}': no usable download name", file.id(), folder.label());
                report.skipped += 1;
                continue;
            };
            let destination = local.join(name);
            if destination.exists() {
                info!("Skipping '{}' - already exists", destination.display());
                report.skipped += 1;
                continue;
            }
            info!("Downloading '{}'", destination.display());
            file.download(&destination).await?;
            report.downloaded += 1;
        }
        Ok(report)
    }
    .boxed()
}

// --- Cleanup ---

/// Items of a name-sorted list that repeat the name of their predecessor.
/// The first item of every run is kept; unnamed items are never duplicates.
pub(crate) fn adjacent_duplicates<T, F>(sorted: Vec<T>, name: F) -> Vec<T>
where
    F: Fn(&T) -> Option<&str>,
{
    let mut duplicates = Vec::new();
    let mut current: Option<String> = None;
    for item in sorted {
        let item_name = name(&item).map(str::to_string);
        if item_name.is_some() && item_name == current {
            duplicates.push(item);
        } else {
            current = item_name;
        }
    }
    duplicates
}

async fn remove<F, Fut>(report: &mut CleanupReport, dry_run: bool, what: String, delete: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if dry_run {
        info!("[DRY RUN] {what}");
        report.removed += 1;
        return;
    }
    warn!("{what} - deleting");
    match delete().await {
        Ok(()) => report.removed += 1,
        Err(e) => {
            warn!("Could not delete: {e}");
            report.failed += 1;
        }
    }
}

/// Deletes sub-folders and files that share a name with a sibling, keeping
/// one of each, then descends into the remaining sub-folders.
///
/// Folders are compared by name, files by display name. Only exact matches
/// count.
pub fn delete_duplicates(folder: &RemoteFolder, dry_run: bool) -> BoxFuture<'_, Result<CleanupReport>> {
    async move {
        let mut report = CleanupReport::default();

        let mut sub_folders = folder.sub_folders().await?;
        sub_folders.sort_by(|a, b| a.name().cmp(&b.name()));
        for duplicate in adjacent_duplicates(sub_folders, RemoteFolder::name) {
            let what = format!("Duplicate folder '{}' ({})", duplicate.label(), duplicate.id());
            remove(&mut report, dry_run, what, || duplicate.delete()).await;
        }

        let mut files = folder.files().await?;
        files.sort_by(|a, b| a.name().cmp(&b.name()));
        for duplicate in adjacent_duplicates(files, RemoteFile::name) {
            let what = format!("Duplicate file '{}' ({})", duplicate.name().unwrap_or_default(), duplicate.id());
            remove(&mut report, dry_run, what, || duplicate.delete()).await;
        }

        // Re-read: the listing above may contain folders deleted just now
        for sub_folder in folder.sub_folders().await? {
            report.merge(delete_duplicates(&sub_folder, dry_run).await?);
        }
        Ok(report)
    }
    .boxed()
}

/// Deletes folders without files or sub-folders, depth first, so a folder
/// that only contained empty folders goes as well. `folder` itself is
/// deleted if it ends up empty.
pub fn prune_empty_folders(folder: &RemoteFolder, dry_run: bool) -> BoxFuture<'_, Result<CleanupReport>> {
    async move {
        let mut report = CleanupReport::default();

        let mut sub_folders = folder.sub_folders().await?;
        if !sub_folders.is_empty() {
            for sub_folder in &sub_folders {
                report.merge(prune_empty_folders(sub_folder, dry_run).await?);
            }
            sub_folders = folder.sub_folders().await?;
        }
        let files = folder.files().await?;

        if sub_folders.is_empty() && files.is_empty() {
            let what = format!("Empty folder: {}", folder.label());
            remove(&mut report, dry_run, what, || folder.clone().delete()).await;
        }
        Ok(report)
    }
    .boxed()
}

/// Deletes everything in `folder` that has no counterpart in `local`.
///
/// A sub-folder survives if `local` has a directory of the same name, and
/// is then checked against that directory. A file survives if its download
/// name is the target name of some file in `local` according to `naming`.
/// Nothing is uploaded.
pub fn prune_remote_orphans<'a, N>(
    local: &'a Path,
    folder: &'a RemoteFolder,
    naming: &'a N,
    dry_run: bool,
) -> BoxFuture<'a, Result<CleanupReport>>
where
    N: TargetNaming + Sync + ?Sized,
{
    async move {
        require_local_dir(local)?;
        let mut local_dirs = HashSet::new();
        let mut target_names = HashSet::new();
        for entry in local_entries(local)? {
            match entry {
                LocalEntry::Dir(path) => {
                    local_dirs.insert(file_name_of(&path)?.to_string());
                }
                LocalEntry::File(path) => {
                    if let Some(target) = naming.target_name(&path) {
                        target_names.insert(target);
                    }
                }
            }
        }

        let mut report = CleanupReport::default();

        for sub_folder in folder.sub_folders().await? {
            let Some(name) = sub_folder.name().map(str::to_string) else {
                warn!("Leaving unnamed sub-folder '{}' alone", sub_folder.id());
                continue;
            };
            if local_dirs.contains(&name) {
                let local_sub = local.join(&name);
                report.merge(prune_remote_orphans(&local_sub, &sub_folder, naming, dry_run).await?);
            } else {
                let what = format!(
                    "Remote folder '{name}' is not in {}",
                    local.display()
                );
                remove(&mut report, dry_run, what, || sub_folder.delete()).await;
            }
        }

        for file in folder.files().await? {
            let Some(name) = file.download_name().map(str::to_string) else {
                warn!("Leaving file '{}' without download name alone", file.id());
                continue;
            };
            if !target_names.contains(&name) {
                let what = format!(
                    "Remote file '{name}' is not derived from a file in {}",
                    local.display()
                );
                remove(&mut report, dry_run, what, || file.delete()).await;
            }
        }
        Ok(report)
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names<'a>(items: &'a [&'a str]) -> Vec<&'a str> {
        items.to_vec()
    }

    #[test]
    fn duplicates_keep_first_of_each_run() {
        let sorted = names(&["A", "A", "B", "B", "B", "C"]);
        let duplicates = adjacent_duplicates(sorted, |n| Some(*n));
        assert_eq!(duplicates, vec!["A", "B", "B"]);
    }

    #[test]
    fn near_duplicates_are_not_detected() {
        let sorted = names(&["Fotos", "fotos", "Fotos 2"]);
        assert!(adjacent_duplicates(sorted, |n| Some(*n)).is_empty());
    }

    #[test]
    fn unnamed_items_are_never_duplicates() {
        let sorted: Vec<Option<&str>> = vec![None, None, Some("x"), Some("x")];
        let duplicates = adjacent_duplicates(sorted, |n| *n);
        assert_eq!(duplicates, vec![Some("x")]);
    }

    #[test]
    fn local_entries_are_sorted_and_classified() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();
        std::fs::write(dir.path().join("c").join("nested.txt"), "n").unwrap();

        let entries = local_entries(dir.path()).unwrap();
        assert_eq!(
            entries,
            vec![
                LocalEntry::File(dir.path().join("a.txt")),
                LocalEntry::File(dir.path().join("b.txt")),
                LocalEntry::Dir(dir.path().join("c")),
            ]
        );
    }

    #[test]
    fn verbatim_naming_uses_file_name() {
        assert_eq!(
            VerbatimNaming.target_name(Path::new("/data/photos/IMG_1.PNG")).as_deref(),
            Some("IMG_1.PNG")
        );
    }

    #[test]
    fn unsafe_remote_names_are_rejected() {
        assert_eq!(safe_component("Sommerfest 2024"), Some("Sommerfest 2024"));
        for bad in ["", ".", "..", "a/b"] {
            assert_eq!(safe_component(bad), None, "{bad}");
        }
    }

    #[test]
    #[cfg(unix)]
    fn backslash_is_a_plain_character_on_unix() {
        assert_eq!(safe_component("Kasse\\2024.pdf"), Some("Kasse\\2024.pdf"));
    }

    #[test]
    #[cfg(windows)]
    fn backslash_is_a_separator_on_windows() {
        assert_eq!(safe_component("a\\b"), None);
    }

    #[test]
    #[cfg(unix)]
    fn dangling_symlinks_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::os::unix::fs::symlink("/nonexistent/target", dir.path().join("broken.jpg")).unwrap();

        let entries = local_entries(dir.path()).unwrap();
        assert_eq!(entries, vec![LocalEntry::File(dir.path().join("a.jpg"))]);
    }

    #[test]
    fn unreadable_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(local_entries(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn missing_local_dir_is_filesystem_error() {
        let dir = TempDir::new().unwrap();
        let err = require_local_dir(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, IgiturError::Filesystem(_)));
    }

    #[test]
    fn reports_merge() {
        let mut report = CleanupReport { removed: 1, failed: 0 };
        report.merge(CleanupReport { removed: 2, failed: 1 });
        assert_eq!(report, CleanupReport { removed: 3, failed: 1 });
        assert!(!report.is_success());

        let mut sync = SyncReport { uploaded: 1, ..Default::default() };
        sync.merge(SyncReport { skipped: 4, folders_created: 1, ..Default::default() });
        assert_eq!(sync.uploaded, 1);
        assert_eq!(sync.skipped, 4);
        assert_eq!(sync.folders_created, 1);
    }
}
