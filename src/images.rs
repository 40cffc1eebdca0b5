//! Uploading photo folders as downscaled JPEGs.
//!
//! Sources with an allowed extension are decoded, shrunk to fit
//! [`ResizeOptions`] and re-encoded as `<stem>.jpg` before upload. The
//! re-encoded file only ever lives in a temporary directory.

use futures::future::{BoxFuture, FutureExt};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::drive::RemoteFolder;
use crate::error::{IgiturError, Result};
use crate::sync::{
    self, file_name_of, local_entries, require_local_dir, reuse_or_create_sub_folder, CleanupReport,
    LocalEntry, SyncReport, TargetNaming,
};

/// Extensions (lowercase, without dot) that are picked up for resizing.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub const TARGET_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1 to 100.
    pub jpeg_quality: u8,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            max_width: 2000,
            max_height: 2000,
            jpeg_quality: 90,
        }
    }
}

/// Decodes `input`, shrinks it to fit within the configured bounds keeping
/// the aspect ratio, drops any alpha channel and writes a JPEG to `output`.
///
/// Images already within bounds keep their size. Returns the dimensions of
/// the written image.
pub fn resize_to_jpeg(input: &Path, output: &Path, options: ResizeOptions) -> Result<(u32, u32)> {
    let img = image::ImageReader::open(input)?
        .with_guessed_format()?
        .decode()?;

    let img = if img.width() > options.max_width || img.height() > options.max_height {
        img.resize(options.max_width, options.max_height, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no transparency
    let rgb = img.to_rgb8();

    let mut writer = BufWriter::new(std::fs::File::create(output)?);
    JpegEncoder::new_with_quality(&mut writer, options.jpeg_quality.clamp(1, 100)).encode_image(&rgb)?;
    writer.flush()?;
    Ok(rgb.dimensions())
}

#[derive(Debug, Clone, Default)]
pub struct ResizedImageUploader {
    options: ResizeOptions,
    skip_file_names: Vec<String>,
    scratch_root: Option<PathBuf>,
}

impl ResizedImageUploader {
    pub fn new(options: ResizeOptions) -> Self {
        Self {
            options,
            skip_file_names: Vec::new(),
            scratch_root: None,
        }
    }

    pub fn options(&self) -> ResizeOptions {
        self.options
    }

    /// Files whose name contains `fragment` (ignoring case) are skipped.
    pub fn add_skip_file_name(&mut self, fragment: impl Into<String>) {
        self.skip_file_names.push(fragment.into());
    }

    pub fn with_skip_file_names<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_file_names.extend(fragments.into_iter().map(Into::into));
        self
    }

    pub fn skip_file_names(&self) -> &[String] {
        &self.skip_file_names
    }

    /// Re-encoded images are written below `root` instead of the system
    /// temp directory.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn is_allowed_extension(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
    }

    pub fn is_skipped_name(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_lowercase();
        self.skip_file_names
            .iter()
            .any(|fragment| name.contains(&fragment.to_lowercase()))
    }

    /// `<stem>.jpg`, whatever the source extension.
    pub fn target_name_for(path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        Some(format!("{stem}.{TARGET_EXTENSION}"))
    }

    async fn upload_resized(&self, source: &Path, target_name: &str, folder: &RemoteFolder) -> Result<()> {
        // Removed when dropped, whether or not the upload went through
        let scratch = match &self.scratch_root {
            Some(root) => tempfile::Builder::new().prefix("igitur").tempdir_in(root)?,
            None => tempfile::TempDir::new()?,
        };
        let target = scratch.path().join(target_name);

        info!("Resizing file: {} as: {}", source.display(), target.display());
        let (input, output, options) = (source.to_path_buf(), target.clone(), self.options);
        let (width, height) = tokio::task::spawn_blocking(move || resize_to_jpeg(&input, &output, options))
            .await
            .map_err(|e| IgiturError::Io(std::io::Error::other(e)))??;

        info!(
            "Uploading file: {} ({width}x{height}) to folder: {}",
            target.display(),
            folder.label()
        );
        folder.upload_file(&target).await?;
        Ok(())
    }

    /// Uploads the images below `local` into `folder`, resized, recursively.
    ///
    /// Non-image files and files matching a skip name are ignored. An image
    /// is skipped when the folder already has a file named like its target
    /// (`<stem>.jpg`); this includes files uploaded earlier in the same pass,
    /// so `a.png` and `a.jpeg` produce a single upload. The first failure
    /// ends the walk.
    pub fn upload_folder_resized<'a>(
        &'a self,
        local: &'a Path,
        folder: &'a mut RemoteFolder,
    ) -> BoxFuture<'a, Result<SyncReport>> {
        async move {
            require_local_dir(local)?;
            let mut report = SyncReport::default();

            let mut remote_names: HashSet<String> = folder
                .files()
                .await?
                .iter()
                .filter_map(|f| f.download_name().map(str::to_string))
                .collect();
            let remote_sub_folders = folder.sub_folders().await?;

            for entry in local_entries(local)? {
                match entry {
                    LocalEntry::File(path) => {
                        if !Self::is_allowed_extension(&path) {
                            info!(
                                "Skipping: {}: File type is not in processing list ({ALLOWED_EXTENSIONS:?})",
                                path.display()
                            );
                            report.skipped += 1;
                            continue;
                        }
                        if self.is_skipped_name(&path) {
                            info!(
                                "Skipping: {}: File name contains a skipped name ({:?})",
                                path.display(),
                                self.skip_file_names
                            );
                            report.skipped += 1;
                            continue;
                        }
                        let target_name = Self::target_name_for(&path)
                            .ok_or_else(|| IgiturError::InvalidPath(path.display().to_string()))?;
                        if remote_names.contains(&target_name) {
                            info!(
                                "Skipping: {}: File already exists in remote folder as '{target_name}'",
                                path.display()
                            );
                            report.skipped += 1;
                            continue;
                        }

                        self.upload_resized(&path, &target_name, folder)
                            .await
                            .inspect_err(|e| error!("Failed to upload file {}: {e}", path.display()))?;
                        remote_names.insert(target_name);
                        report.uploaded += 1;
                    }
                    LocalEntry::Dir(path) => {
                        let name = file_name_of(&path)?;
                        let (mut target, created) =
                            reuse_or_create_sub_folder(folder, &remote_sub_folders, name).await?;
                        if created {
                            report.folders_created += 1;
                        }
                        report.merge(self.upload_folder_resized(&path, &mut target).await?);
                    }
                }
            }
            Ok(report)
        }
        .boxed()
    }

    /// Deletes remote items that no local file or directory maps to under
    /// this uploader's naming.
    pub async fn delete_remote_orphans(
        &self,
        local: &Path,
        folder: &RemoteFolder,
        dry_run: bool,
    ) -> Result<CleanupReport> {
        sync::prune_remote_orphans(local, folder, self, dry_run).await
    }
}

impl TargetNaming for ResizedImageUploader {
    fn target_name(&self, local_file: &Path) -> Option<String> {
        if Self::is_allowed_extension(local_file) && !self.is_skipped_name(local_file) {
            Self::target_name_for(local_file)
        } else {
            None
        }
    }
}
