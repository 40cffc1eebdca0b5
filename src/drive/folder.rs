use futures::future::{BoxFuture, FutureExt};
use futures::TryStreamExt;
use std::path::Path;
use tracing::{debug, info, warn};

use super::client::DriveClient;
use super::model::{InodeProperties, NewFolder};
use super::upload::StorageReceipt;
use crate::error::{IgiturError, Result};
use crate::sync::CleanupReport;

/// Whether a folder's properties have been fetched.
///
/// Nothing refreshes implicitly: a `Loaded` snapshot stays as it is until
/// [`RemoteFolder::refresh`] is called.
#[derive(Debug, Clone)]
pub enum FolderState {
    Unloaded,
    Loaded(InodeProperties),
}

/// A Drive folder, keyed by id.
#[derive(Debug, Clone)]
pub struct RemoteFolder {
    client: DriveClient,
    id: String,
    state: FolderState,
}

impl RemoteFolder {
    pub fn unloaded(client: DriveClient, id: impl Into<String>) -> Self {
        Self {
            client,
            id: id.into(),
            state: FolderState::Unloaded,
        }
    }

    /// Wraps properties already obtained from a listing.
    pub fn from_properties(client: DriveClient, properties: InodeProperties) -> Self {
        Self {
            client,
            id: properties.id.clone(),
            state: FolderState::Loaded(properties),
        }
    }

    /// Fetches the folder's properties; fails if the folder is not accessible.
    pub async fn open(client: DriveClient, id: impl Into<String>) -> Result<Self> {
        let mut folder = Self::unloaded(client, id);
        folder.refresh().await?;
        Ok(folder)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }

    pub fn state(&self) -> &FolderState {
        &self.state
    }

    pub fn properties(&self) -> Option<&InodeProperties> {
        match &self.state {
            FolderState::Loaded(properties) => Some(properties),
            FolderState::Unloaded => None,
        }
    }

    pub async fn ensure_loaded(&mut self) -> Result<&InodeProperties> {
        if let FolderState::Unloaded = self.state {
            self.refresh().await?;
        }
        self.properties().ok_or_else(|| {
            IgiturError::MalformedResponse(format!("no properties for folder '{}'", self.id))
        })
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let properties = self.client.folder_properties(&self.id).await?;
        self.state = FolderState::Loaded(properties);
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.properties()?.name.as_deref()
    }

    /// Name for log messages, falling back to the id.
    pub fn label(&self) -> &str {
        self.name().unwrap_or(&self.id)
    }

    pub async fn sub_folders(&self) -> Result<Vec<RemoteFolder>> {
        self.client
            .list_children(&self.id)
            .try_filter(|entry| futures::future::ready(entry.is_folder_like()))
            .map_ok(|entry| RemoteFolder::from_properties(self.client.clone(), entry))
            .try_collect()
            .await
    }

    pub async fn files(&self) -> Result<Vec<RemoteFile>> {
        self.client
            .list_children(&self.id)
            .try_filter(|entry| futures::future::ready(entry.is_file_like()))
            .map_ok(|entry| RemoteFile::new(self.client.clone(), entry))
            .try_collect()
            .await
    }

    /// Sub-folders and files from a single pass over the listing.
    pub async fn children(&self) -> Result<(Vec<RemoteFolder>, Vec<RemoteFile>)> {
        let mut folders = Vec::new();
        let mut files = Vec::new();
        for entry in self.client.list_all(&self.id).await? {
            if entry.is_folder_like() {
                folders.push(RemoteFolder::from_properties(self.client.clone(), entry));
            } else if entry.is_file_like() {
                files.push(RemoteFile::new(self.client.clone(), entry));
            }
        }
        Ok((folders, files))
    }

    /// Creates a sub-folder with the same access rights as this folder.
    ///
    /// This folder's properties are refreshed afterwards, and the new folder
    /// is returned with its properties loaded.
    pub async fn create_sub_folder(&mut self, name: &str, description: &str) -> Result<RemoteFolder> {
        let parent = self.ensure_loaded().await?.clone();
        debug!(
            "Creating sub-folder '{name}' in folder '{}' owned by '{:?}' with owner ID '{:?}'",
            self.label(),
            parent.owner_type,
            parent.owner_id
        );

        let request = NewFolder::child_of(&self.id, &parent, name, description)?;
        let new_id = self.client.create_folder(&request).await?;
        self.refresh().await?;
        debug!("Created sub-folder '{name}' with ID: {new_id}");

        RemoteFolder::open(self.client.clone(), new_id).await
    }

    /// Deletes the folder including everything in it.
    pub async fn delete(self) -> Result<()> {
        self.client.delete_folder(&self.id).await
    }

    /// Best-effort removal of every immediate child.
    pub async fn delete_content(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        for folder in self.sub_folders().await? {
            let label = folder.label().to_string();
            info!("Deleting folder: {label}");
            match folder.delete().await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!("Could not delete folder '{label}': {e}");
                    report.failed += 1;
                }
            }
        }
        for file in self.files().await? {
            let label = file.label().to_string();
            info!("Deleting file: {label}");
            match file.delete().await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!("Could not delete file '{label}': {e}");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    pub async fn upload_file(&self, local_path: &Path) -> Result<StorageReceipt> {
        self.client.upload_file(&self.id, local_path).await
    }

    /// Total size in bytes of all files below this folder.
    pub fn size(&self) -> BoxFuture<'_, Result<u64>> {
        async move {
            let (sub_folders, files) = self.children().await?;
            let mut total: u64 = files.iter().map(RemoteFile::size).sum();
            for sub_folder in &sub_folders {
                total += sub_folder.size().await?;
            }
            Ok(total)
        }
        .boxed()
    }
}

/// A Drive file with the properties it was listed with.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    client: DriveClient,
    properties: InodeProperties,
}

impl RemoteFile {
    pub fn new(client: DriveClient, properties: InodeProperties) -> Self {
        Self { client, properties }
    }

    pub fn id(&self) -> &str {
        &self.properties.id
    }

    pub fn properties(&self) -> &InodeProperties {
        &self.properties
    }

    /// Name shown on Gaudeam, usually without the extension.
    pub fn name(&self) -> Option<&str> {
        self.properties.name.as_deref()
    }

    /// Original file name including the extension.
    pub fn download_name(&self) -> Option<&str> {
        self.properties.download_name.as_deref()
    }

    pub fn label(&self) -> &str {
        self.download_name()
            .or_else(|| self.name())
            .unwrap_or(&self.properties.id)
    }

    pub fn size(&self) -> u64 {
        self.properties.file_size.unwrap_or(0)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.properties.content_type.as_deref()
    }

    pub async fn download(&self, destination: &Path) -> Result<u64> {
        self.client.download_file(self.id(), destination).await
    }

    pub async fn delete(self) -> Result<()> {
        self.client.delete_file(self.id()).await
    }
}
