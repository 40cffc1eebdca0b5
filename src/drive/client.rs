use async_stream::try_stream;
use futures::stream::{Stream, StreamExt, TryStreamExt};
use reqwest::{multipart, StatusCode};
use serde_json::Value;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::model::{CreatedResponse, InodeEnvelope, InodeProperties, ListResponse, NewFolder};
use super::upload::{mime_type_from_filename, StorageReceipt, UploadSignature, UploadedFileRecord};
use crate::error::{IgiturError, Result};
use crate::session::GaudeamSession;

/// Page size of folder listings.
pub const DIRECTORY_LIST_LIMIT: usize = 80;

/// Typed access to the Drive endpoints of one Gaudeam instance.
#[derive(Debug, Clone)]
pub struct DriveClient {
    session: GaudeamSession,
}

impl DriveClient {
    pub fn new(session: GaudeamSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &GaudeamSession {
        &self.session
    }

    pub async fn folder_properties(&self, folder_id: &str) -> Result<InodeProperties> {
        self.session
            .get(&format!("/api/v1/drive/folders/{folder_id}"))
            .await?
            .ensure_success(format!(
                "Error fetching drive folder properties for folder '{folder_id}'"
            ))?
            .json()
    }

    async fn list_page(&self, parent_id: &str, offset: usize) -> Result<Vec<InodeProperties>> {
        let path = format!(
            "/api/v1/drive/folders?parent_id={parent_id}&order=%3Ename&offset={offset}&limit={DIRECTORY_LIST_LIMIT}"
        );
        let page: ListResponse = self
            .session
            .get(&path)
            .await?
            .ensure_success(format!("Error fetching contents of folder '{parent_id}'"))?
            .json()?;
        Ok(page.results)
    }

    /// Lazily pages through the children of a folder, ordered by name.
    ///
    /// A page shorter than [`DIRECTORY_LIST_LIMIT`] ends the listing, so no
    /// request is made once the remaining entries are known to be exhausted.
    pub fn list_children<'a>(
        &'a self,
        parent_id: &'a str,
    ) -> impl Stream<Item = Result<InodeProperties>> + Send + 'a {
        try_stream! {
            let mut offset = 0;
            loop {
                let batch = self.list_page(parent_id, offset).await?;
                let count = batch.len();
                debug!("Folder '{parent_id}': {count} entries at offset {offset}");
                for entry in batch {
                    yield entry;
                }
                if count < DIRECTORY_LIST_LIMIT {
                    break;
                }
                offset += DIRECTORY_LIST_LIMIT;
            }
        }
    }

    pub async fn list_all(&self, parent_id: &str) -> Result<Vec<InodeProperties>> {
        self.list_children(parent_id).try_collect().await
    }

    /// Top-level Drive categories of the instance.
    pub async fn categories(&self) -> Result<Vec<InodeProperties>> {
        let response: ListResponse = self
            .session
            .get("/api/v1/drive/categories")
            .await?
            .ensure_success("Error fetching drive categories")?
            .json()?;
        Ok(response.results)
    }

    /// Creates a folder and returns its id.
    pub async fn create_folder(&self, folder: &NewFolder) -> Result<String> {
        let created: CreatedResponse = self
            .session
            .post_json("/api/v1/drive/folders", Some(&InodeEnvelope { inode: folder }))
            .await?
            .ensure_success(format!("Error creating sub-folder '{}'", folder.name))?
            .json()?;
        Ok(created.id)
    }

    pub async fn delete_folder(&self, folder_id: &str) -> Result<()> {
        self.session
            .delete(&format!("/api/v1/drive/folders/{folder_id}"))
            .await?
            .ensure_success(format!("Error deleting folder '{folder_id}'"))?;
        Ok(())
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.session
            .delete(&format!("/api/v1/drive/uploaded_files/{file_id}"))
            .await?
            .ensure_success(format!("Error deleting file '{file_id}'"))?;
        Ok(())
    }

    // --- Transfer Logic ---

    /// Uploads a local file into a folder.
    ///
    /// The bytes go to the storage endpoint handed out by
    /// `/api/v1/drive/sign`; the resulting object is then registered as a
    /// Drive file under `parent_id`. No step is retried.
    pub async fn upload_file(&self, parent_id: &str, local_path: &Path) -> Result<StorageReceipt> {
        if !local_path.is_file() {
            return Err(IgiturError::Filesystem(format!(
                "File not found: {}",
                local_path.display()
            )));
        }
        let filename = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IgiturError::InvalidPath(local_path.display().to_string()))?
            .to_string();

        let signature: UploadSignature = self
            .session
            .post_json::<Value>("/api/v1/drive/sign", None)
            .await?
            .ensure_success("Error getting upload signature")?
            .json()?;
        debug!("Upload endpoint: {}", signature.post_endpoint);

        // Stream the file instead of loading it into memory
        let file = tokio::fs::File::open(local_path).await?;
        let file_size = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(tokio_util::io::ReaderStream::new(file));
        let part = multipart::Part::stream_with_length(body, file_size)
            .file_name(filename.clone())
            .mime_str(mime_type_from_filename(&filename))?;

        let mut form = multipart::Form::new();
        for (key, value) in signature.form_fields() {
            form = form.text(key, value);
        }
        let form = form.part("file", part);

        let response = self
            .session
            .http()
            .post(&signature.post_endpoint)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if status != StatusCode::CREATED {
            return Err(IgiturError::remote("Error uploading file to storage", status, text));
        }

        let receipt = StorageReceipt::parse(&text)?;
        debug!(
            "Stored {} in bucket {} as {} (etag {})",
            receipt.location, receipt.bucket, receipt.key, receipt.etag
        );

        let record = UploadedFileRecord::new(parent_id, local_path, &receipt)?;
        self.session
            .post_json("/api/v1/drive/uploaded_files", Some(&InodeEnvelope { inode: &record }))
            .await?
            .ensure_success("Error confirming uploaded file")?;
        Ok(receipt)
    }

    /// Streams a file to `destination`, replacing whatever is there.
    /// Returns the number of bytes written.
    pub async fn download_file(&self, file_id: &str, destination: &Path) -> Result<u64> {
        let response = self
            .session
            .get_streaming(&format!("/drive/uploaded_files/{file_id}/download"))
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IgiturError::remote(
                format!("Error downloading file '{file_id}'"),
                status,
                body,
            ));
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        let copied: Result<()> = async {
            while let Some(chunk) = stream.next().await {
                let data = chunk?;
                file.write_all(&data).await?;
                written += data.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = copied {
            // Leave no partial file behind; it would count as downloaded later
            drop(file);
            let _ = tokio::fs::remove_file(destination).await;
            return Err(e);
        }
        Ok(written)
    }
}
