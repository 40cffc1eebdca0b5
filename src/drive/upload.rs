//! Pieces of the two-phase signed upload: the signature handed out by the
//! Drive, the storage receipt, and the registration record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{IgiturError, Result};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("tiff", "image/tiff"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
];

/// Content type for a file name, looked up by its lowercased extension.
pub fn mime_type_from_filename(filename: &str) -> &'static str {
    let Some((_, extension)) = filename.rsplit_once('.') else {
        return DEFAULT_MIME_TYPE;
    };
    let extension = extension.to_ascii_lowercase();
    MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map_or(DEFAULT_MIME_TYPE, |(_, mime)| *mime)
}

/// Response of `POST /api/v1/drive/sign`.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadSignature {
    pub post_endpoint: String,
    #[serde(default)]
    pub signature: BTreeMap<String, Value>,
}

impl UploadSignature {
    /// Signature entries as multipart text fields.
    pub fn form_fields(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.signature.iter().map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
    }
}

/// What the storage endpoint reports after accepting the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageReceipt {
    pub location: String,
    pub bucket: String,
    pub key: String,
    pub etag: String,
}

impl StorageReceipt {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| IgiturError::MalformedResponse(format!("upload response is not XML: {e}")))?;

        let field = |name: &str| -> Result<String> {
            doc.descendants()
                .find(|n| n.tag_name().name() == name)
                .and_then(|n| n.text())
                .map(|s| s.trim().to_string())
                .ok_or_else(|| {
                    IgiturError::MalformedResponse(format!("upload response has no <{name}>"))
                })
        };

        Ok(Self {
            location: field("Location")?,
            bucket: field("Bucket")?,
            key: field("Key")?,
            etag: field("ETag")?.trim_matches('"').to_string(),
        })
    }
}

/// Metadata registered for an uploaded object.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UploadedFileRecord {
    pub content_type: String,
    pub name: String,
    pub parent_id: String,
    pub physically_created_at: String,
    pub stored_file: String,
}

impl UploadedFileRecord {
    pub fn new(parent_id: &str, local_path: &Path, receipt: &StorageReceipt) -> Result<Self> {
        let filename = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IgiturError::InvalidPath(local_path.display().to_string()))?;
        let stem = local_path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or(filename);

        Ok(Self {
            content_type: mime_type_from_filename(filename).to_string(),
            // Gaudeam shows names without extension
            name: stem.to_string(),
            parent_id: parent_id.to_string(),
            physically_created_at: String::new(),
            stored_file: receipt.key.clone(),
        })
    }
}
