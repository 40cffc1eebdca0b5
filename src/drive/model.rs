use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{IgiturError, Result};

/// Drive ids come back as numbers or strings depending on the endpoint.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!("unexpected id: {other}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    Gallery,
    Photo,
    DriveFile,
}

impl EntryKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Folder" => Some(EntryKind::Folder),
            "Gallery" => Some(EntryKind::Gallery),
            "Photo" => Some(EntryKind::Photo),
            "DriveFile" => Some(EntryKind::DriveFile),
            _ => None,
        }
    }

    pub fn is_folder_like(self) -> bool {
        matches!(self, EntryKind::Folder | EntryKind::Gallery)
    }

    pub fn is_file_like(self) -> bool {
        matches!(self, EntryKind::Photo | EntryKind::DriveFile)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct RestrictTo {
    #[serde(default)]
    pub id: Option<Value>,
}

/// Raw record of a Drive inode, as returned both by the folder properties
/// endpoint and by folder listings.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct InodeProperties {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub download_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub owner_type: Option<String>,
    #[serde(default)]
    pub owner_id: Option<Value>,
    #[serde(default)]
    pub restrict_to: Option<RestrictTo>,
    // Allow unknown fields from the Drive API
    #[serde(flatten)]
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl InodeProperties {
    pub fn entry_kind(&self) -> Option<EntryKind> {
        self.kind.as_deref().and_then(EntryKind::parse)
    }

    pub fn is_folder_like(&self) -> bool {
        self.entry_kind().is_some_and(EntryKind::is_folder_like)
    }

    pub fn is_file_like(&self) -> bool {
        self.entry_kind().is_some_and(EntryKind::is_file_like)
    }
}

/// `{results: [...]}` wrapper used by list endpoints.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct ListResponse {
    #[serde(default)]
    pub results: Vec<InodeProperties>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct CreatedResponse {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
}

/// Access settings a new folder takes over from its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Ownership {
    pub owner_type: Option<String>,
    pub owner_id: Option<Value>,
    pub restrict_to_id: Option<Value>,
}

impl Ownership {
    /// Derives the settings of a child folder from its parent's properties.
    ///
    /// | parent owner type | child owner type | child restrict_to_id |
    /// |---|---|---|
    /// | `Group` | `Group` | parent's `restrict_to.id` |
    /// | `GroupMember` | `GroupMember` | `null` |
    /// | absent | `null` | `null` |
    ///
    /// Any other owner type is a configuration error.
    pub fn inherit_from(parent: &InodeProperties) -> Result<Self> {
        let owner_id = parent.owner_id.clone().filter(|v| !v.is_null());
        match parent.owner_type.as_deref() {
            Some("Group") => {
                let restrict_to_id = parent
                    .restrict_to
                    .as_ref()
                    .and_then(|r| r.id.clone())
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| {
                        IgiturError::Configuration(
                            "cannot create folder: parent is owned by a group but has no restrict_to id"
                                .to_string(),
                        )
                    })?;
                Ok(Self {
                    owner_type: Some("Group".to_string()),
                    owner_id,
                    restrict_to_id: Some(restrict_to_id),
                })
            }
            Some("GroupMember") => Ok(Self {
                owner_type: Some("GroupMember".to_string()),
                owner_id,
                restrict_to_id: None,
            }),
            None => Ok(Self {
                owner_type: None,
                owner_id,
                restrict_to_id: None,
            }),
            Some(other) => Err(IgiturError::Configuration(format!(
                "cannot create folder: unsupported owner type '{other}'"
            ))),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewFolder {
    pub description: String,
    pub name: String,
    pub ordering: Vec<String>,
    pub owner_id: Option<Value>,
    pub owner_type: Option<String>,
    pub parent_id: String,
    pub restrict_to_id: Option<Value>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl NewFolder {
    pub fn child_of(
        parent_id: &str,
        parent: &InodeProperties,
        name: &str,
        description: &str,
    ) -> Result<Self> {
        let ownership = Ownership::inherit_from(parent)?;
        Ok(Self {
            description: description.to_string(),
            name: name.to_string(),
            ordering: vec!["<name".to_string()],
            owner_id: ownership.owner_id,
            owner_type: ownership.owner_type,
            parent_id: parent_id.to_string(),
            restrict_to_id: ownership.restrict_to_id,
            kind: "Folder".to_string(),
        })
    }
}

/// Request envelope: every Drive mutation wraps its payload in `inode`.
#[derive(Serialize, Debug)]
pub(crate) struct InodeEnvelope<'a, T: Serialize> {
    pub inode: &'a T,
}
