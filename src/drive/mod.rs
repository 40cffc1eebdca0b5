//! Gaudeam Drive: folders, files and the endpoints behind them.

mod client;
mod folder;
mod model;
mod upload;

pub use client::{DriveClient, DIRECTORY_LIST_LIMIT};
pub use folder::{FolderState, RemoteFile, RemoteFolder};
pub use model::{EntryKind, InodeProperties, NewFolder, Ownership, RestrictTo};
pub use upload::{mime_type_from_filename, StorageReceipt, UploadSignature, UploadedFileRecord};
