//! # igitur
//!
//! Client library for the Drive of a Gaudeam instance.
//!
//! - [`GaudeamSession`]: cookie-authenticated HTTP access to one instance.
//! - [`drive`]: folders and files, listing, creation, deletion, signed
//!   uploads and downloads.
//! - [`sync`]: recursive upload/download sync between a local directory
//!   and a Drive folder, plus cleanup passes (duplicates, empty folders,
//!   remote orphans).
//! - [`images`]: uploading photo folders as downscaled JPEGs.
//!
//! ```no_run
//! use igitur::{DriveClient, GaudeamSession, RemoteFolder, ResizedImageUploader};
//! use std::path::Path;
//!
//! # async fn example() -> igitur::Result<()> {
//! let session = GaudeamSession::new("<_gaudeam_session cookie>", "yourinstance");
//! let client = DriveClient::new(session);
//! let mut folder = RemoteFolder::open(client, "35234").await?;
//!
//! let mut uploader = ResizedImageUploader::default();
//! uploader.add_skip_file_name("komprimiert");
//! uploader
//!     .upload_folder_resized(Path::new("/your/source/path/of/images"), &mut folder)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod drive;
pub mod error;
pub mod images;
pub mod session;
pub mod store;
pub mod sync;

pub use drive::{DriveClient, RemoteFile, RemoteFolder};
pub use error::{IgiturError, Result};
pub use images::{ResizeOptions, ResizedImageUploader};
pub use session::GaudeamSession;
pub use store::{FileSessionStore, SessionCredentials, SessionStore};
pub use sync::{CleanupReport, SyncReport, TargetNaming, VerbatimNaming};
