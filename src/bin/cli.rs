//! # igitur CLI
//!
//! Command-line access to the Drive of a Gaudeam instance.
//!
//! ## Usage
//!
//! ```bash
//! # Store a session taken from a logged in browser
//! igitur login --cookie <_gaudeam_session> --subdomain yourinstance
//!
//! # Mirror a Drive folder locally
//! igitur download 35234 ./fotos
//!
//! # Upload a directory tree, skipping what is already there
//! igitur upload 35234 ./fotos
//!
//! # Upload photos downscaled to 2000px JPEGs
//! igitur upload-images 35234 ./fotos --skip komprimiert
//!
//! # Clean up
//! igitur dedup 35234 --dry-run
//! igitur prune-orphans 35234 ./fotos --resized
//! ```
//!
//! ## Authentication
//!
//! The session cookie is read from `--cookie`/`--subdomain` (or
//! `GAUDEAM_SESSION`/`GAUDEAM_SUBDOMAIN`); otherwise the session stored by
//! `igitur login` is used.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use igitur::{
    CleanupReport, DriveClient, FileSessionStore, GaudeamSession, IgiturError, RemoteFolder, ResizeOptions,
    ResizedImageUploader, SessionCredentials, SessionStore, SyncReport, VerbatimNaming,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit code indicating successful completion.
const EXIT_SUCCESS: u8 = 0;
/// Exit code indicating a general error occurred.
const EXIT_ERROR: u8 = 1;

// =============================================================================
// CLI Definition
// =============================================================================

#[derive(Parser)]
#[command(name = "igitur")]
#[command(author, version, about = "Command line interface to interact with Gaudeam.")]
#[command(
    long_about = "Command line interface to interact with the Drive of a Gaudeam instance.\n\n\
Features:\n\
  - Recursive folder upload/download that skips what is already there\n\
  - Photo upload with downscaling to JPEG\n\
  - Duplicate, empty-folder and orphan cleanup with dry-run"
)]
struct Cli {
    /// Enable verbose logging (can also use RUST_LOG env var)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Where the session from `login` is kept (default: ~/.igitur_session)
    #[arg(long, env = "IGITUR_SESSION_FILE", global = true)]
    session_file: Option<PathBuf>,

    /// Value of the `_gaudeam_session` cookie - can also use GAUDEAM_SESSION env var
    #[arg(long, env = "GAUDEAM_SESSION", global = true, hide_env_values = true)]
    cookie: Option<String>,

    /// Subdomain of the instance, e.g. "yourinstance" for yourinstance.gaudeam.de
    #[arg(long, env = "GAUDEAM_SUBDOMAIN", global = true)]
    subdomain: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a session cookie and store it for later commands
    Login,

    /// Delete the stored session
    Logout,

    /// Check login status
    Status,

    /// Download a Drive folder recursively
    Download {
        /// ID of the Drive folder to download from
        folder_id: String,

        /// Destination directory
        #[arg(default_value = ".")]
        destination: PathBuf,
    },

    /// Upload a file or the content of a directory to a Drive folder
    Upload {
        /// ID of the Drive folder to upload to
        folder_id: String,

        /// File or directory to upload
        source: PathBuf,
    },

    /// Upload a directory of images, downscaled to JPEG
    UploadImages {
        /// ID of the Drive folder to upload to
        folder_id: String,

        /// Directory containing the images
        source: PathBuf,

        /// Skip files whose name contains this text (repeatable)
        #[arg(long = "skip")]
        skip: Vec<String>,

        #[command(flatten)]
        resize: ResizeArgs,
    },

    /// Delete duplicate folders and files, keeping one of each name
    Dedup {
        /// ID of the Drive folder to clean up
        folder_id: String,

        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete empty folders, including the given one if it ends up empty
    PruneEmpty {
        /// ID of the Drive folder to clean up
        folder_id: String,

        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete remote folders and files that have no local counterpart
    PruneOrphans {
        /// ID of the Drive folder to clean up
        folder_id: String,

        /// Local directory the folder was uploaded from
        source: PathBuf,

        /// Match files as `upload-images` names them (<stem>.jpg)
        #[arg(long)]
        resized: bool,

        /// With --resized: names skipped during upload (repeatable)
        #[arg(long = "skip", requires = "resized")]
        skip: Vec<String>,

        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// List folder contents
    List {
        /// ID of the Drive folder
        folder_id: String,
    },

    /// List the top-level Drive categories
    Categories,

    /// Show the total size of a folder
    Size {
        /// ID of the Drive folder
        folder_id: String,
    },
}

#[derive(clap::Args)]
struct ResizeArgs {
    /// Maximum width in pixels
    #[arg(long, default_value_t = ResizeOptions::default().max_width)]
    max_width: u32,

    /// Maximum height in pixels
    #[arg(long, default_value_t = ResizeOptions::default().max_height)]
    max_height: u32,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = ResizeOptions::default().jpeg_quality,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,
}

impl From<ResizeArgs> for ResizeOptions {
    fn from(args: ResizeArgs) -> Self {
        ResizeOptions {
            max_width: args.max_width,
            max_height: args.max_height,
            jpeg_quality: args.quality,
        }
    }
}

fn format_size(size: u64) -> String {
    let mut size = size as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} PB")
}

fn print_sync_report(action: &str, report: &SyncReport) {
    println!("\n✓ {action} complete!");
    if report.uploaded > 0 {
        println!("  Uploaded:   {} files", report.uploaded);
    }
    if report.downloaded > 0 {
        println!("  Downloaded: {} files", report.downloaded);
    }
    if report.folders_created > 0 {
        println!("  Created:    {} folders", report.folders_created);
    }
    println!("  Skipped:    {} files", report.skipped);
}

fn finish_cleanup(report: &CleanupReport, dry_run: bool) -> anyhow::Result<()> {
    let verb = if dry_run { "Would delete" } else { "Deleted" };
    println!("\n{verb}: {} items", report.removed);
    if !report.is_success() {
        bail!("{} item(s) could not be deleted", report.failed);
    }
    Ok(())
}

fn session_store(path: Option<PathBuf>) -> anyhow::Result<FileSessionStore> {
    match path {
        Some(path) => Ok(FileSessionStore::new(path)),
        None => Ok(FileSessionStore::default_location()?),
    }
}

/// Picks the session from the command line/environment, or from the store.
async fn authenticate(
    cookie: Option<String>,
    subdomain: Option<String>,
    store: &FileSessionStore,
) -> anyhow::Result<GaudeamSession> {
    let session = match (cookie, subdomain) {
        (Some(cookie), Some(subdomain)) => GaudeamSession::new(cookie, &subdomain),
        _ => store
            .load()?
            .ok_or_else(|| IgiturError::Authentication("No session found. Please login first.".to_string()))?
            .to_session(),
    };
    session.ensure_valid().await?;
    Ok(session)
}

async fn open_folder(session: GaudeamSession, folder_id: &str) -> anyhow::Result<RemoteFolder> {
    RemoteFolder::open(DriveClient::new(session), folder_id)
        .await
        .with_context(|| format!("Could not open folder '{folder_id}'"))
}

fn require_exists(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        bail!(IgiturError::Filesystem(format!("Source path '{}' does not exist.", path.display())));
    }
    Ok(())
}

/// Application entry point.
#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Main application logic.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("igitur=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("igitur=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let store = session_store(cli.session_file)?;

    match cli.command {
        Commands::Login => {
            let (Some(cookie), Some(subdomain)) = (cli.cookie, cli.subdomain) else {
                bail!("login needs --cookie and --subdomain (or GAUDEAM_SESSION and GAUDEAM_SUBDOMAIN)");
            };
            let credentials = SessionCredentials::new(cookie, subdomain);
            let session = credentials.to_session();
            session.ensure_valid().await?;
            store.save(&credentials)?;
            println!("✓ Logged in, session saved to {}", store.path().display());
        }

        Commands::Logout => {
            if store.clear()? {
                println!("Logged out and session file deleted.");
            } else {
                println!("No session file found.");
            }
        }

        Commands::Status => {
            let session = authenticate(cli.cookie, cli.subdomain, &store).await?;
            let member = session.current_member().await?;
            println!(
                "Logged in as {} at {}",
                member.email().unwrap_or("<unknown>"),
                session.base_url()
            );
        }

        Commands::Download { folder_id, destination } => {
            let session = authenticate(cli.cookie, cli.subdomain, &store).await?;
            let folder = open_folder(session, &folder_id).await?;
            println!("\n📥 Downloading '{}' to {}\n", folder.label(), destination.display());
            let report = igitur::sync::download_folder(&folder, &destination).await?;
            print_sync_report("Download", &report);
        }

        Commands::Upload { folder_id, source } => {
            let session = authenticate(cli.cookie, cli.subdomain, &store).await?;
            require_exists(&source)?;
            let mut folder = open_folder(session, &folder_id).await?;

            if source.is_file() {
                folder.upload_file(&source).await?;
                println!("✓ Uploaded {}", source.display());
            } else {
                println!("\n📤 Uploading {} to '{}'\n", source.display(), folder.label());
                let report = igitur::sync::upload_folder(&source, &mut folder).await?;
                print_sync_report("Upload", &report);
            }
        }

        Commands::UploadImages {
            folder_id,
            source,
            skip,
            resize,
        } => {
            let session = authenticate(cli.cookie, cli.subdomain, &store).await?;
            if !source.is_dir() {
                bail!(IgiturError::Filesystem(format!(
                    "Source path '{}' does not exist or is not a directory.",
                    source.display()
                )));
            }
            let mut folder = open_folder(session, &folder_id).await?;
            let uploader = ResizedImageUploader::new(resize.into()).with_skip_file_names(skip);

            println!("\n📤 Uploading images from {} to '{}'\n", source.display(), folder.label());
            let report = uploader.upload_folder_resized(&source, &mut folder).await?;
            print_sync_report("Upload", &report);
        }

        Commands::Dedup { folder_id, dry_run } => {
            let session = authenticate(cli.cookie, cli.subdomain, &store).await?;
            let folder = open_folder(session, &folder_id).await?;
            let report = igitur::sync::delete_duplicates(&folder, dry_run).await?;
            finish_cleanup(&report, dry_run)?;
        }

        Commands::PruneEmpty { folder_id, dry_run } => {
            let session = authenticate(cli.cookie, cli.subdomain, &store).await?;
            let folder = open_folder(session, &folder_id).await?;
            let report = igitur::sync::prune_empty_folders(&folder, dry_run).await?;
            finish_cleanup(&report, dry_run)?;
        }

        Commands::PruneOrphans {
            folder_id,
            source,
            resized,
            skip,
            dry_run,
        } => {
            let session = authenticate(cli.cookie, cli.subdomain, &store).await?;
            require_exists(&source)?;
            let folder = open_folder(session, &folder_id).await?;

            let report = if resized {
                ResizedImageUploader::default()
                    .with_skip_file_names(skip)
                    .delete_remote_orphans(&source, &folder, dry_run)
                    .await?
            } else {
                igitur::sync::prune_remote_orphans(&source, &folder, &VerbatimNaming, dry_run).await?
            };
            finish_cleanup(&report, dry_run)?;
        }

        Commands::List { folder_id } => {
            let session = authenticate(cli.cookie, cli.subdomain, &store).await?;
            let folder = open_folder(session, &folder_id).await?;
            let (sub_folders, files) = folder.children().await?;

            if sub_folders.is_empty() && files.is_empty() {
                println!("Folder '{}' is empty", folder.label());
                return Ok(());
            }

            println!("\nContents of '{}':\n", folder.label());
            println!("{:<10} {:<12} {:<40} {:<15}", "Type", "ID", "Name", "Size");
            println!("{}", "-".repeat(80));
            for sub_folder in &sub_folders {
                println!("{:<10} {:<12} {:<40} {:<15}", "DIR", sub_folder.id(), sub_folder.label(), "-");
            }
            for file in &files {
                println!(
                    "{:<10} {:<12} {:<40} {:<15}",
                    "FILE",
                    file.id(),
                    file.label(),
                    format_size(file.size())
                );
            }
            println!();
        }

        Commands::Categories => {
            let session = authenticate(cli.cookie, cli.subdomain, &store).await?;
            let categories = DriveClient::new(session).categories().await?;
            println!("{:<12} {:<40}", "ID", "Name");
            println!("{}", "-".repeat(52));
            for category in &categories {
                println!("{:<12} {:<40}", category.id, category.name.as_deref().unwrap_or(""));
            }
        }

        Commands::Size { folder_id } => {
            let session = authenticate(cli.cookie, cli.subdomain, &store).await?;
            let folder = open_folder(session, &folder_id).await?;
            let size = folder.size().await?;
            println!("{}: {}", folder.label(), format_size(size));
        }
    }

    Ok(())
}
