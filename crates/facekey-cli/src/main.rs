use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facekey_core::OnnxAnalyzerFactory;
use facekey_engine::{
    parse_threshold, spawn_engine, EngineHandle, FaceKeyContext, FaceKeyError, Verification,
};
use facekey_store::{BlobStore, LocalFs, ProfileStore, SqliteProfileStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "facekey", about = "Face-key enrollment and verification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user profiles
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Enroll a photo as the user's face key, replacing any previous one
    Enroll {
        username: String,
        /// Photo containing exactly one face
        image: PathBuf,
    },
    /// Verify a photo against the user's face key
    Verify {
        username: String,
        image: PathBuf,
        /// Match threshold (default: FACEKEY_THRESHOLD or 0.6)
        #[arg(long)]
        threshold: Option<String>,
        /// Compare against the enrolled photo instead of the stored descriptor
        #[arg(long)]
        by_image: bool,
    },
    /// Inspect the blob store
    Blobs {
        #[command(subcommand)]
        command: BlobCommands,
    },
    /// Show configuration and model availability
    Status,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a profile
    Add {
        username: String,
        #[arg(long, default_value = "")]
        full_name: String,
    },
    /// Print a profile
    Show { username: String },
}

#[derive(Subcommand)]
enum BlobCommands {
    /// List stored photos
    List,
    /// Copy a stored photo to the download directory
    Download { name: String },
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    kind: &'a str,
    status: u16,
    message: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match run(cli.command, &config).await? {
        Ok(code) => Ok(code),
        Err(e) => {
            let kind = e.kind();
            tracing::debug!(error = ?e, "request failed");
            let report = ErrorReport {
                kind: kind.as_str(),
                status: kind.status_code(),
                message: e.to_string(),
            };
            eprintln!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Outer error: setup failure. Inner error: the request itself failed.
async fn run(command: Commands, config: &Config) -> Result<Result<ExitCode, FaceKeyError>> {
    match command {
        Commands::User { command } => {
            let profiles = open_profiles(config)?;
            match command {
                UserCommands::Add { username, full_name } => {
                    let profile = profiles
                        .create_user(&username, &full_name)
                        .with_context(|| format!("creating user {username}"))?;
                    print_json(&profile)?;
                }
                UserCommands::Show { username } => {
                    match profiles.find_by_username(&username).context("looking up profile")? {
                        Some(profile) => print_json(&profile)?,
                        None => return Ok(Err(FaceKeyError::UserNotFound(username))),
                    }
                }
            }
        }
        Commands::Enroll { username, image } => {
            let bytes = read_image(&image).await?;
            let engine = start_engine(config)?;
            match engine.enroll(&username, bytes).await {
                Ok(result) => print_json(&result)?,
                Err(e) => return Ok(Err(e)),
            }
        }
        Commands::Verify {
            username,
            image,
            threshold,
            by_image,
        } => {
            let threshold = match parse_threshold(threshold.as_deref()) {
                Ok(t) => t,
                Err(e) => return Ok(Err(e)),
            };
            let bytes = read_image(&image).await?;
            let engine = start_engine(config)?;
            let verification = if by_image {
                engine.verify_by_image(&username, bytes, threshold).await
            } else {
                engine.verify_by_embedding(&username, bytes, threshold).await
            };
            match verification {
                Ok(v) => {
                    print_json(&v)?;
                    return Ok(Ok(ExitCode::from(verify_exit_status(&v))));
                }
                Err(e) => return Ok(Err(e)),
            }
        }
        Commands::Blobs { command } => {
            let blobs = open_blobs(config)?;
            let result = match command {
                BlobCommands::List => blobs.list().map(|names| print_json(&names)),
                BlobCommands::Download { name } => blobs.download(&name).map(|path| print_json(&path)),
            };
            match result {
                Ok(printed) => printed?,
                Err(e) => return Ok(Err(e.into())),
            }
        }
        Commands::Status => {
            let factory = OnnxAnalyzerFactory::new(config.model_dir.clone());
            let blobs = BlobStore::connect(Arc::new(LocalFs), config.blob_root.clone(), config.download_dir.clone());
            print_json(&serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config": config,
                "models_present": factory.models_present(),
                "blob_dir": blobs.dir(),
            }))?;
        }
    }
    Ok(Ok(ExitCode::SUCCESS))
}

/// A rejected face exits non-zero so scripts can branch on the status.
fn verify_exit_status(v: &Verification) -> u8 {
    if v.is_match() {
        0
    } else {
        1
    }
}

fn open_profiles(config: &Config) -> Result<SqliteProfileStore> {
    SqliteProfileStore::open(&config.db_path)
        .with_context(|| format!("opening profile database {}", config.db_path.display()))
}

fn open_blobs(config: &Config) -> Result<BlobStore> {
    let blobs = BlobStore::connect(Arc::new(LocalFs), config.blob_root.clone(), config.download_dir.clone());
    std::fs::create_dir_all(blobs.dir()).with_context(|| format!("creating blob directory {}", blobs.dir()))?;
    Ok(blobs)
}

fn start_engine(config: &Config) -> Result<EngineHandle> {
    let profiles = Arc::new(open_profiles(config)?);
    let ctx = FaceKeyContext::new(profiles, open_blobs(config)?)
        .with_default_threshold(config.threshold)
        .with_ordering(config.ordering);

    let factory = OnnxAnalyzerFactory::new(config.model_dir.clone());
    let engine = spawn_engine(&factory, ctx, config.workers)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    tracing::info!(workers = engine.workers(), "engine ready");
    Ok(engine)
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading image {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
