use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use oss_uploader::models::{FileRow, PolicyFailure, UploadedObject};
use oss_uploader::{UploadListener, Uploader, UploaderConfig, length_hint};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "oss-uploader", about = "Direct browser-style uploads to Aliyun OSS")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload local files through a signed policy
    Upload {
        /// Stage all files in a list and upload them as one batch
        #[arg(long)]
        multiple: bool,

        /// JSON configuration file; OSS_* environment variables are used otherwise
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Check that a value's length lies within a range
    CheckLength {
        #[arg(long)]
        min: usize,
        #[arg(long)]
        max: usize,
        /// Print the failure message
        #[arg(long)]
        message: bool,
        value: String,
    },
}

struct CliListener;

impl UploadListener for CliListener {
    fn on_all_uploaded(&self, results: &[UploadedObject]) {
        match serde_json::to_string_pretty(results) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize results: {}", e),
        }
    }

    fn on_policy_failed(&self, failure: &PolicyFailure) {
        error!(
            "❌ Policy request failed (status {:?}): {} {}",
            failure.status, failure.reason, failure.body
        );
    }

    fn on_dialog_closed(&self) {
        info!("Dialog closed");
    }

    fn on_notice(&self, message: &str) {
        warn!("⚠️  {}", message);
    }
}

fn print_rows(rows: &[FileRow]) {
    for row in rows {
        println!("{:>4}  {:<40} {:>12}  {}", row.id, row.name, row.size, row.status);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oss_uploader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Command::CheckLength {
            min,
            max,
            message,
            value,
        } => {
            if let Err(e) = length_hint(min, max)(&value, message) {
                if let Some(message) = e.message {
                    println!("{}", message);
                }
                std::process::exit(1);
            }
        }
        Command::Upload {
            multiple,
            config,
            files,
        } => {
            let mut config = match config {
                Some(path) => UploaderConfig::from_file(&path)?,
                None => UploaderConfig::from_env(),
            };
            config.multiple |= multiple;

            let uploader = Uploader::render(config, Arc::new(CliListener))?;

            if uploader.config().multiple {
                info!("🗂️  {}", uploader.open());
                uploader.choose(files.as_slice()).await?;
                print_rows(&uploader.rows());
                let result = uploader.start().await;
                print_rows(&uploader.rows());
                uploader.close()?;
                result?;
            } else {
                uploader.choose(files.as_slice()).await?;
            }
        }
    }

    Ok(())
}
