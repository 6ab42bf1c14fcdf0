use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "muster", about = "Muster attendance CLI")]
struct Cli {
    /// Base URL of the musterd daemon.
    #[arg(long, default_value = "http://127.0.0.1:7700")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    CheckIn,
    CheckOut,
}

impl Kind {
    fn as_wire(self) -> &'static str {
        match self {
            Kind::CheckIn => "check_in",
            Kind::CheckOut => "check_out",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register a reference face image for a user
    Register {
        identifier: String,
        /// Path to the reference image file
        image: PathBuf,
    },
    /// Verify a captured image against the stored reference
    Verify {
        identifier: String,
        /// Path to the captured image file
        image: PathBuf,
    },
    /// Mark a check-in or check-out event
    Mark {
        identifier: String,
        #[arg(value_enum)]
        kind: Kind,
        /// Verification confidence to record on the event
        #[arg(short, long, default_value_t = 0.0)]
        confidence: f32,
    },
    /// Show attendance history, newest first
    History {
        identifier: String,
        /// Inclusive start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Inclusive end date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },
    /// Check daemon health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let response = match cli.command {
        Commands::Register { identifier, image } => {
            post(
                &client,
                &format!("{}/api/register-face", cli.url),
                json!({
                    "identifier": identifier,
                    "imageBase64": encode_image(&image)?,
                }),
            )
            .await?
        }
        Commands::Verify { identifier, image } => {
            post(
                &client,
                &format!("{}/api/verify-face", cli.url),
                json!({
                    "identifier": identifier,
                    "imageBase64": encode_image(&image)?,
                }),
            )
            .await?
        }
        Commands::Mark {
            identifier,
            kind,
            confidence,
        } => {
            post(
                &client,
                &format!("{}/api/mark-attendance", cli.url),
                json!({
                    "identifier": identifier,
                    "type": kind.as_wire(),
                    "confidence": confidence,
                }),
            )
            .await?
        }
        Commands::History {
            identifier,
            start,
            end,
        } => {
            let mut query = vec![("identifier", identifier)];
            if let Some(start) = start {
                query.push(("startDate", start));
            }
            if let Some(end) = end {
                query.push(("endDate", end));
            }
            let response = client
                .get(format!("{}/api/attendance-history", cli.url))
                .query(&query)
                .send()
                .await
                .context("request failed")?;
            decode(response).await?
        }
        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.url))
                .send()
                .await
                .context("request failed")?;
            decode(response).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn post(client: &reqwest::Client, url: &str, body: Value) -> Result<Value> {
    let response = client
        .post(url)
        .json(&body)
        .send()
        .await
        .context("request failed")?;
    decode(response).await
}

async fn decode(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response.json().await.context("decode response body")?;
    if !status.is_success() {
        let message = body["message"].as_str().unwrap_or("unknown error");
        anyhow::bail!("{status}: {message}");
    }
    Ok(body)
}

fn encode_image(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read image {}", path.display()))?;
    Ok(BASE64.encode(bytes))
}
