use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reface", about = "Reface face-swap service CLI")]
struct Cli {
    /// Base URL of the refaced daemon.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    daemon: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a face swap and print the result
    Swap {
        /// Share link of the target video
        #[arg(long)]
        target_url: String,
        /// Share link of the source face image
        #[arg(long)]
        source_url: String,
    },
    /// Show daemon status
    Status,
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

    match cli.command {
        Commands::Swap {
            target_url,
            source_url,
        } => {
            let response: serde_json::Value = client
                .post(format!("{}/api/swap", cli.daemon))
                .form(&[("target_url", &target_url), ("source_url", &source_url)])
                .send()
                .await
                .context("daemon unreachable")?
                .json()
                .await
                .context("daemon returned malformed JSON")?;

            println!("{}", serde_json::to_string_pretty(&response)?);
            if response["status"] == "error" {
                bail!("swap failed");
            }
        }
        Commands::Status => {
            let response: serde_json::Value = client
                .get(format!("{}/api/status", cli.daemon))
                .send()
                .await
                .context("daemon unreachable")?
                .json()
                .await
                .context("daemon returned malformed JSON")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Health => {
            let response: serde_json::Value = client
                .get(format!("{}/api/health", cli.daemon))
                .send()
                .await
                .context("daemon unreachable")?
                .json()
                .await
                .context("daemon returned malformed JSON")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
