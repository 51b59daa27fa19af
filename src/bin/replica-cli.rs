use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use replica_node::config::{load_config, NodeConfig};
use replica_node::drain::client::{check_node_running, request_shutdown, QuitOptions, QuitOutcome};
use replica_node::drain::transport::HttpTransport;

#[derive(Parser)]
#[command(name = "replica-cli")]
#[command(about = "Management CLI for a replica node", long_about = None)]
struct Cli {
    /// Node configuration; supplies the defaults for the options below
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Admin endpoint of the node [default: http://<admin.bind_address>]
    #[arg(short, long)]
    url: Option<String>,

    /// Admin API key [default: admin.api_key]
    #[arg(short, long)]
    key: Option<String>,

    /// Log drain progress
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drain the node and shut it down
    Quit {
        /// Remove the node from the cluster before draining it
        #[arg(long)]
        decommission: bool,

        /// Give up on the graceful shutdown after this long and force it
        /// [default: shutdown.quit_timeout_secs]
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Check that the node answers drain requests
    Probe,
    /// Show lifecycle status
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("replica_node=info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => load_config(path).map_err(|e| format!("{}: {}", path.display(), e))?,
        None => NodeConfig::default(),
    };
    let url = cli
        .url
        .unwrap_or_else(|| format!("http://{}", config.admin.bind_address));
    let key = cli.key.unwrap_or_else(|| config.admin.api_key.clone());

    match cli.command {
        Commands::Quit {
            decommission,
            timeout_secs,
        } => {
            let transport = HttpTransport::new(&url, key)?;
            let mut options = QuitOptions::from(&config.shutdown);
            options.decommission = decommission;
            if let Some(secs) = timeout_secs {
                options.timeout = Duration::from_secs(secs);
            }
            if let QuitOutcome::Hard(reason) = request_shutdown(&transport, &options).await? {
                eprintln!("{}", reason);
            }
            println!("ok");
        }
        Commands::Probe => {
            let transport = HttpTransport::new(&url, key)?;
            check_node_running(&transport).await?;
            println!("ok");
        }
        Commands::Status => {
            let mut headers = HeaderMap::new();
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))?,
            );
            let res = reqwest::Client::new()
                .get(format!("{}/admin/status", url.trim_end_matches('/')))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
