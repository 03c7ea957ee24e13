//! Payment history - command line entry point
//!
//! Performs one authenticated fetch and prints the records as JSON on stdout.
//! Logs go to stderr and, optionally, to a file under `--log-dir`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use payment_history::history::{ClientConfig, HistoryClient, RequestWindow};
use payment_history::{Configuration, TracingLog};

#[derive(Parser, Debug)]
#[command(name = "payment-history")]
#[command(about = "Fetch the payment history feed", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to JSON configuration file (environment variables are used otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Window start, RFC 3339 (e.g. 2024-01-01T00:00:00Z)
    #[arg(long)]
    from: Option<String>,

    /// Window end, RFC 3339
    #[arg(long)]
    to: Option<String>,

    /// Request timeout in seconds (transport default when omitted)
    #[arg(long)]
    timeout: Option<u64>,

    /// Directory for a log file in addition to stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool, log_dir: Option<&PathBuf>) -> Result<()> {
    // Filter out noisy HTTP crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let log_filename = format!(
                "payment_history_{}.log",
                chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
            );
            let file_appender = tracing_appender::rolling::never(dir, &log_filename);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .init();

            info!("Log file: {}", dir.join(&log_filename).display());
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .init();
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.log_dir.as_ref())?;

    let config = match &cli.config {
        Some(path) => Configuration::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Configuration::from_env(),
    };

    let mut client_config = ClientConfig::default().with_logger(Arc::new(TracingLog));
    if let Some(secs) = cli.timeout {
        client_config = client_config.with_timeout(Duration::from_secs(secs));
    }

    let client = HistoryClient::with_config(None, None, &config, client_config)
        .context("Failed to create history client")?;

    let window = RequestWindow::new(cli.from.map(Into::into), cli.to.map(Into::into));
    let records = client
        .fetch_window(&window)
        .await
        .context("Payment history fetch failed")?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
