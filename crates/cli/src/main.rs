//! Hosted Checkout CLI - operator tools for a running deployment.
//!
//! # Usage
//!
//! ```bash
//! # Ask the backend for a checkout's status once
//! hc-cli status 8ac7a4a28f1c2d3e
//!
//! # Reconcile a pending checkout until it settles (Enter = check now)
//! hc-cli watch 8ac7a4a28f1c2d3e --interval 30 --max-attempts 10
//!
//! # Fetch a page's nonce and audit its Content-Security-Policy
//! hc-cli probe https://pay.example.com/?checkoutId=8ac7a4a28f1c2d3e
//!
//! # Print just the nonce of a page
//! hc-cli nonce https://pay.example.com/success
//! ```
//!
//! # Commands
//!
//! - `status` - One backend status lookup, printed as JSON
//! - `watch` - Timer-driven reconciliation of a pending checkout
//! - `probe` - Nonce probe plus policy audit of a deployed page
//! - `nonce` - Nonce probe only

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use url::Url;

mod commands;

#[derive(Parser)]
#[command(name = "hc-cli")]
#[command(author, version, about = "Hosted Checkout operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a checkout's status once
    Status {
        /// Checkout reference issued by the payment provider
        checkout_id: String,

        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Reconcile a pending checkout until it is confirmed or polling stops
    Watch {
        /// Checkout reference issued by the payment provider
        checkout_id: String,

        #[command(flatten)]
        backend: BackendArgs,

        /// Seconds between automatic checks
        #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 30)]
        interval: u64,

        /// Automatic checks before giving up
        #[arg(long, env = "POLL_MAX_ATTEMPTS", default_value_t = 10)]
        max_attempts: u32,
    },
    /// Probe a page's nonce and audit its Content-Security-Policy
    Probe {
        /// Page URL to probe
        url: Url,

        /// Origin the widget script is expected to load from
        #[arg(long, env = "WIDGET_ORIGIN", default_value = "https://eu-test.oppwa.com")]
        widget_origin: Url,

        /// URL of the widget's dependency library
        #[arg(
            long,
            env = "WIDGET_DEPENDENCY_URL",
            default_value = "https://code.jquery.com/jquery.js"
        )]
        dependency_url: Url,
    },
    /// Print the nonce a page is served with
    Nonce {
        /// Page URL to probe
        url: Url,
    },
}

/// Where the backend status endpoint lives.
#[derive(Args)]
struct BackendArgs {
    /// Payment backend base URL
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:4000")]
    backend_url: Url,

    /// Status lookup path
    #[arg(long, env = "BACKEND_STATUS_PATH", default_value = "/payment/hyperpay/status")]
    status_path: String,

    /// Request timeout in seconds
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value_t = 10)]
    timeout: u64,
}

impl BackendArgs {
    fn into_config(self) -> hosted_checkout::config::BackendConfig {
        hosted_checkout::config::BackendConfig {
            base_url: self.backend_url,
            status_path: self.status_path,
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hc_cli=info,hosted_checkout=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Status {
            checkout_id,
            backend,
        } => commands::status::once(&backend.into_config(), &checkout_id).await?,
        Commands::Watch {
            checkout_id,
            backend,
            interval,
            max_attempts,
        } => {
            let policy = commands::status::watch_policy(interval, max_attempts)?;
            commands::status::watch(&backend.into_config(), &checkout_id, policy).await?;
        }
        Commands::Probe {
            url,
            widget_origin,
            dependency_url,
        } => commands::probe::audit(&url, &widget_origin, &dependency_url).await?,
        Commands::Nonce { url } => commands::probe::nonce(&url).await?,
    }
    Ok(())
}
