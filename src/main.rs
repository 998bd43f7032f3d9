//! pushnoti - web push application server.
//!
//! This is the main binary entry point. See the `pushnoti` library for the
//! core functionality.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use pushnoti::server::{http, DispatchCoordinator, VapidKeys, WebPushTransport};
use pushnoti::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "pushnoti")]
#[command(version)]
#[command(about = "Web push subscription and dispatch server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the /push routes
    Serve {
        /// Address to bind, overrides the configured one
        #[arg(long)]
        listen: Option<String>,
        /// Path to config.json
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// VAPID key management
    Vapid {
        #[command(subcommand)]
        command: VapidCommands,
    },
    /// Print the effective configuration, secrets redacted
    Config {
        /// Path to config.json
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum VapidCommands {
    /// Generate a new VAPID keypair
    Generate {
        /// Contact URI for the JWT `sub` claim (mailto: or https:)
        #[arg(long)]
        subject: Option<String>,
        /// Write the keys into the config file
        #[arg(long)]
        save: bool,
        /// Path to config.json
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Config::default_path(),
    }
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Ok(path) = std::env::var("PUSHNOTI_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.format_timestamp_secs().init();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down...");
}

/// Runs the push server until Ctrl-C.
fn run_server(listen: Option<String>, path: &Path) -> Result<()> {
    let mut config = Config::load_from(path)?;
    if let Some(addr) = listen {
        config.listen_addr = addr;
    }
    config
        .validate()
        .with_context(|| format!("Configuration in {} is not usable", path.display()))?;
    let push = config.push.clone().validated()?;

    let coordinator = DispatchCoordinator::new(push, Arc::new(WebPushTransport::default()))
        .with_delivery_timeout(config.delivery_timeout())
        .install_global();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
        log::info!("pushnoti v{} started", env!("CARGO_PKG_VERSION"));
        http::serve(listener, coordinator, shutdown_signal()).await?;
        Ok(())
    })
}

fn generate_vapid(subject: Option<String>, save: bool, path: &Path) -> Result<()> {
    let keys = VapidKeys::generate()?;

    if save {
        let mut config = Config::load_from(path)?;
        config.push.vapid.public_key = keys.public_key_base64url().to_string();
        config.push.vapid.private_key = keys.private_key_base64url().to_string();
        if let Some(subject) = subject {
            config.push.vapid.subject = subject;
        }
        config.save_to(path)?;
        println!("Saved VAPID keys to {}", path.display());
        println!("Public key: {}", keys.public_key_base64url());
    } else {
        if let Some(subject) = subject {
            println!("Subject:     {subject}");
        }
        println!("Public key:  {}", keys.public_key_base64url());
        println!("Private key: {}", keys.private_key_base64url());
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen, config } => {
            run_server(listen, &config_path(config)?)?;
        }
        Commands::Vapid { command } => match command {
            VapidCommands::Generate {
                subject,
                save,
                config,
            } => {
                generate_vapid(subject, save, &config_path(config)?)?;
            }
        },
        Commands::Config { config } => {
            let config = Config::load_from(&config_path(config)?)?;
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}
