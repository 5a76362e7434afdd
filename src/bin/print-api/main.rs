//! HTTP server that slices uploaded 3D models and ships the result to a
//! printer.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use print_api::config::Config;
use slog::Drain;
use tracing_subscriber::prelude::*;

/// Serve the print-api server.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "print-api")]
struct Cli {
    /// Config file to use
    #[arg(long, short, default_value = "print-api.toml")]
    config: String,

    /// Print debug info
    #[arg(short, long)]
    debug: bool,

    /// Print logs as json
    #[arg(short, long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve HTTP requests to slice 3D models and send them to printers.
    Serve {
        /// `host:port` to bind to on the host system.
        #[arg(long, short, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

impl Cli {
    /// Setup our logger.
    fn create_logger(&self, app: &str) -> slog::Logger {
        if self.json {
            let drain = slog_json::Json::default(std::io::stderr()).fuse();
            self.async_root_logger(drain, app)
        } else {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            self.async_root_logger(drain, app)
        }
    }

    fn async_root_logger<T>(&self, drain: T, app: &str) -> slog::Logger
    where
        T: slog::Drain + Send + 'static,
        <T as slog::Drain>::Err: std::fmt::Debug,
    {
        let level = if self.debug {
            slog::Level::Debug
        } else {
            slog::Level::Info
        };

        let level_drain = slog::LevelFilter(drain, level).fuse();
        let async_drain = slog_async::Async::new(level_drain).build().fuse();
        slog::Logger::root(async_drain, slog::slog_o!("app" => app.to_owned()))
    }
}

async fn handle_signals() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up SIGINT handler");
            e
        })?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up SIGTERM handler");
            e
        })?;

        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await.map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up Ctrl+C handler");
            anyhow::Error::new(e)
        })?;

        tracing::info!("received Ctrl+C (SIGINT)");
    }

    tracing::info!("triggering cleanup...");
    tracing::info!("all clean, exiting!");
    std::process::exit(0);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::spawn(async { handle_signals().await });

    let level_filter = if cli.debug {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(level_filter))
        .init();

    let mut config = Config::from_file(&PathBuf::from(&cli.config))?;
    if cli.debug {
        config.debug = true;
    }

    match &cli.command {
        Commands::Serve { bind } => {
            let logger = cli.create_logger("print-api");
            print_api::server::serve(bind, &config, logger).await
        }
    }
}
