//! `tavor` command-line entry point.
//!
//! Logs go to stderr so that stdout carries only command output and JSON.
//! Ctrl-C cancels the in-flight wait or command instead of killing the
//! process mid-request.

mod cli;
mod commands;
mod config;

use std::process::ExitCode;

use clap::Parser;
use tavor_core::{CancellationToken, Client, ClientConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config::log_filter(&cli.global)))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let client_config = config::resolve(&cli.global, ClientConfig::from_env());
    tracing::debug!(?client_config, "Configuration loaded");
    let client = Client::new(client_config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received interrupt, cancelling");
            on_signal.cancel();
        }
    });

    commands::dispatch(&client, cli.command, &cancel).await
}
