mod cli;

use clap::Parser;
use cli::Cli;
use std::sync::Arc;
use tagwatch::reconcile::{self, Services};
use tagwatch::{notify, DockerClient, DockerHubClient, Error as WatchError};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(watch_error) = e.downcast_ref::<WatchError>() {
            eprintln!("Error: {}", watch_error);
            if let Some(suggestion) = watch_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Environment-backed options must see `.env` before parsing.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.is_verbose(), cli.log_json)?;

    let (mode, config) = cli.into_config()?;
    if config.verbose {
        tracing::debug!("effective configuration: {}", serde_json::to_string_pretty(&config)?);
    }

    let services = Services {
        runtime: Arc::new(DockerClient::connect().map_err(WatchError::from)?),
        registry: Arc::new(DockerHubClient::new().map_err(WatchError::from)?),
        notifier: notify::from_target(&config.notify)?,
    };

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    reconcile::run(mode, config, services, cancel).await?;
    Ok(())
}

/// First SIGINT/SIGTERM stops scheduling after the current cycle, a second one exits.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Failed to create SIGTERM handler: {}", e);
                    None
                }
            }
        };

        let mut signal_count = 0;
        loop {
            #[cfg(unix)]
            let terminate = async {
                match sigterm.as_mut() {
                    Some(s) => {
                        s.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate => {}
            }

            signal_count += 1;
            if signal_count == 1 {
                tracing::info!("stopping after the current run (signal again to force quit)");
                cancel.cancel();
            } else {
                tracing::warn!("force quitting");
                std::process::exit(130);
            }
        }
    });
}

fn init_tracing(verbose: bool, json: bool) -> anyhow::Result<()> {
    let default_filter = if verbose { "tagwatch=debug,info" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}
