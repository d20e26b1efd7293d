use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use futures::future::FutureExt;

use brokercore::broker::Broker;
use brokercore::config::{Args, Config, Role};
use brokercore::gc::Gc;
use brokercore::queue::InMemoryQueue;
use brokercore::staging::InMemoryStaging;
use brokercore::store::InMemoryRequestStore;
use brokercore::worker::Worker;

/// Waits for SIGINT or SIGTERM, whichever arrives first (§6's exit-code contract).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down gracefully"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down gracefully"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.validate {
        println!("configuration is valid");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = run(args.role, config).await {
        tracing::error!(error = %e, "fatal error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn run(role: Role, config: Config) -> brokercore::Result<()> {
    let broker_config = config.broker.clone().into();
    let worker_config = config.worker.clone().into();
    let gc_config = config.gc.clone().try_into()?;
    let collections = Arc::new(config.collections()?);

    let store = Arc::new(InMemoryRequestStore::new());
    let queue = Arc::new(InMemoryQueue::default());
    let staging = Arc::new(InMemoryStaging::new("https://staging.local"));

    match role {
        Role::Broker => {
            let broker = Broker::new(store, queue, collections, broker_config);
            broker.run(shutdown_signal()).await
        }
        Role::Worker => {
            let worker = Worker::new(store, queue, staging, collections, worker_config);
            worker.run(shutdown_signal()).await
        }
        Role::Gc => {
            let gc = Gc::new(store, staging, gc_config);
            gc.run(shutdown_signal()).await
        }
        Role::All => {
            let broker = Broker::new(store.clone(), queue.clone(), collections.clone(), broker_config);
            let worker = Worker::new(store.clone(), queue.clone(), staging.clone(), collections, worker_config);
            let gc = Gc::new(store, staging, gc_config);

            let shutdown = shutdown_signal().shared();

            tokio::try_join!(
                broker.run(shutdown.clone()),
                worker.run(shutdown.clone()),
                gc.run(shutdown),
            )?;
            Ok(())
        }
    }
}
