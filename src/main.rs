use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pickup_audit::config::Config;
use pickup_audit::infrastructure::{AppState, SeaOrmJobStore};
use pickup_audit::pipeline::spawn_intake;
use pickup_audit::relay::{RelayError, start_relay};
use pickup_audit::{db, server};

#[tokio::main]
async fn main() {
    // Initialize tracing; stdout belongs to the keyword sink
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pickup_audit=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize database
    let db = db::init_db(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let store = Arc::new(SeaOrmJobStore::new(db, config.reclaim_after));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("🛑 Shutdown requested");
                    shutdown.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
            }
        });
    }

    let (ingestor, intake) = spawn_intake(
        store.clone(),
        tokio::io::stdout(),
        config.intake_options(),
    );

    let relay = start_relay(&config, store.clone(), shutdown.clone())
        .await
        .expect("Failed to start log relay");

    // A relay failure takes the whole service down
    let relay = relay.map(|handle| {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = handle.await.unwrap_or_else(|e| {
                Err(RelayError::Task {
                    task: "relay",
                    message: e.to_string(),
                })
            });
            shutdown.cancel();
            result
        })
    });

    let state = AppState::new(store, ingestor, shutdown.clone()).with_relay(relay.is_some());
    let router = server::build_router(state);

    if let Err(e) = server::serve(router, config.port, shutdown.clone()).await {
        tracing::error!("HTTP server error: {}", e);
    }
    shutdown.cancel();

    let mut failed = false;
    if let Some(relay) = relay {
        match relay.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("❌ Log relay stopped with error: {}", e);
                failed = true;
            }
            Err(e) => {
                tracing::error!("❌ Log relay task failed: {}", e);
                failed = true;
            }
        }
    }

    match intake.await {
        Ok(stored) => tracing::info!("Intake flushed, {} log jobs stored this run", stored),
        Err(e) => tracing::error!("❌ Log intake task failed: {}", e),
    }

    if failed {
        std::process::exit(1);
    }
}
