//! Event broker - publication engine for signed and published resources

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use event_broker::{
    config::{Args, StoreBackend},
    decision::HttpDecisionClient,
    engine::PublicationEngine,
    server::{self, AppState},
    store::{MemoryStore, ResourceStore, SparqlStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("event_broker={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let engine_config = args.engine_config();

    info!("======================================");
    info!("  Event Broker");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Environment: {}", args.environment);
    match args.store_backend {
        StoreBackend::Sparql => info!("Store: SPARQL {}", args.sparql_endpoint),
        StoreBackend::Memory => info!("Store: in-memory"),
    }
    info!("Decision service: {}", args.decision_service_url);
    info!(
        "Dispatch: fanout {}, {} deferred workers",
        engine_config.fanout, engine_config.deferred_workers
    );
    info!(
        "Retries: {} attempts, backoff {:?}",
        engine_config.max_attempts,
        engine_config.backoff.delays()
    );
    info!("======================================");

    let store: Arc<dyn ResourceStore> = match args.store_backend {
        StoreBackend::Sparql => Arc::new(SparqlStore::new(args.sparql_config())?),
        StoreBackend::Memory => {
            warn!("Using the in-memory store, state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let decision = Arc::new(HttpDecisionClient::new(
        args.decision_service_url.clone(),
        args.request_timeout(),
    )?);

    let engine = Arc::new(PublicationEngine::new(store, decision, engine_config));

    if args.resume_retries {
        if let Err(e) = engine.resume_orphaned_retries().await {
            warn!("Could not resume pending retries (continuing): {}", e);
        }
    }

    let state = Arc::new(AppState::new(args, engine));

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
