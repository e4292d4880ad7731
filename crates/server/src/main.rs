mod api;
mod config;
mod state;
mod utils;

use api::api_router;
use config::{config_path_from_env, load_or_create_config, resolve_library_root};
use library::{Indexer, MetadataCache};
use state::AppState;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let cache = MetadataCache::new(config.cache_config(&config_path));
    info!("Metadata cache ready with {} entries", cache.len());
    let indexer = Indexer::new(cache, config.indexer_options());

    let library_root = resolve_library_root(&config_path, &config.library_root);
    match library_root.as_deref() {
        Some(root) if root.is_dir() => {
            info!("Default library directory: {}", root.display());
            indexer.watcher().watch(root).await;
        }
        Some(root) => warn!("Library directory {} does not exist", root.display()),
        None => info!("No default library directory; requests must pass dir."),
    }

    let state = AppState {
        indexer: indexer.clone(),
        library_root,
    };
    let app = api_router(state)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    indexer.shutdown().await;
    info!("Metadata cache flushed.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
