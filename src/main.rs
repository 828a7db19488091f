//! Configuration engine daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   engine.toml ──▶ config::load_config ──▶ StaticCatalog (+ store discovery)
//!                                                  │
//!                                                  ▼
//!   ┌─────────────────────────────────────────────────────────────────────┐
//!   │                      ConfigurationEngine                            │
//!   │                                                                     │
//!   │   init / destroy / full_reload        load / unload / reload(name)  │
//!   │            │                                    │                   │
//!   │            ▼                                    ▼                   │
//!   │   ┌─────────────────┐   get(name)   ┌──────────────────────────┐    │
//!   │   │ ClassLoader-    │──────────────▶│ OverrideResourceLoader   │    │
//!   │   │ Manager         │               │  base path ─▶ parent ─▶  │    │
//!   │   └─────────────────┘               │  shared resources        │    │
//!   │            │                        └────────────┬─────────────┘    │
//!   │            ▼                                     │                  │
//!   │   ┌─────────────────┐  EntityResolver            ▼                  │
//!   │   │    Digester     │◀──────────── Database │ Archive │ Directory   │
//!   │   └─────────────────┘                                               │
//!   │            │                                                        │
//!   │            ▼                                                        │
//!   │   Configuration (state, adapters, resources) + message streams     │
//!   └─────────────────────────────────────────────────────────────────────┘
//!          ▲                    ▲                      ▲
//!          │ SIGHUP             │ directory changes    │ admin API
//!      signals.rs          config/watcher.rs       admin/ (axum)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use config_engine::admin::{setup_admin_router, AdminState};
use config_engine::config::loader::load_config;
use config_engine::config::watcher::ConfigWatcher;
use config_engine::engine::{ConfigurationEngine, StaticCatalog};
use config_engine::lifecycle::{next_signal, SignalEvent};
use config_engine::loader::store::{ConfigStore, SqlConfigStore};
use config_engine::observability::{logging, metrics};
use config_engine::Shutdown;

#[derive(Parser)]
#[command(name = "config-engine")]
#[command(about = "Configuration classloading and lifecycle engine", long_about = None)]
struct Args {
    /// Engine configuration file
    #[arg(short, long, default_value = "engine.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        instance = %config.engine.instance_name,
        configurations = config.configurations.len(),
        "config-engine starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let store: Option<Arc<dyn ConfigStore>> = match &config.database.url {
        Some(url) => Some(Arc::new(SqlConfigStore::connect(url).await?)),
        None => None,
    };

    let mut catalog = StaticCatalog::new(config.configurations.clone());
    if config.database.discover {
        if let Some(store) = &store {
            catalog = catalog.with_discovery(store.clone());
        } else {
            tracing::warn!("Store discovery requested but no database url is configured");
        }
    }

    let mut builder = ConfigurationEngine::builder(Arc::new(catalog))
        .settings(config.engine.clone())
        .retry(config.retry.clone());
    if let Some(store) = store {
        builder = builder.store(store);
    }
    let engine = builder.build();

    if !engine.init(config.retry.enabled).await {
        tracing::warn!("Engine did not start, see the *ALL* message log");
    }

    let shutdown = Arc::new(Shutdown::new());

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState::new(
            engine.clone(),
            config.admin.api_key.as_str(),
        ));
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin server failed");
            }
        });
    }

    let (watcher, mut changes) = ConfigWatcher::new(&config.configurations);
    let _watcher = if watcher.is_empty() {
        None
    } else {
        match watcher.run() {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start configuration watcher");
                None
            }
        }
    };
    {
        let engine = engine.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    Some(name) = changes.recv() => {
                        match engine.reload(&name).await {
                            Ok(state) => tracing::info!(configuration = %name, state = %state, "Reloaded after change"),
                            Err(e) => tracing::warn!(configuration = %name, error = %e, "Reload after change failed"),
                        }
                    }
                    else => break,
                }
            }
        });
    }

    loop {
        match next_signal().await {
            SignalEvent::FullReload => {
                tracing::info!("SIGHUP received, full reload");
                if let Err(e) = engine.full_reload().await {
                    tracing::warn!(error = %e, "Full reload refused");
                }
            }
            SignalEvent::Shutdown => break,
        }
    }

    tracing::info!("Shutdown signal received");
    shutdown.trigger();
    engine.destroy().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
