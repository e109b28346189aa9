//! HTTP server bootstrap and wiring.

pub mod api;

use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::adapters::{ModelInvoker, Retriever};
use crate::config::Config;
use crate::engine::WorkflowEngine;
use crate::store::{DeliverableStore, RunStore};
use crate::templates::TemplateCatalog;

pub use api::AppState;

/// Assemble the shared state and router from a full set of collaborators.
pub fn build(
    config: &Config,
    catalog: Arc<TemplateCatalog>,
    runs: Arc<dyn RunStore>,
    deliverables: Arc<dyn DeliverableStore>,
    invoker: Arc<dyn ModelInvoker>,
    retriever: Arc<dyn Retriever>,
) -> axum::Router {
    let engine = Arc::new(WorkflowEngine::new(
        Arc::clone(&catalog),
        Arc::clone(&runs),
        Arc::clone(&deliverables),
        invoker,
        retriever,
        config.engine.clone(),
    ));
    let state = AppState {
        engine,
        runs,
        deliverables,
        catalog,
        server: config.server.clone(),
    };
    let router = api::router(state);
    if config.server.dev_mode {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve the router until ctrl-c.
pub async fn serve(router: axum::Router, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
