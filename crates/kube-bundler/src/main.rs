//! Kube Bundler - Main entry point
//!
//! Serves an HTTP API that:
//! - Composes single-model and composite Kubernetes manifests
//! - Builds environment descriptors for co-deployed solutions
//! - Packages solution folders into downloadable deployment bundles

mod api;
mod config;

use anyhow::{Context, Result};
use kube_bundler_core::loader::FsResourceLoader;
use kube_bundler_core::writer::ZipBundleWriter;
use kube_bundler_core::BundleAssembler;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub assembler: BundleAssembler<FsResourceLoader, ZipBundleWriter>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            assembler: BundleAssembler::new(FsResourceLoader::new(), ZipBundleWriter::new()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,kube_bundler=debug,kube_bundler_core=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kube Bundler");

    let config = AppConfig::from_env();
    tracing::info!("Configuration loaded: {:?}", config);

    if !config.solutions_dir.is_dir() {
        tracing::warn!("Solutions directory {:?} does not exist yet", config.solutions_dir);
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(config));

    let app = api::create_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("API listening on {}", addr);

    axum::serve(listener, app).await.context("Server exited")?;
    Ok(())
}
