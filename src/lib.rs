// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod registry;

use std::sync::Arc;

use axum::Router;
use tracing::info;

pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::decision::FinalDecision;
pub use crate::engine::{AnalyzeRequest, CallPolicy, Orchestrator};
pub use crate::error::AnalyzeError;

use crate::analyze::gateway::{build_gateway_from_config, DynGateway};
use crate::registry::{HttpTypeSource, StaticTypeSource, TypeRegistry, TypeSource};

/// Wire the full service from a config: gateway, type registry (populated eagerly),
/// orchestrator and metrics.
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<AppState> {
    anyhow::ensure!(cfg.max_upload_bytes > 0, "max_upload_bytes must be positive");

    let source: Arc<dyn TypeSource> = match &cfg.types_source_url {
        Some(url) => Arc::new(HttpTypeSource::new(url.clone())),
        None => Arc::new(StaticTypeSource::default()),
    };
    let gateway: DynGateway = build_gateway_from_config(&cfg.ai);

    let state = build_state_with(cfg, source, gateway).await;
    info!(
        provider = state.orchestrator.provider_name(),
        types = state.orchestrator.registry().current().len(),
        "service wired"
    );
    Ok(state)
}

/// Same as [`build_state`] with explicit type source and gateway (used by tests).
pub async fn build_state_with(
    cfg: &AppConfig,
    source: Arc<dyn TypeSource>,
    gateway: DynGateway,
) -> AppState {
    // Recorder first, so the initial type fetch is counted.
    let metrics = crate::metrics::Metrics::init();

    let registry = Arc::new(TypeRegistry::new(source));
    registry.ensure_loaded().await;

    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        gateway,
        CallPolicy::from_config(&cfg.ai),
        cfg.ai.demo_mode,
    ));

    AppState::new(orchestrator)
        .with_config(cfg)
        .with_metrics(metrics)
}

/// Build the full in-process app from environment (`.env`, `config/ai.json`).
pub async fn app() -> anyhow::Result<Router> {
    let cfg = AppConfig::from_env();
    let state = build_state(&cfg).await?;
    Ok(router(state))
}
