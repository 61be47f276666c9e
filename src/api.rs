use std::sync::Arc;

use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::analyze::types::UserClaim;
use crate::config::{AppConfig, DEFAULT_MAX_UPLOAD_BYTES};
use crate::decision::FinalDecision;
use crate::engine::{AnalyzeRequest, Orchestrator};
use crate::error::AnalyzeError;
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub max_upload_bytes: usize,
    pub metrics: Option<Metrics>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            metrics: None,
        }
    }

    pub fn with_config(mut self, cfg: &AppConfig) -> Self {
        self.max_upload_bytes = cfg.max_upload_bytes;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

pub fn router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;
    let metrics = state.metrics.clone();

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/refresh-types", get(refresh_types))
        .route("/types", get(list_types))
        .with_state(state);

    if let Some(m) = metrics {
        app = app.merge(m.router());
    }

    app.layer(DefaultBodyLimit::max(limit))
        .layer(CorsLayer::very_permissive())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "provider": state.orchestrator.provider_name(),
        "types_loaded": state.orchestrator.registry().current().len(),
    }))
}

async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<FinalDecision>, AnalyzeError> {
    let multipart = multipart.map_err(|e| {
        AnalyzeError::BadRequest(format!("Expected a multipart/form-data body: {}", e.body_text()))
    })?;
    let req = read_analyze_form(multipart).await?;
    let decision = state.orchestrator.run(&req).await?;
    Ok(Json(decision))
}

async fn refresh_types(State(state): State<AppState>) -> Json<Value> {
    let types = state.orchestrator.registry().refresh().await;
    info!(target: "registry", count = types.len(), "types refreshed on request");
    Json(json!({ "count": types.len(), "types": types.as_slice() }))
}

async fn list_types(State(state): State<AppState>) -> Json<Value> {
    let types = state.orchestrator.registry().current();
    Json(json!({ "count": types.len(), "types": types.as_slice() }))
}

/// Collect the multipart fields of `POST /analyze`. Unknown fields are ignored,
/// missing text fields default to empty.
async fn read_analyze_form(mut multipart: Multipart) -> Result<AnalyzeRequest, AnalyzeError> {
    let mut req = AnalyzeRequest::default();
    let mut description = String::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                req.image = field.bytes().await.map_err(bad_multipart)?.to_vec();
            }
            "description" => description = read_text(field).await?,
            "type" => req.claim.incident_type = read_text(field).await?,
            "severity" => req.claim.severity = read_text(field).await?,
            "demo_mode" => req.demo_mode = parse_flag(&read_text(field).await?)?,
            _ => {}
        }
    }

    if req.image.is_empty() {
        return Err(AnalyzeError::BadRequest("Image file required".into()));
    }
    req.description = Some(description);
    req.claim = UserClaim {
        incident_type: req.claim.incident_type.trim().to_string(),
        severity: req.claim.severity.trim().to_string(),
    };
    Ok(req)
}

async fn read_text(field: Field<'_>) -> Result<String, AnalyzeError> {
    field.text().await.map_err(bad_multipart)
}

fn bad_multipart(e: MultipartError) -> AnalyzeError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AnalyzeError::PayloadTooLarge(e.body_text());
    }
    AnalyzeError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
}

fn parse_flag(raw: &str) -> Result<Option<bool>, AnalyzeError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" => Ok(Some(false)),
        other => Err(AnalyzeError::BadRequest(format!(
            "demo_mode must be true or false, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_flag_parsing() {
        assert_eq!(parse_flag("").unwrap(), None);
        assert_eq!(parse_flag(" YES ").unwrap(), Some(true));
        assert_eq!(parse_flag("1").unwrap(), Some(true));
        assert_eq!(parse_flag("false").unwrap(), Some(false));
        assert!(parse_flag("maybe").is_err());
    }
}
