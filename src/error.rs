// src/error.rs
//! Request-level error taxonomy and its HTTP shape.
//!
//! Every variant aborts the request; no partial decision is ever returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::analyze::decoder::DecodeError;
use crate::analyze::gateway::GatewayError;
use crate::decision::ValidationFailure;

/// Which model call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ImageAnalysis,
    DescriptionAnalysis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ImageAnalysis => "image_analysis",
            Stage::DescriptionAnalysis => "description_analysis",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyzeError {
    #[error("{0}")]
    BadRequest(String),

    #[error("upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("{stage}: model gateway unavailable: {source}")]
    UpstreamUnavailable { stage: Stage, source: GatewayError },

    #[error("{stage}: {source}")]
    Decode { stage: Stage, source: DecodeError },

    #[error("decision failed validation: {0}")]
    Validation(#[from] ValidationFailure),
}

impl AnalyzeError {
    /// Short label for logs and the `analyze_failures_total{kind}` series.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzeError::BadRequest(_) => "bad_request",
            AnalyzeError::PayloadTooLarge(_) => "payload_too_large",
            AnalyzeError::UpstreamUnavailable { .. } => "upstream_unavailable",
            AnalyzeError::Decode {
                source: DecodeError::NotJson { .. },
                ..
            } => "not_json",
            AnalyzeError::Decode {
                source: DecodeError::SchemaInvalid { .. },
                ..
            } => "schema_invalid",
            AnalyzeError::Validation(_) => "validation_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AnalyzeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AnalyzeError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AnalyzeError::Decode { .. } | AnalyzeError::Validation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            AnalyzeError::BadRequest(msg) => json!({ "error": msg }),
            AnalyzeError::PayloadTooLarge(msg) => json!({
                "error": "Upload exceeds the size limit",
                "details": msg,
            }),
            AnalyzeError::UpstreamUnavailable { stage, source } => json!({
                "error": "Model gateway unavailable",
                "stage": stage,
                "details": source.to_string(),
            }),
            AnalyzeError::Decode {
                stage,
                source: DecodeError::NotJson { raw },
            } => json!({
                "error": "Failed to parse model response as JSON",
                "stage": stage,
                "raw": raw,
            }),
            AnalyzeError::Decode {
                stage,
                source: DecodeError::SchemaInvalid { violations },
            } => json!({
                "error": "Output format invalid",
                "stage": stage,
                "details": violations,
            }),
            AnalyzeError::Validation(v) => json!({
                "error": "Decision failed validation",
                "details": v.to_string(),
            }),
        }
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!(
            target: "analyze",
            kind = self.kind(),
            status = status.as_u16(),
            message = %self,
            "analyze request failed"
        );
        (status, Json(self.body())).into_response()
    }
}
