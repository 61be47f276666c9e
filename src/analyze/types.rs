// src/analyze/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-impact severity reported by the image analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    /// Field was absent from the model reply.
    #[serde(rename = "unknown")]
    Unknown,
}

impl Severity {
    /// Case-insensitive label parse; only the three real levels are accepted.
    pub fn parse_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured reply of the image-only analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    #[serde(rename = "disaster_probability")]
    pub probability: f64,
    #[serde(rename = "disaster_type")]
    pub incident_type: String,
    #[serde(rename = "disaster_severity")]
    pub severity: Severity,
    pub reasoning: String,
}

/// Structured reply of the description reconciliation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptionAnalysis {
    /// `None` when no user description was supplied (wire sentinel `-1`).
    #[serde(rename = "similarity_score", serialize_with = "similarity_on_wire")]
    pub similarity: Option<f64>,
    pub reformulated_description: String,
}

fn similarity_on_wire<S: serde::Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(v.unwrap_or(SIMILARITY_NOT_APPLICABLE))
}

impl DescriptionAnalysis {
    /// Wire form of the similarity score (`-1` for not applicable).
    pub fn similarity_wire(&self) -> f64 {
        self.similarity.unwrap_or(SIMILARITY_NOT_APPLICABLE)
    }
}

pub const SIMILARITY_NOT_APPLICABLE: f64 = -1.0;

/// What the user claimed alongside the upload. Free strings, never validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserClaim {
    pub incident_type: String,
    pub severity: String,
}
