//! decision.rs: final verdict shape and the score blend that produces it.
//!
//! Everything here is pure: no I/O, no model calls. The orchestrator feeds in the two
//! decoded analyses and gets back a validated `FinalDecision`.
//!
//! Policy:
//! - a zero visual probability is a hard floor (text cannot rescue it),
//! - without a user description the visual probability passes through unchanged,
//! - otherwise `0.8 * image + 0.2 * similarity`,
//! - `is_incident` when the result is at least `0.6` (closed bound).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyze::types::{DescriptionAnalysis, ImageAnalysis};

pub const IMAGE_WEIGHT: f64 = 0.8;
pub const SIMILARITY_WEIGHT: f64 = 0.2;
pub const INCIDENT_THRESHOLD: f64 = 0.6;

/// Decimal places kept from the weighted sum, so float noise (0.75 * 0.8) does not
/// push a blend off the threshold.
const BLEND_DECIMALS: i32 = 12;

/// Outcome of the score blend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blend {
    pub probability: f64,
    pub is_incident: bool,
}

/// Blend the image probability with the description similarity.
///
/// `similarity_score` is ignored when `description_was_empty` is set (the wire sentinel
/// `-1` can be passed straight through).
pub fn combine(image_probability: f64, similarity_score: f64, description_was_empty: bool) -> Blend {
    let probability = if image_probability == 0.0 {
        0.0
    } else if description_was_empty {
        image_probability
    } else {
        round_blend(image_probability * IMAGE_WEIGHT + similarity_score * SIMILARITY_WEIGHT)
    };

    Blend {
        probability,
        is_incident: probability >= INCIDENT_THRESHOLD,
    }
}

/// Same policy with the "not applicable" score modelled as `None`.
pub fn combine_optional(image_probability: f64, similarity: Option<f64>) -> Blend {
    match similarity {
        Some(s) => combine(image_probability, s, false),
        None => combine(image_probability, 0.0, true),
    }
}

fn round_blend(x: f64) -> f64 {
    let scale = 10f64.powi(BLEND_DECIMALS);
    (x * scale).round() / scale
}

/// Response body of `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    pub is_incident: bool,
    /// Blended probability in `[0.0, 1.0]`.
    pub probability: f64,
    pub reformulated_description: String,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub severity: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    #[error("final probability {0} is outside [0, 1]")]
    ProbabilityOutOfRange(f64),
    #[error("final probability is not a finite number")]
    ProbabilityNotFinite,
}

impl FinalDecision {
    /// Derive the decision from both analyses. This is the only constructor.
    pub fn assemble(
        image: &ImageAnalysis,
        description: &DescriptionAnalysis,
    ) -> Result<Self, ValidationFailure> {
        let blend = combine_optional(image.probability, description.similarity);
        let decision = Self {
            is_incident: blend.is_incident,
            probability: blend.probability,
            reformulated_description: description.reformulated_description.clone(),
            incident_type: image.incident_type.clone(),
            severity: image.severity.to_string(),
            reasoning: image.reasoning.clone(),
        };
        decision.validate()?;
        Ok(decision)
    }

    fn validate(&self) -> Result<(), ValidationFailure> {
        if !self.probability.is_finite() {
            return Err(ValidationFailure::ProbabilityNotFinite);
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(ValidationFailure::ProbabilityOutOfRange(self.probability));
        }
        Ok(())
    }
}
