// src/analyze/description.rs
//! Description reconciler: compares the user's free text with the image reasoning and
//! produces a public-facing description.
//!
//! Two modes:
//! - empty description: summary from the reasoning only, similarity is "not applicable",
//! - comparison: similarity in `[0, 1]` plus a summary consistent with the analysis.

use crate::analyze::decoder::{
    decode_description_analysis, decode_description_summary, DecodeError, FieldViolation, UNKNOWN,
};
use crate::analyze::gateway::{DynGateway, Part};
use crate::analyze::image::StageError;
use crate::analyze::prompts::{
    compare_instructions, describe_only_instructions, description_context, reasoning_context,
};
use crate::analyze::types::DescriptionAnalysis;

/// Upper bound for the public description, in chars.
pub const MAX_PUBLIC_DESCRIPTION_CHARS: usize = 600;

#[derive(Clone)]
pub struct DescriptionReconciler {
    gateway: DynGateway,
}

impl DescriptionReconciler {
    pub fn new(gateway: DynGateway) -> Self {
        Self { gateway }
    }

    pub fn build_parts(user_description: Option<&str>, image_reasoning: &str) -> Vec<Part> {
        match supplied(user_description) {
            None => vec![
                Part::text(describe_only_instructions()),
                Part::text(reasoning_context(image_reasoning)),
            ],
            Some(desc) => vec![
                Part::text(compare_instructions()),
                Part::text(reasoning_context(image_reasoning)),
                Part::text(description_context(desc)),
            ],
        }
    }

    pub async fn reconcile(
        &self,
        user_description: Option<&str>,
        image_reasoning: &str,
    ) -> Result<DescriptionAnalysis, StageError> {
        let parts = Self::build_parts(user_description, image_reasoning);
        let raw = self.gateway.classify(&parts).await?;

        let (decoded, similarity) = if supplied(user_description).is_none() {
            // Nothing to compare: the score is never read, whatever the model sent.
            (decode_description_summary(&raw)?, None)
        } else {
            let decoded = decode_description_analysis(&raw)?;
            let Some(score) = decoded.similarity else {
                return Err(DecodeError::SchemaInvalid {
                    violations: vec![FieldViolation {
                        field: "similarity_score".into(),
                        message: "-1 is only valid when no description was supplied".into(),
                    }],
                }
                .into());
            };
            (decoded, Some(score))
        };

        let mut reformulated_description = sanitize_public_text(&decoded.reformulated_description);
        if reformulated_description.is_empty() {
            reformulated_description = UNKNOWN.to_string();
        }

        Ok(DescriptionAnalysis {
            similarity,
            reformulated_description,
        })
    }
}

/// `Some(trimmed)` when the user actually wrote something.
fn supplied(user_description: Option<&str>) -> Option<&str> {
    user_description.map(str::trim).filter(|s| !s.is_empty())
}

/// Plain single-paragraph text: markup characters removed, whitespace collapsed,
/// capped at `MAX_PUBLIC_DESCRIPTION_CHARS`.
pub fn sanitize_public_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_PUBLIC_DESCRIPTION_CHARS));
    let mut prev_space = false;
    let mut count = 0usize;
    for ch in input.chars() {
        let c = match ch {
            '*' | '_' | '#' | '`' | '>' | '<' | '[' | ']' | '~' | '|' => continue,
            c if c.is_whitespace() => ' ',
            c if c.is_control() => continue,
            c => c,
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
                count += 1;
            }
            prev_space = true;
        } else {
            out.push(c);
            count += 1;
            prev_space = false;
        }
        if count >= MAX_PUBLIC_DESCRIPTION_CHARS {
            break;
        }
    }
    out.trim().to_string()
}
