// src/analyze/image.rs
//! Image classifier: one gateway call with the image, the policy instructions and the
//! user's claims, decoded against the image-analysis schema.

use crate::analyze::decoder::{decode_image_analysis, DecodeError};
use crate::analyze::gateway::{DynGateway, GatewayError, Part};
use crate::analyze::prompts::{user_context, ImagePrompt};
use crate::analyze::types::{ImageAnalysis, UserClaim};
use thiserror::Error;

/// Failure of one analysis stage: either the call or its reply.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Clone)]
pub struct ImageClassifier {
    gateway: DynGateway,
}

impl ImageClassifier {
    pub fn new(gateway: DynGateway) -> Self {
        Self { gateway }
    }

    /// Ordered payload: image, instructions, user context.
    pub fn build_parts(
        image: &[u8],
        claim: &UserClaim,
        known_types: &[String],
        demo_mode: bool,
    ) -> Vec<Part> {
        let prompt = ImagePrompt {
            known_types,
            demo_mode,
        };
        vec![
            Part::jpeg(image),
            Part::text(prompt.instructions()),
            Part::text(user_context(claim)),
        ]
    }

    pub async fn analyze(
        &self,
        image: &[u8],
        claim: &UserClaim,
        known_types: &[String],
        demo_mode: bool,
    ) -> Result<ImageAnalysis, StageError> {
        let parts = Self::build_parts(image, claim, known_types, demo_mode);
        let raw = self.gateway.classify(&parts).await?;
        Ok(decode_image_analysis(&raw)?)
    }
}
