// src/analyze/mod.rs
//! Analysis pipeline pieces: model gateway, instruction payloads, reply decoding and the
//! two analysis stages built on top of them.

pub mod decoder;
pub mod description;
pub mod gateway;
pub mod image;
pub mod prompts;
pub mod types;

// Re-export convenient types.
pub use crate::analyze::decoder::{DecodeError, FieldViolation, Schema};
pub use crate::analyze::description::DescriptionReconciler;
pub use crate::analyze::gateway::{DynGateway, GatewayError, MockGateway, ModelGateway, Part};
pub use crate::analyze::image::{ImageClassifier, StageError};
pub use crate::analyze::types::{DescriptionAnalysis, ImageAnalysis, Severity, UserClaim};
