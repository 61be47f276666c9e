// src/config/mod.rs
//! Process configuration: model gateway settings from `config/ai.json`,
//! everything else from environment variables (`.env` is loaded by the binary).

pub mod ai;

use std::env;

pub use ai::AiConfig;

pub const ENV_TYPES_SOURCE_URL: &str = "TYPES_SOURCE_URL";
pub const ENV_MAX_UPLOAD_BYTES: &str = "MAX_UPLOAD_BYTES";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ai: AiConfig,
    /// GET endpoint returning `[{"name": ...}, ...]`; `None` means no external source.
    pub types_source_url: Option<String>,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let types_source_url = env::var(ENV_TYPES_SOURCE_URL)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let max_upload_bytes = env::var(ENV_MAX_UPLOAD_BYTES)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        Self {
            ai: AiConfig::load_default(),
            types_source_url,
            max_upload_bytes,
        }
    }
}
