// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, time::Duration};
use tracing::warn;

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";
pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    1
}
fn default_retry_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "gemini" | "mock" (case-insensitive)
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from GEMINI_API_KEY
    #[serde(default)]
    pub api_key: String,
    /// Upper bound for a single model call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after a retryable gateway failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Default for the per-request demo flag (tolerates screen-captured imagery).
    #[serde(default)]
    pub demo_mode: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "gemini".to_string(),
            model: default_model(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            demo_mode: false,
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> anyhow::Result<Self> {
        let mut cfg: AiConfig = serde_json::from_str(data)?;

        // Normalize provider
        cfg.provider = cfg.provider.trim().to_lowercase();

        // Resolve api key if "ENV"
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "gemini" => match env::var("GEMINI_API_KEY") {
                    Ok(key) if !key.trim().is_empty() => key,
                    _ => {
                        // Keep the call policy; only the provider is switched off.
                        warn!("Missing GEMINI_API_KEY env var, model gateway disabled");
                        cfg.enabled = false;
                        String::new()
                    }
                },
                "mock" => String::new(),
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        // Sanitize call policy
        if cfg.timeout_secs == 0 {
            cfg.timeout_secs = 1;
        }
        cfg.max_retries = cfg.max_retries.min(5);

        Ok(cfg)
    }

    /// Load from `$AI_CONFIG_PATH` or `config/ai.json`.
    /// Falls back to a disabled default when the file is missing or invalid.
    pub fn load_default() -> Self {
        let path = env::var(ENV_AI_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.into());
        match Self::load_from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %e, %path, "AI config not loaded, model gateway disabled");
                Self::default()
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let cfg = AiConfig::from_json_str(r#"{"enabled": true, "provider": "MOCK"}"#).unwrap();
        assert_eq!(cfg.provider, "mock");
        assert_eq!(cfg.model, "gemini-2.5-flash");
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.max_retries, 1);
        assert!(!cfg.demo_mode);
    }

    #[test]
    fn call_policy_is_clamped() {
        let cfg = AiConfig::from_json_str(
            r#"{"enabled": true, "provider": "gemini", "api_key": "k", "timeout_secs": 0, "max_retries": 40}"#,
        )
        .unwrap();
        assert_eq!(cfg.timeout_secs, 1);
        assert_eq!(cfg.max_retries, 5);
    }

    #[serial_test::serial]
    #[test]
    fn env_key_is_resolved_for_gemini() {
        env::set_var("GEMINI_API_KEY", "secret-key");
        let cfg =
            AiConfig::from_json_str(r#"{"enabled": true, "provider": "gemini", "api_key": "ENV"}"#)
                .unwrap();
        assert_eq!(cfg.api_key, "secret-key");

        env::remove_var("GEMINI_API_KEY");
        let cfg = AiConfig::from_json_str(
            r#"{"enabled": true, "provider": "gemini", "api_key": "env", "timeout_secs": 12, "max_retries": 3, "demo_mode": true}"#,
        )
        .unwrap();
        assert!(!cfg.enabled, "no key means no provider");
        assert!(cfg.api_key.is_empty());
        assert_eq!(cfg.timeout_secs, 12);
        assert_eq!(cfg.max_retries, 3);
        assert!(cfg.demo_mode);
    }

    #[serial_test::serial]
    #[test]
    fn load_default_keeps_policy_when_key_is_missing() {
        env::remove_var("GEMINI_API_KEY");
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ai.json");
        fs::write(
            &p,
            r#"{"enabled": true, "provider": "gemini", "api_key": "ENV", "timeout_secs": 7, "retry_backoff_ms": 50, "demo_mode": true}"#,
        )
        .unwrap();

        env::set_var(ENV_AI_CONFIG_PATH, p.display().to_string());
        let cfg = AiConfig::load_default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.timeout_secs, 7);
        assert_eq!(cfg.retry_backoff_ms, 50);
        assert!(cfg.demo_mode);
        env::remove_var(ENV_AI_CONFIG_PATH);
    }

    #[test]
    fn unknown_provider_with_env_key_is_rejected() {
        let err =
            AiConfig::from_json_str(r#"{"enabled": true, "provider": "other", "api_key": "ENV"}"#)
                .unwrap_err();
        assert!(err.to_string().contains("Unsupported provider"));
    }

    #[serial_test::serial]
    #[test]
    fn load_default_reads_env_path_and_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ai.json");
        fs::write(&p, r#"{"enabled": true, "provider": "mock", "demo_mode": true}"#).unwrap();

        env::set_var(ENV_AI_CONFIG_PATH, p.display().to_string());
        let cfg = AiConfig::load_default();
        assert!(cfg.enabled);
        assert!(cfg.demo_mode);

        env::set_var(ENV_AI_CONFIG_PATH, dir.path().join("missing.json"));
        let cfg = AiConfig::load_default();
        assert!(!cfg.enabled);

        env::remove_var(ENV_AI_CONFIG_PATH);
    }
}
