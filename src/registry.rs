// src/registry.rs
//! Incident type registry.
//!
//! Holds the list of valid incident type labels fetched from an external source.
//! Readers take a cheap `Arc` snapshot; a refresh replaces the whole list at once.
//! Fetch failures degrade to an empty list and are only logged.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::{counter, gauge};
use serde_json::Value;
use tracing::{info, warn};

/// Where type labels come from.
#[async_trait]
pub trait TypeSource: Send + Sync {
    async fn fetch_types(&self) -> Result<Vec<String>>;
    fn name(&self) -> &'static str;
}

/// GET endpoint returning a JSON array of objects with an optional `name` field.
pub struct HttpTypeSource {
    url: String,
    client: reqwest::Client,
}

impl HttpTypeSource {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl TypeSource for HttpTypeSource {
    async fn fetch_types(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("requesting incident types from {}", self.url))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("type source returned HTTP {status}"));
        }
        let body = resp.text().await.context("reading type source body")?;
        parse_type_names(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Fixed list; used when no external source is configured and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTypeSource {
    types: Vec<String>,
}

impl StaticTypeSource {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TypeSource for StaticTypeSource {
    async fn fetch_types(&self) -> Result<Vec<String>> {
        Ok(self.types.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Keep the string `name` of each array element, in order, duplicates included.
pub fn parse_type_names(body: &str) -> Result<Vec<String>> {
    let v: Value = serde_json::from_str(body).context("type source body is not JSON")?;
    let items = v
        .as_array()
        .ok_or_else(|| anyhow!("type source body is not a JSON array"))?;
    Ok(items
        .iter()
        .filter_map(|it| it.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

pub struct TypeRegistry {
    source: Arc<dyn TypeSource>,
    current: RwLock<Arc<Vec<String>>>,
}

impl TypeRegistry {
    pub fn new(source: Arc<dyn TypeSource>) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Refetch from the source and replace the current set. Never fails:
    /// an unreachable or malformed source yields an empty set.
    pub async fn fetch(&self) -> Arc<Vec<String>> {
        let fresh = match self.source.fetch_types().await {
            Ok(types) => {
                if types.is_empty() {
                    warn!(target: "registry", source = self.source.name(), "type source returned no types");
                }
                counter!("type_registry_refresh_total", "outcome" => "ok").increment(1);
                types
            }
            Err(e) => {
                warn!(target: "registry", source = self.source.name(), error = %e, "type source unavailable, continuing without types");
                counter!("type_registry_refresh_total", "outcome" => "error").increment(1);
                Vec::new()
            }
        };

        let fresh = Arc::new(fresh);
        {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            *guard = fresh.clone();
        }
        gauge!("type_registry_size").set(fresh.len() as f64);
        info!(target: "registry", count = fresh.len(), "incident types refreshed");
        fresh
    }

    /// Read-only snapshot of the current set.
    pub fn current(&self) -> Arc<Vec<String>> {
        self.current
            .read()
            .map(|g| g.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Alias of `current()`.
    pub fn get(&self) -> Arc<Vec<String>> {
        self.current()
    }

    /// Alias of `fetch()`.
    pub async fn refresh(&self) -> Arc<Vec<String>> {
        self.fetch().await
    }

    /// Populate from the source only while the set is empty.
    pub async fn ensure_loaded(&self) -> Arc<Vec<String>> {
        let snapshot = self.current();
        if snapshot.is_empty() {
            self.fetch().await
        } else {
            snapshot
        }
    }
}
