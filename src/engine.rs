//! # Request Orchestrator
//! Sequences one analysis request:
//! type registry (read) → image classifier → description reconciler → decision blend.
//!
//! The two model calls are strictly sequential: the reconciler needs the classifier's
//! reasoning. Each call runs under the configured timeout; transport-level failures are
//! retried here (never inside the gateway). Decode failures abort immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::analyze::description::DescriptionReconciler;
use crate::analyze::gateway::{DynGateway, GatewayError};
use crate::analyze::image::{ImageClassifier, StageError};
use crate::analyze::types::UserClaim;
use crate::config::AiConfig;
use crate::decision::FinalDecision;
use crate::error::{AnalyzeError, Stage};
use crate::registry::TypeRegistry;

/// One incoming classification request.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeRequest {
    pub image: Vec<u8>,
    /// Free text; empty or whitespace-only counts as "not supplied".
    pub description: Option<String>,
    pub claim: UserClaim,
    /// Per-request override of the configured demo mode.
    pub demo_mode: Option<bool>,
}

/// Timeout and retry policy for model calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::from_config(&AiConfig::default())
    }
}

impl CallPolicy {
    pub fn from_config(cfg: &AiConfig) -> Self {
        Self {
            timeout: cfg.timeout(),
            max_retries: cfg.max_retries,
            backoff: cfg.retry_backoff(),
        }
    }
}

pub struct Orchestrator {
    registry: Arc<TypeRegistry>,
    classifier: ImageClassifier,
    reconciler: DescriptionReconciler,
    policy: CallPolicy,
    default_demo_mode: bool,
    provider: &'static str,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<TypeRegistry>,
        gateway: DynGateway,
        policy: CallPolicy,
        default_demo_mode: bool,
    ) -> Self {
        let provider = gateway.provider_name();
        Self {
            registry,
            classifier: ImageClassifier::new(gateway.clone()),
            reconciler: DescriptionReconciler::new(gateway),
            policy,
            default_demo_mode,
            provider,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider
    }

    pub async fn run(&self, req: &AnalyzeRequest) -> Result<FinalDecision, AnalyzeError> {
        counter!("analyze_requests_total").increment(1);
        let result = self.run_inner(req).await;
        match &result {
            Ok(d) if d.is_incident => counter!("analyze_incidents_total").increment(1),
            Ok(_) => {}
            Err(e) => counter!("analyze_failures_total", "kind" => e.kind()).increment(1),
        }
        result
    }

    async fn run_inner(&self, req: &AnalyzeRequest) -> Result<FinalDecision, AnalyzeError> {
        if req.image.is_empty() {
            return Err(AnalyzeError::BadRequest("Image file required".into()));
        }

        let types = self.registry.current();
        if types.is_empty() {
            debug!(target: "analyze", "no incident types loaded, prompt omits the type list");
        }
        let demo_mode = req.demo_mode.unwrap_or(self.default_demo_mode);

        // Stage 1: image only.
        let classifier = &self.classifier;
        let image_bytes = req.image.as_slice();
        let claim = &req.claim;
        let known_types = types.as_slice();
        let image = call_with_policy(Stage::ImageAnalysis, self.policy, move || {
            classifier.analyze(image_bytes, claim, known_types, demo_mode)
        })
        .await?;

        // Stage 2: the reasoning is handed over by value.
        let reasoning = image.reasoning.clone();
        let reconciler = &self.reconciler;
        let description = req.description.as_deref();
        let reasoning_ref = reasoning.as_str();
        let desc = call_with_policy(Stage::DescriptionAnalysis, self.policy, move || {
            reconciler.reconcile(description, reasoning_ref)
        })
        .await?;

        let decision = FinalDecision::assemble(&image, &desc)?;

        let user_text = req.description.as_deref().unwrap_or("").trim();
        info!(
            target: "analyze",
            provider = self.provider,
            demo_mode,
            types = types.len(),
            desc_id = %anon_hash(user_text),
            desc_len = user_text.chars().count(),
            image_probability = image.probability,
            similarity = ?desc.similarity,
            probability = decision.probability,
            is_incident = decision.is_incident,
            "analysis complete"
        );
        Ok(decision)
    }
}

/// Run one stage under the timeout, retrying retryable gateway failures with linear backoff.
async fn call_with_policy<T, F, Fut>(
    stage: Stage,
    policy: CallPolicy,
    mut call: F,
) -> Result<T, AnalyzeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let mut attempt: u32 = 0;
    loop {
        counter!("gateway_calls_total", "stage" => stage.as_str()).increment(1);
        let started = Instant::now();
        let outcome = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(r) => r,
            Err(_) => Err(StageError::Gateway(GatewayError::Timeout(policy.timeout))),
        };
        histogram!("gateway_duration_ms", "stage" => stage.as_str())
            .record(started.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(v) => return Ok(v),
            Err(StageError::Decode(source)) => return Err(AnalyzeError::Decode { stage, source }),
            Err(StageError::Gateway(e)) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                counter!("gateway_retries_total", "stage" => stage.as_str()).increment(1);
                warn!(target: "gateway", %stage, attempt, error = %e, "model call failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            Err(StageError::Gateway(source)) => {
                return Err(AnalyzeError::UpstreamUnavailable { stage, source })
            }
        }
    }
}

/// Short, non-reversible id for user text in logs (never log the raw text).
pub(crate) fn anon_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
