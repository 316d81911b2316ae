//! Match Pipeline — orchestrates one screening request.
//!
//! Flow: cache lookup (hit → return) → resolve model → build prompt →
//!       invoke (admission-limited, timed) → recover → cache store → return.
//!
//! Only resolution and invocation can fail. Any response that arrives, however
//! malformed, is recovered and cached.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::llm_client::{ChatMessage, ChatRequest, ChatStream, InferenceService};
use crate::matching::cache::ResultCache;
use crate::matching::invoker::{invoke, InvokeError};
use crate::matching::prompts::{build_match_prompt, match_generation_options};
use crate::matching::recovery::{recover, RecoveryTier};
use crate::matching::resolver::{resolve_model, ModelAvailability};
use crate::models::matching::{MatchRequest, MatchResult, ModelDescriptor};

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Inference service unavailable: {reason}")]
    ServiceDown { reason: String },

    #[error("{message}")]
    NoSuitableModel {
        message: String,
        installed: Vec<String>,
    },

    #[error("Inference call timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("Inference call failed: {0}")]
    Transport(String),
}

impl From<InvokeError> for MatchError {
    fn from(e: InvokeError) -> Self {
        match e {
            InvokeError::Timeout { after } => MatchError::Timeout { after },
            InvokeError::Transport(message) => MatchError::Transport(message),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub request_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_concurrent_inferences: usize,
}

pub struct MatchPipeline {
    service: Arc<dyn InferenceService>,
    cache: ResultCache,
    /// One local model server cannot usefully serve many calls at once.
    inference_permits: Arc<Semaphore>,
    settings: PipelineSettings,
}

impl MatchPipeline {
    pub fn new(service: Arc<dyn InferenceService>, settings: PipelineSettings) -> Self {
        Self {
            service,
            cache: ResultCache::new(),
            inference_permits: Arc::new(Semaphore::new(settings.max_concurrent_inferences.max(1))),
            settings,
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Runs the full pipeline for one request. A cache hit skips everything,
    /// model resolution included.
    pub async fn run(&self, request: &MatchRequest) -> Result<Arc<MatchResult>, MatchError> {
        if let Some(hit) = self
            .cache
            .get(&request.resume_text, &request.job_description)
        {
            debug!("Cache hit; skipping inference");
            return Ok(hit);
        }
        debug!("Cache miss");

        let model = self.require_model().await?;
        let prompt = build_match_prompt(&request.resume_text, &request.job_description);
        let chat = ChatRequest::single_turn(&model.name, &prompt, match_generation_options());

        let raw = self.invoke_limited(&chat).await?;

        let (result, tier) = recover(&raw, &model.name);
        if tier == RecoveryTier::Heuristic {
            warn!("Model {} returned unparseable output; heuristic result cached", model.name);
        }
        info!(
            "Match complete: {}% via {} ({:?} recovery)",
            result.match_percentage, model.name, tier
        );

        let stored = self
            .cache
            .set(&request.resume_text, &request.job_description, result);
        debug!("Result cache holds {} entries", self.cache.len());
        Ok(stored)
    }

    /// Free-form conversation with the preferred model. Not cached.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, MatchError> {
        let model = self.require_model().await?;
        let request = ChatRequest::conversation(&model.name, messages);
        self.invoke_limited(&request).await
    }

    /// Streaming variant of `chat`. The request timeout bounds the wait for the
    /// response to start; once deltas flow, the stream runs until the service
    /// finishes or the caller drops it. The admission permit is held for the
    /// life of the stream.
    pub async fn chat_stream(&self, messages: Vec<ChatMessage>) -> Result<ChatStream, MatchError> {
        let model = self.require_model().await?;
        let request = ChatRequest::conversation(&model.name, messages).streaming();

        let permit = self
            .inference_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| MatchError::Transport(format!("Inference limiter closed: {e}")))?;

        let after = self.settings.request_timeout;
        let deltas = match tokio::time::timeout(after, self.service.chat_stream(&request)).await {
            Ok(Ok(deltas)) => deltas,
            Ok(Err(e)) => {
                warn!("Streaming chat with {} failed: {e}", model.name);
                return Err(MatchError::Transport(e.to_string()));
            }
            Err(_) => {
                warn!("Streaming chat with {} did not start within {}s", model.name, after.as_secs());
                return Err(MatchError::Timeout { after });
            }
        };
        info!("Streaming chat with {}", model.name);

        Ok(deltas
            .map(move |delta| {
                let _held = &permit;
                delta
            })
            .boxed())
    }

    /// Checks the inference service without running a request.
    pub async fn model_status(&self) -> ModelAvailability {
        resolve_model(self.service.as_ref(), self.settings.probe_timeout).await
    }

    async fn require_model(&self) -> Result<ModelDescriptor, MatchError> {
        match self.model_status().await {
            ModelAvailability::Available { model, .. } => {
                info!("Using model {} ({})", model.name, model.size_label);
                Ok(model)
            }
            ModelAvailability::NoSuitableModel { installed } => Err(MatchError::NoSuitableModel {
                message: ModelAvailability::no_suitable_model_message(),
                installed,
            }),
            ModelAvailability::ServiceDown { reason } => Err(MatchError::ServiceDown { reason }),
        }
    }

    /// The timeout covers the call itself, not time spent queued for a permit.
    async fn invoke_limited(&self, request: &ChatRequest) -> Result<String, MatchError> {
        let _permit = self
            .inference_permits
            .acquire()
            .await
            .map_err(|e| MatchError::Transport(format!("Inference limiter closed: {e}")))?;

        Ok(invoke(self.service.as_ref(), request, self.settings.request_timeout).await?)
    }
}
