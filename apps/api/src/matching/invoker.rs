//! Inference Invoker: exactly one outbound chat call, bounded by a cancellation timer.

use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm_client::{ChatRequest, InferenceService};

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Inference call timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("Inference call failed: {0}")]
    Transport(String),
}

/// Cancels its token once `after` elapses unless dropped first.
/// Dropping the guard aborts the timer task, so no timer outlives the call.
struct ArmedTimer {
    handle: JoinHandle<()>,
}

impl ArmedTimer {
    fn arm(token: CancellationToken, after: Duration) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        });
        Self { handle }
    }
}

impl Drop for ArmedTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Sends `request` and waits for the raw response text.
///
/// If `timeout` elapses first, the in-flight request future is dropped (which
/// aborts the HTTP call and releases its connection) and `Timeout` is returned.
/// No retries.
pub async fn invoke(
    service: &dyn InferenceService,
    request: &ChatRequest,
    timeout: Duration,
) -> Result<String, InvokeError> {
    let token = CancellationToken::new();
    let _timer = ArmedTimer::arm(token.clone(), timeout);

    debug!(
        "Invoking {} (timeout {}s, {} messages)",
        request.model,
        timeout.as_secs(),
        request.messages.len()
    );

    tokio::select! {
        result = service.chat(request) => {
            result.map_err(|e| {
                warn!("Inference call to {} failed: {e}", request.model);
                InvokeError::Transport(e.to_string())
            })
        }
        _ = token.cancelled() => {
            warn!(
                "Inference call to {} aborted after {}s",
                request.model,
                timeout.as_secs()
            );
            Err(InvokeError::Timeout { after: timeout })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{ChatMessage, LlmError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    enum Reply {
        Text(&'static str),
        Fail,
        After(Duration, &'static str),
        Never,
    }

    struct FakeService {
        reply: Reply,
        dropped_in_flight: Arc<AtomicBool>,
    }

    impl FakeService {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                dropped_in_flight: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    /// Flags when the chat future is dropped before completing.
    struct InFlight(Arc<AtomicBool>, bool);

    impl Drop for InFlight {
        fn drop(&mut self) {
            if !self.1 {
                self.0.store(true, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl InferenceService for FakeService {
        async fn list_models(&self) -> Result<Vec<String>, LlmError> {
            Ok(vec![])
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            let mut guard = InFlight(self.dropped_in_flight.clone(), false);
            let result = match &self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Fail => Err(LlmError::Api {
                    status: 500,
                    message: "model crashed".to_string(),
                }),
                Reply::After(delay, text) => {
                    tokio::time::sleep(*delay).await;
                    Ok(text.to_string())
                }
                Reply::Never => std::future::pending().await,
            };
            guard.1 = true;
            result
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::conversation("phi", vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn test_success_returns_raw_text() {
        let service = FakeService::new(Reply::Text("{\"matchPercentage\": 10"));
        let raw = invoke(&service, &request(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(raw, "{\"matchPercentage\": 10");
    }

    #[tokio::test]
    async fn test_service_error_is_transport() {
        let service = FakeService::new(Reply::Fail);
        let err = invoke(&service, &request(), Duration::from_secs(60))
            .await
            .unwrap_err();
        match err {
            InvokeError::Transport(message) => assert!(message.contains("model crashed")),
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_and_is_aborted() {
        let service = FakeService::new(Reply::Never);
        let err = invoke(&service, &request(), Duration::from_secs(1200))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Timeout { after } if after.as_secs() == 1200));
        assert!(service.dropped_in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_finishing_before_bound_succeeds() {
        let service = FakeService::new(Reply::After(Duration::from_secs(30), "done"));
        let raw = invoke(&service, &request(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(raw, "done");
        assert!(!service.dropped_in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_timer_never_fires() {
        let token = CancellationToken::new();
        let timer = ArmedTimer::arm(token.clone(), Duration::from_secs(5));
        drop(timer);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_fires() {
        let token = CancellationToken::new();
        let _timer = ArmedTimer::arm(token.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(token.is_cancelled());
    }
}
