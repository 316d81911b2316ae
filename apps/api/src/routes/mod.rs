pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::matching::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Matching API
        .route("/api/v1/match", post(handlers::handle_match))
        .route("/api/v1/match-resume", post(handlers::handle_match_upload))
        .route("/api/v1/models/status", get(handlers::handle_model_status))
        .route("/api/v1/chat", post(handlers::handle_chat))
        .route("/api/v1/chat/stream", post(handlers::handle_chat_stream))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm_client::OllamaClient;
    use crate::matching::pipeline::{MatchPipeline, PipelineSettings};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_reports_ok() {
        let config = Config {
            ollama_base_url: "http://127.0.0.1:9".to_string(),
            match_timeout: Duration::from_secs(1200),
            probe_timeout: Duration::from_secs(10),
            max_concurrent_inferences: 1,
            max_upload_bytes: 1024,
            port: 0,
            rust_log: "info".to_string(),
        };
        let client = OllamaClient::new(&config.ollama_base_url).unwrap();
        let pipeline = MatchPipeline::new(
            Arc::new(client),
            PipelineSettings {
                request_timeout: config.match_timeout,
                probe_timeout: config.probe_timeout,
                max_concurrent_inferences: 1,
            },
        );
        let app = build_router(AppState {
            pipeline: Arc::new(pipeline),
            config,
        });

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }
}
