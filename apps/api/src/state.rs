use std::sync::Arc;

use crate::config::Config;
use crate::matching::pipeline::MatchPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the result cache, so it must be shared rather than rebuilt per request.
    pub pipeline: Arc<MatchPipeline>,
    pub config: Config,
}
