//! Axum route handlers for the Matching API.

use std::convert::Infallible;

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::ChatMessage;
use crate::matching::resolver::ModelStatus;
use crate::models::matching::{MatchRequest, MatchResult};
use crate::state::AppState;

const RESUME_FIELD: &str = "resume";
const JOB_DESCRIPTION_FIELD: &str = "jobDescription";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/match
///
/// Screens resume text against a job description.
pub async fn handle_match(
    State(state): State<AppState>,
    Json(request): Json<MatchRequest>,
) -> Result<Json<MatchResult>, AppError> {
    run_match(&state, request).await
}

/// POST /api/v1/match-resume
///
/// Multipart variant: a `resume` part holding the already-extracted resume
/// text and a `jobDescription` text part.
pub async fn handle_match_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MatchResult>, AppError> {
    let mut resume_text: Option<String> = None;
    let mut job_description: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Malformed multipart body", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != RESUME_FIELD && name != JOB_DESCRIPTION_FIELD {
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(&format!("Could not read '{name}'"), e))?;
        let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
            AppError::Validation(format!(
                "'{name}' must be UTF-8 text; extract text from PDF/DOCX files before uploading"
            ))
        })?;

        if name == RESUME_FIELD {
            resume_text = Some(text);
        } else {
            job_description = Some(text);
        }
    }

    let (Some(resume_text), Some(job_description)) = (resume_text, job_description) else {
        return Err(AppError::Validation(
            "Resume file and job description are required".to_string(),
        ));
    };

    run_match(
        &state,
        MatchRequest {
            resume_text,
            job_description,
        },
    )
    .await
}

/// GET /api/v1/models/status
///
/// Reports whether the inference service is up and which model would be used.
pub async fn handle_model_status(State(state): State<AppState>) -> Json<ModelStatus> {
    Json(state.pipeline.model_status().await.to_status())
}

/// POST /api/v1/chat
pub async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, AppError> {
    if body.messages.is_empty() {
        return Err(AppError::Validation("messages cannot be empty".to_string()));
    }

    let response = state.pipeline.chat(body.messages).await?;
    Ok(Json(ChatReply { response }))
}

/// POST /api/v1/chat/stream
///
/// Same body as `/api/v1/chat`, answered as server-sent events carrying
/// `{"content": ...}` per delta. Failures before the first delta use the
/// normal error response; a failure mid-stream becomes a last `{"error": ...}`
/// event.
pub async fn handle_chat_stream(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if body.messages.is_empty() {
        return Err(AppError::Validation("messages cannot be empty".to_string()));
    }

    let deltas = state.pipeline.chat_stream(body.messages).await?;
    let events = deltas.map(|delta| {
        let payload = match delta {
            Ok(content) => json!({ "content": content }),
            Err(e) => {
                warn!("Chat stream ended with error: {e}");
                json!({ "error": e.to_string() })
            }
        };
        Ok(Event::default().data(payload.to_string()))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Body-limit failures surface while streaming parts, so they keep their 413.
fn multipart_error(context: &str, e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("{context}: {e}"))
    } else {
        AppError::Validation(format!("{context}: {e}"))
    }
}

async fn run_match(state: &AppState, request: MatchRequest) -> Result<Json<MatchResult>, AppError> {
    if request.resume_text.trim().is_empty() {
        return Err(AppError::Validation("resumeText cannot be empty".to_string()));
    }
    if request.job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "jobDescription cannot be empty".to_string(),
        ));
    }

    let span = info_span!("match", request_id = %Uuid::new_v4());
    async move {
        info!(
            "Matching resume ({} chars) against job description ({} chars)",
            request.resume_text.chars().count(),
            request.job_description.chars().count()
        );
        let result = state.pipeline.run(&request).await.map_err(AppError::from)?;
        Ok::<_, AppError>(Json(MatchResult::clone(&result)))
    }
    .instrument(span)
    .await
}
