use serde::{Deserialize, Serialize};

/// Caps applied to every `MatchResult`, whichever recovery tier produced it.
pub const MAX_MATCHED_SKILLS: usize = 5;
pub const MAX_MISSING_SKILLS: usize = 5;
pub const MAX_SUGGESTIONS: usize = 3;

/// One screening request: plain text already extracted from the source documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub resume_text: String,
    #[serde(alias = "jobDescriptionText")]
    pub job_description: String,
}

/// The installed model chosen for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    pub size_label: String,
    pub description: String,
}

/// Structured match report returned to callers.
///
/// `raw_response` is only set when the model output could not be parsed and the
/// values were recovered heuristically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub match_percentage: u8,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub suggestions: Vec<String>,
    pub explanation: String,
    pub model_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}
