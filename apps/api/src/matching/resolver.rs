//! Model Availability Resolver: picks the fastest installed model from a fixed
//! preference list.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::llm_client::InferenceService;
use crate::models::matching::ModelDescriptor;

/// Model families in order of preference, fastest first.
pub const PREFERRED_MODELS: &[&str] = &["phi", "gemma2:2b", "mistral", "llama2", "gemma2"];

const UNKNOWN_SIZE: &str = "Unknown";

static SIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[0-9]+b").unwrap());

/// Outcome of one availability check.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelAvailability {
    Available {
        model: ModelDescriptor,
        installed: Vec<String>,
    },
    NoSuitableModel {
        installed: Vec<String>,
    },
    ServiceDown {
        reason: String,
    },
}

/// JSON shape of `GET /api/v1/models/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub running: bool,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<ModelDescriptor>,
    pub available_models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelAvailability {
    pub fn no_suitable_model_message() -> String {
        format!(
            "Inference service is running but none of the supported models ({}) are installed. \
            Run 'ollama pull phi' or 'ollama pull mistral' to download a fast model.",
            PREFERRED_MODELS.join(", ")
        )
    }

    pub fn to_status(&self) -> ModelStatus {
        match self {
            ModelAvailability::Available { model, installed } => ModelStatus {
                running: true,
                model_loaded: true,
                selected_model: Some(model.clone()),
                available_models: installed.clone(),
                error: None,
            },
            ModelAvailability::NoSuitableModel { installed } => ModelStatus {
                running: true,
                model_loaded: false,
                selected_model: None,
                available_models: installed.clone(),
                error: Some(Self::no_suitable_model_message()),
            },
            ModelAvailability::ServiceDown { reason } => ModelStatus {
                running: false,
                model_loaded: false,
                selected_model: None,
                available_models: vec![],
                error: Some(reason.clone()),
            },
        }
    }
}

/// Probes the inference service once, bounded by `probe_timeout`. Never retries.
pub async fn resolve_model(
    service: &dyn InferenceService,
    probe_timeout: Duration,
) -> ModelAvailability {
    let installed = match tokio::time::timeout(probe_timeout, service.list_models()).await {
        Ok(Ok(models)) => models,
        Ok(Err(e)) => {
            warn!("Model listing failed: {e}");
            return ModelAvailability::ServiceDown {
                reason: e.to_string(),
            };
        }
        Err(_) => {
            warn!("Model probe timed out after {}s", probe_timeout.as_secs());
            return ModelAvailability::ServiceDown {
                reason: format!(
                    "Connection to the inference service timed out after {}s",
                    probe_timeout.as_secs()
                ),
            };
        }
    };

    match select_preferred(&installed) {
        Some(name) => {
            let model = describe_model(name);
            info!("Selected model {} ({})", model.name, model.size_label);
            ModelAvailability::Available { model, installed }
        }
        None => {
            warn!(
                "No preferred model installed; service reports {:?}",
                installed
            );
            ModelAvailability::NoSuitableModel { installed }
        }
    }
}

/// Walks the preference list, not the installed list: the first preferred
/// family with any installed match wins.
pub fn select_preferred(installed: &[String]) -> Option<&str> {
    PREFERRED_MODELS.iter().find_map(|preferred| {
        installed
            .iter()
            .find(|name| matches_preferred(name, preferred))
            .map(String::as_str)
    })
}

fn matches_preferred(name: &str, preferred: &str) -> bool {
    name == preferred
        || name
            .strip_prefix(preferred)
            .is_some_and(|rest| rest.starts_with(':') || rest.starts_with('-'))
}

pub fn describe_model(name: &str) -> ModelDescriptor {
    ModelDescriptor {
        name: name.to_string(),
        size_label: size_label(name),
        description: model_description(name).to_string(),
    }
}

/// Best-effort parameter-count label, e.g. "gemma2:2b" -> "2B".
fn size_label(name: &str) -> String {
    SIZE_RE
        .find(name)
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_else(|| UNKNOWN_SIZE.to_string())
}

fn model_description(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.contains("phi") {
        "Microsoft's Phi (very fast, efficient model)"
    } else if lower.contains("gemma2") {
        "Google's Gemma 2 (compact, efficient model)"
    } else if lower.contains("mistral") {
        "Mistral AI's model (good balance of speed and quality)"
    } else if lower.contains("llama2") {
        "Meta's Llama 2 (faster than Llama 3)"
    } else if lower.contains("llama3") {
        "Meta's Llama 3 (high quality but slower)"
    } else {
        "AI language model"
    }
}
