//! Response Recoverer — turns raw model output into a `MatchResult`, never failing.
//!
//! Small local models regularly break strict JSON: the `}` stop token strips the
//! closing brace, the token cap truncates mid-array, and prose or markdown
//! fences surround the object. Recovery degrades through two tiers:
//!
//! 1. Structural: scan from the first `{` with a string-aware depth counter,
//!    cut at the point the top-level object closes (dropping trailing prose),
//!    or close whatever is still open if the text ends first. Parse the slice
//!    and read each field leniently.
//! 2. Heuristic: if no `{` exists or the slice still does not parse, pull a
//!    percentage out of the prose and fill the lists with sentinel values so
//!    callers can tell "nothing found" apart from "could not parse".

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::matching::{
    MatchResult, MAX_MATCHED_SKILLS, MAX_MISSING_SKILLS, MAX_SUGGESTIONS,
};

/// Longest prefix of unparseable output kept for diagnostics (in chars).
pub const RAW_RESPONSE_PREFIX_CHARS: usize = 500;

/// Neutral midpoint used when no percentage can be found anywhere.
pub const FALLBACK_PERCENTAGE: u8 = 50;

pub const DEFAULT_EXPLANATION: &str = "Analysis complete.";
pub const UNPARSEABLE_EXPLANATION: &str = "Response was incomplete or not fully parseable.";
pub const SKILLS_SENTINEL: &str = "Could not extract data";
pub const SUGGESTIONS_SENTINEL: &str = "Try submitting simpler resume/job inputs";

static PERCENT_SIGN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%").unwrap());
static PERCENTAGE_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)percentage[:\s]+(\d+)").unwrap());
static LEADING_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(\.\d+)?").unwrap());

const PERCENTAGE_KEYS: &[&str] = &["matchPercentage", "match_percentage", "percentage"];
const MATCHED_KEYS: &[&str] = &["matchedSkills", "matched_skills"];
const MISSING_KEYS: &[&str] = &["missingSkills", "missing_skills"];
const SUGGESTION_KEYS: &[&str] = &["suggestions"];
const EXPLANATION_KEYS: &[&str] = &["explanation"];

/// Which tier produced a result. Logged by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTier {
    Structural,
    Heuristic,
}

/// Recovers a `MatchResult` from raw model output. Infallible.
pub fn recover(raw: &str, model_used: &str) -> (MatchResult, RecoveryTier) {
    match recover_structured(raw) {
        Some(fields) => (fields.into_result(model_used), RecoveryTier::Structural),
        None => {
            warn!(
                "Structural recovery failed for {} chars of model output; using heuristics",
                raw.chars().count()
            );
            (recover_heuristic(raw, model_used), RecoveryTier::Heuristic)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 1: structural
// ────────────────────────────────────────────────────────────────────────────

/// Fields read from a parsed object, before `model_used` is attached.
#[derive(Debug)]
struct RecoveredFields {
    match_percentage: u8,
    matched_skills: Vec<String>,
    missing_skills: Vec<String>,
    suggestions: Vec<String>,
    explanation: String,
}

impl RecoveredFields {
    fn into_result(self, model_used: &str) -> MatchResult {
        MatchResult {
            match_percentage: self.match_percentage,
            matched_skills: self.matched_skills,
            missing_skills: self.missing_skills,
            suggestions: self.suggestions,
            explanation: self.explanation,
            model_used: model_used.to_string(),
            raw_response: None,
        }
    }
}

fn recover_structured(raw: &str) -> Option<RecoveredFields> {
    let candidate = extract_object(raw)?;
    debug!("Structural candidate: {candidate}");

    let object = match serde_json::from_str::<Map<String, Value>>(&candidate) {
        Ok(object) => object,
        Err(e) => {
            debug!("Candidate did not parse: {e}");
            return None;
        }
    };

    Some(RecoveredFields {
        match_percentage: lookup(&object, PERCENTAGE_KEYS)
            .and_then(percentage_from_value)
            .unwrap_or(0),
        matched_skills: string_list(lookup(&object, MATCHED_KEYS), MAX_MATCHED_SKILLS),
        missing_skills: string_list(lookup(&object, MISSING_KEYS), MAX_MISSING_SKILLS),
        suggestions: string_list(lookup(&object, SUGGESTION_KEYS), MAX_SUGGESTIONS),
        explanation: lookup(&object, EXPLANATION_KEYS)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string()),
    })
}

/// An open container seen by the scanner.
#[derive(Debug, Clone, Copy)]
enum Frame {
    /// `key_cut` is set while the object is between members: from just after
    /// `{` or at the `,` until the key's `:` arrives. Cutting there drops a
    /// partial key.
    Object { key_cut: Option<usize> },
    Array,
}

impl Frame {
    fn closer(self) -> char {
        match self {
            Frame::Object { .. } => '}',
            Frame::Array => ']',
        }
    }
}

/// Slices the first top-level JSON object out of `raw`.
///
/// Braces and brackets inside string literals are ignored. If the object
/// closes, everything after it is dropped. If the text ends first, a partial
/// key is cut back to the preceding `,` or `{`, otherwise an open string is
/// terminated, and then every open container is closed innermost-first.
/// Returns `None` only when `raw` contains no `{` at all.
pub fn extract_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let body = &raw[start..];

    let mut frames: Vec<Frame> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => frames.push(Frame::Object {
                key_cut: Some(i + 1),
            }),
            '[' => frames.push(Frame::Array),
            ':' => {
                if let Some(Frame::Object { key_cut }) = frames.last_mut() {
                    *key_cut = None;
                }
            }
            ',' => {
                if let Some(Frame::Object { key_cut }) = frames.last_mut() {
                    *key_cut = Some(i);
                }
            }
            '}' | ']' => {
                // A mismatched closer is left for the parser to reject.
                if frames.last().map(|f| f.closer()) == Some(c) {
                    frames.pop();
                }
                if frames.is_empty() {
                    return Some(body[..i + c.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }

    Some(close_truncated(body, in_string, escaped, &frames))
}

fn close_truncated(body: &str, in_string: bool, escaped: bool, frames: &[Frame]) -> String {
    let mut repaired = body.to_string();

    if let Some(Frame::Object {
        key_cut: Some(cut),
    }) = frames.last()
    {
        repaired.truncate(*cut);
        let trimmed_len = repaired.trim_end().len();
        repaired.truncate(trimmed_len);
    } else if in_string {
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    } else {
        let trimmed_len = repaired.trim_end().len();
        repaired.truncate(trimmed_len);
        if repaired.ends_with(',') {
            repaired.pop();
        } else if repaired.ends_with(':') {
            repaired.push_str(" null");
        }
    }

    repaired.extend(frames.iter().rev().map(|f| f.closer()));
    repaired
}

fn lookup<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key))
}

/// Accepts `80`, `80.4`, `"80"` and `"80%"`. Clamped to 0–100.
fn percentage_from_value(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => LEADING_NUMBER_RE.find(s)?.as_str().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(clamp_percentage(number))
}

fn clamp_percentage(number: f64) -> u8 {
    if number.is_nan() {
        return 0;
    }
    number.round().clamp(0.0, 100.0) as u8
}

/// Reads a list field. A bare string becomes a one-item list, non-string items
/// are stringified, and the list is capped at `max`.
fn string_list(value: Option<&Value>, max: usize) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .take(max)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 2: heuristic
// ────────────────────────────────────────────────────────────────────────────

fn recover_heuristic(raw: &str, model_used: &str) -> MatchResult {
    MatchResult {
        match_percentage: heuristic_percentage(raw).unwrap_or(FALLBACK_PERCENTAGE),
        matched_skills: vec![SKILLS_SENTINEL.to_string()],
        missing_skills: vec![SKILLS_SENTINEL.to_string()],
        suggestions: vec![SUGGESTIONS_SENTINEL.to_string()],
        explanation: UNPARSEABLE_EXPLANATION.to_string(),
        model_used: model_used.to_string(),
        raw_response: Some(raw.chars().take(RAW_RESPONSE_PREFIX_CHARS).collect()),
    }
}

/// First `NN%`, otherwise `percentage: NN`.
fn heuristic_percentage(raw: &str) -> Option<u8> {
    [&*PERCENT_SIGN_RE, &*PERCENTAGE_WORD_RE]
        .iter()
        .find_map(|re| {
            re.captures(raw)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
        })
        .map(|n| n.min(100) as u8)
}
