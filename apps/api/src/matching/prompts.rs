//! Prompt Builder: renders the screening prompt for one resume / job description pair.

use crate::llm_client::prompts::JSON_ONLY_INSTRUCTION;
use crate::llm_client::GenerationOptions;
use crate::models::matching::{MAX_MATCHED_SKILLS, MAX_MISSING_SKILLS, MAX_SUGGESTIONS};

/// Hard cap on generated tokens. The JSON report is short.
const NUM_PREDICT: u32 = 500;
const TOP_P: f32 = 0.8;

/// Instruction block of the match prompt. Only the `{max_*}` and `{json_only}`
/// markers are substituted here; user text is appended afterwards by `format!`
/// and never passes through `.replace`.
const MATCH_INSTRUCTIONS: &str = r#"You are an expert recruiter and must analyze ONLY the overlap between the job description and the candidate's resume.

Only count skills that are *explicitly relevant to the job role*. Do NOT include unrelated programming languages or tools, even if they appear in the resume.

Your job is to:

1. Identify up to {max_matched} matchedSkills from the resume that are *directly useful* for the job description.
2. Identify up to {max_missing} missingSkills from the job description that are *not found* in the resume.
3. Provide 1-{max_suggestions} useful suggestions to improve job fit.
4. Provide a short explanation.
5. Calculate matchPercentage ONLY based on matchedSkills that directly align with job description needs.

Do not include skills that are not useful for this job. Ignore extra text. {json_only}

Use exactly this JSON format:

{
  "matchPercentage": number (0-100),
  "matchedSkills": string[] (max {max_matched}),
  "missingSkills": string[] (max {max_missing}),
  "suggestions": string[] (max {max_suggestions}),
  "explanation": string (brief 1-2 lines)
}"#;

/// Builds the match prompt. Pure and deterministic.
pub fn build_match_prompt(resume_text: &str, job_description: &str) -> String {
    let instructions = MATCH_INSTRUCTIONS
        .replace("{max_matched}", &MAX_MATCHED_SKILLS.to_string())
        .replace("{max_missing}", &MAX_MISSING_SKILLS.to_string())
        .replace("{max_suggestions}", &MAX_SUGGESTIONS.to_string())
        .replace("{json_only}", JSON_ONLY_INSTRUCTION);

    format!(
        "{instructions}\n\nRESUME:\n{}\n\nJOB DESCRIPTION:\n{}",
        resume_text.trim(),
        job_description.trim()
    )
}

/// Deterministic, cheap decoding. `}` as a stop token ends generation as soon as
/// the object closes, though the model may still stop elsewhere.
pub fn match_generation_options() -> GenerationOptions {
    GenerationOptions {
        temperature: 0.0,
        top_p: TOP_P,
        num_predict: NUM_PREDICT,
        stop: vec!["}".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_deterministic() {
        let a = build_match_prompt("Rust engineer", "Needs Rust");
        let b = build_match_prompt("Rust engineer", "Needs Rust");
        assert_eq!(a, b);
    }

    #[test]
    fn test_prompt_contains_inputs_in_order() {
        let prompt = build_match_prompt("RESUME-BODY", "JD-BODY");
        let resume_at = prompt.find("RESUME-BODY").unwrap();
        let jd_at = prompt.find("JD-BODY").unwrap();
        assert!(resume_at < jd_at);
        assert!(prompt.trim_end().ends_with("JD-BODY"));
    }

    #[test]
    fn test_prompt_states_caps_and_schema() {
        let prompt = build_match_prompt("r", "j");
        assert!(prompt.contains("up to 5 matchedSkills"));
        assert!(prompt.contains("up to 5 missingSkills"));
        assert!(prompt.contains("1-3 useful suggestions"));
        for field in [
            "\"matchPercentage\"",
            "\"matchedSkills\"",
            "\"missingSkills\"",
            "\"suggestions\"",
            "\"explanation\"",
        ] {
            assert!(prompt.contains(field), "missing {field}");
        }
        assert!(prompt.contains("Do NOT use markdown code fences"));
    }

    #[test]
    fn test_placeholders_in_user_text_are_not_expanded() {
        let prompt = build_match_prompt("I wrote {max_matched} parsers", "{json_only}");
        assert!(prompt.contains("I wrote {max_matched} parsers"));
        assert!(prompt.trim_end().ends_with("{json_only}"));
    }

    #[test]
    fn test_resume_naming_job_description_marker_is_kept_verbatim() {
        let prompt = build_match_prompt("I built a {job_description} templating engine", "JD-SECRET");
        assert!(prompt.contains("I built a {job_description} templating engine"));
        assert_eq!(prompt.matches("JD-SECRET").count(), 1);
        assert!(prompt.ends_with("JOB DESCRIPTION:\nJD-SECRET"));
    }

    #[test]
    fn test_job_description_naming_resume_marker_is_kept_verbatim() {
        let prompt = build_match_prompt("RESUME-SECRET", "paste {resume_text} here");
        assert_eq!(prompt.matches("RESUME-SECRET").count(), 1);
        assert!(prompt.ends_with("paste {resume_text} here"));
    }

    #[test]
    fn test_generation_options_favor_determinism() {
        let options = match_generation_options();
        assert_eq!(options.temperature, 0.0);
        assert_eq!(options.num_predict, 500);
        assert_eq!(options.stop, vec!["}".to_string()]);
    }
}
