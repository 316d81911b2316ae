// Shared prompt fragments. Each feature that needs LLM calls keeps its own
// prompts.rs alongside it; this file holds the cross-cutting pieces.

/// Instruction appended to every structured-output prompt.
/// Small local models still add fences or commentary now and then, so callers
/// must recover from non-compliant output rather than rely on this.
pub const JSON_ONLY_INSTRUCTION: &str = "Respond with a single JSON object and nothing else. \
    Do NOT use markdown code fences. \
    Do NOT add explanations, greetings or notes before or after the JSON.";
