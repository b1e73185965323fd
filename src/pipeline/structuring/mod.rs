//! Shared model-facing steps for every LLM backend: sanitise the document,
//! build the prompt, and turn whatever text comes back into a validated
//! [`ExtractionResult`].

pub mod parser;
pub mod prompt;
pub mod sanitize;
pub mod validation;

pub use parser::{locate_json_object, normalize_confidence, parse_extraction_response, ParseError};
pub use prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
pub use sanitize::{sanitize_for_prompt, Sanitized, MAX_PROMPT_INPUT_CHARS};
pub use validation::validate_extraction;

use crate::models::{ExtractType, ExtractionInput, ExtractionResult};

/// A prompt ready to send, plus what the sanitiser did to the document.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub system: &'static str,
    pub user: String,
    pub removed_lines: usize,
    pub truncated: bool,
}

/// Sanitise `input.text` and build the extraction prompt around it.
pub fn prepare_prompt(input: &ExtractionInput, supports_summary: bool) -> PreparedPrompt {
    let sanitized = sanitize_for_prompt(&input.text, &input.source_id);
    let include_summary = supports_summary && input.wants(ExtractType::Summary);
    let user = build_extraction_prompt(input, &sanitized.text, input.reference_date, include_summary);
    PreparedPrompt {
        system: EXTRACTION_SYSTEM_PROMPT,
        user,
        removed_lines: sanitized.removed_lines,
        truncated: sanitized.truncated,
    }
}

/// Parse a model's raw text, keep only what the caller asked for and
/// what can be found in the document.
pub fn interpret_response(raw: &str, input: &ExtractionInput, prompt: &PreparedPrompt) -> ExtractionResult {
    let mut result = parse_extraction_response(raw);
    result.retain_requested(input);
    validate_extraction(&mut result, &input.text, &input.source_id);
    result.clamp_confidences();
    if prompt.truncated {
        result
            .warnings
            .push(format!("Document truncated to {MAX_PROMPT_INPUT_CHARS} characters"));
    }
    if prompt.removed_lines > 0 {
        result.warnings.push(format!(
            "Removed {} instruction-like lines from the document",
            prompt.removed_lines
        ));
    }
    result
}
