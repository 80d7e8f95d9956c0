//! Provider error-message classification
//!
//! The warehouse reports load failures as free-form message text, not a
//! stable code. This module is the single place that text is interpreted:
//! substring heuristics map it onto the closed error taxonomy so the rest
//! of the pipeline never string-matches provider wording. The heuristic is
//! fragile by nature (provider wording can change under us), which is
//! exactly why it lives behind one pure function.

use tabload_common::PipelineError;

const QUOTA_INDICATORS: &[&str] = &[
    "quota",
    "rate limit",
    "429",
    "resource exhausted",
    "too many requests",
];

const SCHEMA_INDICATORS: &[&str] = &[
    "schema",
    "field",
    "column",
    "type mismatch",
    "invalid field name",
];

const MEMORY_INDICATORS: &[&str] = &["memory limit", "out of memory"];

/// Map a terminal load-job error message onto the pipeline taxonomy.
pub fn classify_load_failure(message: &str) -> PipelineError {
    let lower = message.to_lowercase();

    if QUOTA_INDICATORS.iter().any(|s| lower.contains(s)) {
        PipelineError::Quota(message.to_string())
    } else if MEMORY_INDICATORS.iter().any(|s| lower.contains(s)) {
        PipelineError::MemoryLimit(message.to_string())
    } else if SCHEMA_INDICATORS.iter().any(|s| lower.contains(s)) {
        PipelineError::InvalidCsv(message.to_string())
    } else {
        PipelineError::load_failed(message)
    }
}
