//! Structured output extraction from free-form LLM text
//!
//! Models wrap JSON in prose or markdown fences more often than not. The
//! extractor takes a ```json fenced block if there is one, otherwise the span
//! from the first `{` to the last `}`.

use serde::de::DeserializeOwned;

use crate::error::{Result, RoutebookError};

/// Locate the JSON object inside `output`
pub fn json_slice(output: &str) -> Option<&str> {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

/// Deserialize the JSON object embedded in `output`
pub fn extract_json<T: DeserializeOwned>(output: &str) -> Result<T> {
    let json = json_slice(output)
        .ok_or_else(|| RoutebookError::Upstream(format!("LLM output contains no JSON object: {}", preview(output))))?;

    serde_json::from_str(json)
        .map_err(|e| RoutebookError::Upstream(format!("LLM output is not valid JSON ({}): {}", e, preview(json))))
}

fn preview(s: &str) -> String {
    const MAX: usize = 200;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        let cut: String = s.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}
