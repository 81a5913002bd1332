//! Fence stripping and JSON extraction for raw model responses.
//!
//! Models are told to answer with bare JSON but often wrap it in markdown
//! fences anyway. Every fence marker is removed, not only a leading and
//! trailing pair, and the remainder must parse as JSON in one attempt.
use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::util::truncate_string;

/// Bytes of response text quoted back in parse errors.
const ERROR_PREVIEW_BYTES: usize = 200;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    // Opening markers may carry a `json` tag; closing markers are bare.
    FENCE.get_or_init(|| Regex::new(r"(?i)```(?:json)?").expect("valid fence regex"))
}

/// Remove all code fence markers and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    fence_regex().replace_all(raw, "").trim().to_string()
}

/// Strip fences from `raw` and parse the remainder as JSON.
///
/// Fails when the cleaned text is empty or not valid JSON; the error carries
/// the parser position and a preview of the cleaned text.
pub fn extract_json(raw: &str) -> Result<Value> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(anyhow!("response contained no JSON (empty after fence stripping)"));
    }
    serde_json::from_str(&cleaned).map_err(|err| {
        anyhow!(
            "parse response as JSON: {err} (line {}, column {}); text starts: {:?}",
            err.line(),
            err.column(),
            truncate_string(&cleaned, ERROR_PREVIEW_BYTES)
        )
    })
}
