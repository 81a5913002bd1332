//! Export of the stage result map.
//!
//! The artifact is the result map keyed by stage key, pretty printed. It is
//! written to a temp file in the destination directory and renamed into place
//! so a failed write never leaves a truncated export behind.
use crate::stage::StageResults;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Default export filename.
pub const DEFAULT_EXPORT_FILE: &str = "extraction-results.json";

/// Render the export document.
pub fn export_json(results: &StageResults) -> Result<String> {
    serde_json::to_string_pretty(results).context("serialize stage results")
}

/// Write the export document to `path` atomically.
pub fn write_export(path: &Path, results: &StageResults) -> Result<()> {
    let text = export_json(results)?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    staged
        .write_all(text.as_bytes())
        .context("write export to temp file")?;
    staged.write_all(b"\n").context("write export to temp file")?;
    staged
        .persist(path)
        .with_context(|| format!("write {}", path.display()))?;
    tracing::info!(path = %path.display(), stages = results.len(), "export written");
    Ok(())
}

/// Load a previous export, e.g. to rebuild prompts for a later stage.
pub fn read_export(path: &Path) -> Result<StageResults> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse export {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageId;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[test]
    fn export_is_keyed_by_stage_in_pipeline_order() {
        let mut results = StageResults::new();
        results.insert(StageId::Meta, json!({"themes": []}));
        results.insert(StageId::Concepts, json!([{"term": "a"}]));
        let text = export_json(&results).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            parsed,
            json!({"concepts": [{"term": "a"}], "meta": {"themes": []}})
        );
        assert!(text.find("concepts").unwrap() < text.find("meta").unwrap());
    }

    #[test]
    fn write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_EXPORT_FILE);
        let mut results = StageResults::new();
        results.insert(StageId::Taxonomy, json!({"categories": [{"name": "x"}]}));
        write_export(&path, &results).unwrap();
        assert_eq!(read_export(&path).unwrap(), results);

        // Overwrite replaces the previous run's export.
        results.clear();
        write_export(&path, &results).unwrap();
        assert!(read_export(&path).unwrap().is_empty());
    }

    #[test]
    fn unknown_stage_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"summary": {}}"#).unwrap();
        assert!(read_export(&path).is_err());
    }
}
