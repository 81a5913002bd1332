//! Typed per-stage result shapes checked at the model boundary.
//!
//! Only the fields later stages and the log summaries rely on are required;
//! everything else the model returns is accepted and kept in the raw value.
use crate::stage::StageId;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Concept {
    pub term: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Elaboration {
    pub term: String,
    #[serde(default)]
    pub elaboration: Option<String>,
    #[serde(default)]
    pub examples: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Taxonomy {
    #[serde(default)]
    pub root: Option<String>,
    pub categories: Vec<TaxonomyCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyCategory {
    pub name: String,
    #[serde(default)]
    pub concepts: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Compression {
    pub thesis: String,
    #[serde(default)]
    pub glossary: Vec<Value>,
}

/// A stage result viewed through its expected shape.
#[derive(Debug, Clone)]
pub enum StageOutput {
    Concepts(Vec<Concept>),
    Elaborations(Vec<Elaboration>),
    Taxonomy(Taxonomy),
    Compression(Compression),
    Meta(Map<String, Value>),
}

impl StageOutput {
    /// Check `value` against the shape expected for `stage`.
    pub fn parse(stage: StageId, value: &Value) -> Result<Self> {
        let output = match stage {
            StageId::Concepts => StageOutput::Concepts(typed(stage, value)?),
            StageId::Elaborations => StageOutput::Elaborations(typed(stage, value)?),
            StageId::Taxonomy => StageOutput::Taxonomy(typed(stage, value)?),
            StageId::Compression => StageOutput::Compression(typed(stage, value)?),
            StageId::Meta => match value {
                Value::Object(map) => StageOutput::Meta(map.clone()),
                other => {
                    return Err(anyhow!(
                        "meta result must be a JSON object, got {}",
                        json_kind(other)
                    ))
                }
            },
        };
        Ok(output)
    }

    /// One-line summary used in the activity log and collapsed panels.
    pub fn summary(&self) -> String {
        match self {
            StageOutput::Concepts(concepts) => {
                let implicit = concepts
                    .iter()
                    .filter(|concept| concept.kind.as_deref() == Some("implicit"))
                    .count();
                format!(
                    "extracted {} concepts ({} explicit, {} implicit)",
                    concepts.len(),
                    concepts.len() - implicit,
                    implicit
                )
            }
            StageOutput::Elaborations(items) => {
                let examples: usize = items.iter().map(|item| item.examples.len()).sum();
                format!("elaborated {} concepts with {} examples", items.len(), examples)
            }
            StageOutput::Taxonomy(taxonomy) => {
                let placed: usize = taxonomy
                    .categories
                    .iter()
                    .map(|category| category.concepts.len())
                    .sum();
                format!(
                    "built {} categories under {:?} placing {} concepts",
                    taxonomy.categories.len(),
                    taxonomy.root.as_deref().unwrap_or("(unnamed root)"),
                    placed
                )
            }
            StageOutput::Compression(compression) => format!(
                "compressed to a thesis with {} glossary terms",
                compression.glossary.len()
            ),
            StageOutput::Meta(map) => format!("meta-analysis with {} sections", map.len()),
        }
    }
}

fn typed<T: serde::de::DeserializeOwned>(stage: StageId, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|err| {
        anyhow!(
            "{stage} result has unexpected shape ({} given): {err}",
            json_kind(value)
        )
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
