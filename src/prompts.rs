//! Prompt assembly for the five pipeline stages.
//!
//! Templates are compiled in from `prompts/*.md` and filled in a single pass,
//! so placeholder-looking text inside the source or inside upstream results is
//! never expanded a second time. Building a prompt cannot fail: missing
//! upstream results are serialized as `null`.
use crate::stage::{Depth, StageId, StageResults};
use crate::templates;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// System and user instructions for one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

impl PromptPair {
    /// Both prompts as one readable document.
    pub fn to_document(&self) -> String {
        format!("# System\n\n{}\n\n# User\n\n{}\n", self.system, self.user)
    }
}

/// Everything a stage prompt may draw on.
pub struct PromptInputs<'a> {
    pub source: &'a str,
    pub depth: Depth,
    /// Results of stages that completed before the one being built.
    pub results: &'a StageResults,
}

/// Upstream stages that feed the meta-analysis aggregate, in order.
const AGGREGATE_STAGES: [StageId; 4] = [
    StageId::Concepts,
    StageId::Elaborations,
    StageId::Taxonomy,
    StageId::Compression,
];

/// Build the prompt pair for `stage`.
pub fn build_prompt(stage: StageId, inputs: &PromptInputs<'_>) -> PromptPair {
    let (stage_system, user_template) = match stage {
        StageId::Concepts => (templates::CONCEPTS_SYSTEM_MD, templates::CONCEPTS_USER_MD),
        StageId::Elaborations => (
            templates::ELABORATIONS_SYSTEM_MD,
            templates::ELABORATIONS_USER_MD,
        ),
        StageId::Taxonomy => (templates::TAXONOMY_SYSTEM_MD, templates::TAXONOMY_USER_MD),
        StageId::Compression => (
            templates::COMPRESSION_SYSTEM_MD,
            templates::COMPRESSION_USER_MD,
        ),
        StageId::Meta => (templates::META_SYSTEM_MD, templates::META_USER_MD),
    };

    let source = inputs.source.trim();
    let target_count = inputs.depth.target_count().to_string();
    let concepts = upstream_json(inputs.results, StageId::Concepts);
    let taxonomy = upstream_json(inputs.results, StageId::Taxonomy);
    let taxonomy_note = if inputs.results.contains_key(&StageId::Taxonomy) {
        "The taxonomy produced for these concepts:"
    } else {
        "No taxonomy is available for this run; work from the concepts alone."
    };
    let (completed, aggregate) = meta_aggregate(inputs.results);

    let user = fill_template(user_template, |key| match key {
        "source" => Some(source),
        "depth" => Some(inputs.depth.as_str()),
        "target_count" => Some(target_count.as_str()),
        "concepts" => Some(concepts.as_str()),
        "taxonomy" => Some(taxonomy.as_str()),
        "taxonomy_note" => Some(taxonomy_note),
        "completed" => Some(completed.as_str()),
        "aggregate" => Some(aggregate.as_str()),
        _ => None,
    });

    PromptPair {
        system: format!("{}\n{}", templates::SYSTEM_BASE_MD.trim_end(), stage_system),
        user,
    }
}

/// Pretty JSON for an upstream result, or `null` when it is absent.
fn upstream_json(results: &StageResults, stage: StageId) -> String {
    match results.get(&stage) {
        Some(value) => format!("{value:#}"),
        None => "null".to_string(),
    }
}

/// Aggregate whichever of stages 1-4 completed into one object for stage 5.
fn meta_aggregate(results: &StageResults) -> (String, String) {
    let mut aggregate = Map::new();
    let mut names = Vec::new();
    for stage in AGGREGATE_STAGES {
        if let Some(value) = results.get(&stage) {
            aggregate.insert(stage.as_str().to_string(), value.clone());
            names.push(stage.as_str());
        }
    }
    let completed = if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    };
    (completed, format!("{:#}", Value::Object(aggregate)))
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"))
}

/// Replace `{name}` placeholders in one pass; unknown names are left intact.
fn fill_template<'v>(template: &str, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| match lookup(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs<'a>(source: &'a str, results: &'a StageResults) -> PromptInputs<'a> {
        PromptInputs {
            source,
            depth: Depth::Shallow,
            results,
        }
    }

    fn full_results() -> StageResults {
        let mut results = StageResults::new();
        results.insert(
            StageId::Concepts,
            json!([{"term": "mitochondria", "kind": "explicit"}]),
        );
        results.insert(
            StageId::Elaborations,
            json!([{"term": "mitochondria", "elaboration": "organelle"}]),
        );
        results.insert(
            StageId::Taxonomy,
            json!({"root": "biology", "categories": [{"name": "organelles"}]}),
        );
        results.insert(StageId::Compression, json!({"thesis": "cells need power"}));
        results
    }

    #[test]
    fn every_stage_builds_non_empty_prompts() {
        let results = full_results();
        for stage in StageId::ALL {
            let pair = build_prompt(stage, &inputs("The cell.", &results));
            assert!(!pair.system.trim().is_empty(), "{stage} system");
            assert!(!pair.user.trim().is_empty(), "{stage} user");
            assert!(pair.user.contains("The cell."), "{stage} source");
            assert!(pair.system.contains("JSON only"), "{stage} base rules");
        }
    }

    #[test]
    fn concepts_prompt_carries_depth_target() {
        let results = StageResults::new();
        let pair = build_prompt(StageId::Concepts, &inputs("text", &results));
        assert!(pair.user.contains("exactly 7 concepts"));
        assert!(pair.user.contains("depth: shallow"));
    }

    #[test]
    fn dependent_prompts_embed_upstream_json() {
        let results = full_results();
        let concepts = format!("{:#}", results[&StageId::Concepts]);
        let taxonomy = format!("{:#}", results[&StageId::Taxonomy]);
        for stage in [StageId::Elaborations, StageId::Taxonomy, StageId::Compression] {
            let pair = build_prompt(stage, &inputs("text", &results));
            assert!(pair.user.contains(&concepts), "{stage}");
        }
        let compression = build_prompt(StageId::Compression, &inputs("text", &results));
        assert!(compression.user.contains(&taxonomy));
    }

    #[test]
    fn compression_tolerates_missing_taxonomy() {
        let mut results = full_results();
        results.remove(&StageId::Taxonomy);
        let pair = build_prompt(StageId::Compression, &inputs("text", &results));
        assert!(pair.user.contains("No taxonomy is available"));
        assert!(pair.user.contains("null"));
        assert!(!pair.user.contains("{taxonomy}"));
    }

    #[test]
    fn meta_aggregates_only_completed_stages() {
        let mut results = full_results();
        results.remove(&StageId::Elaborations);
        let pair = build_prompt(StageId::Meta, &inputs("text", &results));
        assert!(pair.user.contains("Completed stages: concepts, taxonomy, compression"));
        assert!(pair.user.contains("\"thesis\": \"cells need power\""));
        assert!(!pair.user.contains("\"elaborations\""));

        let (_, aggregate) = meta_aggregate(&results);
        assert!(pair.user.contains(&aggregate));
        let doc: Value = serde_json::from_str(&aggregate).unwrap();
        let keys: Vec<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 3);
        for stage in [StageId::Concepts, StageId::Taxonomy, StageId::Compression] {
            assert_eq!(doc[stage.as_str()], results[&stage], "{stage}");
        }

        let empty = StageResults::new();
        let pair = build_prompt(StageId::Meta, &inputs("text", &empty));
        assert!(pair.user.contains("Completed stages: none"));
        assert!(pair.user.contains("{}"));
    }

    #[test]
    fn placeholders_inside_source_are_not_expanded() {
        let results = full_results();
        let pair = build_prompt(StageId::Elaborations, &inputs("see {concepts}", &results));
        assert!(pair.user.contains("see {concepts}"));
    }
}
