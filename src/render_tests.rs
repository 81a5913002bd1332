use super::*;
use crate::client::{CompletionRequest, ModelClient};
use crate::pipeline::{Orchestrator, RunRequest};
use crate::stage::Depth;
use crate::transcript::TranscriptEntryBuilder;
use anyhow::anyhow;
use serde_json::json;
use std::collections::HashMap;

/// Replies with fixed JSON per stage; stages without a reply fail.
struct FixedClient(HashMap<StageId, Value>);

impl ModelClient for FixedClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        self.0
            .get(&request.stage)
            .map(Value::to_string)
            .ok_or_else(|| anyhow!("connection refused"))
    }
}

fn concepts() -> Value {
    json!([
        {"term": "mitochondria", "kind": "explicit", "definition": "organelle"},
        {"term": "ATP", "kind": "implicit"}
    ])
}

fn finished_run(replies: Vec<(StageId, Value)>) -> PipelineRun {
    let client = FixedClient(replies.into_iter().collect());
    Orchestrator::new(&client)
        .run(RunRequest::all_stages("Mitochondria make ATP.", Depth::Shallow))
        .unwrap()
}

#[test]
fn pill_pads_name_to_status_column() {
    let pill = status_pill(StageId::Taxonomy, StageStatus::Complete);
    assert!(pill.starts_with("[▲] Taxonomy ...."), "{pill}");
    assert!(pill.ends_with(" complete"));

    let other = status_pill(StageId::Compression, StageStatus::Complete);
    assert_eq!(pill.chars().count(), other.chars().count());
}

#[test]
fn collapsed_run_shows_pills_summaries_and_failures() {
    let run = finished_run(vec![
        (StageId::Concepts, concepts()),
        (StageId::Meta, json!({"themes": ["energy"]})),
    ]);
    let text = render_run(&run, false);

    assert!(text.starts_with("concept pipeline (finished): depth shallow (target 7 concepts)"));
    assert!(text.contains("[◆] Dual Extraction"));
    assert!(text.contains("extracted 2 concepts (1 explicit, 1 implicit)"));
    assert!(text.contains("  mitochondria, ATP\n"));
    assert!(text.contains("Elaboration failed (transport):\n  connection refused"));
    assert!(text.contains("meta-analysis with 1 sections"));
    assert!(!text.contains("[implicit]"));
    assert!(text.contains("activity:\n  [+"));
    assert!(text.contains("pipeline finished"));
}

#[test]
fn expanded_panels_show_typed_outline() {
    let run = finished_run(vec![
        (StageId::Concepts, concepts()),
        (
            StageId::Taxonomy,
            json!({"root": "Biology", "categories": [{"name": "Organelles", "concepts": ["mitochondria"]}]}),
        ),
        (
            StageId::Compression,
            json!({"thesis": "Cells run on ATP.", "glossary": [{"term": "ATP", "definition": "energy carrier"}]}),
        ),
    ]);
    let text = render_run(&run, true);

    assert!(text.contains("  - mitochondria [explicit]: organelle\n"));
    assert!(text.contains("  - ATP [implicit]\n"));
    assert!(text.contains("  Biology\n    Organelles\n      - mitochondria\n"));
    assert!(text.contains("  thesis: Cells run on ATP.\n"));
    assert!(text.contains("    - ATP: energy carrier\n"));
}

#[test]
fn json_mode_carries_statuses_results_and_log() {
    let run = finished_run(vec![(StageId::Concepts, concepts())]);
    let doc: Value = serde_json::from_str(&render_run_json(&run).unwrap()).unwrap();
    assert_eq!(doc["state"], "finished");
    assert_eq!(doc["statuses"]["concepts"], "complete");
    assert_eq!(doc["statuses"]["taxonomy"], "error");
    assert_eq!(doc["results"]["concepts"], concepts());
    assert_eq!(doc["failures"]["meta"]["kind"], "transport");
    assert!(doc["log"].as_array().is_some_and(|log| !log.is_empty()));
}

#[test]
fn catalog_lists_every_stage_with_dependencies() {
    let text = render_stage_catalog();
    assert!(text.contains("1. ◆ Dual Extraction (concepts)"));
    assert!(text.contains("4. ● Compression / Expansion (compression)"));
    assert!(text.contains("depends on: none"));

    let doc: Value = serde_json::from_str(&render_stage_catalog_json().unwrap()).unwrap();
    assert_eq!(doc[2]["key"], "taxonomy");
    assert_eq!(doc[2]["depends_on"], json!(["concepts"]));
}

#[test]
fn transcript_lines_show_outcome() {
    let entries = vec![
        TranscriptEntryBuilder::new(StageId::Concepts).success("extracted 2 concepts"),
        TranscriptEntryBuilder::new(StageId::Taxonomy).failed("status 500"),
    ];
    let text = render_transcript(&entries);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("stage 1 concepts ok in "));
    assert!(lines[0].ends_with(": extracted 2 concepts"));
    assert!(lines[1].starts_with("stage 3 taxonomy FAILED in "));
    assert_eq!(render_transcript(&[]), "no model calls recorded\n");
}

#[test]
fn progress_printer_writes_running_and_terminal_lines() {
    let mut buffer = Vec::new();
    {
        let mut printer = ProgressPrinter::new(&mut buffer);
        for status in [StageStatus::Running, StageStatus::Complete] {
            printer
                .on_event(&RunEvent::Status {
                    stage: StageId::Concepts,
                    status,
                })
                .unwrap();
        }
        printer
            .on_event(&RunEvent::Status {
                stage: StageId::Taxonomy,
                status: StageStatus::Skipped,
            })
            .unwrap();
    }
    let text = String::from_utf8(buffer).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with(" running"));
    assert!(lines[1].contains(" complete ("));
    assert!(lines[2].ends_with(" skipped"));
}

#[test]
fn elapsed_is_seconds_with_two_decimals() {
    assert_eq!(format_elapsed(0), "0.00s");
    assert_eq!(format_elapsed(1234), "1.23s");
    assert_eq!(format_elapsed(61_000), "61.00s");
}
