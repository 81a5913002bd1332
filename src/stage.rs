//! Fixed stage catalog, depth levels, and per-stage status.
//!
//! The pipeline always has the same five stages in the same order. Stage
//! identity is an enum so dependency rules are checked by the compiler rather
//! than by string comparison.
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Parsed JSON result per completed stage, ordered by execution order.
pub type StageResults = BTreeMap<StageId, Value>;

/// Identifier of one of the five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Concepts,
    Elaborations,
    Taxonomy,
    Compression,
    Meta,
}

impl StageId {
    /// All stages in execution order.
    pub const ALL: [StageId; 5] = [
        StageId::Concepts,
        StageId::Elaborations,
        StageId::Taxonomy,
        StageId::Compression,
        StageId::Meta,
    ];

    /// Return the stable key used in exports, logs, and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Concepts => "concepts",
            StageId::Elaborations => "elaborations",
            StageId::Taxonomy => "taxonomy",
            StageId::Compression => "compression",
            StageId::Meta => "meta",
        }
    }

    /// 1-based position in the pipeline.
    pub fn number(&self) -> u8 {
        match self {
            StageId::Concepts => 1,
            StageId::Elaborations => 2,
            StageId::Taxonomy => 3,
            StageId::Compression => 4,
            StageId::Meta => 5,
        }
    }

    pub fn definition(&self) -> &'static StageDefinition {
        &STAGES[usize::from(self.number() - 1)]
    }

    /// Stages 2-4 cannot run without a completed stage 1.
    pub fn requires_concepts(&self) -> bool {
        matches!(
            self,
            StageId::Elaborations | StageId::Taxonomy | StageId::Compression
        )
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = anyhow::Error;

    /// Accept either the stage key (`taxonomy`) or its number (`3`).
    fn from_str(raw: &str) -> Result<Self> {
        let needle = raw.trim().to_ascii_lowercase();
        StageId::ALL
            .into_iter()
            .find(|stage| stage.as_str() == needle || stage.number().to_string() == needle)
            .ok_or_else(|| {
                anyhow!(
                    "unknown stage {raw:?} (expected one of: {})",
                    StageId::ALL.map(|stage| stage.as_str()).join(", ")
                )
            })
    }
}

/// Immutable description of a stage, used by the presentation layer.
#[derive(Debug)]
pub struct StageDefinition {
    pub id: StageId,
    pub display_name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub depends_on: &'static [StageId],
}

pub static STAGES: [StageDefinition; 5] = [
    StageDefinition {
        id: StageId::Concepts,
        display_name: "Dual Extraction",
        icon: "◆",
        description: "Extract explicit and implicit concepts from the source text",
        depends_on: &[],
    },
    StageDefinition {
        id: StageId::Elaborations,
        display_name: "Elaboration",
        icon: "◇",
        description: "Elaborate each concept with examples and connections",
        depends_on: &[StageId::Concepts],
    },
    StageDefinition {
        id: StageId::Taxonomy,
        display_name: "Taxonomy",
        icon: "▲",
        description: "Organize the concepts into a hierarchical taxonomy",
        depends_on: &[StageId::Concepts],
    },
    StageDefinition {
        id: StageId::Compression,
        display_name: "Compression / Expansion",
        icon: "●",
        description: "Compress the material into a thesis and glossary, then expand it",
        depends_on: &[StageId::Concepts],
    },
    StageDefinition {
        id: StageId::Meta,
        display_name: "Meta-Analysis",
        icon: "★",
        description: "Analyze whatever the earlier stages produced as a whole",
        depends_on: &[],
    },
];

/// Parse a comma-separated stage selection such as `concepts,3,meta`.
///
/// An empty selection is rejected; duplicates collapse.
pub fn parse_stage_list(raw: &str) -> Result<BTreeSet<StageId>> {
    let mut selected = BTreeSet::new();
    for part in raw.split(',') {
        if part.trim().is_empty() {
            continue;
        }
        selected.insert(part.parse::<StageId>()?);
    }
    if selected.is_empty() {
        return Err(anyhow!("stage selection is empty"));
    }
    Ok(selected)
}

/// Coarse knob selecting the stage-1 target concept count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    Shallow,
    #[default]
    Medium,
    Deep,
}

impl Depth {
    /// Number of concepts requested from the model. Never enforced locally.
    pub fn target_count(&self) -> usize {
        match self {
            Depth::Shallow => 7,
            Depth::Medium => 13,
            Depth::Deep => 23,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Shallow => "shallow",
            Depth::Medium => "medium",
            Depth::Deep => "deep",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage lifecycle: `idle -> running -> complete | error`, or `idle -> skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Idle,
    Running,
    Complete,
    Error,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Idle => "idle",
            StageStatus::Running => "running",
            StageStatus::Complete => "complete",
            StageStatus::Error => "error",
            StageStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Complete | StageStatus::Error | StageStatus::Skipped
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
