//! CLI argument parsing for the extraction pipeline.
use crate::stage::Depth;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "cpipe",
    version,
    about = "Five-stage concept extraction pipeline over a language model",
    after_help = "Commands:\n  run --text <TEXT> | --input <PATH>   Run the pipeline and export results\n  stages                               List the pipeline stages\n  prompt --stage <STAGE> --text <TEXT> Print the prompt pair for one stage\n  config                               Show or write the configuration\n  log --transcript <DIR>               Summarize a recorded transcript\n\nExamples:\n  cpipe run --input notes.md --depth deep\n  cpipe run --text \"...\" --stages concepts,taxonomy --format json\n  CPIPE_LM_COMMAND=./my-lm.sh cpipe run --input - < notes.md\n  cpipe prompt --stage compression --input notes.md --results extraction-results.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Stages(StagesArgs),
    Prompt(PromptArgs),
    Config(ConfigArgs),
    Log(LogArgs),
}

/// Output format for `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Where the source text comes from; exactly one of the two is required.
#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Source text given inline
    #[arg(long, value_name = "TEXT")]
    pub text: Option<String>,

    /// Read the source text from a file (`-` for stdin)
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,
}

/// Run command inputs.
#[derive(Parser, Debug)]
#[command(about = "Run the extraction pipeline over a source text")]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Target concept count for stage 1 (shallow=7, medium=13, deep=23)
    #[arg(long, value_enum)]
    pub depth: Option<Depth>,

    /// Comma-separated stage keys or numbers to run (default: all)
    #[arg(long, value_name = "LIST")]
    pub stages: Option<String>,

    /// Export path for the result map
    #[arg(long, value_name = "PATH", conflicts_with = "no_export")]
    pub out: Option<PathBuf>,

    /// Do not write the export file
    #[arg(long)]
    pub no_export: bool,

    /// Output format for the run report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Show full result panels instead of one-line summaries
    #[arg(long)]
    pub expand: bool,

    /// Suppress live progress on stderr
    #[arg(long)]
    pub quiet: bool,

    /// Emit info-level logs on stderr
    #[arg(long)]
    pub verbose: bool,

    /// Model name override
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// Maximum output tokens per call
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Messages endpoint override
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Run this command as the model instead of calling the endpoint
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Record prompts, responses and a call log under this directory
    #[arg(long, value_name = "DIR")]
    pub transcript: Option<PathBuf>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "List the pipeline stages")]
pub struct StagesArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

/// Prompt command inputs for inspecting what a stage would send.
#[derive(Parser, Debug)]
#[command(about = "Print the system and user prompts for one stage")]
pub struct PromptArgs {
    /// Stage key or number
    #[arg(long, value_name = "STAGE")]
    pub stage: String,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Target concept count for stage 1
    #[arg(long, value_enum, default_value_t = Depth::Medium)]
    pub depth: Depth,

    /// Previous export to draw upstream results from
    #[arg(long, value_name = "PATH")]
    pub results: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Show the effective configuration or write a default config file")]
pub struct ConfigArgs {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write a default config file
    #[arg(long)]
    pub write: bool,

    /// Overwrite an existing config file with --write
    #[arg(long, requires = "write")]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize the model calls recorded in a transcript directory")]
pub struct LogArgs {
    /// Transcript directory written by `run --transcript`
    #[arg(long, value_name = "DIR")]
    pub transcript: PathBuf,

    /// Emit the entries as JSON
    #[arg(long)]
    pub json: bool,
}
