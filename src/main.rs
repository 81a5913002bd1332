//! `cpipe`: run a source text through five model-driven extraction stages.
//!
//! Concepts are extracted first; elaboration, taxonomy and compression build
//! on them, and a meta-analysis reads whatever completed. Results are
//! rendered to the terminal and exported as one JSON map.
mod cli;
mod client;
mod config;
mod export;
mod extract;
mod pipeline;
mod prompts;
mod render;
mod shapes;
mod stage;
mod templates;
mod transcript;
mod util;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Command, OutputFormat, RootArgs, SourceArgs};
use crate::client::{CommandModelClient, HttpModelClient, ModelClient, ModelSettings};
use crate::config::PipelineConfig;
use crate::pipeline::{check_source, Orchestrator, RunRequest};
use crate::prompts::{build_prompt, PromptInputs};
use crate::render::ProgressPrinter;
use crate::stage::{parse_stage_list, StageId, StageResults};
use crate::transcript::Transcript;

/// Exit status when the run finished but a stage or the run itself failed.
const EXIT_STAGE_ERRORS: i32 = 2;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    let verbose = matches!(&args.command, Command::Run(run) if run.verbose);
    init_tracing(verbose);

    match args.command {
        Command::Run(args) => {
            let code = run_command(&args)?;
            if code != 0 {
                io::stdout().flush().context("flush stdout")?;
                std::process::exit(code);
            }
            Ok(())
        }
        Command::Stages(args) => {
            if args.json {
                println!("{}", render::render_stage_catalog_json()?);
            } else {
                print!("{}", render::render_stage_catalog());
            }
            Ok(())
        }
        Command::Prompt(args) => prompt_command(&args),
        Command::Config(args) => config_command(&args),
        Command::Log(args) => log_command(&args),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "cpipe=info" } else { "cpipe=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run_command(args: &cli::RunArgs) -> Result<i32> {
    let source = read_source(&args.source)?;
    check_source(&source)?;

    let (_, config) = config::resolve_config(args.config.as_deref())?;
    let mut request = RunRequest::all_stages(source, args.depth.unwrap_or(config.default_depth));
    if let Some(list) = args.stages.as_deref() {
        request.selected = parse_stage_list(list)?;
    }

    let client = build_client(args, &config)?;
    let transcript = args.transcript.clone().map(Transcript::new);
    let mut progress = ProgressPrinter::new(io::stderr());

    let mut orchestrator = Orchestrator::new(client.as_ref());
    if let Some(transcript) = transcript.as_ref() {
        orchestrator = orchestrator.with_transcript(transcript);
    }
    if !args.quiet {
        orchestrator = orchestrator.with_observer(&mut progress);
    }
    let run = orchestrator.run(request)?;

    match args.format {
        OutputFormat::Text => print!("{}", render::render_run(&run, args.expand)),
        OutputFormat::Json => println!("{}", render::render_run_json(&run)?),
    }

    if !args.no_export {
        let path = args
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.export_file));
        export::write_export(&path, run.results())?;
        if !args.quiet {
            eprintln!("wrote {}", path.display());
        }
    }

    if run.has_errors() {
        return Ok(EXIT_STAGE_ERRORS);
    }
    Ok(0)
}

/// Pick the command backend when one is configured, else the HTTP endpoint.
fn build_client(args: &cli::RunArgs, config: &PipelineConfig) -> Result<Box<dyn ModelClient>> {
    let settings = ModelSettings {
        model: args.model.clone().unwrap_or_else(|| config.model.clone()),
        max_tokens: args.max_tokens.unwrap_or(config.max_tokens),
    };
    if settings.max_tokens == 0 {
        return Err(anyhow!("--max-tokens must be positive"));
    }

    if let Some(command) = config::resolve_lm_command(args.lm.as_deref(), config) {
        tracing::info!(command = %command, "using LM command backend");
        return Ok(Box::new(CommandModelClient::new(command, settings)?));
    }

    let api_key = config::resolve_api_key(config).ok_or_else(|| {
        anyhow!(
            "no API key: set {} or {}, or configure an LM command with --lm",
            config::API_KEY_ENV_VAR,
            config.api_key_env
        )
    })?;
    let endpoint = args
        .endpoint
        .clone()
        .unwrap_or_else(|| config.endpoint.clone());
    tracing::info!(endpoint = %endpoint, model = %settings.model, "using HTTP backend");
    Ok(Box::new(HttpModelClient::new(
        endpoint,
        api_key,
        config.anthropic_version.clone(),
        settings,
    )?))
}

fn read_source(args: &SourceArgs) -> Result<String> {
    if let Some(text) = args.text.as_ref() {
        return Ok(text.clone());
    }
    match args.input.as_ref() {
        Some(path) if path.as_os_str() == "-" => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("read source text from stdin")?;
            Ok(text)
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read source text {}", path.display())),
        None => Err(anyhow!("provide --text or --input")),
    }
}

fn prompt_command(args: &cli::PromptArgs) -> Result<()> {
    let stage: StageId = args.stage.parse()?;
    let source = read_source(&args.source)?;
    let results = match args.results.as_ref() {
        Some(path) => export::read_export(path)?,
        None => StageResults::new(),
    };
    let prompt = build_prompt(
        stage,
        &PromptInputs {
            source: &source,
            depth: args.depth,
            results: &results,
        },
    );
    print!("{}", prompt.to_document());
    Ok(())
}

fn config_command(args: &cli::ConfigArgs) -> Result<()> {
    if args.write {
        let path = config::config_path(args.config.as_deref())
            .ok_or_else(|| anyhow!("no config directory available; pass --config"))?;
        if path.exists() && !args.force {
            return Err(anyhow!(
                "config already exists at {} (use --force to overwrite)",
                path.display()
            ));
        }
        config::write_config(&path, &PipelineConfig::default())?;
        eprintln!("wrote {}", path.display());
        return Ok(());
    }

    let (path, config) = config::resolve_config(args.config.as_deref())?;
    let api_key = config::resolve_api_key(&config).map(|key| util::redact_secret(&key));
    let lm_command = config::resolve_lm_command(None, &config);
    let report = serde_json::json!({
        "path": path.as_ref().map(|p| p.display().to_string()),
        "exists": path.as_ref().is_some_and(|p| p.is_file()),
        "config": config,
        "api_key": api_key,
        "lm_command": lm_command,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize config report")?
    );
    Ok(())
}

fn log_command(args: &cli::LogArgs) -> Result<()> {
    let transcript = Transcript::new(args.transcript.clone());
    let entries = transcript::load_entries(&transcript.log_path())?;
    if args.json {
        let text = serde_json::to_string_pretty(&entries).context("serialize transcript")?;
        println!("{text}");
    } else {
        print!("{}", render::render_transcript(&entries));
    }
    Ok(())
}
