//! Command-line entry: batch extraction and diagnosis over JSONL.
//!
//! `extract` turns raw console logs into sectioned crash-report
//! candidates; `diagnose` classifies finished candidates. Per-record
//! problems are logged and counted, never fatal; only setup errors
//! (unreadable input, missing oracle credentials) abort the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::warn;

use syzslice::config::{self, FileConfig, OracleConfig};
use syzslice::diagnose::{self, render, DiagnosisRecord};
use syzslice::jsonl;
use syzslice::oracle::{ChatOracle, Oracle};
use syzslice::pipeline::{
    run_batch, ExtractOptions, PolicyConfig, ProcessMode, SectionMap, SpanMode,
};
use syzslice::registry::SectionName;

#[derive(Parser)]
#[command(name = config::APP_NAME)]
#[command(version = config::APP_VERSION)]
#[command(about = "Extract and diagnose kernel-sanitizer crash reports from raw logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract sectioned candidates from raw logs
    Extract(ExtractArgs),
    /// Diagnose previously extracted candidates
    Diagnose(DiagnoseArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Input JSONL, one {"id", "log"} object per line
    #[arg(long)]
    logs: PathBuf,

    /// Output directory for artifacts
    #[arg(long)]
    out: PathBuf,

    /// Window placement over the raw log
    #[arg(long, value_enum, default_value_t = SpanArg::Windowed)]
    span: SpanArg,

    /// Extraction engine
    #[arg(long, value_enum, default_value_t = ModeArg::Oracle)]
    mode: ModeArg,

    /// Keep diagnostic sections (registers, page dumps, ...) in the result
    #[arg(long)]
    include_diag: bool,

    /// Decision-trace artifact: none, one JSONL, or per-record Markdown
    #[arg(long, value_enum, default_value_t = ExplainArg::Off)]
    explain: ExplainArg,

    /// Override the Call Trace line cap
    #[arg(long)]
    call_trace_max: Option<usize>,

    /// Override the "Allocated by task" line cap
    #[arg(long)]
    alloc_max: Option<usize>,

    /// Override the "Freed by task" line cap
    #[arg(long)]
    freed_max: Option<usize>,

    /// Override the buggy-address line cap
    #[arg(long)]
    buggy_max: Option<usize>,

    /// Override the memory-state line cap
    #[arg(long)]
    mem_state_max: Option<usize>,

    /// Override the combined diagnostic-section budget
    #[arg(long)]
    diag_total_max: Option<usize>,

    /// Keep lines carrying unresolved-symbol question marks
    #[arg(long)]
    keep_question_lines: bool,

    #[command(flatten)]
    oracle: OracleArgs,

    /// Optional JSON config file (default: ./syzslice.json when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct DiagnoseArgs {
    /// candidates.jsonl produced by `extract`
    #[arg(long)]
    candidates: PathBuf,

    /// Output directory for artifacts
    #[arg(long)]
    out: PathBuf,

    /// Diagnosis engine
    #[arg(long, value_enum, default_value_t = DiagnoseModeArg::Rules)]
    mode: DiagnoseModeArg,

    /// Artifact format: one JSONL, or per-record Markdown
    #[arg(long, value_enum, default_value_t = FormatArg::Json)]
    format: FormatArg,

    #[command(flatten)]
    oracle: OracleArgs,

    /// Optional JSON config file (default: ./syzslice.json when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Oracle endpoint flags, overriding the config file.
#[derive(Args)]
struct OracleArgs {
    /// Oracle endpoint URL
    #[arg(long, env = "SYZSLICE_API_URL")]
    api_url: Option<String>,

    /// Oracle API key
    #[arg(long, env = "SYZSLICE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Oracle model name
    #[arg(long, env = "SYZSLICE_MODEL")]
    model: Option<String>,
}

#[derive(Copy, Clone, ValueEnum)]
enum SpanArg {
    Full,
    Windowed,
}

#[derive(Copy, Clone, ValueEnum)]
enum ModeArg {
    Oracle,
    Rules,
}

#[derive(Copy, Clone, ValueEnum)]
enum ExplainArg {
    Off,
    Json,
    Sidecar,
}

#[derive(Copy, Clone, ValueEnum)]
enum DiagnoseModeArg {
    Rules,
    Cot,
}

#[derive(Copy, Clone, ValueEnum)]
enum FormatArg {
    Json,
    Md,
}

fn main() -> Result<()> {
    syzslice::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Extract(args) => cmd_extract(args),
        Commands::Diagnose(args) => cmd_diagnose(args),
    }
}

/// One line of `fallback_hits.jsonl`: the candidate plus why the rule
/// extractor ran.
#[derive(Serialize)]
struct FallbackHit<'a> {
    id: &'a str,
    sections: &'a SectionMap,
    fallback_used: bool,
    reason: &'a str,
}

fn cmd_extract(args: ExtractArgs) -> Result<()> {
    let file_cfg = config::load_file_config(args.config.as_deref())?;

    let mut opts = ExtractOptions::default();
    file_cfg.apply_to(&mut opts);
    opts.span = match args.span {
        SpanArg::Full => SpanMode::Full,
        SpanArg::Windowed => SpanMode::Windowed,
    };
    opts.mode = match args.mode {
        ModeArg::Oracle => ProcessMode::Oracle,
        ModeArg::Rules => ProcessMode::Rules,
    };

    let mut policy = PolicyConfig {
        include_diag: args.include_diag,
        drop_question_marked: !args.keep_question_lines,
        ..PolicyConfig::default()
    };
    if let Some(v) = args.call_trace_max {
        policy.section_caps.insert(SectionName::CallTrace, v);
    }
    if let Some(v) = args.alloc_max {
        policy.section_caps.insert(SectionName::AllocatedBy, v);
    }
    if let Some(v) = args.freed_max {
        policy.section_caps.insert(SectionName::FreedBy, v);
    }
    if let Some(v) = args.buggy_max {
        policy.section_caps.insert(SectionName::BuggyAddress, v);
    }
    if let Some(v) = args.mem_state_max {
        policy.section_caps.insert(SectionName::MemoryState, v);
    }
    if let Some(v) = args.diag_total_max {
        policy.diag_total_max = v;
    }

    // Fail fast on missing credentials before any input is read.
    let oracle: Option<Arc<dyn Oracle>> = match opts.mode {
        ProcessMode::Oracle => Some(Arc::new(build_chat_oracle(&file_cfg, args.oracle)?)),
        ProcessMode::Rules => None,
    };

    let (records, problems) = jsonl::read_log_records(&args.logs)
        .with_context(|| format!("reading {}", args.logs.display()))?;
    for problem in &problems {
        warn!(error = %problem, "input record rejected");
    }

    let (outcomes, summary) = run_batch(&records, &opts, &policy, oracle.as_deref());

    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;

    let candidates: Vec<_> = outcomes.iter().map(|o| &o.candidate).collect();
    jsonl::write_jsonl(&args.out.join("candidates.jsonl"), &candidates)?;

    let hits: Vec<FallbackHit> = outcomes
        .iter()
        .filter(|o| o.candidate.fallback_used)
        .map(|o| FallbackHit {
            id: &o.candidate.id,
            sections: &o.candidate.sections,
            fallback_used: true,
            reason: o.fallback_reason.as_deref().unwrap_or("unknown"),
        })
        .collect();
    if !hits.is_empty() {
        jsonl::write_jsonl(&args.out.join("fallback_hits.jsonl"), &hits)?;
    }

    match args.explain {
        ExplainArg::Off => {}
        ExplainArg::Json => {
            let traces: Vec<_> = outcomes.iter().map(|o| &o.trace).collect();
            jsonl::write_jsonl(&args.out.join("explain.jsonl"), &traces)?;
        }
        ExplainArg::Sidecar => {
            let dir = args.out.join("explain");
            fs::create_dir_all(&dir)?;
            for outcome in &outcomes {
                let path = dir.join(format!("{}.md", outcome.trace.id));
                fs::write(&path, outcome.trace.render_markdown())
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_diagnose(args: DiagnoseArgs) -> Result<()> {
    let file_cfg = config::load_file_config(args.config.as_deref())?;

    let (candidates, problems) = jsonl::read_candidates(&args.candidates)
        .with_context(|| format!("reading {}", args.candidates.display()))?;
    for problem in &problems {
        warn!(error = %problem, "candidate rejected");
    }

    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;

    let mut records: Vec<DiagnosisRecord> = Vec::new();
    let mut done = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    match args.mode {
        DiagnoseModeArg::Rules => {
            for candidate in &candidates {
                let report = candidate.to_report_text();
                if report.trim().is_empty() {
                    skipped += 1;
                    continue;
                }
                let facts = diagnose::parse_crash_facts(&report);
                match args.format {
                    FormatArg::Json => records.push(DiagnosisRecord::rules(&candidate.id, facts)),
                    FormatArg::Md => {
                        let body = render::render_rules_markdown(&facts);
                        write_diagnosis_md(&args.out, &candidate.id, &body)?;
                    }
                }
                done += 1;
            }
        }
        DiagnoseModeArg::Cot => {
            let oracle = build_chat_oracle(&file_cfg, args.oracle)?;
            for candidate in &candidates {
                let report = candidate.to_report_text();
                if report.trim().is_empty() {
                    skipped += 1;
                    continue;
                }
                match diagnose::diagnose_cot(&report, &oracle) {
                    Ok(narrative) => {
                        match args.format {
                            FormatArg::Json => {
                                records.push(DiagnosisRecord::cot(&candidate.id, narrative));
                            }
                            FormatArg::Md => {
                                write_diagnosis_md(&args.out, &candidate.id, &narrative)?;
                            }
                        }
                        done += 1;
                    }
                    Err(err) => {
                        warn!(id = %candidate.id, error = %err, "diagnosis failed");
                        failed += 1;
                    }
                }
            }
        }
    }

    if matches!(args.format, FormatArg::Json) {
        jsonl::write_jsonl(&args.out.join("diagnose.jsonl"), &records)?;
    }

    println!(
        "diagnosed {done} of {} candidates ({skipped} empty, {failed} failed)",
        candidates.len()
    );
    Ok(())
}

fn write_diagnosis_md(out: &Path, id: &str, body: &str) -> Result<()> {
    let path = out.join(format!("{id}.md"));
    fs::write(&path, render::render_record_markdown(id, body))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn build_chat_oracle(file_cfg: &FileConfig, flags: OracleArgs) -> Result<ChatOracle> {
    let OracleConfig {
        api_url,
        api_key,
        model,
        connect_timeout,
        request_timeout,
    } = file_cfg.oracle_config(flags.api_url, flags.api_key, flags.model)?;
    Ok(ChatOracle::with_timeouts(
        &api_url,
        &api_key,
        &model,
        connect_timeout,
        request_timeout,
    ))
}
