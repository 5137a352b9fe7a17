//! `lifelog` command line entry point.
//!
//! # Responsibility
//! - Resolve which days to process and apply flag overrides to the
//!   environment-derived configuration.
//! - Run one pipeline pass and print a task tally.

use chrono::NaiveDate;
use clap::Parser;
use lifelog_core::{
    default_log_level, discover_days, init_logging_with_stderr, run_pipeline, PipelineOptions,
    PipelineReport, ProcessorConfig, ProviderKind, RunOutcome,
};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const DAY_FORMAT: &str = "%Y-%m-%d";

#[derive(Parser, Debug)]
#[command(
    name = "lifelog",
    version,
    about = "Process captured activity events into a markdown vault",
    long_about = "Ingests <data-dir>/events/<day>.jsonl into the vault's state database, plans \
                  note tasks with the configured LLM provider and writes concept and question \
                  notes.\n\nWithout --day or --from/--to every day file present is processed."
)]
struct Cli {
    /// Process a single day (YYYY-MM-DD).
    #[arg(long, value_parser = parse_day, conflicts_with_all = ["from", "to"])]
    day: Option<NaiveDate>,

    /// First day of an inclusive range (YYYY-MM-DD).
    #[arg(long, value_parser = parse_day, requires = "to")]
    from: Option<NaiveDate>,

    /// Last day of an inclusive range (YYYY-MM-DD).
    #[arg(long, value_parser = parse_day, requires = "from")]
    to: Option<NaiveDate>,

    /// Override the LLM provider (llama_cpp, openai, gemini).
    #[arg(long, value_parser = parse_provider)]
    provider: Option<ProviderKind>,

    /// Rebuild the vault from stored events without re-ingesting.
    #[arg(long)]
    rebuild: bool,

    /// Plan and report what would run without writing notes.
    #[arg(long)]
    dry_run: bool,

    /// Worker pool size.
    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long, env = "PROCESSOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, env = "PROCESSOR_VAULT_DIR")]
    vault_dir: Option<PathBuf>,

    /// trace, debug, info, warn or error.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = apply_overrides(ProcessorConfig::from_env(), &cli);

    if let Err(err) = start_logging(&config) {
        eprintln!("lifelog: logging disabled: {err}");
    }

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error error={message}");
            eprintln!("lifelog: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &ProcessorConfig) -> Result<(), String> {
    let events_dir = config.events_dir();
    if !events_dir.is_dir() {
        warn!(
            "event=cli_run module=cli status=skip reason=missing_events_dir path={}",
            events_dir.display()
        );
        println!("events directory {} does not exist", events_dir.display());
        return Ok(());
    }

    let days = resolve_days(cli, &events_dir)?;
    if days.is_empty() {
        info!("event=cli_run module=cli status=skip reason=no_days");
        println!("no days to process");
        return Ok(());
    }
    info!(
        "event=cli_run module=cli status=start days={} first={} last={}",
        days.len(),
        days[0],
        days[days.len() - 1]
    );

    let options = PipelineOptions {
        days,
        provider: cli.provider,
        rebuild_only: cli.rebuild,
        dry_run: cli.dry_run,
    };
    let report = run_pipeline(config, &options).map_err(|err| err.to_string())?;
    print_report(&report);
    Ok(())
}

fn resolve_days(cli: &Cli, events_dir: &Path) -> Result<Vec<String>, String> {
    if let Some(day) = cli.day {
        return Ok(vec![day.format(DAY_FORMAT).to_string()]);
    }
    if let (Some(from), Some(to)) = (cli.from, cli.to) {
        return day_range(from, to);
    }
    discover_days(events_dir)
        .map_err(|err| format!("failed to list `{}`: {err}", events_dir.display()))
}

fn day_range(from: NaiveDate, to: NaiveDate) -> Result<Vec<String>, String> {
    if from > to {
        return Err(format!("--from ({from}) must not be after --to ({to})"));
    }
    Ok(from
        .iter_days()
        .take_while(|day| *day <= to)
        .map(|day| day.format(DAY_FORMAT).to_string())
        .collect())
}

fn apply_overrides(mut config: ProcessorConfig, cli: &Cli) -> ProcessorConfig {
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(vault_dir) = &cli.vault_dir {
        config.vault_dir = vault_dir.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.llm.concurrency = concurrency.max(1);
    }
    if let Some(level) = &cli.log_level {
        config.log_level = Some(level.clone());
    }
    config
}

fn start_logging(config: &ProcessorConfig) -> Result<(), String> {
    let level = config
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| config.vault_dir.join(".src").join("logs"));
    let log_dir = std::path::absolute(&log_dir)
        .map_err(|err| format!("cannot resolve `{}`: {err}", log_dir.display()))?;
    let log_dir = log_dir
        .to_str()
        .ok_or_else(|| format!("log dir `{}` is not valid UTF-8", log_dir.display()))?;
    init_logging_with_stderr(&level, log_dir, true)
}

fn print_report(report: &PipelineReport) {
    println!(
        "ingested={} events={} tasks={}",
        report.ingested, report.events, report.planned_tasks
    );
    match &report.outcome {
        RunOutcome::Skipped(reason) => println!("nothing executed: {reason}"),
        RunOutcome::DryRun(dry) => {
            for (round, ids) in dry.rounds.iter().enumerate() {
                println!("round {}: {}", round + 1, ids.join(", "));
            }
            if !dry.blocked.is_empty() {
                println!("blocked: {}", dry.blocked.join(", "));
            }
        }
        RunOutcome::Executed(run) => {
            for outcome in run.outcomes.iter().filter(|outcome| outcome.error.is_some()) {
                println!(
                    "failed {}: {}",
                    outcome.task_id,
                    outcome.error.as_deref().unwrap_or_default()
                );
            }
            println!(
                "completed={} failed={} blocked={}{}",
                run.completed,
                run.failed,
                run.blocked,
                if run.aborted { " (aborted)" } else { "" }
            );
        }
    }
}

fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, DAY_FORMAT)
        .map_err(|err| format!("expected YYYY-MM-DD, got `{raw}`: {err}"))
}

fn parse_provider(raw: &str) -> Result<ProviderKind, String> {
    raw.parse::<ProviderKind>().map_err(|err| err.to_string())
}
