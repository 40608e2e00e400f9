use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use field_profiler_common::Config;
use field_profiler_core::{
    export, print_summary, select, DatasetProfile, ExportFormat, Operator, ParquetSource, ProfileOutcome,
    Profiler, RawValue, RecordFilter, RecordId, RecordSource, SelectionCriterion,
};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("expected YYYY-MM-DD, got {s}"))
}

fn parse_operator(s: &str) -> Result<Operator, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[derive(Parser)]
#[command(name = "field-profiler", version, about = "Per-field data profiler for Parquet files")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand that runs a profile.
#[derive(Args)]
struct RunArgs {
    path: PathBuf,
    /// Profile only these fields
    #[arg(long, value_delimiter = ',')]
    fields: Option<Vec<String>>,
    /// Profile only these record ids (row indices)
    #[arg(long, value_delimiter = ',')]
    records: Option<Vec<u64>>,
    /// Validation rule, e.g. "age >= 0 AND name IS NOT NULL"; repeatable
    #[arg(long = "rule")]
    rules: Vec<String>,
    /// Reference day for before/after counts (defaults to today)
    #[arg(long, value_parser = parse_date)]
    today: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile every field and print a summary
    Profile {
        #[command(flatten)]
        run: RunArgs,
        /// Print the full profile as JSON instead of the summary
        #[arg(long)]
        json: bool,
        /// Also write profile.json to the configured output directory
        #[arg(long)]
        save: bool,
    },
    /// Print the ids of records matching a statistic of one field
    Select {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long)]
        field: String,
        /// e.g. max, median, top_values, uppercase, weekend
        #[arg(long)]
        statistic: String,
        /// ==, !=, <, <=, >, >= or one_of
        #[arg(long = "op", default_value = "==", value_parser = parse_operator)]
        operator: Operator,
        /// Compare against this value instead of the reported statistic
        #[arg(long)]
        threshold: Option<String>,
    },
    /// Write the profile as json, csv or html
    Export {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long)]
        format: Option<String>,
        /// Output directory (defaults to the configured one)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_env("FIELD_PROFILER_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let config = load_config()?;
    match cli.command {
        Commands::Profile { run, json, save } => run_profile(run, json, save, &config).await?,
        Commands::Select { run, field, statistic, operator, threshold } => {
            let criterion = SelectionCriterion {
                field,
                statistic,
                operator,
                threshold: threshold.map(RawValue::Text),
            };
            run_select(run, criterion, &config).await?
        }
        Commands::Export { run, format, output } => run_export(run, format, output, &config).await?,
    }
    Ok(())
}

/// A missing config file means defaults; an unreadable or invalid one is an error.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("could not load config: {e}"))?;
    debug!(output_dir = %config.export.output_dir, format = %config.export.format, "config loaded");
    Ok(config)
}

fn open(path: &Path) -> anyhow::Result<ParquetSource> {
    if !path.exists() {
        anyhow::bail!("file not found: {}", path.display());
    }
    ParquetSource::open(path).map_err(|e| anyhow::anyhow!("{e}"))
}

/// Runs the profile on a blocking thread while this task reports progress.
/// Ctrl-C cancels the run; a cancelled run exits without output.
async fn profile_source(source: ParquetSource, run: &RunArgs, config: &Config) -> anyhow::Result<DatasetProfile> {
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst))?;
    }
    let total = source.record_count_hint().unwrap_or(0);
    let (tx, rx) = std::sync::mpsc::channel::<u64>();
    let cfg = config.profiling.clone();
    let fields = run.fields.clone();
    let rules = run.rules.clone();
    let filter = match &run.records {
        Some(ids) => RecordFilter::only(ids.iter().map(|&i| RecordId(i))),
        None => RecordFilter::all(),
    };
    let today = run.today;
    let worker = tokio::task::spawn_blocking(move || {
        let mut profiler = Profiler::new(&cfg)
            .with_cancel(cancel)
            .with_progress(tx)
            .with_filter(filter)
            .with_rules(rules);
        if let Some(fields) = fields {
            profiler = profiler.with_fields(fields);
        }
        if let Some(today) = today {
            profiler = profiler.with_today(today);
        }
        profiler.run(&source)
    });
    let show = std::io::stderr().is_terminal();
    let printer = tokio::task::spawn_blocking(move || {
        // the sender is dropped when the run ends, closing the channel
        for n in rx {
            if show {
                eprint!("\rprofiled {n}/{total} records");
                let _ = std::io::stderr().flush();
            }
        }
        if show {
            eprintln!();
        }
    });
    let outcome = worker.await?.map_err(|e| anyhow::anyhow!("{e}"))?;
    printer.await?;
    match outcome {
        ProfileOutcome::Completed(profile) => Ok(profile),
        ProfileOutcome::Cancelled => {
            eprintln!("cancelled, no results produced");
            std::process::exit(130);
        }
    }
}

async fn run_profile(run: RunArgs, json: bool, save: bool, config: &Config) -> anyhow::Result<()> {
    let source = open(&run.path)?;
    let profile = profile_source(source, &run, config).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        print_summary(&profile);
    }
    if save {
        let out_dir = Path::new(&config.export.output_dir);
        let out_path = export(&profile, ExportFormat::Json, out_dir, "profile").map_err(|e| anyhow::anyhow!("{e}"))?;
        println!("Profile saved to {}", out_path.display());
    }
    Ok(())
}

async fn run_select(run: RunArgs, criterion: SelectionCriterion, config: &Config) -> anyhow::Result<()> {
    let source = open(&run.path)?;
    let reread = source.clone();
    let profile = profile_source(source, &run, config).await?;
    let cfg = config.profiling.clone();
    let ids = tokio::task::spawn_blocking(move || select(&reread, &profile, &criterion, &cfg))
        .await?
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{:<24} {}", "matched:", ids.len());
    for id in ids {
        println!("{id}");
    }
    Ok(())
}

async fn run_export(
    run: RunArgs,
    format: Option<String>,
    output: Option<PathBuf>,
    config: &Config,
) -> anyhow::Result<()> {
    let format: ExportFormat = format
        .as_deref()
        .unwrap_or(&config.export.format)
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let source = open(&run.path)?;
    let stem = run
        .path
        .file_stem()
        .map(|s| format!("{}.profile", s.to_string_lossy()))
        .unwrap_or_else(|| "profile".into());
    let profile = profile_source(source, &run, config).await?;
    let out_dir = output.unwrap_or_else(|| PathBuf::from(&config.export.output_dir));
    let out_path = export(&profile, format, &out_dir, &stem).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Exported to {}", out_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[profiling\nunique_retention_cap = ").unwrap();
        std::env::set_var("FIELD_PROFILER_CONFIG", &path);
        let err = load_config().unwrap_err();
        std::env::remove_var("FIELD_PROFILER_CONFIG");
        assert!(err.to_string().contains("could not load config"));
    }
}
