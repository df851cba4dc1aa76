//! Cross-validation CLI
//!
//! Leave-one-out cross-validation of the language classifier over a sample
//! corpus.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use classifier_crossval::{
    parse_extension_list, Corpus, CrossValidator, EvalContext, HeuristicSet, LanguageRegistry,
    NaiveBayesTrainer, ReportBuilder, RunConfig, RunReport, Settings, StatConfig,
};
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cross-validation")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Test every sample against every language, not only ambiguous ones
    #[arg(long)]
    all: bool,

    /// Only test samples with these extensions (e.g. `.m,.h`)
    #[arg(long, value_name = "LIST")]
    extensions: Option<String>,

    /// Fail when the number of errors exceeds the acceptable threshold
    #[arg(long)]
    test: bool,

    /// Corpus root directory
    #[arg(long, value_name = "DIR")]
    corpus: Option<PathBuf>,

    /// Language definitions (YAML)
    #[arg(long, value_name = "FILE")]
    languages: Option<PathBuf>,

    /// Heuristic rules (YAML)
    #[arg(long, value_name = "FILE")]
    heuristics: Option<PathBuf>,

    /// Settings file (YAML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long)]
    jobs: Option<NonZeroUsize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Print an accuracy summary to stderr
    #[arg(long)]
    summary: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help goes to stdout, usage errors to stderr
            e.print().ok();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run the whole pipeline; `Ok(false)` when the threshold check fails
fn run(cli: &Cli) -> Result<bool> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let extensions = cli
        .extensions
        .as_deref()
        .map(parse_extension_list)
        .transpose()
        .context("Invalid --extensions value")?;

    let config = RunConfig {
        exhaustive: cli.all,
        extensions,
        check_threshold: cli.test,
        jobs: cli.jobs.map(NonZeroUsize::get).or(settings.jobs),
        consider_bytes: settings.consider_bytes,
    };

    let corpus_path = cli.corpus.clone().unwrap_or(settings.corpus);
    let languages_path = cli.languages.clone().unwrap_or(settings.languages);
    let heuristics_path = cli.heuristics.clone().unwrap_or(settings.heuristics);

    let registry = LanguageRegistry::load(&languages_path).with_context(|| {
        format!("Failed to load languages from {}", languages_path.display())
    })?;
    let heuristics = HeuristicSet::load(&heuristics_path).with_context(|| {
        format!("Failed to load heuristics from {}", heuristics_path.display())
    })?;
    let corpus = Corpus::load(&corpus_path)
        .with_context(|| format!("Failed to load corpus from {}", corpus_path.display()))?;

    let stats = corpus.stats();
    tracing::info!(
        corpus = %corpus_path.display(),
        samples = stats.total_samples,
        languages = stats.total_languages,
        single_sample_languages = stats.single_sample_languages,
        known_languages = registry.len(),
        heuristic_rules = heuristics.len(),
        "Loaded inputs"
    );

    let context = EvalContext::new(config, corpus, registry, &heuristics);
    let results = CrossValidator::new(NaiveBayesTrainer::new)
        .run(&context)
        .context("Cross-validation aborted")?;

    let report = ReportBuilder::new(context.config())
        .with_results(results)
        .build();

    write_report(&report, cli.format).context("Failed to write report")?;

    if cli.summary {
        eprintln!("{}", report.summary(&StatConfig::default()).to_table());
    }

    Ok(report.passed())
}

fn write_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut out = stdout.lock();
    let mut err = stderr.lock();

    match format {
        OutputFormat::Text => report.write_text(&mut out, &mut err)?,
        OutputFormat::Json => {
            writeln!(out, "{}", report.to_json()?)?;
            if let Some(verdict) = report.verdict.filter(|v| !v.passed) {
                writeln!(err, "{}", verdict.message())?;
            }
        }
    }
    out.flush()?;
    Ok(())
}
