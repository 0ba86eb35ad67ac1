//! `laundry-alert` command-line host.
//!
//! Wires settings, logging and the core's collaborators together:
//!
//! | Command | Store | Sink |
//! |---------|-------|------|
//! | `classify` | none | stdout |
//! | `process-event` | `LocalObjectStore` | `HttpSink` (or in-memory with `--dry-run`) |
//! | `watch` | drop directory | `HttpSink` (or stdout with `--dry-run`) |

mod settings;
mod watch;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use laundry_core::{
    batch::process_json, AlertError, BatchHandler, BatchReport, ClassificationResult,
    ClipClassifier, DeliveryError, DetectionEvent, EventPolicy, HttpSink, LocalObjectStore,
    MemorySink, ObjectStore, ResultSink,
};
use serde_json::json;
use settings::{default_settings_path, load_settings, AppSettings};
use tracing::{info, warn};
use watch::Watcher;

/// Classify laundry-room audio clips and report detections.
#[derive(Debug, Parser)]
#[command(name = "laundry-alert", author, version, about)]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Debug-level logging for laundry crates
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// Result endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Absolute sample value that counts as a clap or knock
    #[arg(long, global = true)]
    peak_threshold: Option<f32>,

    /// How speech and clapping detections combine (combined | clap_first)
    #[arg(long, global = true)]
    policy: Option<EventPolicy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify WAV files and print one JSON result per file
    Classify {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Include clip statistics
        #[arg(long, default_value_t = false)]
        stats: bool,
    },

    /// Process an object-created notification (`-` reads stdin)
    ProcessEvent {
        event_json: PathBuf,

        /// Root directory holding `<bucket>/<key>` objects
        #[arg(long, env = "LAUNDRY_STORE_ROOT")]
        store_root: Option<PathBuf>,

        /// Print events instead of posting them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Poll a directory for new WAV files
    Watch {
        dir: PathBuf,

        /// Print events instead of posting them
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Handle files already present, then exit
        #[arg(long, default_value_t = false)]
        once: bool,
    },
}

/// Prints each event as one JSON line.
struct StdoutSink;

impl ResultSink for StdoutSink {
    fn deliver(&self, event: &DetectionEvent) -> std::result::Result<u16, DeliveryError> {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "could not serialize event"),
        }
        Ok(200)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("laundry=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("laundry=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_settings(cli: &Cli) -> AppSettings {
    let path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&path);
    settings.apply_env_overrides();

    if let Some(endpoint) = &cli.endpoint {
        settings.endpoint = endpoint.clone();
    }
    if let Some(peak) = cli.peak_threshold {
        settings.peak_threshold = peak;
    }
    if let Some(policy) = cli.policy {
        settings.event_policy = policy;
    }
    settings.normalize();
    settings
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = resolve_settings(&cli);
    let classifier = ClipClassifier::new(settings.classifier_config());
    info!(
        peak_threshold = settings.peak_threshold,
        policy = %settings.event_policy,
        "laundry-alert starting"
    );

    match cli.command {
        Command::Classify { files, stats } => {
            classify_files(&classifier, &files, stats)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::ProcessEvent {
            event_json,
            store_root,
            dry_run,
        } => {
            let raw = read_event(&event_json)?;
            let store = LocalObjectStore::new(store_root.unwrap_or_else(|| settings.store_root.clone()));
            let report = if dry_run {
                let sink = MemorySink::new();
                let report = run_batch(&classifier, &store, &sink, &settings, &raw)?;
                for event in sink.take() {
                    println!("{}", serde_json::to_string(&event)?);
                }
                report
            } else {
                let sink = HttpSink::new(settings.endpoint.clone(), settings.request_timeout())
                    .context("building HTTP client")?;
                run_batch(&classifier, &store, &sink, &settings, &raw)?
            };

            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(if report.needs_redelivery() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Watch { dir, dry_run, once } => {
            let summary = if dry_run {
                watch_dir(Watcher::new(classifier, StdoutSink, dir, settings.poll_interval()), once)?
            } else {
                let sink = HttpSink::new(settings.endpoint.clone(), settings.request_timeout())
                    .context("building HTTP client")?;
                watch_dir(Watcher::new(classifier, sink, dir, settings.poll_interval()), once)?
            };
            info!(handled = summary.handled, failed = summary.failed, "watch finished");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn classify_files(classifier: &ClipClassifier, files: &[PathBuf], stats: bool) -> Result<()> {
    for file in files {
        let name = file.display().to_string();
        let line = if stats {
            let analysis = std::fs::read(file)
                .map_err(AlertError::from)
                .and_then(|bytes| classifier.analyze(&bytes));
            match analysis {
                Ok(a) => json!({ "file": name, "result": a.result, "stats": a.stats }),
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "classification failed; reporting neutral result");
                    json!({ "file": name, "result": ClassificationResult::NEUTRAL, "stats": null })
                }
            }
        } else {
            json!({ "file": name, "result": classifier.classify_file(file) })
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

fn read_event(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading notification from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn run_batch<S: ObjectStore, K: ResultSink>(
    classifier: &ClipClassifier,
    store: S,
    sink: K,
    settings: &AppSettings,
    raw: &str,
) -> Result<BatchReport> {
    let handler = BatchHandler::new(classifier.clone(), store, sink, settings.staging_dir.clone());
    process_json(&handler, raw).context("parsing object-created notification")
}

fn watch_dir<K: ResultSink>(watcher: Watcher<K>, once: bool) -> Result<watch::WatchSummary> {
    if once {
        watcher.run_once()
    } else {
        watcher.run(Arc::new(AtomicBool::new(false)))
    }
}
