//! CLI binary for mediscan.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, drives the pipeline against a local data directory,
//! and prints results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mediscan::{
    history, AnalysisConfig, AnalysisProgress, AnalysisRequest, Analyzer, LocalStore,
    PipelineStage, PrescriptionRecord, RecordId, StaticAuth,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one spinner whose message tracks the pipeline's
/// human-readable status string, stage by stage.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AnalysisProgress for CliProgress {
    fn on_stage(&self, stage: PipelineStage) {
        self.bar.set_message(stage.status_text().to_string());
    }

    fn on_degraded(&self, reason: &str) {
        self.bar
            .println(format!("  {} {}", yellow("⚠"), dim(reason)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a prescription
  mediscan analyze rx.pdf --patient "Alice Johnson" --doctor "Dr. Smith"

  # Include symptom notes
  mediscan analyze rx.pdf --symptoms "persistent headache, 3 days"

  # Show a stored record
  mediscan show 7c9e6679-7425-40de-944b-e07fc1f90ae7

  # List all analyzed prescriptions
  mediscan list

  # Export everything to a snapshot file
  mediscan export

  # Remove all stored files and records
  mediscan wipe --yes

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY       OpenRouter API key (required for analyze)
  MEDISCAN_DATA_DIR        Data directory (default: ./mediscan-data)
  PDFIUM_DYNAMIC_LIB_PATH  Path to an existing libpdfium
  RUST_LOG                 Log filter, e.g. mediscan=debug

SETUP:
  1. Set API key:  export OPENROUTER_API_KEY=sk-or-...
  2. Analyze:      mediscan analyze rx.pdf --patient "Alice Johnson"
"#;

/// Analyze prescription documents with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "mediscan",
    version,
    about = "Analyze prescription documents with a vision LLM",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Data directory for stored files and records.
    #[arg(long, env = "MEDISCAN_DATA_DIR", default_value = "./mediscan-data", global = true)]
    data_dir: PathBuf,

    /// User identifier recorded in exports.
    #[arg(long, default_value = "local", global = true)]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload and analyze a prescription PDF.
    Analyze {
        /// Path to the prescription PDF.
        file: PathBuf,

        /// Patient name for the analysis context.
        #[arg(long)]
        patient: Option<String>,

        /// Doctor name for the analysis context.
        #[arg(long)]
        doctor: Option<String>,

        /// Symptoms or additional notes.
        #[arg(long)]
        symptoms: Option<String>,

        /// Model identifier requested from the provider.
        #[arg(long)]
        model: Option<String>,

        /// Analysis timeout budget in seconds.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Print one stored record.
    Show {
        /// Record identifier.
        id: String,
    },

    /// List stored prescription records.
    List,

    /// Write the prescription-history snapshot to a file.
    Export {
        /// Output path; defaults to the snapshot's own file name.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete all stored files and records.
    Wipe {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store = Arc::new(
        LocalStore::open(&cli.data_dir)
            .await
            .with_context(|| format!("opening data directory {}", cli.data_dir.display()))?,
    );
    let auth = Arc::new(StaticAuth::signed_in(cli.user.clone()));

    match cli.command {
        Command::Analyze {
            file,
            patient,
            doctor,
            symptoms,
            model,
            timeout,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "prescription.pdf".to_string());

            let progress = CliProgress::new();
            let mut builder = AnalysisConfig::builder()
                .analysis_timeout_secs(timeout)
                .progress(progress.clone());
            if let Some(model) = model {
                builder = builder.model(model);
            }
            let config = builder.build()?;

            let analyzer = Analyzer::new(auth, store.clone(), store, config);
            let outcome = analyzer
                .analyze(AnalysisRequest {
                    file_name,
                    bytes,
                    patient_name: patient,
                    doctor_name: doctor,
                    symptoms,
                })
                .await;
            progress.finish();

            let outcome = outcome?;
            match outcome.degraded {
                None => println!(
                    "{} Analysis saved as {}",
                    green("✔"),
                    bold(outcome.record.id.as_str())
                ),
                Some(reason) => println!(
                    "{} Saved {} without analysis: {}",
                    yellow("⚠"),
                    bold(outcome.record.id.as_str()),
                    reason
                ),
            }
            print_record(&outcome.record);
        }

        Command::Show { id } => {
            let analyzer = Analyzer::new(auth, store.clone(), store, AnalysisConfig::default());
            match analyzer.load(&RecordId::from_string(id.clone())).await? {
                Some(record) => print_record(&record),
                None => bail!("no record with id {id}"),
            }
        }

        Command::List => {
            let records = history::list_prescriptions(store.as_ref()).await?;
            if records.is_empty() {
                println!("No prescriptions analyzed yet.");
            }
            for record in records {
                println!(
                    "{}  overall {:>3}  {}  {}",
                    record.id,
                    record.feedback.overall_score,
                    record.patient_name.as_deref().unwrap_or("-"),
                    dim(&record.prescription_path),
                );
            }
        }

        Command::Export { output } => {
            let (name, json) = history::export_snapshot(store.as_ref(), &cli.user).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(&name));
            std::fs::write(&path, json)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{} Exported to {}", green("✔"), path.display());
        }

        Command::Wipe { yes } => {
            if !yes {
                print!("Delete ALL stored files and records? [y/N] ");
                std::io::stdout().flush().ok();
                let mut answer = String::new();
                std::io::stdin().read_line(&mut answer).ok();
                if !answer.trim().eq_ignore_ascii_case("y") {
                    println!("Aborted.");
                    return Ok(());
                }
            }
            let deleted = history::wipe(store.as_ref(), store.as_ref()).await?;
            println!("{} Removed {deleted} files and flushed all records", green("✔"));
        }
    }

    Ok(())
}

/// Render one record's feedback as a category table.
fn print_record(record: &PrescriptionRecord) {
    println!();
    println!("{}", bold(&format!("Prescription {}", record.id)));
    if let Some(ref p) = record.patient_name {
        println!("  Patient: {p}");
    }
    if let Some(ref d) = record.doctor_name {
        println!("  Doctor:  {d}");
    }
    if let Some(ref s) = record.symptoms {
        println!("  Notes:   {s}");
    }
    println!("  Files:   {}  {}", record.prescription_path, record.image_path);
    println!();

    let fb = &record.feedback;
    println!("  Overall score: {}", score_colored(fb.overall_score));
    for (name, category) in fb.categories() {
        println!("  {:<18} {}", name, score_colored(category.score));
        for tip in &category.tips {
            let marker = match tip.kind {
                mediscan::TipKind::Good => green("+"),
                mediscan::TipKind::Improve => yellow("~"),
            };
            println!("    {marker} {}", tip.tip);
            if let Some(ref explanation) = tip.explanation {
                println!("      {}", dim(explanation));
            }
        }
    }

    if fb.is_all_zero() && !record.ai_response.is_empty() {
        println!();
        println!("  {}", dim("Raw response:"));
        for line in record.ai_response.lines().take(10) {
            println!("  {}", dim(line));
        }
    }
}

fn score_colored(score: u8) -> String {
    let text = format!("{score:>3}/100");
    match score {
        90..=100 => green(&text),
        50..=89 => yellow(&text),
        _ => red(&text),
    }
}
