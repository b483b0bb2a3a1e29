//! CLI binary for docx2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig`, runs one batch and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use docx2md::{
    ConversionConfig, ConversionOptions, ConversionProgressCallback, ConversionRequest,
    ConversionTask, FsStorage, MathEngine, Orchestrator, ProgressCallback, Storage, TaskStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// document. Documents finish out of order, so start times are keyed by
/// task id.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, task_id: &str) -> String {
        let ms = self
            .start_times
            .lock()
            .remove(task_id)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} documents…"))
        ));
    }

    fn on_task_start(&self, task_id: &str, source: &str) {
        self.start_times
            .lock()
            .insert(task_id.to_string(), Instant::now());
        self.bar.set_message(source.to_string());
    }

    fn on_task_complete(&self, task_id: &str, source: &str, warnings: usize, bytes: usize) {
        let mark = if warnings == 0 { green("✓") } else { yellow("✓") };
        let notes = if warnings == 0 {
            String::new()
        } else {
            yellow(&format!("  {warnings} warnings"))
        };
        self.bar.println(format!(
            "  {mark} {source}  {}  {}{notes}",
            dim(&format!("{bytes:>7} bytes")),
            self.elapsed(task_id),
        ));
        self.bar.inc(1);
    }

    fn on_task_error(&self, task_id: &str, source: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let first_line = error.lines().next().unwrap_or_default();
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {source}  {}  {}",
            red("✗"),
            red(&msg),
            self.elapsed(task_id),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} documents converted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every .docx below ./docx into ./markdown
  docx2md

  # Convert selected documents
  docx2md report.docx minutes/2024-05.docx

  # LaTeX math for MathJax/KaTeX sites, no table of contents
  docx2md --math latex --no-toc thesis.docx

  # Text only, no image files
  docx2md --no-images --output-dir out report.docx

  # What would be converted?
  docx2md --list

  # Machine-readable task results
  docx2md --json report.docx > tasks.json

OUTPUT LAYOUT:
  <output-dir>/<name>/<name>.md
  <output-dir>/<name>/images/…      (linked as ./images/…)

ENVIRONMENT VARIABLES:
  DOCX2MD_DOCX_DIR        Source directory
  DOCX2MD_OUTPUT_DIR      Output directory
  DOCX2MD_PANDOC          pandoc executable
  DOCX2MD_MATH            Math engine (mathml, latex, plain)
  DOCX2MD_TIMEOUT         pandoc timeout in seconds
  DOCX2MD_WORKERS         Documents converted concurrently
  RUST_LOG                Log filter (overrides -v / -q)

SETUP:
  Install pandoc (https://pandoc.org/installing.html) and make sure
  `pandoc --version` works, or point --pandoc at the executable.
"#;

/// Convert DOCX documents to Markdown, keeping tables, math and images.
#[derive(Parser, Debug)]
#[command(
    name = "docx2md",
    version,
    about = "Convert DOCX documents to Markdown, keeping tables, math and images",
    long_about = "Convert DOCX documents to Markdown through pandoc. Merged table cells \
survive as embedded HTML, equations are written as MathML, LaTeX or plain text, images are \
copied next to each Markdown file, and text inside drawings is kept.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents to convert, relative to --docx-dir. Default: all of them.
    names: Vec<String>,

    /// Directory holding the source documents.
    #[arg(long, env = "DOCX2MD_DOCX_DIR", default_value = "docx")]
    docx_dir: PathBuf,

    /// Directory Markdown folders are written to.
    #[arg(short, long, env = "DOCX2MD_OUTPUT_DIR", default_value = "markdown")]
    output_dir: PathBuf,

    /// Math rendering: mathml, latex, plain.
    #[arg(long, env = "DOCX2MD_MATH", value_enum, default_value = "mathml")]
    math: MathArg,

    /// Do not prepend a table of contents.
    #[arg(long, env = "DOCX2MD_NO_TOC")]
    no_toc: bool,

    /// Deepest heading level listed in the table of contents (1–6).
    #[arg(long, env = "DOCX2MD_TOC_DEPTH", default_value_t = 4,
          value_parser = clap::value_parser!(u8).range(1..=6))]
    toc_depth: u8,

    /// Replace images by their alt text instead of copying them.
    #[arg(long, env = "DOCX2MD_NO_IMAGES")]
    no_images: bool,

    /// pandoc timeout per document, in seconds.
    #[arg(long, env = "DOCX2MD_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Documents converted concurrently.
    #[arg(short, long, env = "DOCX2MD_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Largest accepted DOCX, in bytes.
    #[arg(long, env = "DOCX2MD_MAX_FILE_SIZE", default_value_t = docx2md::config::DEFAULT_MAX_FILE_SIZE)]
    max_file_size: u64,

    /// Keep each scratch directory (intermediate HTML, extracted media).
    #[arg(long, env = "DOCX2MD_KEEP_TEMP")]
    keep_temp: bool,

    /// pandoc executable.
    #[arg(long, env = "DOCX2MD_PANDOC", default_value = "pandoc")]
    pandoc: PathBuf,

    /// List convertible documents and exit.
    #[arg(long)]
    list: bool,

    /// Check pandoc and the directories, then exit.
    #[arg(long)]
    check: bool,

    /// Print task results as JSON on stdout.
    #[arg(long, env = "DOCX2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCX2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCX2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCX2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MathArg {
    Mathml,
    Latex,
    Plain,
}

impl From<MathArg> for MathEngine {
    fn from(v: MathArg) -> Self {
        match v {
            MathArg::Mathml => MathEngine::Mathml,
            MathArg::Latex => MathEngine::Latex,
            MathArg::Plain => MathEngine::Plain,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list && !cli.check;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Storage ──────────────────────────────────────────────────────────
    let storage = FsStorage::new(&cli.docx_dir, &cli.output_dir);
    storage
        .ensure_dirs()
        .await
        .context("Failed to create the source/output directories")?;

    if cli.list {
        let ids = storage
            .list_sources()
            .await
            .context("Failed to list source documents")?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&ids)?);
        } else {
            for id in ids {
                println!("{id}");
            }
        }
        return Ok(());
    }

    // ── Build config + orchestrator ──────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let storage: Arc<dyn Storage> = Arc::new(storage);
    let orchestrator = Orchestrator::new(config, Arc::clone(&storage))
        .await
        .with_context(|| format!("pandoc is required (looked for {})", cli.pandoc.display()))?;

    if cli.check {
        let report = orchestrator.check_dependencies().await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("pandoc:   {}", report.converter_version);
            println!(
                "storage:  {}",
                if report.storage_ok { green("ok") } else { red("unavailable") }
            );
        }
        return Ok(());
    }

    // ── Collect requests ─────────────────────────────────────────────────
    let names = if cli.names.is_empty() {
        storage
            .list_sources()
            .await
            .context("Failed to list source documents")?
    } else {
        cli.names.clone()
    };
    if names.is_empty() {
        if !cli.quiet {
            eprintln!("No .docx files found in {}", cli.docx_dir.display());
        }
        return Ok(());
    }

    // Bad names are input errors: reported here, never turned into tasks
    let mut rejected = 0usize;
    let requests: Vec<ConversionRequest> = names
        .iter()
        .filter_map(|name| match orchestrator.request(name) {
            Ok(request) => Some(request),
            Err(e) => {
                rejected += 1;
                eprintln!("{} {name}: {e}", red("✗"));
                None
            }
        })
        .collect();

    // ── Run batch ────────────────────────────────────────────────────────
    let started = Instant::now();
    let handle = orchestrator
        .convert_batch(requests)
        .context("Failed to schedule conversions")?;
    let task_ids = handle.task_ids.clone();
    let summary = handle.join().await?;
    let tasks: Vec<ConversionTask> = task_ids
        .iter()
        .filter_map(|id| orchestrator.task_status(id).ok())
        .collect();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&tasks).context("Failed to serialise tasks")?
        );
    } else if !cli.quiet && !show_progress {
        for task in &tasks {
            print_task(task);
        }
        eprintln!(
            "Converted {}/{} documents in {}ms",
            summary.succeeded,
            summary.total,
            started.elapsed().as_millis()
        );
    }

    let failed = summary.failed + rejected;
    if failed > 0 {
        anyhow::bail!("{failed} of {} documents failed", summary.total + rejected);
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let defaults = ConversionOptions {
        preserve_images: !cli.no_images,
        include_toc: !cli.no_toc,
        toc_depth: cli.toc_depth,
        math_engine: cli.math.into(),
        ..ConversionOptions::default()
    };

    let mut builder = ConversionConfig::builder()
        .converter_program(&cli.pandoc)
        .converter_timeout_secs(cli.timeout)
        .workers(cli.workers)
        .max_file_size(cli.max_file_size)
        .cleanup_temp_files(!cli.keep_temp)
        .defaults(defaults);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_task(task: &ConversionTask) {
    match (task.status, &task.result, &task.error) {
        (TaskStatus::Succeeded, Some(result), _) => {
            eprintln!(
                "{} {}  →  {}",
                green("✓"),
                task.source.id,
                bold(&result.output_path.display().to_string())
            );
            for warning in &result.warnings {
                eprintln!("    {} {warning}", yellow("⚠"));
            }
        }
        (TaskStatus::Failed, _, Some(error)) => {
            eprintln!("{} {}  [{}] {}", red("✗"), task.source.id, error.kind, error.detail);
        }
        (status, _, _) => eprintln!("{} {}  {status}", dim("·"), task.source.id),
    }
}
