#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::env::VarError;
use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, info_span};
use tracing_subscriber::EnvFilter;
use vsfs_block::FileByteDevice;
use vsfs_ondisk::Superblock;
use vsfs_repair::{Checker, Finding, FsckReport, Severity, Stage, StageOutcome, format_image};
use vsfs_types::Geometry;

/// Exit status when at least one stage could not run to completion.
const EXIT_STAGE_FAILED: i32 = 4;

// ── CLI definition ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    const ENV_KEY: &'static str = "VSFS_LOG_FORMAT";

    fn parse(raw: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(raw.trim(), true).map_err(|_| {
            anyhow::anyhow!(
                "invalid {key}={raw:?}; expected one of: human, json",
                key = Self::ENV_KEY
            )
        })
    }

    fn from_env() -> Result<Option<Self>> {
        match std::env::var(Self::ENV_KEY) {
            Ok(value) => Ok(Some(Self::parse(&value)?)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => {
                bail!("{key} contains non-UTF-8 bytes", key = Self::ENV_KEY)
            }
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

/// Logs go to stderr and default to `warn` so they stay out of the report.
fn default_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn init_logging(log_format_override: Option<LogFormat>) -> Result<LogFormat> {
    let format = log_format_override
        .or(LogFormat::from_env()?)
        .unwrap_or(LogFormat::Human);

    match format {
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(default_env_filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .compact()
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize human logger: {err}"))?,
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_env_filter(default_env_filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize JSON logger: {err}"))?,
    }

    Ok(format)
}

#[derive(Debug, Parser)]
#[command(
    name = "vsfsck",
    about = "Check and repair a VSFS filesystem image in place",
    after_help = "Running `vsfsck <IMAGE>` is the same as `vsfsck check <IMAGE>`."
)]
struct Cli {
    /// Log output format (`human` or `json`).
    ///
    /// Precedence: `--log-format` > `VSFS_LOG_FORMAT` > `human`.
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,
    /// Image to check and repair.
    image: Option<PathBuf>,
    /// Output the report in JSON format.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check an image and repair every inconsistency found.
    Check {
        /// Path to the filesystem image.
        image: PathBuf,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// Print the canonical on-disk layout the checker enforces.
    Layout {
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// Create (or overwrite) an image with an empty, consistent filesystem.
    Format {
        /// Path to the filesystem image.
        image: PathBuf,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Check { .. } => "check",
            Self::Layout { .. } => "layout",
            Self::Format { .. } => "format",
        }
    }
}

impl Cli {
    /// Fold the bare `vsfsck <IMAGE>` form into `check`. A top-level `--json`
    /// also applies to the subcommand that follows it.
    fn into_command(self) -> Result<Command> {
        match (self.command, self.image) {
            (Some(command), None) => Ok(match command {
                Command::Check { image, json } => Command::Check {
                    image,
                    json: json || self.json,
                },
                Command::Layout { json } => Command::Layout {
                    json: json || self.json,
                },
                format @ Command::Format { .. } => format,
            }),
            (Some(_), Some(image)) => bail!(
                "unexpected argument {} before subcommand",
                image.display()
            ),
            (None, Some(image)) => Ok(Command::Check {
                image,
                json: self.json,
            }),
            (None, None) => bail!("missing IMAGE; run `vsfsck --help` for usage"),
        }
    }
}

// ── Output types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum FsckOutcome {
    Clean,
    Repaired,
    RepairedWithWarnings,
    StageFailed,
}

impl FsckOutcome {
    fn of(report: &FsckReport) -> Self {
        if report.has_failures() {
            Self::StageFailed
        } else if report.is_clean() {
            Self::Clean
        } else if report.warnings_count() > 0 {
            Self::RepairedWithWarnings
        } else {
            Self::Repaired
        }
    }

    const fn exit_code(self) -> i32 {
        match self {
            Self::StageFailed => EXIT_STAGE_FAILED,
            Self::Clean | Self::Repaired | Self::RepairedWithWarnings => 0,
        }
    }
}

#[derive(Debug, Serialize)]
struct FsckOutput<'a> {
    image: String,
    outcome: FsckOutcome,
    exit_code: i32,
    findings: usize,
    warnings: usize,
    #[serde(flatten)]
    report: &'a FsckReport,
}

impl<'a> FsckOutput<'a> {
    fn new(image: &Path, report: &'a FsckReport) -> Self {
        let outcome = FsckOutcome::of(report);
        Self {
            image: image.display().to_string(),
            outcome,
            exit_code: outcome.exit_code(),
            findings: report.findings_count(),
            warnings: report.warnings_count(),
            report,
        }
    }
}

#[derive(Debug, Serialize)]
struct LayoutOutput {
    magic: u16,
    block_size: u32,
    total_blocks: u32,
    inode_size: u32,
    inode_count: u32,
    inode_bitmap_block: u32,
    data_bitmap_block: u32,
    inode_table_start: u32,
    first_data_block: u32,
    image_len: u64,
}

impl LayoutOutput {
    fn new(geo: &Geometry) -> Self {
        let sb = Superblock::canonical(geo);
        Self {
            magic: sb.magic,
            block_size: sb.block_size,
            total_blocks: sb.total_blocks,
            inode_size: sb.inode_size,
            inode_count: sb.inode_count,
            inode_bitmap_block: sb.inode_bitmap_block,
            data_bitmap_block: sb.data_bitmap_block,
            inode_table_start: sb.inode_table_start,
            first_data_block: sb.first_data_block,
            image_len: geo.image_len(),
        }
    }
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    match run() {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let log_format = init_logging(cli.log_format)?;
    let command = cli.into_command()?;
    let command_name = command.name();
    let run_span = info_span!(
        target: "vsfs::cli",
        "command",
        command = command_name,
        log_format = log_format.as_str()
    );
    let _run_guard = run_span.enter();
    let started = Instant::now();
    info!(target: "vsfs::cli", command = command_name, "command_start");

    let result = match command {
        Command::Check { image, json } => check_cmd(&image, json),
        Command::Layout { json } => layout_cmd(json).map(|()| 0),
        Command::Format { image } => format_cmd(&image).map(|()| 0),
    };

    info!(
        target: "vsfs::cli",
        command = command_name,
        ok = result.is_ok(),
        duration_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        "command_complete"
    );
    result
}

// ── Commands ────────────────────────────────────────────────────────────────

fn check_cmd(path: &Path, json: bool) -> Result<i32> {
    let command_span = info_span!(
        target: "vsfs::cli::check",
        "check",
        image = %path.display(),
        output_json = json
    );
    let _command_guard = command_span.enter();

    let report = Checker::new(Geometry::VSFS).run(|| FileByteDevice::open(path));
    let output = FsckOutput::new(path, &report);
    print_fsck_output(json, &output)?;

    info!(
        target: "vsfs::cli::check",
        outcome = ?output.outcome,
        findings = output.findings,
        warnings = output.warnings,
        exit_code = output.exit_code,
        "check_complete"
    );
    Ok(output.exit_code)
}

fn layout_cmd(json: bool) -> Result<()> {
    let geo = Geometry::VSFS;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&LayoutOutput::new(&geo))
                .context("serialize layout output")?
        );
    } else {
        let mut out = String::new();
        render_layout(&mut out, &geo).context("render layout")?;
        print!("{out}");
    }
    Ok(())
}

fn format_cmd(path: &Path) -> Result<()> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let dev = FileByteDevice::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let geo = Geometry::VSFS;
    format_image(&dev, &geo).with_context(|| format!("failed to format {}", path.display()))?;

    println!(
        "Formatted {}: {} blocks of {} bytes, {} inodes.",
        path.display(),
        geo.total_blocks,
        geo.block_size,
        geo.inode_count()
    );
    Ok(())
}

// ── Rendering ───────────────────────────────────────────────────────────────

fn print_fsck_output(json: bool, output: &FsckOutput<'_>) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(output).context("serialize fsck output")?
        );
        return Ok(());
    }

    let mut out = String::new();
    render_report(&mut out, output.report).context("render fsck report")?;
    print!("{out}");
    Ok(())
}

fn render_report(out: &mut String, report: &FsckReport) -> fmt::Result {
    for outcome in &report.stages {
        let stage = outcome.stage();
        writeln!(out, "===== {} =====", stage.title())?;
        match outcome {
            StageOutcome::Completed(stage_report) => {
                if stage_report.is_clean() {
                    writeln!(out, "{}", stage.clean_message())?;
                }
                for finding in &stage_report.findings {
                    match finding.severity() {
                        Severity::Repaired => writeln!(out, "{finding}")?,
                        Severity::Warning => writeln!(out, "WARNING: {finding}")?,
                    }
                }
                if let Some(bitmap) = &stage_report.bitmap {
                    let which = if stage == Stage::InodeBitmap {
                        "Inode"
                    } else {
                        "Data"
                    };
                    writeln!(out, "Updated {which} Bitmap:")?;
                    writeln!(out, "{}", bitmap.rendered)?;
                }
                let layout_rewritten = stage_report
                    .findings
                    .iter()
                    .any(|f| matches!(f, Finding::SuperblockField(_)));
                if layout_rewritten {
                    render_layout(out, &report.geometry)?;
                }
            }
            StageOutcome::Failed { error, .. } => {
                writeln!(out, "Stage aborted: {error}")?;
            }
        }
        writeln!(out)?;
    }

    let failed = report.failed_stages().len();
    writeln!(
        out,
        "vsfsck: {} issue(s) found, {} left unrepaired, {} stage(s) failed.",
        report.findings_count(),
        report.warnings_count(),
        failed
    )
}

fn render_layout(out: &mut String, geo: &Geometry) -> fmt::Result {
    let layout = LayoutOutput::new(geo);
    writeln!(out, "Superblock layout:")?;
    writeln!(out, "  magic               {:#06X}", layout.magic)?;
    writeln!(out, "  block_size          {}", layout.block_size)?;
    writeln!(out, "  total_blocks        {}", layout.total_blocks)?;
    writeln!(out, "  inode_size          {}", layout.inode_size)?;
    writeln!(out, "  inode_count         {}", layout.inode_count)?;
    writeln!(out, "  inode_bitmap_block  {}", layout.inode_bitmap_block)?;
    writeln!(out, "  data_bitmap_block   {}", layout.data_bitmap_block)?;
    writeln!(out, "  inode_table_start   {}", layout.inode_table_start)?;
    writeln!(out, "  first_data_block    {}", layout.first_data_block)?;
    writeln!(out, "  image_len           {}", layout.image_len)
}
