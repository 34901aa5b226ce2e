//! kubeguard CLI entry point.
//!
//! Provides `audit`, `list`, and `explain` subcommands for running the
//! benchmark against the local node and cluster, listing the catalog, or
//! describing one control's evidence plan.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use kubeguard::catalog::{Catalog, ControlKind, BENCHMARK};
use kubeguard::config::AuditConfig;
use kubeguard::logging;
use kubeguard::report::{AuditReport, TextRenderer};
use kubeguard::runner::Runner;
use kubeguard::types::VerdictKind;

/// Exit status when an automated control fails.
const EXIT_FAILED_CONTROLS: u8 = 1;
/// Exit status for configuration and usage errors.
const EXIT_CONFIG_ERROR: u8 = 2;

/// kubeguard — CIS Kubernetes Benchmark auditor for worker nodes and cluster policy.
#[derive(Parser)]
#[command(name = "kubeguard", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Evaluate every control and print the report.
    Audit {
        /// Report format.
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Deadline for guarded cluster queries, in seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,
        /// Only run one benchmark chapter.
        #[arg(long, value_parser = ["4", "5"])]
        section: Option<String>,
        /// Also write a JSON log under this directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Log evidence decisions to stderr.
        #[arg(long, short)]
        verbose: bool,
    },
    /// List the controls in the catalog.
    List,
    /// Describe one control and its evidence plan.
    Explain {
        /// Control id, e.g. `4.2.1`.
        id: String,
    },
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// One line per control plus a summary.
    Text,
    /// A single JSON document.
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Audit {
            format,
            deadline_secs,
            section,
            log_dir,
            verbose,
        } => handle_audit(format, deadline_secs, section, log_dir, verbose).await,
        Command::List => {
            logging::init_cli(false);
            handle_list()
        }
        Command::Explain { id } => {
            logging::init_cli(false);
            handle_explain(&id)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "kubeguard failed");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

/// Run the audit and stream the report to stdout.
async fn handle_audit(
    format: Format,
    deadline_secs: Option<u64>,
    section: Option<String>,
    log_dir: Option<PathBuf>,
    verbose: bool,
) -> anyhow::Result<ExitCode> {
    let _logging_guard = match &log_dir {
        Some(dir) => Some(logging::init_file(dir, verbose)?),
        None => {
            logging::init_cli(verbose);
            None
        }
    };

    let mut config = AuditConfig::load().context("failed to load configuration")?;
    if let Some(secs) = deadline_secs {
        config.api.deadline_secs = secs;
    }

    let mut catalog = Catalog::cis_v1_9().context("built-in catalog is invalid")?;
    if let Some(chapter) = &section {
        catalog = catalog.only_chapter(chapter);
    }
    info!(
        benchmark = BENCHMARK,
        controls = catalog.len(),
        deadline_secs = config.api.deadline_secs,
        "starting audit"
    );

    let runner = Runner::connect(catalog, config).await;
    let mut run = runner.run_all();

    let failed = match format {
        Format::Text => {
            let stdout = io::stdout();
            let mut renderer = TextRenderer::new(stdout.lock());
            let mut failed = false;
            while let Some(result) = run.next().await {
                if result.automated && result.verdict.kind() == VerdictKind::Fail {
                    failed = true;
                }
                renderer.render(&result).context("failed to write report")?;
            }
            let summary = renderer.finish().context("failed to write report")?;
            info!(?summary, "audit finished");
            failed
        }
        Format::Json => {
            let report = AuditReport::collect(run.collect_all().await);
            let json = report.to_json().context("failed to serialize report")?;
            writeln!(io::stdout(), "{json}").context("failed to write report")?;
            info!(summary = ?report.summary, "audit finished");
            report.has_automated_failure()
        }
    };

    Ok(if failed {
        ExitCode::from(EXIT_FAILED_CONTROLS)
    } else {
        ExitCode::SUCCESS
    })
}

/// Print one line per control.
fn handle_list() -> anyhow::Result<ExitCode> {
    let catalog = Catalog::cis_v1_9().context("built-in catalog is invalid")?;
    let mut out = io::stdout().lock();
    for control in catalog.controls() {
        let mode = if control.is_automated() {
            "automated"
        } else {
            "manual"
        };
        writeln!(out, "{:<8} {:<10} {}", control.id, mode, control.title)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Print a control's title, evidence plan and remediation.
fn handle_explain(id: &str) -> anyhow::Result<ExitCode> {
    let catalog = Catalog::cis_v1_9().context("built-in catalog is invalid")?;
    let control = catalog
        .get(id)
        .with_context(|| format!("unknown control {id}"))?;

    let mut out = io::stdout().lock();
    writeln!(out, "{} {}", control.id, control.title)?;
    match &control.kind {
        ControlKind::Automated { plan, shortfall } => {
            writeln!(out, "automated, shortfall: {shortfall:?}")?;
            for (i, probe) in plan.iter().enumerate() {
                writeln!(out, "  {}. {}", i.saturating_add(1), probe.describe())?;
            }
        }
        ControlKind::Manual => {
            writeln!(out, "manual")?;
            if let Some(target) = control.audit_target {
                let config = AuditConfig::load().context("failed to load configuration")?;
                writeln!(out, "  inspect: {}", config.path(target).display())?;
            }
        }
    }
    writeln!(out, "remediation: {}", control.remediation)?;
    Ok(ExitCode::SUCCESS)
}
