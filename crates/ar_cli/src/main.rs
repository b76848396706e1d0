// crates/ar_cli/src/main.rs
//
// Wires up: exit codes, typed error mapping, logging, the validate-only
// short-circuit and the full run path (load → pipeline → artifacts).

mod args;

mod exitcodes {
    pub const OK: u8 = 0;
    /// Config, flag or input-shape problems.
    pub const VALIDATION: u8 = 2;
    /// Reconciliation invariant violated; table withheld.
    pub const SELF_VERIFY: u8 = 3;
    pub const IO: u8 = 4;
}

use std::fmt;
use std::process::ExitCode;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ar_io::IoError;
use ar_pipeline::{check_inputs, run_with_ctx, EngineCtx, EngineError};
use ar_report::{write_failed_qa, write_outputs, ReportError};

use args::{parse_and_validate, Args};

/// Central error type for CLI → exit-code mapping.
#[derive(Debug)]
enum MainError {
    Engine(EngineError),
    Report(ReportError),
}

impl fmt::Display for MainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MainError::Engine(e) => write!(f, "{e}"),
            MainError::Report(e) => write!(f, "{e}"),
        }
    }
}

impl From<EngineError> for MainError {
    fn from(e: EngineError) -> Self {
        MainError::Engine(e)
    }
}

impl From<IoError> for MainError {
    fn from(e: IoError) -> Self {
        MainError::Engine(EngineError::Load(e))
    }
}

impl From<ReportError> for MainError {
    fn from(e: ReportError) -> Self {
        MainError::Report(e)
    }
}

fn main() -> ExitCode {
    let args = match parse_and_validate() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("arc: error: {e}");
            return ExitCode::from(exitcodes::VALIDATION);
        }
    };
    init_tracing(&args);

    let result = if args.validate_only { validate_only(&args) } else { run_once(&args) };
    match result {
        Ok(()) => ExitCode::from(exitcodes::OK),
        Err(e) => {
            eprintln!("arc: error: {e}");
            ExitCode::from(map_error(&e))
        }
    }
}

/// stderr only; `RUST_LOG` wins over the flags.
fn init_tracing(args: &Args) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load config and inputs, validate, stop.
fn validate_only(args: &Args) -> Result<(), MainError> {
    let paths = args.input_paths()?;
    let loaded = check_inputs(&paths)?;
    info!(lines = loaded.lines.len(), sources = loaded.targets.len(), "inputs valid");
    if !args.quiet {
        eprintln!("validate-only: inputs OK");
    }
    Ok(())
}

fn run_once(args: &Args) -> Result<(), MainError> {
    let paths = args.input_paths()?;
    let mut loaded = check_inputs(&paths)?;
    if args.sequential {
        loaded.config.reconcile.parallel = false;
    }

    let timestamp = args
        .timestamp
        .clone()
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

    match run_with_ctx(EngineCtx::new(loaded, timestamp)) {
        Ok(outs) => {
            for c in &outs.kpi_summary {
                debug!(kpi = %c.kpi, present = c.present, min = ?c.min, max = ?c.max, degenerate = c.degenerate, "kpi column");
            }
            write_outputs(&args.out, &outs)?;
            if !args.quiet {
                eprintln!(
                    "run: {} rows, table {} written to {}",
                    outs.table.len(),
                    outs.qa_report.table_sha256.as_deref().unwrap_or("-"),
                    args.out.display()
                );
            }
            Ok(())
        }
        Err(EngineError::ReconciliationInvariantViolation { report }) => {
            // Fail closed: the QA report is the only artifact.
            write_failed_qa(&args.out, &report)?;
            Err(MainError::Engine(EngineError::ReconciliationInvariantViolation { report }))
        }
        Err(e) => Err(e.into()),
    }
}

/// Map typed errors to the exit-code table.
fn map_error(e: &MainError) -> u8 {
    use exitcodes::*;
    match e {
        MainError::Engine(e) => match e {
            EngineError::InvalidWeightConfiguration(_)
            | EngineError::Config(_)
            | EngineError::InvalidTimestamp(_) => VALIDATION,
            EngineError::ReconciliationInvariantViolation { .. } | EngineError::Build(_) => SELF_VERIFY,
            EngineError::Load(io) => match io {
                IoError::Path(_) | IoError::Hash(_) => IO,
                IoError::Json { .. }
                | IoError::Csv { .. }
                | IoError::Toml(_)
                | IoError::Manifest(_)
                | IoError::Invalid(_) => VALIDATION,
            },
        },
        MainError::Report(_) => IO,
    }
}
