// crates/ar_cli/src/args.rs
//
// Deterministic, offline CLI argument surface.
//
// Rules:
// - No networked paths (reject any scheme:// on every path flag)
// - Exactly one of: --manifest  XOR  (--lines + zero or more --target source=path)
// - --config only in explicit mode (a manifest names its own config)
// - --timestamp must be RFC 3339 UTC; normalized to seconds + `Z`
// - --validate-only loads and validates config and inputs without running

use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use ar_core::ids::SourceName;
use ar_io::hasher::normalize_rfc3339_utc_seconds;
use ar_io::loader::{input_paths_from_manifest, InputPaths};
use ar_io::{looks_like_url_strict, IoError};

/// Parsed CLI arguments (raw).
#[derive(Debug, Parser, Clone)]
#[command(
    name = "arc",
    version,
    disable_help_subcommand = true,
    about = "Reconcile fractional allocation lines to integer group targets and rank them"
)]
pub struct Args {
    // --- Mode selection ---
    /// Manifest JSON naming lines, targets and config (mutually exclusive with explicit flags).
    #[arg(long, conflicts_with_all = ["lines", "targets", "config"])]
    pub manifest: Option<PathBuf>,

    // --- Explicit mode ---
    /// Allocation lines CSV.
    #[arg(long)]
    pub lines: Option<PathBuf>,
    /// Target source as `<source>=<path>`; repeatable.
    #[arg(long = "target", value_name = "SOURCE=PATH", value_parser = parse_target)]
    pub targets: Vec<(SourceName, PathBuf)>,
    /// Engine config TOML (defaults when omitted).
    #[arg(long)]
    pub config: Option<PathBuf>,

    // --- Output ---
    /// Output directory (created if missing).
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    // --- Determinism & control ---
    /// Run timestamp (RFC 3339 UTC). Defaults to the current time.
    #[arg(long, value_parser = parse_timestamp)]
    pub timestamp: Option<String>,

    /// Reconcile groups on the calling thread instead of the rayon pool.
    #[arg(long)]
    pub sequential: bool,

    /// Load and validate config and inputs, do not run the engine.
    #[arg(long)]
    pub validate_only: bool,

    /// Only warnings and errors on stderr.
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,

    /// More log output (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

/// Errors surfaced by argument validation. Messages are short and stable.
#[derive(Debug)]
pub enum CliError {
    Missing(&'static str),
    NonLocalPath(String),
    NotFound(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use CliError::*;
        match self {
            Missing(s) => write!(f, "missing required flag: {s}"),
            NonLocalPath(p) => write!(f, "path must be local file (no scheme): {p}"),
            NotFound(p) => write!(f, "file not found: {p}"),
        }
    }
}
impl std::error::Error for CliError {}

/// `<source>=<path>`, source must be a valid source name.
pub fn parse_target(s: &str) -> Result<(SourceName, PathBuf), String> {
    let (name, path) = s.split_once('=').ok_or_else(|| format!("expected SOURCE=PATH, got {s:?}"))?;
    let source: SourceName = name.trim().parse().map_err(|e| format!("bad source name {name:?}: {e}"))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(format!("empty path for source {source}"));
    }
    Ok((source, PathBuf::from(path)))
}

pub fn parse_timestamp(s: &str) -> Result<String, String> {
    normalize_rfc3339_utc_seconds(s).map_err(|e| e.to_string())
}

/// Entry point used by main.rs
pub fn parse_and_validate() -> Result<Args, CliError> {
    let args = Args::parse();
    args.check()?;
    Ok(args)
}

impl Args {
    fn all_paths(&self) -> impl Iterator<Item = &Path> {
        [self.manifest.as_deref(), self.lines.as_deref(), self.config.as_deref(), Some(self.out.as_path())]
            .into_iter()
            .flatten()
            .chain(self.targets.iter().map(|(_, p)| p.as_path()))
    }

    pub fn check(&self) -> Result<(), CliError> {
        for p in self.all_paths() {
            ensure_local_path(p)?;
        }
        match &self.manifest {
            Some(m) => ensure_local_exists(m, "--manifest"),
            None => {
                let lines = self.lines.as_deref().ok_or(CliError::Missing("--manifest or --lines"))?;
                ensure_local_exists(lines, "--lines")?;
                for (source, p) in &self.targets {
                    ensure_local_exists(p, &format!("--target {source}"))?;
                }
                if let Some(c) = &self.config {
                    ensure_local_exists(c, "--config")?;
                }
                Ok(())
            }
        }
    }

    /// Resolve the input set; manifest mode reads and digest-verifies the manifest.
    pub fn input_paths(&self) -> Result<InputPaths, IoError> {
        match (&self.manifest, &self.lines) {
            (Some(m), _) => input_paths_from_manifest(m),
            (None, Some(lines)) => Ok(InputPaths {
                lines: lines.clone(),
                targets: self.targets.clone(),
                config: self.config.clone(),
            }),
            (None, None) => Err(IoError::Invalid("no inputs given".into())),
        }
    }
}

#[inline]
fn ensure_local_path(p: &Path) -> Result<(), CliError> {
    match p.to_str() {
        Some(s) if looks_like_url_strict(s) => Err(CliError::NonLocalPath(s.to_string())),
        _ => Ok(()),
    }
}

fn ensure_local_exists(p: &Path, label: &str) -> Result<(), CliError> {
    match fs::metadata(p) {
        Ok(m) if m.is_file() => Ok(()),
        _ => Err(CliError::NotFound(format!("{label} {}", p.display()))),
    }
}
