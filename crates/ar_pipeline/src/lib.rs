//! ar_pipeline — deterministic pipeline surface
//! (load → resolve → reconcile → consolidate → score → tag → rank → validate → build).
//!
//! Stages are pure functions over typed inputs; all file access goes through
//! `ar_io` and all arithmetic through `ar_algo`. The table is published only
//! when every fatal QA check passes.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span};

use ar_algo::allocation::{Apportioner, LargestRemainder};
use ar_core::config::{ConfigError, EngineConfig};
use ar_core::entities::AllocationLine;
use ar_io::hasher::normalize_rfc3339_utc_seconds;
use ar_io::loader::{self, InputPaths, LoadedContext, SourceTargets};
use ar_io::IoError;

pub mod build_result;
pub mod build_run_record;
pub mod consolidate;
pub mod load;
pub mod rank;
pub mod reconcile;
pub mod resolve_provenance;
pub mod score;
pub mod tag;
pub mod validate;

pub use build_result::{FinalLine, FinalTable, SideReport};
pub use build_run_record::RunRecord;
pub use reconcile::NonReconcilableGroup;
pub use resolve_provenance::{Provenance, ProvenanceMismatch};
pub use score::KpiColumnSummary;
pub use tag::Action;
pub use validate::{QaReport, Severity, ValidationIssue};

/// Engine identifiers recorded in every RunRecord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineMeta {
    pub vendor: String,
    pub name: String,
    pub version: String,
    pub build: String,
}

pub fn engine_identifiers() -> EngineMeta {
    EngineMeta {
        vendor: "ar".to_string(),
        name: "ar_engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: "dev".to_string(),
    }
}

/// Single error surface for the pipeline orchestration.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid weight configuration: {0}")]
    InvalidWeightConfiguration(ConfigError),

    #[error("invalid configuration: {0}")]
    Config(ConfigError),

    /// A fatal QA check failed; the table was not published.
    #[error("reconciliation invariant violation: final table withheld")]
    ReconciliationInvariantViolation { report: Box<QaReport> },

    #[error(transparent)]
    Load(#[from] IoError),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("build error: {0}")]
    Build(String),
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidWeightConfiguration { .. } | ConfigError::InvalidWeight { .. } => {
                EngineError::InvalidWeightConfiguration(e)
            }
            other => EngineError::Config(other),
        }
    }
}

/// Pipeline context: inputs already loaded and shape-validated by `ar_io`.
#[derive(Debug)]
pub struct EngineCtx {
    pub loaded: LoadedContext,
    pub engine_meta: EngineMeta,
    /// RFC 3339 UTC; supplied by the caller so runs are reproducible.
    pub timestamp_utc: String,
}

impl EngineCtx {
    pub fn new(loaded: LoadedContext, timestamp_utc: impl Into<String>) -> Self {
        Self { loaded, engine_meta: engine_identifiers(), timestamp_utc: timestamp_utc.into() }
    }
}

/// Table-level products of one reconciliation, before any run metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOutputs {
    pub table: FinalTable,
    pub qa_report: QaReport,
    pub side_report: SideReport,
    pub kpi_summary: Vec<KpiColumnSummary>,
}

#[derive(Debug, Clone)]
pub struct EngineOutputs {
    pub table: FinalTable,
    pub qa_report: QaReport,
    pub side_report: SideReport,
    pub run_record: RunRecord,
    pub kpi_summary: Vec<KpiColumnSummary>,
}

// -------------------------------------- Public API --------------------------------------

/// Resolve, reconcile, consolidate, score, tag, rank and self-verify.
pub fn reconcile_table(
    lines: &[AllocationLine],
    sources: &[SourceTargets],
    config: &EngineConfig,
    apportioner: &dyn Apportioner,
) -> Result<TableOutputs, EngineError> {
    config.validate()?;

    let resolved = {
        let _span = info_span!("resolve_provenance").entered();
        resolve_provenance::resolve_provenance(lines, sources, config)
    };

    let outcome = {
        let _span = info_span!("reconcile", apportioner = apportioner.name()).entered();
        reconcile::reconcile(lines, &resolved, apportioner, config.reconcile.parallel)
    };

    let (consolidated, consolidated_rows) = {
        let _span = info_span!("consolidate").entered();
        consolidate::consolidate(outcome.lines)
    };

    let (scored, kpi_summary) = {
        let _span = info_span!("score").entered();
        score::score(consolidated, &config.scoring.weights)
    };

    let table = {
        let _span = info_span!("tag_rank").entered();
        build_result::build_table(rank::rank(tag::tag(scored)))
    };
    let side_report = SideReport { non_reconcilable_groups: outcome.non_reconcilable };

    let mut qa_report = {
        let _span = info_span!("validate").entered();
        validate::validate(
            lines,
            &resolved,
            &table.rows,
            validate::AuditCounts {
                consolidated_rows,
                non_reconcilable_groups: side_report.non_reconcilable_groups.len(),
            },
        )
    };

    if !qa_report.passed {
        for issue in qa_report.issues().iter().filter(|i| i.severity == Severity::Error) {
            error!(code = issue.code, "{}", issue.message);
        }
        return Err(EngineError::ReconciliationInvariantViolation { report: Box::new(qa_report) });
    }

    let digest = build_result::table_sha256(&table).map_err(|e| EngineError::Build(e.to_string()))?;
    qa_report.table_sha256 = Some(digest);

    info!(
        rows = table.len(),
        groups = resolved.targets.len(),
        non_reconcilable = side_report.non_reconcilable_groups.len(),
        mismatches = qa_report.provenance_mismatches.len(),
        "final table verified"
    );
    Ok(TableOutputs { table, qa_report, side_report, kpi_summary })
}

/// Orchestrate the pipeline with a preloaded context and the default apportionment.
pub fn run_with_ctx(ctx: EngineCtx) -> Result<EngineOutputs, EngineError> {
    run_with_apportioner(ctx, &LargestRemainder)
}

/// Same as `run_with_ctx` with an explicit apportionment method.
pub fn run_with_apportioner(ctx: EngineCtx, apportioner: &dyn Apportioner) -> Result<EngineOutputs, EngineError> {
    // Reject a bad timestamp before any work.
    normalize_rfc3339_utc_seconds(&ctx.timestamp_utc).map_err(|e| EngineError::InvalidTimestamp(e.to_string()))?;

    let TableOutputs { table, qa_report, side_report, kpi_summary } =
        reconcile_table(&ctx.loaded.lines, &ctx.loaded.targets, &ctx.loaded.config, apportioner)?;

    let run_record = {
        let _span = info_span!("build_run_record").entered();
        build_run_record::build_run_record(build_run_record::RunRecordParts {
            timestamp_utc: &ctx.timestamp_utc,
            engine: &ctx.engine_meta,
            config: &ctx.loaded.config,
            inputs: &ctx.loaded.digests,
            apportionment: apportioner.name(),
            table: &table,
            side_report: &side_report,
            qa_report: &qa_report,
        })?
    };
    debug!(run_id = %run_record.id, "run record built");

    Ok(EngineOutputs { table, qa_report, side_report, run_record, kpi_summary })
}

/// Load config and data and validate them without running any stage.
pub fn check_inputs(paths: &InputPaths) -> Result<LoadedContext, EngineError> {
    load::load_checked(paths)
}

pub fn run_from_paths(paths: &InputPaths, timestamp_utc: &str) -> Result<EngineOutputs, EngineError> {
    let loaded = load::load_checked(paths)?;
    run_with_ctx(EngineCtx::new(loaded, timestamp_utc))
}

/// Convenience entry: parse/verify a manifest, load via `ar_io`, then run.
pub fn run_from_manifest_path<P: AsRef<Path>>(path: P, timestamp_utc: &str) -> Result<EngineOutputs, EngineError> {
    let paths = loader::input_paths_from_manifest(path.as_ref())?;
    run_from_paths(&paths, timestamp_utc)
}
