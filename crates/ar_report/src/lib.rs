//! ar_report/src/lib.rs — offline renderers + artifact writer.
//!
//! Renderers are pure (value → bytes). `write_outputs` publishes the full set;
//! `write_failed_qa` is the fail-closed path: only `qa_report.json` is written
//! and any table left over from an earlier run in the same directory is removed.

#![deny(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use ar_io::canonical_json::write_bytes_atomic;
use ar_pipeline::{EngineOutputs, QaReport};

pub mod render_json;
#[cfg(feature = "render_csv")]
pub mod render_csv;

pub use render_json::{render_qa_json, render_run_record_json, render_side_report_json, render_table_json};
#[cfg(feature = "render_csv")]
pub use render_csv::render_table_csv;

pub const QA_REPORT_FILE: &str = "qa_report.json";
pub const TABLE_CSV_FILE: &str = "final_table.csv";
pub const TABLE_JSON_FILE: &str = "final_table.json";
pub const SIDE_REPORT_FILE: &str = "non_reconcilable_groups.json";
pub const RUN_RECORD_FILE: &str = "run_record.json";

/// Artifacts only written when the table is published.
const PUBLISHED_FILES: [&str; 4] = [TABLE_CSV_FILE, TABLE_JSON_FILE, SIDE_REPORT_FILE, RUN_RECORD_FILE];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("json render error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv render error: {0}")]
    Csv(String),

    #[error("write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[cfg(feature = "render_csv")]
impl From<csv::Error> for ReportError {
    fn from(e: csv::Error) -> Self {
        ReportError::Csv(e.to_string())
    }
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, ReportError> {
    let path = dir.join(name);
    write_bytes_atomic(&path, bytes).map_err(|source| ReportError::Write { path: path.clone(), source })?;
    debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
    Ok(path)
}

fn ensure_dir(dir: &Path) -> Result<(), ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::Write { path: dir.to_path_buf(), source })
}

/// Write every artifact of a successful run into `dir`. Returns the written paths.
pub fn write_outputs(dir: &Path, out: &EngineOutputs) -> Result<Vec<PathBuf>, ReportError> {
    ensure_dir(dir)?;
    let mut written = Vec::with_capacity(5);

    #[cfg(feature = "render_csv")]
    written.push(write_file(dir, TABLE_CSV_FILE, &render_table_csv(&out.table)?)?);
    written.push(write_file(dir, TABLE_JSON_FILE, &render_table_json(&out.table)?)?);
    written.push(write_file(dir, SIDE_REPORT_FILE, &render_side_report_json(&out.side_report)?)?);
    written.push(write_file(dir, RUN_RECORD_FILE, &render_run_record_json(&out.run_record)?)?);
    // QA last: its presence with `passed: true` marks a complete set.
    written.push(write_file(dir, QA_REPORT_FILE, &render_qa_json(&out.qa_report)?)?);

    info!(dir = %dir.display(), files = written.len(), "outputs published");
    Ok(written)
}

/// Fail-closed: write only the QA report and drop stale published artifacts.
pub fn write_failed_qa(dir: &Path, qa: &QaReport) -> Result<PathBuf, ReportError> {
    ensure_dir(dir)?;
    for name in PUBLISHED_FILES {
        let p = dir.join(name);
        match fs::remove_file(&p) {
            Ok(()) => debug!(path = %p.display(), "stale artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(ReportError::Write { path: p, source }),
        }
    }
    write_file(dir, QA_REPORT_FILE, &render_qa_json(qa)?)
}
