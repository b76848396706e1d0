//! render_json.rs — JSON renderers for the published artifacts.
//!
//! Key order follows struct field order (`serde_json/preserve_order` is on
//! workspace-wide). Output is pretty-printed with a trailing newline; the same
//! value always renders to the same bytes.

use serde::Serialize;

use ar_pipeline::{FinalTable, QaReport, RunRecord, SideReport};

use crate::ReportError;

fn pretty<T: Serialize>(value: &T) -> Result<Vec<u8>, ReportError> {
    let mut out = serde_json::to_vec_pretty(value)?;
    out.push(b'\n');
    Ok(out)
}

pub fn render_qa_json(qa: &QaReport) -> Result<Vec<u8>, ReportError> {
    pretty(qa)
}

/// `{"rows": [...]}`.
pub fn render_table_json(table: &FinalTable) -> Result<Vec<u8>, ReportError> {
    pretty(table)
}

pub fn render_side_report_json(side: &SideReport) -> Result<Vec<u8>, ReportError> {
    pretty(side)
}

pub fn render_run_record_json(run: &RunRecord) -> Result<Vec<u8>, ReportError> {
    pretty(run)
}
