//! crates/ar_pipeline/src/build_run_record.rs
//! Assemble the RunRecord and derive its `RUN:<ts>:<hex>` id.
//!
//! The id hashes the canonical bytes of the record *without* its id field.
//! `config_sha256` covers the normative config only: the sequential/parallel
//! switch is an execution knob and must not change the digest.

use std::collections::BTreeMap;

use serde::Serialize;

use ar_core::config::{EngineConfig, InputConfig, ProvenanceConfig, ScoringConfig};
use ar_io::hasher::{normalize_rfc3339_utc_seconds, run_id_from_canonical, sha256_canonical};
use ar_io::loader::InputDigests;

use crate::build_result::{FinalTable, SideReport};
use crate::tag::Action;
use crate::validate::QaReport;
use crate::{EngineError, EngineMeta};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub timestamp_utc: String,
    pub engine: EngineMeta,
    pub config_sha256: String,
    pub inputs: InputDigests,
    pub apportionment: String,
    pub outputs: RunOutputs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutputs {
    pub table_sha256: String,
    pub rows: usize,
    /// Keyed by the wire name of the action.
    pub actions: BTreeMap<String, usize>,
    pub non_reconcilable_groups: usize,
    pub provenance_mismatches: usize,
    pub consolidated_rows: usize,
}

#[derive(Serialize)]
struct NormativeConfig<'a> {
    provenance: &'a ProvenanceConfig,
    scoring: &'a ScoringConfig,
    input: &'a InputConfig,
}

pub fn config_sha256(config: &EngineConfig) -> Result<String, EngineError> {
    let view = NormativeConfig {
        provenance: &config.provenance,
        scoring: &config.scoring,
        input: &config.input,
    };
    sha256_canonical(&view).map_err(|e| EngineError::Build(e.to_string()))
}

pub struct RunRecordParts<'a> {
    pub timestamp_utc: &'a str,
    pub engine: &'a EngineMeta,
    pub config: &'a EngineConfig,
    pub inputs: &'a InputDigests,
    pub apportionment: &'a str,
    pub table: &'a FinalTable,
    pub side_report: &'a SideReport,
    pub qa_report: &'a QaReport,
}

pub fn build_run_record(p: RunRecordParts<'_>) -> Result<RunRecord, EngineError> {
    let timestamp = normalize_rfc3339_utc_seconds(p.timestamp_utc)
        .map_err(|e| EngineError::InvalidTimestamp(e.to_string()))?;

    let table_sha256 = match &p.qa_report.table_sha256 {
        Some(h) => h.clone(),
        None => return Err(EngineError::Build("run record requires a published table".into())),
    };

    let outputs = RunOutputs {
        table_sha256,
        rows: p.table.len(),
        actions: Action::ALL
            .iter()
            .map(|&a| (a.as_str().to_string(), p.table.count_action(a)))
            .collect(),
        non_reconcilable_groups: p.side_report.non_reconcilable_groups.len(),
        provenance_mismatches: p.qa_report.provenance_mismatches.len(),
        consolidated_rows: p.qa_report.consolidated_rows,
    };
    let config_sha256 = config_sha256(p.config)?;

    #[derive(Serialize)]
    struct RunNoId<'a> {
        timestamp_utc: &'a str,
        engine: &'a EngineMeta,
        config_sha256: &'a str,
        inputs: &'a InputDigests,
        apportionment: &'a str,
        outputs: &'a RunOutputs,
    }
    let no_id = RunNoId {
        timestamp_utc: &timestamp,
        engine: p.engine,
        config_sha256: &config_sha256,
        inputs: p.inputs,
        apportionment: p.apportionment,
        outputs: &outputs,
    };
    let id = run_id_from_canonical(&timestamp, &no_id).map_err(|e| EngineError::Build(e.to_string()))?;

    Ok(RunRecord {
        id,
        timestamp_utc: timestamp,
        engine: p.engine.clone(),
        config_sha256,
        inputs: p.inputs.clone(),
        apportionment: p.apportionment.to_string(),
        outputs,
    })
}
