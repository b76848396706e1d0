use std::fs;

use ar_algo::allocation::{AllocError, Apportioner, Apportionment};
use ar_core::config::EngineConfig;
use ar_core::entities::{AllocationLine, Dimensions, KpiValues};
use ar_io::loader::{InputDigests, LoadedContext};
use ar_pipeline::{run_with_apportioner, run_with_ctx, EngineCtx, EngineError};
use ar_report::*;

const TS: &str = "2025-08-12T10:00:00Z";

fn ctx() -> EngineCtx {
    let lines = vec![
        AllocationLine::new(
            "S1".parse().unwrap(),
            Dimensions::new("G1", Some("Shoes".into()), Some("Boots".into())),
            Some(1.6),
            KpiValues { expected_benefit: Some(0.7), ..Default::default() },
            vec![Some("winter".into()), Some("women".into())],
            0,
        ),
        AllocationLine::new(
            "S2".parse().unwrap(),
            Dimensions::new("G1", Some("Shoes".into()), Some("Boots".into())),
            None,
            KpiValues::default(),
            vec![],
            1,
        ),
    ];
    let loaded = LoadedContext {
        config: EngineConfig::default(),
        lines,
        targets: vec![],
        digests: InputDigests::default(),
    };
    EngineCtx::new(loaded, TS)
}

/// Ignores the target and hands every line five units.
struct FivePerLine;

impl Apportioner for FivePerLine {
    fn name(&self) -> &'static str {
        "five_per_line"
    }
    fn apportion(&self, values: &[f64], target: i64) -> Result<Apportionment, AllocError> {
        if values.is_empty() {
            return Err(AllocError::NoLines { target });
        }
        Ok(Apportionment { quantities: vec![5; values.len()], ..Default::default() })
    }
}

#[test]
fn csv_has_header_and_joined_tags() {
    let out = run_with_ctx(ctx()).unwrap();
    let csv = String::from_utf8(render_table_csv(&out.table).unwrap()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "store_id,group_name,category,subcategory,raw_quantity,rounded_quantity,target_quantity,\
         priority_score,action,instruction,tag_bundle,action_rank,quantity_source_provenance"
    );
    let first = lines.next().unwrap();
    assert!(first.starts_with("S1,G1,Shoes,Boots,1.6,2,"));
    assert!(first.contains("winter|women"));
    assert!(first.contains("Add 2 units in Shoes/Boots (winter, women)"));
    // S2 has no raw quantity: empty cell
    let second = lines.next().unwrap();
    assert!(second.starts_with("S2,G1,Shoes,Boots,,0,"));
}

#[test]
fn qa_json_keeps_published_key_order() {
    let out = run_with_ctx(ctx()).unwrap();
    let text = String::from_utf8(render_qa_json(&out.qa_report).unwrap()).unwrap();
    let keys = [
        "\"passed\"",
        "\"group_sum_check\"",
        "\"integer_type_check\"",
        "\"duplicate_key_check\"",
        "\"missing_required_field_report\"",
        "\"provenance_mismatches\"",
        "\"duplicate_source_entries\"",
        "\"consolidated_rows\"",
        "\"non_reconcilable_groups\"",
        "\"table_sha256\"",
    ];
    let pos: Vec<usize> = keys.iter().map(|k| text.find(k).unwrap()).collect();
    assert!(pos.windows(2).all(|w| w[0] < w[1]), "{text}");
    assert!(text.ends_with('\n'));
}

#[test]
fn successful_run_writes_full_set() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_with_ctx(ctx()).unwrap();
    let written = write_outputs(dir.path(), &out).unwrap();
    assert_eq!(written.len(), 5);
    for f in [QA_REPORT_FILE, TABLE_CSV_FILE, TABLE_JSON_FILE, SIDE_REPORT_FILE, RUN_RECORD_FILE] {
        assert!(dir.path().join(f).is_file(), "{f} missing");
    }
    let run: serde_json::Value = serde_json::from_slice(&fs::read(dir.path().join(RUN_RECORD_FILE)).unwrap()).unwrap();
    assert_eq!(run["outputs"]["rows"], 2);
    assert_eq!(run["apportionment"], "largest_remainder");
}

#[test]
fn failed_run_writes_only_qa_and_clears_stale_table() {
    let dir = tempfile::tempdir().unwrap();
    write_outputs(dir.path(), &run_with_ctx(ctx()).unwrap()).unwrap();

    let err = run_with_apportioner(ctx(), &FivePerLine).unwrap_err();
    let EngineError::ReconciliationInvariantViolation { report } = err else {
        panic!("expected invariant violation");
    };
    write_failed_qa(dir.path(), &report).unwrap();

    assert!(dir.path().join(QA_REPORT_FILE).is_file());
    for f in [TABLE_CSV_FILE, TABLE_JSON_FILE, SIDE_REPORT_FILE, RUN_RECORD_FILE] {
        assert!(!dir.path().join(f).exists(), "{f} should be gone");
    }
    let qa: serde_json::Value = serde_json::from_slice(&fs::read(dir.path().join(QA_REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(qa["passed"], false);
    assert!(qa["table_sha256"].is_null());
}
