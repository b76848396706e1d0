//! render_csv.rs — flat CSV view of the final table.
//!
//! One header row, one record per FinalLine in published order. Missing
//! values are empty cells; the tag bundle is joined with `|`.

use serde::Serialize;

use ar_pipeline::{FinalLine, FinalTable};

use crate::ReportError;

pub const TAG_SEPARATOR: &str = "|";

#[derive(Serialize)]
struct CsvRow<'a> {
    store_id: &'a str,
    group_name: &'a str,
    category: Option<&'a str>,
    subcategory: Option<&'a str>,
    raw_quantity: Option<f64>,
    rounded_quantity: i64,
    target_quantity: f64,
    priority_score: f64,
    action: &'static str,
    instruction: &'a str,
    tag_bundle: String,
    action_rank: u32,
    quantity_source_provenance: &'a str,
}

impl<'a> From<&'a FinalLine> for CsvRow<'a> {
    fn from(r: &'a FinalLine) -> Self {
        CsvRow {
            store_id: r.store_id.as_str(),
            group_name: &r.group_name,
            category: r.category.as_deref(),
            subcategory: r.subcategory.as_deref(),
            raw_quantity: r.raw_quantity,
            rounded_quantity: r.rounded_quantity,
            target_quantity: r.target_quantity,
            priority_score: r.priority_score,
            action: r.action.as_str(),
            instruction: &r.instruction,
            tag_bundle: r.tag_bundle.join(TAG_SEPARATOR),
            action_rank: r.action_rank,
            quantity_source_provenance: &r.quantity_source_provenance,
        }
    }
}

pub fn render_table_csv(table: &FinalTable) -> Result<Vec<u8>, ReportError> {
    let mut w = csv::WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    if table.is_empty() {
        // serialize() writes the header lazily; an empty table still gets one.
        w.write_record(HEADER)?;
    }
    for r in &table.rows {
        w.serialize(CsvRow::from(r))?;
    }
    w.into_inner().map_err(|e| ReportError::Csv(e.error().to_string()))
}

const HEADER: [&str; 13] = [
    "store_id",
    "group_name",
    "category",
    "subcategory",
    "raw_quantity",
    "rounded_quantity",
    "target_quantity",
    "priority_score",
    "action",
    "instruction",
    "tag_bundle",
    "action_rank",
    "quantity_source_provenance",
];
