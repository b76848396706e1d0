//! Loader: read local input files (manifest → config → lines → targets),
//! validate shapes, and return a typed `LoadedContext` for the pipeline.
//! No network I/O.
//!
//! Config is loaded on its own first so callers can reject it before any
//! data file is touched.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ar_core::config::{EngineConfig, InputConfig};
use ar_core::entities::{tag_bundle, AllocationLine, Dimensions, GroupKey, Kpi, KpiValues};
use ar_core::ids::{SourceName, StoreId};

use crate::hasher::sha256_file;
use crate::manifest::{self as man, must_exist_file};
use crate::IoError;

// ----------------------------- Public wire-facing types -----------------------------

/// One group target as supplied by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetEntry {
    pub group_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Only consulted for fallback keys (no category/subcategory).
    #[serde(default)]
    pub tags: Vec<String>,
    /// `null` / absent means the source has no value for this group.
    #[serde(default)]
    pub target: Option<f64>,
}

impl TargetEntry {
    /// Group key under the same derivation rules as allocation lines.
    pub fn group_key(&self) -> GroupKey {
        let dims = Dimensions::new(self.group_name.trim(), self.category.clone(), self.subcategory.clone());
        let attrs: Vec<Option<String>> = self.tags.iter().cloned().map(Some).collect();
        GroupKey::derive(&dims, &tag_bundle(&attrs))
    }

    /// Target value; non-finite reads as missing.
    pub fn value(&self) -> Option<f64> {
        self.target.filter(|v| v.is_finite())
    }
}

/// On-disk shape of a targets file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetFile {
    #[serde(default)]
    pub source: Option<SourceName>,
    pub targets: Vec<TargetEntry>,
}

/// Targets of one named source, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTargets {
    pub source: SourceName,
    pub entries: Vec<TargetEntry>,
}

/// Where the inputs of one run live.
#[derive(Debug, Clone, Default)]
pub struct InputPaths {
    pub lines: PathBuf,
    /// `(source, path)` in the order given by the caller.
    pub targets: Vec<(SourceName, PathBuf)>,
    pub config: Option<PathBuf>,
}

/// SHA-256 of every input file's raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDigests {
    pub lines_sha256: String,
    pub targets_sha256: BTreeMap<String, String>,
    pub config_sha256: Option<String>,
}

/// Loaded, shape-validated inputs for the pipeline.
#[derive(Debug, Clone)]
pub struct LoadedContext {
    pub config: EngineConfig,
    pub lines: Vec<AllocationLine>,
    pub targets: Vec<SourceTargets>,
    pub digests: InputDigests,
}

// ----------------------------- Orchestration -----------------------------

/// Resolve (and digest-verify) the inputs named by a manifest file.
pub fn input_paths_from_manifest(path: &Path) -> Result<InputPaths, IoError> {
    let resolved = man::load_and_resolve_manifest(path)?;
    Ok(InputPaths {
        lines: resolved.lines_path,
        targets: resolved.targets,
        config: resolved.config_path,
    })
}

/// Engine config from TOML, or defaults when no file is given. Not validated here.
pub fn load_config_or_default(path: Option<&Path>) -> Result<EngineConfig, IoError> {
    match path {
        Some(p) => load_config(p),
        None => Ok(EngineConfig::default()),
    }
}

pub fn load_config(path: &Path) -> Result<EngineConfig, IoError> {
    must_exist_file("config_path", path)?;
    let text = fs::read_to_string(path).map_err(|e| IoError::Path(format!("{}: {e}", path.display())))?;
    let cfg: EngineConfig = toml::from_str(&text)?;
    Ok(cfg)
}

/// Load lines and targets with an already-validated `config`.
pub fn load_data(paths: &InputPaths, config: EngineConfig) -> Result<LoadedContext, IoError> {
    must_exist_file("lines_path", &paths.lines)?;
    let lines = load_lines(&paths.lines, &config.input)?;

    let mut targets = Vec::with_capacity(paths.targets.len());
    let mut targets_sha256 = BTreeMap::new();
    for (source, p) in &paths.targets {
        if targets_sha256.contains_key(source.as_str()) {
            return Err(IoError::Invalid(format!("target source given twice: {source}")));
        }
        must_exist_file("targets.path", p)?;
        targets.push(load_targets(p, Some(source))?);
        targets_sha256.insert(source.to_string(), sha256_file(p)?);
    }

    let digests = InputDigests {
        lines_sha256: sha256_file(&paths.lines)?,
        targets_sha256,
        config_sha256: match &paths.config {
            Some(p) => Some(sha256_file(p)?),
            None => None,
        },
    };

    Ok(LoadedContext { config, lines, targets, digests })
}

// ----------------------------- Targets -----------------------------

/// Load one targets file. `expected` (from the manifest or CLI) must agree
/// with the file's own `source` when both are present.
pub fn load_targets(path: &Path, expected: Option<&SourceName>) -> Result<SourceTargets, IoError> {
    let bytes = fs::read(path).map_err(|e| IoError::Path(format!("{}: {e}", path.display())))?;
    let file: TargetFile = serde_json::from_slice(&bytes)?;
    parse_target_file(file, expected)
}

fn parse_target_file(file: TargetFile, expected: Option<&SourceName>) -> Result<SourceTargets, IoError> {
    let source = match (file.source, expected) {
        (Some(a), Some(b)) if &a != b => {
            return Err(IoError::Invalid(format!("targets file declares source {a}, expected {b}")));
        }
        (Some(a), _) => a,
        (None, Some(b)) => b.clone(),
        (None, None) => return Err(IoError::Invalid("targets file has no source name".into())),
    };
    for (i, t) in file.targets.iter().enumerate() {
        if t.group_name.trim().is_empty() {
            return Err(IoError::Json {
                pointer: format!("/targets/{i}/group_name"),
                msg: "group_name must not be blank".into(),
            });
        }
        check_quantity(t.target).map_err(|msg| IoError::Json { pointer: format!("/targets/{i}/target"), msg })?;
    }
    Ok(SourceTargets { source, entries: file.targets })
}

// ----------------------------- Lines (CSV) -----------------------------

pub const COL_STORE_ID: &str = "store_id";
pub const COL_GROUP_NAME: &str = "group_name";
pub const COL_CATEGORY: &str = "category";
pub const COL_SUBCATEGORY: &str = "subcategory";
pub const COL_RAW_QUANTITY: &str = "raw_quantity";

pub fn load_lines(path: &Path, input: &InputConfig) -> Result<Vec<AllocationLine>, IoError> {
    let f = fs::File::open(path).map_err(|e| IoError::Path(format!("{}: {e}", path.display())))?;
    parse_lines(f, input)
}

/// Parse allocation lines from CSV with a header row. Only `store_id`,
/// `group_name` and `raw_quantity` columns are mandatory; absent optional
/// columns read as missing values.
pub fn parse_lines<R: Read>(reader: R, input: &InputConfig) -> Result<Vec<AllocationLine>, IoError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| IoError::Csv { line: 1, column: "-".into(), msg: e.to_string() })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let find = |name: &str| headers.iter().position(|h| h == name);
    let require = |name: &str| {
        find(name).ok_or_else(|| IoError::Csv { line: 1, column: name.into(), msg: "missing required column".into() })
    };

    let store_ix = require(COL_STORE_ID)?;
    let group_ix = require(COL_GROUP_NAME)?;
    let raw_ix = require(COL_RAW_QUANTITY)?;
    let cat_ix = find(COL_CATEGORY);
    let sub_ix = find(COL_SUBCATEGORY);
    let kpi_ix: Vec<(Kpi, Option<usize>)> = Kpi::ALL.iter().map(|k| (*k, find(k.as_str()))).collect();
    let attr_ix: Vec<Option<usize>> = input.attribute_columns.iter().map(|c| find(c.as_str())).collect();

    let mut lines = Vec::new();
    for (seq, rec) in rdr.records().enumerate() {
        let line_no = seq as u64 + 2;
        let rec = rec.map_err(|e| IoError::Csv { line: line_no, column: "-".into(), msg: e.to_string() })?;
        let cell = |ix: usize| rec.get(ix).map(str::trim).unwrap_or("");
        let opt_cell = |ix: Option<usize>| ix.map(|i| cell(i)).filter(|s| !s.is_empty()).map(str::to_string);
        let csv_err = |column: &str, msg: String| IoError::Csv { line: line_no, column: column.into(), msg };

        let store_id: StoreId = cell(store_ix)
            .parse()
            .map_err(|e| csv_err(COL_STORE_ID, format!("{e}")))?;

        let group_name = cell(group_ix);
        if group_name.is_empty() {
            return Err(csv_err(COL_GROUP_NAME, "group_name must not be blank".into()));
        }

        let raw_quantity = parse_number(cell(raw_ix))
            .and_then(check_quantity)
            .map_err(|m| csv_err(COL_RAW_QUANTITY, m))?;

        let mut kpis = KpiValues::default();
        for (kpi, ix) in &kpi_ix {
            if let Some(i) = ix {
                let v = parse_number(cell(*i)).map_err(|m| csv_err(kpi.as_str(), m))?;
                kpis.set(*kpi, v);
            }
        }

        let attrs: Vec<Option<String>> = attr_ix.iter().map(|ix| opt_cell(*ix)).collect();
        let dims = Dimensions::new(group_name, opt_cell(cat_ix), opt_cell(sub_ix));

        lines.push(AllocationLine::new(store_id, dims, raw_quantity, kpis, attrs, seq));
    }
    Ok(lines)
}

/// Largest magnitude a quantity may have: 2^53, past which f64 no longer
/// represents every integer and group sums stop being exact.
pub const MAX_ABS_QUANTITY: f64 = 9_007_199_254_740_992.0;

fn check_quantity(v: Option<f64>) -> Result<Option<f64>, String> {
    match v {
        Some(x) if !x.is_finite() || x.abs() > MAX_ABS_QUANTITY => {
            Err(format!("quantity {x} is outside ±{MAX_ABS_QUANTITY}"))
        }
        _ => Ok(v),
    }
}

/// Empty and NA-style cells are missing; anything else must parse as a number.
fn parse_number(s: &str) -> Result<Option<f64>, String> {
    if s.is_empty() || ["na", "n/a", "nan", "null", "none"].iter().any(|m| s.eq_ignore_ascii_case(m)) {
        return Ok(None);
    }
    s.parse::<f64>().map(Some).map_err(|_| format!("not a number: {s:?}"))
}
