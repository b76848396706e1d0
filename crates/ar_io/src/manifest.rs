// crates/ar_io/src/manifest.rs
//
// Manifest: one JSON document naming every input of a run.
//
// • Inputs are paths only: lines (CSV), one targets file per source (JSON),
//   optional engine config (TOML).
// • Offline-only: reject any path with a scheme ("://", "http:", "https:").
// • Relative paths resolve against the manifest's directory.
// • Digests (if provided) must be 64-lower-hex and only for present inputs;
//   they are verified over the raw file bytes.
// • Every named input must exist and be a file (not a dir).

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ar_core::ids::SourceName;

use crate::hasher::{is_lower_hex_64, sha256_file};

/// External manifest accepted by the loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Optional user-provided identifier (not part of any digest).
    #[serde(default)]
    pub id: Option<String>,
    pub lines_path: String,
    #[serde(default)]
    pub targets: Vec<TargetRef>,
    #[serde(default)]
    pub config_path: Option<String>,
    #[serde(default)]
    pub inputs_sha256: Option<ManifestDigests>,
}

/// One target source and the file it is read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetRef {
    pub source: SourceName,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestDigests {
    #[serde(default)]
    pub lines_path: Option<String>,
    #[serde(default)]
    pub config_path: Option<String>,
    /// Keyed by source name.
    #[serde(default)]
    pub targets: BTreeMap<SourceName, String>,
}

/// Paths resolved against a base directory (usually the manifest's dir).
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub lines_path: PathBuf,
    /// In manifest order.
    pub targets: Vec<(SourceName, PathBuf)>,
    pub config_path: Option<PathBuf>,
    pub digests: Option<ManifestDigests>,
}

/// Loader/validation errors.
#[derive(Debug)]
pub enum ManifestError {
    Empty(&'static str),
    UrlPath(&'static str, String),
    Io(&'static str, String),
    NotAFile(&'static str, String),
    DuplicateSource(String),
    /// Bad hex format / shape.
    DigestShape(String, String),
    /// Provided digest doesn't match the file.
    DigestMismatch(String, String),
    /// Digest provided for an input that is not present in the manifest.
    DigestForMissing(String),
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ManifestError::*;
        match self {
            Empty(k) => write!(f, "field must not be empty: {}", k),
            UrlPath(k, v) => write!(f, "path must be offline (no scheme) for {}: {}", k, v),
            Io(k, v) => write!(f, "cannot access {}: {}", k, v),
            NotAFile(k, v) => write!(f, "path is not a file for {}: {}", k, v),
            DuplicateSource(s) => write!(f, "target source listed twice: {}", s),
            DigestShape(k, v) => write!(f, "invalid sha256 format for {}: {}", k, v),
            DigestMismatch(k, v) => write!(f, "sha256 mismatch for {}: {}", k, v),
            DigestForMissing(k) => write!(f, "digest supplied for missing input: {}", k),
        }
    }
}
impl std::error::Error for ManifestError {}

// ---------- helpers (pure) ----------

#[inline]
fn has_any_scheme(s: &str) -> bool {
    s.contains("://") || s.starts_with("http:") || s.starts_with("https:")
}

#[inline]
fn join_under(base: &Path, rel: &str) -> PathBuf {
    let p = Path::new(rel);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn offline_check(label: &'static str, path: &str) -> Result<(), ManifestError> {
    if path.trim().is_empty() {
        return Err(ManifestError::Empty(label));
    }
    if has_any_scheme(path) {
        return Err(ManifestError::UrlPath(label, path.to_string()));
    }
    Ok(())
}

fn digest_shape(label: &str, h: &str) -> Result<(), ManifestError> {
    if !is_lower_hex_64(h) {
        return Err(ManifestError::DigestShape(label.to_string(), h.to_string()));
    }
    Ok(())
}

// ---------- validation (shape, offline, digests only for present paths) ----------

/// Validate manifest *shape* and offline path policy. Does not perform I/O.
pub fn validate_manifest(man: &Manifest) -> Result<(), ManifestError> {
    offline_check("lines_path", &man.lines_path)?;
    if let Some(c) = &man.config_path {
        offline_check("config_path", c)?;
    }

    let mut seen = std::collections::BTreeSet::new();
    for t in &man.targets {
        offline_check("targets.path", &t.path)?;
        if !seen.insert(t.source.as_str()) {
            return Err(ManifestError::DuplicateSource(t.source.to_string()));
        }
    }

    if let Some(d) = &man.inputs_sha256 {
        if let Some(h) = &d.lines_path {
            digest_shape("lines_path", h)?;
        }
        if let Some(h) = &d.config_path {
            if man.config_path.is_none() {
                return Err(ManifestError::DigestForMissing("config_path".into()));
            }
            digest_shape("config_path", h)?;
        }
        for (src, h) in &d.targets {
            if !seen.contains(src.as_str()) {
                return Err(ManifestError::DigestForMissing(format!("targets.{src}")));
            }
            digest_shape(&format!("targets.{src}"), h)?;
        }
    }
    Ok(())
}

// ---------- resolution (join base + existence/type checks) ----------

/// Resolve manifest paths under `base_dir`, ensure inputs exist and are files.
pub fn resolve_paths(base_dir: &Path, man: &Manifest) -> Result<ResolvedManifest, ManifestError> {
    let lines = join_under(base_dir, &man.lines_path);
    must_exist_file("lines_path", &lines)?;

    let mut targets = Vec::with_capacity(man.targets.len());
    for t in &man.targets {
        let p = join_under(base_dir, &t.path);
        must_exist_file("targets.path", &p)?;
        targets.push((t.source.clone(), p));
    }

    let config = man.config_path.as_ref().map(|s| join_under(base_dir, s));
    if let Some(p) = &config {
        must_exist_file("config_path", p)?;
    }

    Ok(ResolvedManifest {
        lines_path: lines,
        targets,
        config_path: config,
        digests: man.inputs_sha256.clone(),
    })
}

pub(crate) fn must_exist_file(label: &'static str, p: &Path) -> Result<(), ManifestError> {
    let md = fs::metadata(p).map_err(|e| ManifestError::Io(label, format!("{} ({e})", p.display())))?;
    if !md.is_file() {
        return Err(ManifestError::NotAFile(label, p.display().to_string()));
    }
    Ok(())
}

// ---------------------------- digests ----------------------------

fn check_one(path: &Path, expect_hex: &str, label: String) -> Result<(), ManifestError> {
    let got = sha256_file(path).map_err(|e| ManifestError::Io("hash", format!("{} ({e})", path.display())))?;
    if got != expect_hex {
        return Err(ManifestError::DigestMismatch(label, format!("expected={expect_hex} got={got}")));
    }
    Ok(())
}

/// Verify provided digests over raw file bytes. `Ok(())` when none were provided.
pub fn verify_digests(resolved: &ResolvedManifest) -> Result<(), ManifestError> {
    let Some(d) = &resolved.digests else { return Ok(()) };

    if let Some(hex) = &d.lines_path {
        check_one(&resolved.lines_path, hex, "lines_path".into())?;
    }
    match (&resolved.config_path, &d.config_path) {
        (Some(p), Some(hex)) => check_one(p, hex, "config_path".into())?,
        (None, Some(_)) => return Err(ManifestError::DigestForMissing("config_path".into())),
        _ => {}
    }
    for (src, hex) in &d.targets {
        let Some((_, p)) = resolved.targets.iter().find(|(s, _)| s == src) else {
            return Err(ManifestError::DigestForMissing(format!("targets.{src}")));
        };
        check_one(p, hex, format!("targets.{src}"))?;
    }
    Ok(())
}

// ---------------------------- top-level load ----------------------------

const MAX_MANIFEST_BYTES: u64 = 4 * 1024 * 1024;

/// Load a manifest JSON from `manifest_path`, validate, resolve under its
/// directory and verify digests.
pub fn load_and_resolve_manifest(manifest_path: &Path) -> Result<ResolvedManifest, ManifestError> {
    let f = fs::File::open(manifest_path)
        .map_err(|e| ManifestError::Io("read", format!("{} ({e})", manifest_path.display())))?;
    let mut buf = Vec::new();
    f.take(MAX_MANIFEST_BYTES)
        .read_to_end(&mut buf)
        .map_err(|e| ManifestError::Io("read", format!("{} ({e})", manifest_path.display())))?;

    let man: Manifest = serde_json::from_slice(&buf)
        .map_err(|e| ManifestError::Io("parse", format!("{} ({e})", manifest_path.display())))?;

    validate_manifest(&man)?;

    let base = manifest_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let resolved = resolve_paths(&base, &man)?;
    verify_digests(&resolved)?;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn man(json: &str) -> Manifest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn rejects_url_paths() {
        let m = man(r#"{"lines_path":"https://x/lines.csv","targets":[]}"#);
        assert!(matches!(validate_manifest(&m), Err(ManifestError::UrlPath("lines_path", _))));
        let m = man(r#"{"lines_path":"l.csv","targets":[{"source":"primary","path":"file:///t.json"}]}"#);
        assert!(matches!(validate_manifest(&m), Err(ManifestError::UrlPath("targets.path", _))));
    }

    #[test]
    fn rejects_duplicate_sources_and_orphan_digests() {
        let m = man(
            r#"{"lines_path":"l.csv","targets":[
                {"source":"primary","path":"a.json"},
                {"source":"primary","path":"b.json"}]}"#,
        );
        assert!(matches!(validate_manifest(&m), Err(ManifestError::DuplicateSource(_))));

        let h = "a".repeat(64);
        let m = man(&format!(
            r#"{{"lines_path":"l.csv","targets":[],"inputs_sha256":{{"targets":{{"secondary":"{h}"}}}}}}"#
        ));
        assert!(matches!(validate_manifest(&m), Err(ManifestError::DigestForMissing(_))));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<Manifest>(r#"{"lines_path":"l.csv","extra":1}"#).is_err());
    }

    #[test]
    fn resolves_relative_to_manifest_and_verifies_digests() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lines.csv"), "store_id\n").unwrap();
        fs::write(dir.path().join("primary.json"), r#"{"source":"primary","targets":[]}"#).unwrap();
        let good = crate::hasher::sha256_hex(b"store_id\n");
        let mp = dir.path().join("manifest.json");
        fs::write(
            &mp,
            format!(
                r#"{{"lines_path":"lines.csv","targets":[{{"source":"primary","path":"primary.json"}}],
                    "inputs_sha256":{{"lines_path":"{good}"}}}}"#
            ),
        )
        .unwrap();
        let r = load_and_resolve_manifest(&mp).unwrap();
        assert_eq!(r.lines_path, dir.path().join("lines.csv"));
        assert_eq!(r.targets[0].0.as_str(), "primary");

        let bad = "0".repeat(64);
        fs::write(
            &mp,
            format!(r#"{{"lines_path":"lines.csv","inputs_sha256":{{"lines_path":"{bad}"}}}}"#),
        )
        .unwrap();
        assert!(matches!(load_and_resolve_manifest(&mp), Err(ManifestError::DigestMismatch(_, _))));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mp = dir.path().join("manifest.json");
        fs::write(&mp, r#"{"lines_path":"nope.csv"}"#).unwrap();
        assert!(matches!(load_and_resolve_manifest(&mp), Err(ManifestError::Io("lines_path", _))));
    }
}
