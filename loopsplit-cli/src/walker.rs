//! Input Path Walking
//!
//! Dispatches each positional path argument to the right handler
//! (`.class` vs `.jar`, everything else ignored), applies the
//! `--exclude-packages`/`--exclude-classes` filters, and writes results back
//! with a temp-file-then-rename so a crash mid-write never leaves a
//! half-written `.class` file behind.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use loopsplit_core::verify::StructuralVerifier;
use loopsplit_core::{transform_method, LoopSplitError};

use crate::classio::class::ClassFile;
use crate::classio::{CapturedMethodSink, ClassMethodAdapter};
use crate::error::{DriverError, FileOutcome};
use crate::jarfile::rewrite_jar;

/// Parsed `--exclude-packages`/`--exclude-classes` filters.
pub struct Exclusions {
    /// Internal-name package prefixes (`com/example/internal`), matched
    /// against a class's package by prefix.
    packages: Vec<String>,
    /// Internal class names, matched exactly.
    classes: Vec<String>,
}

impl Exclusions {
    pub fn parse(exclude_packages: Option<&str>, exclude_classes: Option<&str>) -> Self {
        let packages = exclude_packages
            .map(|s| s.split(',').map(|p| p.trim().replace('.', "/")).filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        let classes = exclude_classes
            .map(|s| s.split(',').map(|c| c.trim().replace('.', "/")).filter(|c| !c.is_empty()).collect())
            .unwrap_or_default();
        Exclusions { packages, classes }
    }

    /// `internal_name` is slash-separated, e.g. `com/example/Foo`.
    pub fn excludes(&self, internal_name: &str) -> bool {
        if self.classes.iter().any(|c| c == internal_name) {
            return true;
        }
        self.packages.iter().any(|p| {
            internal_name.starts_with(p.as_str())
                && internal_name[p.len()..].starts_with('/')
        })
    }
}

/// Processes one CLI path argument, returning one outcome per `.class` file
/// found inside it (a bare `.class` path yields exactly one).
pub fn process_path(path: &Path, exclusions: &Exclusions) -> Vec<(String, FileOutcome)> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("class") => vec![(path.display().to_string(), process_class_file(path, exclusions))],
        Some("jar") => process_jar(path, exclusions),
        _ => {
            debug!("ignoring non-class, non-jar path: {}", path.display());
            vec![]
        }
    }
}

fn process_class_file(path: &Path, exclusions: &Exclusions) -> FileOutcome {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) => return FileOutcome::Failed(DriverError::from(e)),
    };
    let (outcome, rewritten) = match transform_class_bytes(&data, exclusions) {
        Ok(r) => r,
        Err(e) => return FileOutcome::Failed(e),
    };
    if let Some(bytes) = rewritten {
        if let Err(e) = write_atomically(path, &bytes) {
            return FileOutcome::Failed(DriverError::from(e));
        }
    }
    outcome
}

fn process_jar(path: &Path, exclusions: &Exclusions) -> Vec<(String, FileOutcome)> {
    let result = rewrite_jar(path, |name, data| {
        let internal_name = name.trim_end_matches(".class");
        if exclusions.excludes(internal_name) {
            return Ok((None, FileOutcome::Skipped { reason: "excluded".into() }));
        }
        match transform_class_bytes(&data, exclusions) {
            Ok((outcome, rewritten)) => Ok((rewritten, outcome)),
            Err(e) => Ok((None, FileOutcome::Failed(e))),
        }
    });
    match result {
        Ok(outcomes) => outcomes,
        Err(e) => vec![(path.display().to_string(), FileOutcome::Failed(DriverError::MalformedInput(e.to_string())))],
    }
}

/// Runs every method of one `.class` file's bytes through the transform.
/// Returns the aggregate outcome and, if anything changed, the re-encoded
/// class bytes.
fn transform_class_bytes(data: &[u8], exclusions: &Exclusions) -> Result<(FileOutcome, Option<Vec<u8>>), DriverError> {
    let mut class = ClassFile::parse(data).map_err(|e| DriverError::MalformedInput(e.to_string()))?;
    let this_class = class.this_class_name().unwrap_or("<unknown>").to_string();
    if exclusions.excludes(&this_class) {
        return Ok((FileOutcome::Skipped { reason: "excluded".into() }, None));
    }

    let mut methods_split = 0usize;
    let mut any_change = false;

    for i in 0..class.methods.len() {
        let adapter = {
            let method = &class.methods[i];
            ClassMethodAdapter::new(&class, method).map_err(|e| DriverError::MalformedInput(e.to_string()))?
        };
        let Some(adapter) = adapter else { continue };

        let mut sink = CapturedMethodSink::default();
        let mut verifier = StructuralVerifier;
        let stats = match transform_method(&adapter, &mut sink, &mut verifier) {
            Ok(s) => s,
            Err(e) => return Err(classify_core_error(e)),
        };

        if stats.regions_cloned > 0 {
            adapter
                .apply(&mut class.methods[i], sink.instructions, sink.try_catch)
                .map_err(|e| DriverError::MalformedInput(e.to_string()))?;
            methods_split += 1;
            any_change = true;
            info!("{}: split {} irreducible region(s)", adapter_name(&class, i), stats.regions_cloned);
        }
    }

    if any_change {
        Ok((FileOutcome::Transformed { methods_split }, Some(class.write())))
    } else {
        Ok((FileOutcome::Unchanged, None))
    }
}

fn adapter_name(class: &ClassFile, method_index: usize) -> String {
    class
        .method_name(&class.methods[method_index])
        .map(|n| format!("{}.{}", class.this_class_name().unwrap_or("?"), n))
        .unwrap_or_else(|_| "<unknown method>".into())
}

fn classify_core_error(e: LoopSplitError) -> DriverError {
    match e {
        LoopSplitError::VerificationFailed(msg) | LoopSplitError::StillIrreducible(msg) => {
            DriverError::VerifierRejected(msg)
        }
        other => DriverError::Internal(other),
    }
}

/// Writes `bytes` to a sibling temp file, then renames it over `path` — the
/// rename is atomic on every platform this crate targets, so a process kill
/// mid-write leaves either the old file or the new one, never a truncated one.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path: PathBuf = path.with_extension("class.loopsplit-tmp");
    match write_atomically_inner(&tmp_path, path, bytes) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn write_atomically_inner(tmp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(tmp_path, bytes)?;
    std::fs::rename(tmp_path, path).inspect_err(|e| warn!("failed to rename {} into place: {e}", tmp_path.display()))
}
