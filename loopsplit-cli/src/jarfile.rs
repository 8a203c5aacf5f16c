//! JAR Container Walking
//!
//! A `.jar` is a zip archive of `.class` entries (plus resources this crate
//! never touches). `zip` is already part of the workspace's dependency
//! table for exactly this job, so entries are read and rewritten through it
//! rather than a hand-rolled zip reader.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Rewrites every `.class` entry in `path` via `transform`, leaving every
/// other entry (resources, manifests, nested jars) byte-for-byte untouched.
/// `transform` returns `None` when an entry needs no change, `Some(bytes)`
/// otherwise; its second return value is the per-entry outcome passed back
/// to the caller for reporting.
pub fn rewrite_jar<T>(
    path: &Path,
    transform: impl FnMut(&str, Vec<u8>) -> Result<(Option<Vec<u8>>, T)>,
) -> Result<Vec<(String, T)>> {
    let tmp_path = path.with_extension("jar.loopsplit-tmp");
    match rewrite_jar_inner(path, &tmp_path, transform) {
        Ok(outcomes) => Ok(outcomes),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

/// Does the actual rewrite; every fallible step after `tmp_path` is created
/// is funneled through `?` here so `rewrite_jar` has a single place to clean
/// up the temp file on any failure.
fn rewrite_jar_inner<T>(
    path: &Path,
    tmp_path: &Path,
    mut transform: impl FnMut(&str, Vec<u8>) -> Result<(Option<Vec<u8>>, T)>,
) -> Result<Vec<(String, T)>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut archive = ZipArchive::new(file).with_context(|| format!("{} is not a valid zip archive", path.display()))?;

    let tmp_file = std::fs::File::create(tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;
    let mut writer = ZipWriter::new(tmp_file);
    let mut outcomes = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let options = SimpleFileOptions::default()
            .compression_method(entry.compression())
            .unix_permissions(entry.unix_mode().unwrap_or(0o644));

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        drop(entry);

        if name.ends_with(".class") {
            let (rewritten, outcome) = transform(&name, data.clone())?;
            writer.start_file(&name, options)?;
            writer.write_all(rewritten.as_deref().unwrap_or(&data))?;
            outcomes.push((name, outcome));
        } else {
            writer.start_file(&name, options)?;
            writer.write_all(&data)?;
        }
    }

    writer.finish()?;
    std::fs::rename(tmp_path, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(outcomes)
}
