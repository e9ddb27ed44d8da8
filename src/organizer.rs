//! Drains the flat staging directory into `organized_root/<class>/`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::metadata::basename;
use crate::sampler::SampleManifest;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganizeReport {
    pub expected: usize,
    pub moved: usize,
    pub missing: usize,
    pub coverage_pct: f64,
    pub moved_per_class: BTreeMap<String, usize>,
}

impl fmt::Display for OrganizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (class, moved) in &self.moved_per_class {
            writeln!(f, "  {class:<10} {moved:>6}")?;
        }
        writeln!(f, "Moved: {}", self.moved)?;
        writeln!(f, "Missing: {}", self.missing)?;
        write!(f, "Coverage: {:.1}%", self.coverage_pct)
    }
}

/// Lowercased basename to (manifest file name, class). Two entries sharing a
/// basename collapse to whichever comes last, class by class.
pub fn expected_index(manifest: &SampleManifest) -> HashMap<String, (String, String)> {
    manifest
        .entries()
        .map(|(class, file)| {
            (
                basename(file).to_lowercase(),
                (file.to_owned(), class.to_owned()),
            )
        })
        .collect()
}

/// Lowercased name to on-disk name for every regular file directly inside
/// `dir`, following symlinks. A missing directory is empty.
pub fn scan_staging(dir: &Path) -> Result<BTreeMap<String, String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(Error::io(dir)(e)),
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| fs::metadata(entry.path()).map(|m| m.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    Ok(names
        .into_iter()
        .map(|name| (name.to_lowercase(), name))
        .collect())
}

pub fn organize(
    manifest: &SampleManifest,
    staging: &Path,
    organized_root: &Path,
) -> Result<OrganizeReport> {
    let expected = expected_index(manifest);
    let staged = scan_staging(staging)?;
    debug!(expected = expected.len(), staged = staged.len(), "reconciling");

    fs::create_dir_all(organized_root).map_err(Error::io(organized_root))?;
    for class in manifest.classes() {
        let dir = organized_root.join(class);
        fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
    }

    let mut report = OrganizeReport {
        expected: expected.len(),
        ..OrganizeReport::default()
    };

    for (lower, real) in &staged {
        let Some((_, class)) = expected.get(lower) else {
            continue;
        };
        let src = staging.join(real);
        match fs::metadata(&src) {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => {
                debug!("skipping empty {}", src.display());
                continue;
            }
            Err(_) => continue,
        }

        let dst = organized_root.join(class).join(real);
        if let Err(e) = move_file(&src, &dst) {
            warn!("failed to move {} to {}: {e}", src.display(), dst.display());
            continue;
        }
        report.moved += 1;
        *report.moved_per_class.entry(class.clone()).or_default() += 1;
    }

    report.missing = report.expected - report.moved;
    report.coverage_pct = if report.expected == 0 {
        0.0
    } else {
        100.0 * report.moved as f64 / report.expected as f64
    };
    Ok(report)
}

/// Renames `src` onto `dst`, copying and removing when the two sit on
/// different filesystems.
fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst)?;
    fs::remove_file(src)
}
