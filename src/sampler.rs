//! Reproducible per-class sampling and the persisted sample manifest.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use indexmap::IndexMap;
use rand::seq::index::sample as sample_indices;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::metadata::FileClassIndex;

/// Sampled file names per class. Once written to disk this is the ground
/// truth for every later stage. Classes keep the order they were written in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleManifest(pub IndexMap<String, Vec<String>>);

impl SampleManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(Error::io(path))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(Error::io(path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| Error::io(path)(e.into()))?;
        writer.flush().map_err(Error::io(path))
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Every (class, file) pair, class by class.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .flat_map(|(class, files)| files.iter().map(move |f| (class.as_str(), f.as_str())))
    }

    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, &[&str]); N]> for SampleManifest {
    fn from(classes: [(&str, &[&str]); N]) -> Self {
        SampleManifest(
            classes
                .into_iter()
                .map(|(class, files)| {
                    (class.to_owned(), files.iter().map(|f| f.to_string()).collect())
                })
                .collect(),
        )
    }
}

/// Number of files drawn from a class of `available` files.
pub fn quota(available: usize, fraction: f64) -> usize {
    let k = (available as f64 * fraction).floor() as usize;
    k.max(1).min(available)
}

/// Draws per-class samples from one generator seeded at construction, so the
/// whole manifest is a pure function of the seed and the input order.
pub struct StratifiedSampler {
    rng: ChaCha8Rng,
}

impl StratifiedSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn sample(
        &mut self,
        index: &FileClassIndex,
        desired: &BTreeSet<String>,
        fraction: f64,
    ) -> SampleManifest {
        let mut by_class: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (file, class) in index.iter() {
            if desired.contains(class) {
                by_class.entry(class).or_default().push(file);
            }
        }

        let mut manifest = IndexMap::new();
        for (class, files) in by_class {
            let k = quota(files.len(), fraction);
            let picked: Vec<String> = sample_indices(&mut self.rng, files.len(), k)
                .into_iter()
                .map(|i| files[i].to_owned())
                .collect();
            info!("{class}: {k} / {}", files.len());
            manifest.insert(class.to_owned(), picked);
        }
        SampleManifest(manifest)
    }
}

/// Loads the manifest at `path` if one exists. Otherwise samples `index`
/// and writes the result there. An existing manifest is never recomputed,
/// whatever the current inputs.
pub fn load_or_sample(
    path: &Path,
    index: &FileClassIndex,
    desired: &BTreeSet<String>,
    fraction: f64,
    seed: u64,
) -> Result<SampleManifest> {
    if path.exists() {
        info!("loading existing sample list from {}", path.display());
        return SampleManifest::load(path);
    }

    info!("sampling {:.0}% per class (seed={seed})", fraction * 100.0);
    let manifest = StratifiedSampler::new(seed).sample(index, desired, fraction);
    manifest.save(path)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> FileClassIndex {
        (0..40)
            .map(|i| {
                let class = match i % 4 {
                    0 | 1 => "fox",
                    2 => "dingo",
                    _ => "cat",
                };
                (format!("img/{i:03}.jpg"), class)
            })
            .chain([("lonely.jpg".to_string(), "quoll")])
            .collect()
    }

    fn desired() -> BTreeSet<String> {
        ["fox", "dingo", "quoll", "goanna"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn same_seed_same_manifest() {
        let a = StratifiedSampler::new(42).sample(&index(), &desired(), 0.5);
        let b = StratifiedSampler::new(42).sample(&index(), &desired(), 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn one_generator_spans_all_classes() {
        let mut sampler = StratifiedSampler::new(42);
        let first = sampler.sample(&index(), &desired(), 0.5);
        let second = sampler.sample(&index(), &desired(), 0.5);
        assert_ne!(first, second);

        let mut replay = StratifiedSampler::new(42);
        assert_eq!(replay.sample(&index(), &desired(), 0.5), first);
        assert_eq!(replay.sample(&index(), &desired(), 0.5), second);
    }

    #[test]
    fn class_sizes_follow_the_fraction() {
        let manifest = StratifiedSampler::new(7).sample(&index(), &desired(), 0.25);
        assert_eq!(manifest.0["fox"].len(), 5);
        assert_eq!(manifest.0["dingo"].len(), 2);
        assert_eq!(manifest.0["quoll"].len(), 1);
    }

    #[test]
    fn absent_and_undesired_classes_are_omitted() {
        let manifest = StratifiedSampler::new(1).sample(&index(), &desired(), 0.5);
        let classes: Vec<_> = manifest.classes().collect();
        assert_eq!(classes, ["dingo", "fox", "quoll"]);
    }

    #[test]
    fn draws_without_replacement_from_own_class() {
        let index = index();
        let manifest = StratifiedSampler::new(3).sample(&index, &desired(), 0.9);
        for (class, files) in &manifest.0 {
            let unique: BTreeSet<_> = files.iter().collect();
            assert_eq!(unique.len(), files.len());
            assert!(files.iter().all(|f| index.class_of(f) == Some(class.as_str())));
        }
    }

    #[test]
    fn quota_edges() {
        assert_eq!(quota(1, 0.5), 1);
        assert_eq!(quota(3, 0.1), 1);
        assert_eq!(quota(10, 0.5), 5);
        assert_eq!(quota(7, 0.5), 3);
        assert_eq!(quota(4, 1.0), 4);
    }

    #[test]
    fn persisted_manifest_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sampled_files.json");

        let first = load_or_sample(&path, &index(), &desired(), 0.5, 42).unwrap();
        assert!(path.exists());

        let changed: FileClassIndex = [("other.jpg", "goanna")].into_iter().collect();
        let second = load_or_sample(&path, &changed, &desired(), 0.1, 99).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn manifest_file_is_a_plain_class_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(&path, r#"{"fox": ["a.jpg", "b.jpg"], "dingo": ["c.jpg"]}"#).unwrap();

        let manifest = SampleManifest::load(&path).unwrap();
        let expected = SampleManifest::from([("fox", &["a.jpg", "b.jpg"][..]), ("dingo", &["c.jpg"][..])]);
        assert_eq!(manifest, expected);
        assert_eq!(manifest.total(), 3);
    }

    #[test]
    fn loaded_manifest_keeps_file_class_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(&path, r#"{"fox": ["x/shared.jpg"], "dingo": ["y/shared.jpg"]}"#).unwrap();

        let manifest = SampleManifest::load(&path).unwrap();
        let classes: Vec<_> = manifest.classes().collect();
        assert_eq!(classes, ["fox", "dingo"]);

        manifest.save(&path).unwrap();
        let reloaded = SampleManifest::load(&path).unwrap();
        assert_eq!(reloaded.classes().collect::<Vec<_>>(), ["fox", "dingo"]);
    }
}
