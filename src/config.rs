use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

const METADATA_URL: &str =
    "https://storage.googleapis.com/public-datasets-lila/unsw-predators/unsw-predators.json.zip";
const STORAGE_ROOT: &str = "gs://public-datasets-lila/unsw-predators/images/";

/// Everything a run needs to know. There are no command line flags; the
/// defaults describe the UNSW Predators subset.
#[derive(Debug, Clone)]
pub struct Config {
    pub metadata_url: String,
    pub archive_path: PathBuf,
    pub metadata_path: PathBuf,
    pub manifest_path: PathBuf,
    pub transfer_list_path: PathBuf,
    /// Prefix joined with each sampled file name to form a transfer URI.
    pub storage_root: String,
    pub staging_dir: PathBuf,
    pub organized_root: PathBuf,
    pub sample_fraction: f64,
    pub seed: u64,
    pub desired_classes: BTreeSet<String>,
    pub copy_tool: String,
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata_url: METADATA_URL.to_owned(),
            archive_path: PathBuf::from("unsw-predators.json.zip"),
            metadata_path: PathBuf::from("unsw-predators.json"),
            manifest_path: PathBuf::from("sampled_files.json"),
            transfer_list_path: PathBuf::from("download_list.txt"),
            storage_root: STORAGE_ROOT.to_owned(),
            staging_dir: PathBuf::from("unsw_raw_images"),
            organized_root: PathBuf::from("unsw_images_organized"),
            sample_fraction: 0.5,
            seed: 42,
            desired_classes: ["dingo", "fox", "goanna", "possum", "quoll"]
                .into_iter()
                .map(String::from)
                .collect(),
            copy_tool: "gsutil".to_owned(),
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "sample fraction must be in (0, 1], got {}",
                self.sample_fraction
            )));
        }
        if self.desired_classes.is_empty() {
            return Err(Error::InvalidConfig("no classes requested".into()));
        }
        Ok(())
    }
}
