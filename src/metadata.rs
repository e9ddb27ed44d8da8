//! Dataset metadata: the categories / images / annotations document shipped
//! as a zip archive next to the images, and the filename to class index
//! derived from it.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use indicatif::MultiProgress;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::config::Config;
use crate::downloader::download;
use crate::error::{Error, Result};

/// Record ids are integers in most COCO-style exports, strings in others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::Str(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub id: RecordId,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub id: RecordId,
    pub file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Annotation {
    pub image_id: RecordId,
    pub category_id: RecordId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Metadata {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(reader))?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(Error::io(path))?;
        Self::from_reader(file)
    }
}

/// Filename to class label, in the order each filename was first annotated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileClassIndex {
    entries: Vec<(String, String)>,
    positions: HashMap<String, usize>,
}

impl FileClassIndex {
    /// Records `file` as belonging to `class`. A file seen again takes the
    /// newer class but keeps its original position.
    pub fn insert(&mut self, file: impl Into<String>, class: impl Into<String>) {
        let file = file.into();
        let class = class.into();
        match self.positions.get(&file) {
            Some(&at) => self.entries[at].1 = class,
            None => {
                self.positions.insert(file.clone(), self.entries.len());
                self.entries.push((file, class));
            }
        }
    }

    pub fn class_of(&self, file: &str) -> Option<&str> {
        self.positions
            .get(file)
            .map(|&at| self.entries[at].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(file, class)| (file.as_str(), class.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<F: Into<String>, C: Into<String>> FromIterator<(F, C)> for FileClassIndex {
    fn from_iter<I: IntoIterator<Item = (F, C)>>(iter: I) -> Self {
        let mut index = FileClassIndex::default();
        for (file, class) in iter {
            index.insert(file, class);
        }
        index
    }
}

/// Folds every annotation into a filename to class mapping, then keeps the
/// files whose final class is in `desired`.
///
/// When one image carries several annotations the last one wins. Camera trap
/// exports routinely repeat an image once per detected animal, and only one
/// label per file is kept.
pub fn build_file_class_index(
    metadata: &Metadata,
    desired: &BTreeSet<String>,
) -> Result<FileClassIndex> {
    let categories: HashMap<&RecordId, &str> = metadata
        .categories
        .iter()
        .map(|c| (&c.id, c.name.as_str()))
        .collect();
    let images: HashMap<&RecordId, &str> = metadata
        .images
        .iter()
        .map(|i| (&i.id, i.file_name.as_str()))
        .collect();

    let mut all = FileClassIndex::default();
    for annotation in &metadata.annotations {
        let file = images.get(&annotation.image_id).ok_or_else(|| {
            Error::MetadataFormat(format!(
                "annotation references unknown image {}",
                annotation.image_id
            ))
        })?;
        let class = categories.get(&annotation.category_id).ok_or_else(|| {
            Error::MetadataFormat(format!(
                "annotation references unknown category {}",
                annotation.category_id
            ))
        })?;
        all.insert(*file, *class);
    }
    debug!(files = all.len(), "resolved annotations");

    Ok(all
        .iter()
        .filter(|(_, class)| desired.contains(*class))
        .collect())
}

/// Pulls the metadata document out of `archive`. Prefers an entry named like
/// `dest`, otherwise takes the first JSON entry.
pub fn extract_document(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(Error::io(archive))?;
    let mut zip = ZipArchive::new(file)?;

    let wanted = dest.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let names: Vec<String> = zip.file_names().map(String::from).collect();
    let entry_name = names
        .iter()
        .find(|n| basename(n) == wanted)
        .or_else(|| names.iter().find(|n| n.to_ascii_lowercase().ends_with(".json")))
        .ok_or_else(|| {
            Error::MetadataFormat(format!("{} holds no JSON document", archive.display()))
        })?;

    let mut entry = zip.by_name(entry_name)?;
    let mut out = File::create(dest).map_err(Error::io(dest))?;
    io::copy(&mut entry, &mut out).map_err(Error::io(dest))?;
    Ok(())
}

/// Returns the metadata, downloading and unpacking it first unless the
/// document is already on disk.
pub async fn fetch(client: &Client, config: &Config, progress: &MultiProgress) -> Result<Metadata> {
    if config.metadata_path.exists() {
        info!("metadata already present at {}", config.metadata_path.display());
    } else {
        info!("downloading metadata from {}", config.metadata_url);
        download(client, &config.metadata_url, &config.archive_path, progress).await?;
        extract_document(&config.archive_path, &config.metadata_path)?;
        info!("metadata ready");
    }
    Metadata::load(&config.metadata_path)
}

pub(crate) fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
