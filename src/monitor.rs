use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::watch;
use tracing::warn;

use crate::error::Result;
use crate::metadata::basename;
use crate::organizer::scan_staging;
use crate::sampler::SampleManifest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassProgress {
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub classes: BTreeMap<String, ClassProgress>,
}

impl ProgressSnapshot {
    pub fn done(&self) -> usize {
        self.classes.values().map(|c| c.done).sum()
    }

    pub fn total(&self) -> usize {
        self.classes.values().map(|c| c.total).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.done() >= self.total()
    }
}

/// Progress display drawn on standard output, next to the summary lines.
pub fn stdout_progress() -> MultiProgress {
    MultiProgress::with_draw_target(ProgressDrawTarget::stdout())
}

/// Counts, per class, the manifest entries already sitting in `staging`.
pub fn snapshot(manifest: &SampleManifest, staging: &Path) -> Result<ProgressSnapshot> {
    let staged = scan_staging(staging)?;
    let classes = manifest
        .0
        .iter()
        .map(|(class, files)| {
            let done = files
                .iter()
                .filter(|f| staged.contains_key(&basename(f).to_lowercase()))
                .count();
            (
                class.clone(),
                ClassProgress {
                    done,
                    total: files.len(),
                },
            )
        })
        .collect();
    Ok(ProgressSnapshot { classes })
}

/// Polls `staging` every `interval` and mirrors the counts onto one bar per
/// class plus an overall bar. Returns once every expected file is present or
/// `cancel` flips to true (or its sender goes away).
pub async fn watch_progress(
    manifest: SampleManifest,
    staging: PathBuf,
    interval: Duration,
    progress: MultiProgress,
    mut cancel: watch::Receiver<bool>,
) -> ProgressSnapshot {
    let width = manifest.classes().map(str::len).max().unwrap_or(0);
    let bars: BTreeMap<String, ProgressBar> = manifest
        .0
        .iter()
        .map(|(class, files)| {
            let bar = progress.add(
                ProgressBar::new(files.len() as u64)
                    .with_style(class_style())
                    .with_message(format!("{class:<width$}")),
            );
            (class.clone(), bar)
        })
        .collect();
    let overall = progress.add(
        ProgressBar::new(manifest.total() as u64)
            .with_style(class_style())
            .with_message(format!("{:<width$}", "overall")),
    );

    let mut ticker = tokio::time::interval(interval);
    let mut last = ProgressSnapshot::default();
    loop {
        let cancelled = tokio::select! {
            _ = ticker.tick() => false,
            changed = cancel.changed() => changed.is_err() || *cancel.borrow(),
        };

        match snapshot(&manifest, &staging) {
            Ok(current) => last = current,
            Err(e) => warn!("progress scan failed: {e}"),
        }
        for (class, counts) in &last.classes {
            if let Some(bar) = bars.get(class) {
                bar.set_position(counts.done as u64);
            }
        }
        overall.set_position(last.done() as u64);

        if cancelled || last.is_complete() {
            break;
        }
    }

    for bar in bars.values() {
        bar.finish();
    }
    overall.finish();
    last
}

fn class_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} {wide_bar} {pos:>6}/{len:<6} ({percent:>3}%)")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
