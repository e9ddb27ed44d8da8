use std::path::{Path, PathBuf};

use futures_util::stream::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio::fs::{remove_file, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::warn;

use crate::error::{Error, Result};

/// Streams `url` into `path`. Bytes land in a `.part` file first and are only
/// renamed into place once the body is complete, so an interrupted download
/// never leaves a truncated file at `path`.
pub(crate) async fn download(
    client: &Client,
    url: &str,
    path: &Path,
    progress: &MultiProgress,
) -> Result<()> {
    let bar = progress.add(ProgressBar::new_spinner().with_style(spinner_style()));

    bar.set_message(format!("Searching for {}", path.display()));
    if path.exists() {
        bar.finish_with_message(format!("{} already downloaded!", path.display()));
        bar.finish_and_clear();
        return Ok(());
    }

    let temp_path = part_path(path);
    let fetched = match fetch_into(client, url, &temp_path, &bar).await {
        Ok(()) => tokio::fs::rename(&temp_path, path)
            .await
            .map_err(Error::io(path)),
        Err(e) => Err(e),
    };
    if let Err(e) = fetched {
        bar.abandon_with_message(format!("{e}"));
        discard(&temp_path).await;
        return Err(e);
    }

    bar.finish_with_message("Downloaded file!");
    bar.finish_and_clear();
    Ok(())
}

async fn fetch_into(client: &Client, url: &str, temp_path: &Path, bar: &ProgressBar) -> Result<()> {
    let response = client.get(url).send().await?.error_for_status()?;

    bar.set_message(url.to_owned());
    if let Some(length) = response.content_length() {
        bar.set_length(length);
        bar.set_style(bar_style());
    }

    let temp_file = File::create(temp_path)
        .await
        .map_err(Error::io(temp_path))?;
    let mut writer = BufWriter::new(temp_file);
    let mut stream = response.bytes_stream();
    while let Some(item) = stream.next().await {
        let bytes = item?;
        writer
            .write_all(&bytes)
            .await
            .map_err(Error::io(temp_path))?;
        bar.inc(bytes.len() as u64);
    }
    writer.flush().await.map_err(Error::io(temp_path))?;

    bar.set_style(spinner_style());
    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

async fn discard(path: &Path) {
    match remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove {}: {e}", path.display()),
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {wide_msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner} {msg} {wide_bar} {bytes}/{total_bytes} | {binary_bytes_per_sec} | {duration_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}
