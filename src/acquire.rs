use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sampler::SampleManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    /// The copy tool exited non-zero. Usually some requested objects were
    /// already present locally, so this is not treated as a failure.
    Partial { code: Option<i32> },
}

impl From<ExitStatus> for TransferOutcome {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            TransferOutcome::Completed
        } else {
            TransferOutcome::Partial {
                code: status.code(),
            }
        }
    }
}

/// Writes one `<storage_root><file>` URI per line. Returns the number of URIs.
pub fn write_transfer_list(
    manifest: &SampleManifest,
    storage_root: &str,
    path: &Path,
) -> Result<usize> {
    let file = File::create(path).map_err(Error::io(path))?;
    let mut writer = BufWriter::new(file);
    let mut count = 0;
    for (_, name) in manifest.entries() {
        writeln!(writer, "{storage_root}{name}").map_err(Error::io(path))?;
        count += 1;
    }
    writer.flush().map_err(Error::io(path))?;
    Ok(count)
}

/// Starts `<tool> -m cp -I <staging>/` reading URIs from the transfer list.
/// Its output is discarded. The child is killed if the handle is dropped.
pub fn spawn_copy_tool(config: &Config) -> Result<Child> {
    let list = &config.transfer_list_path;
    let stdin = File::open(list).map_err(Error::io(list))?;
    let dest = format!("{}/", config.staging_dir.display());

    debug!("spawning {} -m cp -I {dest}", config.copy_tool);
    Command::new(&config.copy_tool)
        .args(["-m", "cp", "-I", dest.as_str()])
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ToolNotFound {
                tool: config.copy_tool.clone(),
            },
            _ => Error::Io {
                path: config.copy_tool.clone().into(),
                source: e,
            },
        })
}

pub async fn wait_copy_tool(child: &mut Child) -> Result<TransferOutcome> {
    let status = child.wait().await.map_err(Error::io("copy tool"))?;
    let outcome = TransferOutcome::from(status);
    if let TransferOutcome::Partial { code } = outcome {
        warn!("copy tool exited with {code:?}; some files may already have been present");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn transfer_list_prefixes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("download_list.txt");
        let manifest = SampleManifest::from([
            ("fox", &["cam1/a.jpg", "b.jpg"][..]),
            ("dingo", &["c.jpg"][..]),
        ]);

        let count = write_transfer_list(&manifest, "gs://bucket/images/", &path).unwrap();
        assert_eq!(count, 3);

        let lines: BTreeSet<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        let expected: BTreeSet<String> = [
            "gs://bucket/images/cam1/a.jpg",
            "gs://bucket/images/b.jpg",
            "gs://bucket/images/c.jpg",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(lines, expected);
    }

    #[tokio::test]
    async fn missing_tool_is_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            transfer_list_path: dir.path().join("list.txt"),
            staging_dir: dir.path().join("raw"),
            copy_tool: "definitely-not-a-copy-tool-4f1c".into(),
            ..Config::default()
        };
        write_transfer_list(&SampleManifest::default(), "gs://x/", &config.transfer_list_path)
            .unwrap();

        let err = spawn_copy_tool(&config).unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { tool } if tool == config.copy_tool));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_partial_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            transfer_list_path: dir.path().join("list.txt"),
            staging_dir: dir.path().join("raw"),
            copy_tool: "false".into(),
            ..Config::default()
        };
        write_transfer_list(&SampleManifest::default(), "gs://x/", &config.transfer_list_path)
            .unwrap();

        let mut child = spawn_copy_tool(&config).unwrap();
        let outcome = wait_copy_tool(&mut child).await.unwrap();
        assert!(matches!(outcome, TransferOutcome::Partial { .. }));
    }
}
