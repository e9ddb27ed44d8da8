use std::fs::create_dir_all;
use std::process::ExitCode;

use camtrap_sampler::acquire::{spawn_copy_tool, wait_copy_tool, write_transfer_list};
use camtrap_sampler::metadata::{self, build_file_class_index};
use camtrap_sampler::monitor::{stdout_progress, watch_progress};
use camtrap_sampler::organizer::organize;
use camtrap_sampler::sampler::load_or_sample;
use camtrap_sampler::{init_tracing, Config, Error, Result};
use reqwest::Client;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run(Config::default()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::ToolNotFound { tool }) => {
            eprintln!("ERROR: '{tool}' not found. Install the Google Cloud SDK:");
            eprintln!("   https://cloud.google.com/sdk/docs/install");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    config.validate()?;
    let client = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let progress = stdout_progress();

    let metadata = metadata::fetch(&client, &config, &progress).await?;
    let index = build_file_class_index(&metadata, &config.desired_classes)?;
    let manifest = load_or_sample(
        &config.manifest_path,
        &index,
        &config.desired_classes,
        config.sample_fraction,
        config.seed,
    )?;

    let requested = write_transfer_list(
        &manifest,
        &config.storage_root,
        &config.transfer_list_path,
    )?;
    info!("requesting {requested} files from {}", config.storage_root);

    create_dir_all(&config.staging_dir).map_err(|source| Error::Io {
        path: config.staging_dir.clone(),
        source,
    })?;
    let mut child = spawn_copy_tool(&config)?;
    let (cancel, cancelled) = watch::channel(false);
    let monitor = tokio::spawn(watch_progress(
        manifest.clone(),
        config.staging_dir.clone(),
        config.poll_interval,
        progress.clone(),
        cancelled,
    ));

    let interrupted = tokio::select! {
        outcome = wait_copy_tool(&mut child) => {
            outcome?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        let _ = child.kill().await;
    }
    let _ = cancel.send(true);
    let last = monitor.await.unwrap_or_default();

    if interrupted {
        println!("Stopped. Run again to resume the download.");
        return Ok(());
    }
    println!("Downloaded {}/{}", last.done(), last.total());

    println!("Organizing images by class...");
    let report = organize(&manifest, &config.staging_dir, &config.organized_root)?;
    println!("{report}");
    println!("Dataset saved to: {}/", config.organized_root.display());
    Ok(())
}
