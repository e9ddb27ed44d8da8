//! Sorts whatever has already landed in the staging directory, using the
//! persisted sample list. Safe to run repeatedly.

use std::process::ExitCode;

use camtrap_sampler::organizer::{expected_index, organize, scan_staging};
use camtrap_sampler::sampler::SampleManifest;
use camtrap_sampler::{init_tracing, Config, Result};

fn main() -> ExitCode {
    init_tracing();

    match run(&Config::default()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<()> {
    let manifest = SampleManifest::load(&config.manifest_path)?;
    println!("Loaded {} expected images.", expected_index(&manifest).len());

    let staged = scan_staging(&config.staging_dir)?;
    println!(
        "Found {} files in {}/",
        staged.len(),
        config.staging_dir.display()
    );

    let report = organize(&manifest, &config.staging_dir, &config.organized_root)?;
    println!("Organization complete!");
    println!("{report}");
    println!("Dataset saved to: {}/", config.organized_root.display());
    Ok(())
}
