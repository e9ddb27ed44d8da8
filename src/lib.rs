//! Pulls a reproducible per-class sample of the UNSW Predators camera trap
//! images and sorts the retrieved files into one folder per class.

pub mod acquire;
pub mod config;
mod downloader;
pub mod error;
pub mod metadata;
pub mod monitor;
pub mod organizer;
pub mod sampler;

pub use config::Config;
pub use error::{Error, Result};

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("tracing subscriber already set; skipping re-initialization");
    }
}
