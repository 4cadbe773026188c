pub mod fine_tune;
pub mod select_features;
pub mod warm_start;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

pub(crate) fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .context("invalid progress bar template")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
