use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};

/// Make sure the model file exists at `path`, downloading it from `url` if not.
pub fn ensure_model_ready(path: &Path, url: Option<&str>) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    let Some(url) = url else {
        bail!(
            "pose model {} not found and no [model] url configured",
            path.display()
        );
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    log::info!("downloading pose model from {url}");
    let response =
        reqwest::blocking::get(url).with_context(|| format!("failed to download {url}"))?;
    if !response.status().is_success() {
        bail!("failed to download {url}: HTTP {}", response.status());
    }

    let bar = progress_bar(response.content_length())?;
    let partial = path.with_extension("part");
    let written = write_to(&partial, bar.wrap_read(response))?;
    bar.finish_and_clear();

    fs::rename(&partial, path)
        .with_context(|| format!("failed to move model into {}", path.display()))?;
    log::info!("saved {written} bytes to {}", path.display());
    Ok(())
}

fn progress_bar(total: Option<u64>) -> Result<ProgressBar> {
    let bar = match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("#>-"),
            );
            bar
        }
        None => ProgressBar::new_spinner(),
    };
    bar.set_message("pose model");
    Ok(bar)
}

fn write_to<R: Read>(path: &Path, mut reader: R) -> Result<u64> {
    let mut file =
        fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let written = io::copy(&mut reader, &mut file)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(written)
}
