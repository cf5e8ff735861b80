use std::{
    fs::{self, File},
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};

const MODELS_DIR: &str = "models";
const DETECTOR_MODEL_FILE: &str = "ssd_mobilenet_v1_12.onnx";
const DETECTOR_MODEL_URL: &str = "https://github.com/onnx/models/raw/main/validated/vision/object_detection_segmentation/ssd-mobilenetv1/model/ssd_mobilenet_v1_12.onnx";

#[derive(Clone, Copy, Debug)]
pub enum DownloadEvent {
    Started { total: Option<u64> },
    Progress { downloaded: u64, total: Option<u64> },
    Finished,
}

pub fn default_detector_model_path() -> PathBuf {
    PathBuf::from(MODELS_DIR).join(DETECTOR_MODEL_FILE)
}

/// Makes sure the detector model exists on disk, downloading it on first run.
pub fn ensure_detector_model_ready(
    model_path: &Path,
    on_event: impl FnMut(DownloadEvent),
) -> Result<()> {
    if model_path.is_file() {
        return Ok(());
    }

    log::info!(
        "detector model missing at {}, downloading from {DETECTOR_MODEL_URL}",
        model_path.display()
    );
    download_to(DETECTOR_MODEL_URL, model_path, on_event)
}

fn download_to(url: &str, dest: &Path, mut on_event: impl FnMut(DownloadEvent)) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut response = reqwest::blocking::get(url)
        .and_then(|resp| resp.error_for_status())
        .with_context(|| format!("failed to request {url}"))?;
    let total = response.content_length();
    on_event(DownloadEvent::Started { total });

    let progress = match total {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    progress.set_style(
        ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );
    progress.set_message(DETECTOR_MODEL_FILE);

    let partial = dest.with_extension("onnx.part");
    let file =
        File::create(&partial).with_context(|| format!("failed to create {}", partial.display()))?;
    let mut writer = BufWriter::new(file);
    let mut buf = vec![0u8; 64 * 1024];
    let mut downloaded = 0u64;

    loop {
        let read = response
            .read(&mut buf)
            .context("model download interrupted")?;
        if read == 0 {
            break;
        }
        writer.write_all(&buf[..read])?;
        downloaded += read as u64;
        progress.set_position(downloaded);
        on_event(DownloadEvent::Progress { downloaded, total });
    }
    writer.flush()?;
    drop(writer);
    progress.finish_and_clear();

    if let Some(expected) = total {
        if downloaded != expected {
            let _ = fs::remove_file(&partial);
            return Err(anyhow!(
                "model download truncated: got {downloaded} of {expected} bytes"
            ));
        }
    }

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move model into {}", dest.display()))?;
    on_event(DownloadEvent::Finished);
    log::info!("detector model saved to {}", dest.display());

    Ok(())
}
