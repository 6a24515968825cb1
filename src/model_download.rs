use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

/// An ONNX model the hand landmarker needs on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelAsset {
    pub label: &'static str,
    pub file_name: &'static str,
    pub url: &'static str,
}

pub const HANDPOSE_ESTIMATOR: ModelAsset = ModelAsset {
    label: "handpose estimator",
    file_name: "handpose_estimation_mediapipe_2023feb.onnx",
    url: "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/handpose_estimation_mediapipe_2023feb.onnx",
};

pub const PALM_DETECTOR: ModelAsset = ModelAsset {
    label: "palm detector",
    file_name: "palm_detection_mediapipe_2023feb.onnx",
    url: "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/palm_detection_mediapipe_2023feb.onnx",
};

pub const DEFAULT_MODEL_DIR: &str = "models";

pub fn default_handpose_estimator_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_DIR).join(HANDPOSE_ESTIMATOR.file_name)
}

pub fn default_palm_detector_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_DIR).join(PALM_DETECTOR.file_name)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelDownloadEvent {
    AlreadyPresent { asset: ModelAsset },
    Started { asset: ModelAsset, total: Option<u64> },
    Progress { asset: ModelAsset, downloaded: u64, total: Option<u64> },
    Finished { asset: ModelAsset },
}

/// Makes sure `model_path` exists, downloading `asset` there if it does not.
pub fn ensure_model_ready<F>(asset: ModelAsset, model_path: &Path, mut on_event: F) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    if model_path.exists() {
        on_event(ModelDownloadEvent::AlreadyPresent { asset });
        return Ok(());
    }

    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    let mut progress: Option<ProgressBar> = None;
    download_to_path(asset, model_path, &mut |event| {
        match &event {
            ModelDownloadEvent::Started { total, .. } => {
                progress = Some(create_progress_bar(*total));
            }
            ModelDownloadEvent::Progress { downloaded, .. } => {
                if let Some(pb) = progress.as_ref() {
                    pb.set_position(*downloaded);
                }
            }
            ModelDownloadEvent::Finished { asset } => {
                if let Some(pb) = progress.take() {
                    pb.finish_with_message(format!("{} model ready", asset.label));
                }
            }
            ModelDownloadEvent::AlreadyPresent { .. } => {}
        }
        on_event(event);
    })
    .with_context(|| format!("failed to download {} model", asset.label))
}

fn download_to_path<F>(asset: ModelAsset, dest: &Path, on_event: &mut F) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    log::info!(
        "downloading {} model from {} to {}",
        asset.label,
        asset.url,
        dest.display()
    );

    let mut response = Client::new()
        .get(asset.url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let total = response.content_length();
    on_event(ModelDownloadEvent::Started { asset, total });

    save_download(asset, &mut response, dest, total, on_event)
}

/// Writes the downloaded bytes next to `dest` and moves them into place once
/// complete. A partial temp file is removed when the transfer fails.
fn save_download<R, F>(
    asset: ModelAsset,
    reader: &mut R,
    dest: &Path,
    total: Option<u64>,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    R: Read,
    F: FnMut(ModelDownloadEvent),
{
    let tmp_path = dest.with_extension("download");
    if let Err(err) = write_temp_model(asset, reader, &tmp_path, total, on_event) {
        if let Err(remove_err) = fs::remove_file(&tmp_path) {
            if remove_err.kind() != io::ErrorKind::NotFound {
                log::warn!(
                    "failed to remove partial download {}: {remove_err}",
                    tmp_path.display()
                );
            }
        }
        return Err(err);
    }

    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    on_event(ModelDownloadEvent::Finished { asset });
    Ok(())
}

/// Streams `reader` into `tmp_path`, reporting progress as bytes arrive.
fn write_temp_model<R, F>(
    asset: ModelAsset,
    reader: &mut R,
    tmp_path: &Path,
    total: Option<u64>,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    R: Read,
    F: FnMut(ModelDownloadEvent),
{
    let mut file = fs::File::create(tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing model to disk")?;
        downloaded += bytes_read as u64;
        on_event(ModelDownloadEvent::Progress {
            asset,
            downloaded,
            total,
        });
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_model_is_not_downloaded() {
        let dir = std::env::temp_dir().join(format!("hand-overlay-models-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(PALM_DETECTOR.file_name);
        fs::write(&path, b"onnx").unwrap();

        let mut events = Vec::new();
        ensure_model_ready(PALM_DETECTOR, &path, |evt| events.push(evt)).unwrap();
        assert_eq!(
            events,
            vec![ModelDownloadEvent::AlreadyPresent {
                asset: PALM_DETECTOR
            }]
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    /// Yields one chunk, then fails like a dropped connection.
    struct BrokenTransfer {
        sent: bool,
    }

    impl Read for BrokenTransfer {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
            }
            self.sent = true;
            let n = buf.len().min(4);
            buf[..n].copy_from_slice(&b"onnx"[..n]);
            Ok(n)
        }
    }

    #[test]
    fn interrupted_download_leaves_no_files_behind() {
        let dir = std::env::temp_dir().join(format!("hand-overlay-partial-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let dest = dir.join(HANDPOSE_ESTIMATOR.file_name);

        let mut events = Vec::new();
        let result = save_download(
            HANDPOSE_ESTIMATOR,
            &mut BrokenTransfer { sent: false },
            &dest,
            Some(1024),
            &mut |evt| events.push(evt),
        );

        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("download").exists());
        assert_eq!(
            events,
            vec![ModelDownloadEvent::Progress {
                asset: HANDPOSE_ESTIMATOR,
                downloaded: 4,
                total: Some(1024)
            }]
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn completed_download_is_moved_into_place() {
        let dir = std::env::temp_dir().join(format!("hand-overlay-complete-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let dest = dir.join(PALM_DETECTOR.file_name);

        let mut events = Vec::new();
        save_download(
            PALM_DETECTOR,
            &mut &b"palm model bytes"[..],
            &dest,
            None,
            &mut |evt| events.push(evt),
        )
        .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"palm model bytes");
        assert!(!dest.with_extension("download").exists());
        assert_eq!(
            events.last(),
            Some(&ModelDownloadEvent::Finished {
                asset: PALM_DETECTOR
            })
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn default_paths_live_in_the_model_dir() {
        assert_eq!(
            default_handpose_estimator_model_path(),
            Path::new("models").join("handpose_estimation_mediapipe_2023feb.onnx")
        );
        assert_eq!(
            default_palm_detector_model_path(),
            Path::new("models").join("palm_detection_mediapipe_2023feb.onnx")
        );
    }
}
