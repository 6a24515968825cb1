mod common;
mod ort;
mod palm;

use std::path::PathBuf;

use anyhow::Result;
use thiserror::Error;

use super::render_loop::CancellationToken;
use crate::{
    model_download::{HANDPOSE_ESTIMATOR, ModelDownloadEvent, PALM_DETECTOR, ensure_model_ready},
    types::{DetectionResult, Frame},
};

pub use self::ort::OrtHandLandmarker;

/// Per-frame hand landmark detection.
pub trait HandLandmarker: Send + 'static {
    /// Detects hands on `frame`. In [`RunningMode::Video`] the timestamps must be
    /// strictly increasing across calls.
    fn detect_for_video(&mut self, frame: &Frame, timestamp_ms: f64) -> Result<DetectionResult>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Delegate {
    Cpu,
    #[default]
    Gpu,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunningMode {
    /// Independent still images, timestamps are ignored.
    Image,
    /// A stream of frames with monotonically increasing timestamps.
    #[default]
    Video,
}

#[derive(Clone, Debug)]
pub struct BaseOptions {
    pub handpose_model_path: PathBuf,
    pub palm_model_path: PathBuf,
    pub delegate: Delegate,
}

#[derive(Clone, Debug)]
pub struct HandLandmarkerOptions {
    pub base_options: BaseOptions,
    pub running_mode: RunningMode,
    pub num_hands: usize,
    pub min_hand_detection_confidence: f32,
    pub min_hand_presence_confidence: f32,
}

impl Default for HandLandmarkerOptions {
    fn default() -> Self {
        Self {
            base_options: BaseOptions {
                handpose_model_path: crate::model_download::default_handpose_estimator_model_path(),
                palm_model_path: crate::model_download::default_palm_detector_model_path(),
                delegate: Delegate::default(),
            },
            running_mode: RunningMode::default(),
            num_hands: 2,
            min_hand_detection_confidence: 0.5,
            min_hand_presence_confidence: 0.5,
        }
    }
}

impl HandLandmarkerOptions {
    pub fn validate(&self) -> Result<(), LandmarkerError> {
        if self.num_hands == 0 {
            return Err(LandmarkerError::InvalidOptions(
                "num_hands must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            (
                "min_hand_detection_confidence",
                self.min_hand_detection_confidence,
            ),
            (
                "min_hand_presence_confidence",
                self.min_hand_presence_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LandmarkerError::InvalidOptions(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LandmarkerError {
    #[error("invalid hand landmarker options: {0}")]
    InvalidOptions(String),
    #[error("timestamp {current}ms is not after the previous frame at {previous}ms")]
    NonMonotonicTimestamp { previous: f64, current: f64 },
    #[error("hand landmarker initialization was cancelled")]
    Cancelled,
}

/// Rejects out-of-order timestamps for video-mode landmarkers.
#[derive(Clone, Debug, Default)]
pub(crate) struct TimestampGuard {
    last: Option<f64>,
}

impl TimestampGuard {
    pub(crate) fn check(&mut self, mode: RunningMode, timestamp_ms: f64) -> Result<(), LandmarkerError> {
        if mode == RunningMode::Image {
            return Ok(());
        }
        if let Some(previous) = self.last {
            if timestamp_ms <= previous {
                return Err(LandmarkerError::NonMonotonicTimestamp {
                    previous,
                    current: timestamp_ms,
                });
            }
        }
        self.last = Some(timestamp_ms);
        Ok(())
    }
}

pub fn create_from_options(options: HandLandmarkerOptions) -> Result<OrtHandLandmarker> {
    options.validate()?;
    OrtHandLandmarker::new(options)
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), LandmarkerError> {
    if cancel.is_cancelled() {
        return Err(LandmarkerError::Cancelled);
    }
    Ok(())
}

/// Fetches missing model files, then builds the landmarker. `cancel` is checked
/// before every download and before the sessions are built.
pub fn create_with_model_download(
    options: HandLandmarkerOptions,
    cancel: &CancellationToken,
) -> Result<OrtHandLandmarker> {
    options.validate()?;
    let base = &options.base_options;
    for (asset, path) in [
        (HANDPOSE_ESTIMATOR, &base.handpose_model_path),
        (PALM_DETECTOR, &base.palm_model_path),
    ] {
        ensure_not_cancelled(cancel)?;
        ensure_model_ready(asset, path, |event| {
            if let ModelDownloadEvent::AlreadyPresent { asset } = event {
                log::debug!("{} model found at {}", asset.label, path.display());
            }
        })?;
    }
    ensure_not_cancelled(cancel)?;
    create_from_options(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_track_two_hands_on_gpu_in_video_mode() {
        let options = HandLandmarkerOptions::default();
        assert_eq!(options.num_hands, 2);
        assert_eq!(options.base_options.delegate, Delegate::Gpu);
        assert_eq!(options.running_mode, RunningMode::Video);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn rejects_zero_hands_and_bad_thresholds() {
        let options = HandLandmarkerOptions {
            num_hands: 0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(LandmarkerError::InvalidOptions(_))
        ));

        let options = HandLandmarkerOptions {
            min_hand_presence_confidence: 1.5,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn factory_fails_fast_on_invalid_options() {
        let options = HandLandmarkerOptions {
            num_hands: 0,
            ..Default::default()
        };
        let err = create_from_options(options).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<LandmarkerError>(),
            Some(LandmarkerError::InvalidOptions(_))
        ));
    }

    #[test]
    fn cancelled_initialization_touches_no_model_files() {
        let dir = std::env::temp_dir().join(format!(
            "hand-overlay-cancelled-{}",
            std::process::id()
        ));
        let options = HandLandmarkerOptions {
            base_options: BaseOptions {
                handpose_model_path: dir.join("handpose.onnx"),
                palm_model_path: dir.join("palm.onnx"),
                delegate: Delegate::Cpu,
            },
            ..Default::default()
        };
        let cancel = CancellationToken::default();
        cancel.cancel();

        let err = create_with_model_download(options, &cancel).err().unwrap();
        assert_eq!(
            err.downcast_ref::<LandmarkerError>(),
            Some(&LandmarkerError::Cancelled)
        );
        assert!(!dir.exists());
    }

    #[test]
    fn video_mode_requires_increasing_timestamps() {
        let mut guard = TimestampGuard::default();
        assert!(guard.check(RunningMode::Video, 10.0).is_ok());
        assert!(guard.check(RunningMode::Video, 10.5).is_ok());
        assert_eq!(
            guard.check(RunningMode::Video, 10.5),
            Err(LandmarkerError::NonMonotonicTimestamp {
                previous: 10.5,
                current: 10.5
            })
        );
        assert!(guard.check(RunningMode::Video, 3.0).is_err());
        assert!(guard.check(RunningMode::Video, 11.0).is_ok());
    }

    #[test]
    fn image_mode_ignores_timestamps() {
        let mut guard = TimestampGuard::default();
        assert!(guard.check(RunningMode::Image, 5.0).is_ok());
        assert!(guard.check(RunningMode::Image, 5.0).is_ok());
        assert!(guard.check(RunningMode::Image, 1.0).is_ok());
    }
}
