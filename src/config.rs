use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{
    model_download::{DEFAULT_MODEL_DIR, HANDPOSE_ESTIMATOR, PALM_DETECTOR},
    pipeline::landmarker::{BaseOptions, Delegate, HandLandmarkerOptions, RunningMode},
};

pub const ENV_MODEL_DIR: &str = "HAND_OVERLAY_MODEL_DIR";
pub const ENV_DELEGATE: &str = "HAND_OVERLAY_DELEGATE";
pub const ENV_MAX_HANDS: &str = "HAND_OVERLAY_MAX_HANDS";
pub const ENV_FPS: &str = "HAND_OVERLAY_FPS";
pub const ENV_RUNNING_MODE: &str = "HAND_OVERLAY_RUNNING_MODE";

const DEFAULT_FPS: u32 = 60;
const MAX_FPS: u32 = 240;
/// The palm detector keeps its top candidates only; more hands than this are noise.
const MAX_HANDS: u32 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be \"gpu\" or \"cpu\", got {value:?}")]
    InvalidDelegate { key: &'static str, value: String },
    #[error("{key} must be \"video\" or \"image\", got {value:?}")]
    InvalidRunningMode { key: &'static str, value: String },
    #[error("{key} must be an integer between {min} and {max}, got {value:?}")]
    OutOfRange {
        key: &'static str,
        value: String,
        min: u32,
        max: u32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayConfig {
    pub model_dir: PathBuf,
    pub delegate: Delegate,
    pub running_mode: RunningMode,
    pub num_hands: usize,
    pub fps: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            delegate: Delegate::Gpu,
            running_mode: RunningMode::Video,
            num_hands: 2,
            fps: DEFAULT_FPS,
        }
    }
}

impl OverlayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(dir) = value(ENV_MODEL_DIR) {
            config.model_dir = PathBuf::from(dir);
        }
        if let Some(delegate) = value(ENV_DELEGATE) {
            config.delegate = match delegate.to_ascii_lowercase().as_str() {
                "gpu" => Delegate::Gpu,
                "cpu" => Delegate::Cpu,
                _ => {
                    return Err(ConfigError::InvalidDelegate {
                        key: ENV_DELEGATE,
                        value: delegate,
                    });
                }
            };
        }
        if let Some(mode) = value(ENV_RUNNING_MODE) {
            config.running_mode = match mode.to_ascii_lowercase().as_str() {
                "video" => RunningMode::Video,
                "image" => RunningMode::Image,
                _ => {
                    return Err(ConfigError::InvalidRunningMode {
                        key: ENV_RUNNING_MODE,
                        value: mode,
                    });
                }
            };
        }
        if let Some(hands) = value(ENV_MAX_HANDS) {
            config.num_hands = parse_in_range(ENV_MAX_HANDS, hands, 1, MAX_HANDS)? as usize;
        }
        if let Some(fps) = value(ENV_FPS) {
            config.fps = parse_in_range(ENV_FPS, fps, 1, MAX_FPS)?;
        }

        Ok(config)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    pub fn landmarker_options(&self) -> HandLandmarkerOptions {
        HandLandmarkerOptions {
            base_options: BaseOptions {
                handpose_model_path: self.model_dir.join(HANDPOSE_ESTIMATOR.file_name),
                palm_model_path: self.model_dir.join(PALM_DETECTOR.file_name),
                delegate: self.delegate,
            },
            running_mode: self.running_mode,
            num_hands: self.num_hands,
            ..Default::default()
        }
    }
}

fn parse_in_range(key: &'static str, value: String, min: u32, max: u32) -> Result<u32, ConfigError> {
    match value.parse::<u32>() {
        Ok(parsed) if (min..=max).contains(&parsed) => Ok(parsed),
        _ => Err(ConfigError::OutOfRange {
            key,
            value,
            min,
            max,
        }),
    }
}
