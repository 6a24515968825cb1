use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    Delegate, HandLandmarker, HandLandmarkerOptions, TimestampGuard,
    common::{self, HANDPOSE_INPUT_SIZE},
    palm::{PalmDetector, PalmDetectorConfig, PalmRegion, crop_from_palm},
};
use crate::types::{DetectionResult, Frame, Hand, Handedness};

pub(super) fn build_session(model_path: &Path, delegate: Delegate) -> Result<Session> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?;
    if delegate == Delegate::Gpu {
        // Unavailable providers are skipped and the session falls back to CPU.
        builder = builder.with_execution_providers([CUDAExecutionProvider::default().build()])?;
    }
    builder
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))
}

/// Palm detection followed by per-palm handpose estimation on ONNX Runtime.
pub struct OrtHandLandmarker {
    handpose: Session,
    palm_detector: PalmDetector,
    options: HandLandmarkerOptions,
    timestamps: TimestampGuard,
}

impl OrtHandLandmarker {
    pub(super) fn new(options: HandLandmarkerOptions) -> Result<Self> {
        let base = &options.base_options;
        let handpose = build_session(&base.handpose_model_path, base.delegate)?;
        let palm_detector = PalmDetector::new(
            &base.palm_model_path,
            base.delegate,
            PalmDetectorConfig {
                score_threshold: options.min_hand_detection_confidence,
                ..Default::default()
            },
        )?;

        log::info!(
            "hand landmarker ready ({:?} delegate, {:?} mode, up to {} hands) using {} and {}",
            base.delegate,
            options.running_mode,
            options.num_hands,
            base.handpose_model_path.display(),
            base.palm_model_path.display()
        );

        Ok(Self {
            handpose,
            palm_detector,
            options,
            timestamps: TimestampGuard::default(),
        })
    }

    fn estimate_hand(&mut self, frame: &Frame, palm: &PalmRegion) -> Result<Option<Hand>> {
        let (center, side, angle) = crop_from_palm(palm);
        let (input, transform) =
            common::rotated_crop_tensor(frame, center, side, angle, HANDPOSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run handpose session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("handpose model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let raw = common::decode_landmarks(&flattened)?;

        let scalar_output = |index: usize| -> Option<f32> {
            if outputs.len() <= index {
                return None;
            }
            outputs[index]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
        };
        let presence = scalar_output(1).unwrap_or(1.0);
        if presence < self.options.min_hand_presence_confidence {
            log::debug!("dropping hand with presence {presence:.2}");
            return Ok(None);
        }
        let handedness = scalar_output(2)
            .map(Handedness::from_score)
            .unwrap_or(Handedness::Unknown);

        Ok(Some(Hand {
            handedness,
            score: (presence * palm.score).clamp(0.0, 1.0),
            ..Hand::new(raw.map(|point| transform.normalize(point)))
        }))
    }
}

impl HandLandmarker for OrtHandLandmarker {
    fn detect_for_video(&mut self, frame: &Frame, timestamp_ms: f64) -> Result<DetectionResult> {
        self.timestamps
            .check(self.options.running_mode, timestamp_ms)?;

        let palms = self.palm_detector.detect(frame).unwrap_or_else(|err| {
            log::warn!("palm detection failed: {err:?}");
            Vec::new()
        });

        let mut result = DetectionResult::default();
        for palm in palms.iter().take(self.options.num_hands) {
            if let Some(hand) = self.estimate_hand(frame, palm)? {
                result.hands.push(hand);
            }
        }
        Ok(result)
    }
}
