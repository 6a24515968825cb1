mod anchors;

use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anchors::{ANCHORS, NUM_ANCHORS};
use anyhow::{Context, Result, anyhow};
use ort::session::Session;
use ort::value::Tensor;

use super::{
    Delegate,
    common::{Letterbox, PALM_INPUT_SIZE, letterbox_tensor},
    ort::build_session,
};
use crate::types::Frame;

const PALM_KEYPOINTS: usize = 7;

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 32,
        }
    }
}

/// A detected palm in source frame pixels, with its seven palm keypoints.
#[derive(Clone, Debug, PartialEq)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

pub struct PalmDetector {
    session: Session,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, delegate: Delegate, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = build_session(model_path, delegate).with_context(|| {
            format!("failed to load palm detector from {}", model_path.display())
        })?;
        Ok(Self { session, cfg })
    }

    /// Palms sorted by descending score.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = letterbox_tensor(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let box_shape = boxes.shape().to_vec();
        let score_shape = scores.shape().to_vec();

        decode_palms(
            boxes
                .as_slice()
                .ok_or_else(|| anyhow!("palm boxes not contiguous"))?,
            &box_shape,
            scores
                .as_slice()
                .ok_or_else(|| anyhow!("palm scores not contiguous"))?,
            &score_shape,
            &letterbox,
            &self.cfg,
        )
    }
}

fn trailing_dims(shape: &[usize], what: &str) -> Result<(usize, usize)> {
    match shape {
        [.., anchors, features] if shape.len() >= 3 => Ok((*anchors, *features)),
        _ => Err(anyhow!(
            "unexpected palm {what} shape {shape:?}, need [batch, anchors, features]"
        )),
    }
}

fn decode_palms(
    boxes: &[f32],
    box_shape: &[usize],
    scores: &[f32],
    score_shape: &[usize],
    letterbox: &Letterbox,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    let (anchor_dim, feature_dim) = trailing_dims(box_shape, "box")?;
    let (score_anchor_dim, score_feature_dim) = trailing_dims(score_shape, "score")?;

    if feature_dim < 4 + PALM_KEYPOINTS * 2 {
        return Err(anyhow!("palm box feature dimension too small: {feature_dim}"));
    }
    if anchor_dim != score_anchor_dim {
        return Err(anyhow!(
            "anchor dimension mismatch between boxes ({anchor_dim}) and scores ({score_anchor_dim})"
        ));
    }

    let pad_bias_x = letterbox.pad_x / letterbox.scale;
    let pad_bias_y = letterbox.pad_y / letterbox.scale;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let input = PALM_INPUT_SIZE as f32;
    let to_frame = |anchor: [f32; 2], dx: f32, dy: f32| {
        (
            (dx / input + anchor[0]) * scale - pad_bias_x,
            (dy / input + anchor[1]) * scale - pad_bias_y,
        )
    };

    let mut candidates = Vec::new();
    for anchor_idx in 0..NUM_ANCHORS.min(anchor_dim) {
        let raw_score = *scores
            .get(anchor_idx * score_feature_dim)
            .ok_or_else(|| anyhow!("missing score for palm anchor {anchor_idx}"))?;
        let score = sigmoid(raw_score);
        if score < cfg.score_threshold {
            continue;
        }

        let offset = anchor_idx * feature_dim;
        let features = boxes
            .get(offset..offset + 4 + PALM_KEYPOINTS * 2)
            .ok_or_else(|| anyhow!("missing box features for palm anchor {anchor_idx}"))?;
        let anchor = ANCHORS[anchor_idx];

        let (cx, cy) = to_frame(anchor, features[0], features[1]);
        let half_w = features[2] / input * scale / 2.0;
        let half_h = features[3] / input * scale / 2.0;
        if half_w <= 0.0 || half_h <= 0.0 {
            continue;
        }

        let max_x = letterbox.orig_w.saturating_sub(1) as f32;
        let max_y = letterbox.orig_h.saturating_sub(1) as f32;
        let bbox = [
            (cx - half_w).clamp(0.0, max_x),
            (cy - half_h).clamp(0.0, max_y),
            (cx + half_w).clamp(0.0, max_x),
            (cy + half_h).clamp(0.0, max_y),
        ];

        let keypoints = features[4..]
            .chunks_exact(2)
            .map(|kp| to_frame(anchor, kp[0], kp[1]))
            .collect();

        candidates.push(PalmRegion {
            bbox,
            keypoints,
            score,
        });
    }

    Ok(non_max_suppression(candidates, cfg.nms_threshold, cfg.top_k))
}

/// Center, side length and rotation of the square crop the handpose estimator
/// expects around a palm.
pub fn crop_from_palm(region: &PalmRegion) -> ((f32, f32), f32, f32) {
    let center = if region.keypoints.is_empty() {
        (
            (region.bbox[0] + region.bbox[2]) * 0.5,
            (region.bbox[1] + region.bbox[3]) * 0.5,
        )
    } else {
        let (sum_x, sum_y) = region
            .keypoints
            .iter()
            .fold((0.0_f32, 0.0_f32), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        let n = region.keypoints.len() as f32;
        (sum_x / n, sum_y / n)
    };

    let base_w = (region.bbox[2] - region.bbox[0]).abs();
    let base_h = (region.bbox[3] - region.bbox[1]).abs();
    let keypoint_span = region
        .keypoints
        .iter()
        .fold(None, |acc: Option<(f32, f32, f32, f32)>, &(x, y)| {
            Some(match acc {
                None => (x, x, y, y),
                Some((min_x, max_x, min_y, max_y)) => {
                    (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y))
                }
            })
        })
        .map(|(min_x, max_x, min_y, max_y)| (max_x - min_x).max(max_y - min_y))
        .unwrap_or(0.0);
    // Palms cover a fraction of the hand; leave room for extended fingers.
    let side = base_w.max(base_h).max(keypoint_span).max(80.0) * 2.4;

    (center, side, palm_orientation(region))
}

/// Rotation that turns the palm's principal axis upright.
pub fn palm_orientation(region: &PalmRegion) -> f32 {
    if region.keypoints.len() < 2 {
        return 0.0;
    }

    let n = region.keypoints.len() as f32;
    let (sx, sy) = region
        .keypoints
        .iter()
        .fold((0.0_f32, 0.0_f32), |acc, (x, y)| (acc.0 + x, acc.1 + y));
    let mean = (sx / n, sy / n);

    let (mut cov_xx, mut cov_xy, mut cov_yy) = (0.0, 0.0, 0.0);
    for (x, y) in &region.keypoints {
        let dx = x - mean.0;
        let dy = y - mean.1;
        cov_xx += dx * dx;
        cov_xy += dx * dy;
        cov_yy += dy * dy;
    }
    cov_xx /= n;
    cov_xy /= n;
    cov_yy /= n;

    let trace = cov_xx + cov_yy;
    let det = cov_xx * cov_yy - cov_xy * cov_xy;
    let lambda1 = (trace * 0.5 + ((trace * 0.5).powi(2) - det).max(0.0).sqrt()).max(1e-6);
    let (vx, vy) = if cov_xy.abs() > 1e-6 {
        (lambda1 - cov_yy, cov_xy)
    } else if cov_xx >= cov_yy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };

    vy.atan2(vx) - PI * 0.5
}

fn non_max_suppression(mut candidates: Vec<PalmRegion>, threshold: f32, top_k: usize) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if keep.len() >= top_k {
            break;
        }
        if keep
            .iter()
            .all(|kept| iou(&candidate.bbox, &kept.bbox) < threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(bbox: [f32; 4], score: f32) -> PalmRegion {
        PalmRegion {
            bbox,
            keypoints: Vec::new(),
            score,
        }
    }

    #[test]
    fn nms_keeps_best_of_overlapping_boxes() {
        let kept = non_max_suppression(
            vec![
                region([0.0, 0.0, 10.0, 10.0], 0.6),
                region([1.0, 1.0, 11.0, 11.0], 0.9),
                region([50.0, 50.0, 60.0, 60.0], 0.7),
            ],
            0.3,
            8,
        );
        let scores: Vec<f32> = kept.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn nms_honours_top_k() {
        let kept = non_max_suppression(
            vec![
                region([0.0, 0.0, 1.0, 1.0], 0.9),
                region([10.0, 10.0, 11.0, 11.0], 0.8),
                region([20.0, 20.0, 21.0, 21.0], 0.7),
            ],
            0.3,
            2,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn decodes_single_confident_anchor() {
        let features = 4 + PALM_KEYPOINTS * 2;
        let mut boxes = vec![0.0f32; NUM_ANCHORS * features];
        let mut scores = vec![-10.0f32; NUM_ANCHORS];
        // Anchor 0 sits at (0.5/24, 0.5/24); give it a 48px box on the 192 input.
        boxes[2] = 48.0;
        boxes[3] = 48.0;
        scores[0] = 10.0;

        let letterbox = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 192,
            orig_h: 192,
        };
        let palms = decode_palms(
            &boxes,
            &[1, NUM_ANCHORS, features],
            &scores,
            &[1, NUM_ANCHORS, 1],
            &letterbox,
            &PalmDetectorConfig::default(),
        )
        .unwrap();

        assert_eq!(palms.len(), 1);
        let palm = &palms[0];
        assert!(palm.score > 0.99);
        assert_eq!(palm.keypoints.len(), PALM_KEYPOINTS);
        assert!((palm.keypoints[0].0 - 4.0).abs() < 1e-4);
        assert_eq!(palm.bbox[0], 0.0);
        assert!((palm.bbox[2] - 28.0).abs() < 1e-4);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let letterbox = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 10,
            orig_h: 10,
        };
        let cfg = PalmDetectorConfig::default();
        assert!(decode_palms(&[], &[1, 4], &[], &[1, 4, 1], &letterbox, &cfg).is_err());
        assert!(decode_palms(&[], &[1, 4, 18], &[], &[1, 5, 1], &letterbox, &cfg).is_err());
        assert!(decode_palms(&[], &[1, 4, 6], &[], &[1, 4, 1], &letterbox, &cfg).is_err());
    }

    #[test]
    fn crop_covers_palm_generously() {
        let palm = PalmRegion {
            bbox: [100.0, 100.0, 200.0, 160.0],
            keypoints: vec![(140.0, 120.0), (160.0, 140.0)],
            score: 0.9,
        };
        let (center, side, _) = crop_from_palm(&palm);
        assert_eq!(center, (150.0, 130.0));
        assert!((side - 240.0).abs() < 1e-3);
    }
}
