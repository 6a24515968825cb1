use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, HAND_LANDMARK_COUNT, Landmark};

pub const HANDPOSE_INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;

/// Maps palm detector input coordinates back onto the source frame.
#[derive(Clone, Debug)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// A square, rotated crop of the source frame fed to the handpose estimator.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {} for {}x{}",
            frame.rgba.len(),
            expected_len,
            frame.width,
            frame.height
        ));
    }
    Ok(())
}

/// Scales the frame to fit a `target_size` square, pads the rest with black and
/// returns an NHWC tensor in `[0, 1]`.
pub fn letterbox_tensor(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, Letterbox)> {
    check_frame(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, target_size);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("palm input resize failed")?;
    let resized = dst_image.into_vec();

    let side = target_size as usize;
    let pad_x = (side - new_w as usize) / 2;
    let pad_y = (side - new_h as usize) / 2;
    let src_stride = new_w as usize * 4;

    let mut data = vec![0f32; side * side * 3];
    data.par_chunks_mut(side * 3)
        .enumerate()
        .for_each(|(row, out)| {
            if row < pad_y || row >= pad_y + new_h as usize {
                return;
            }
            let src_row = &resized[(row - pad_y) * src_stride..(row - pad_y + 1) * src_stride];
            for (col, px) in src_row.chunks_exact(4).enumerate() {
                let o = (pad_x + col) * 3;
                out[o] = px[0] as f32 / 255.0;
                out[o + 1] = px[1] as f32 / 255.0;
                out[o + 2] = px[2] as f32 / 255.0;
            }
        });

    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), data)
        .map_err(|err| anyhow!("failed to build palm input tensor: {err}"))?;

    Ok((
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_w: frame.width,
            orig_h: frame.height,
        },
    ))
}

pub fn rotated_crop_tensor(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let size = output_size as usize;
    let mut data = vec![0f32; size * size * 3];
    data.par_chunks_mut(size * 3)
        .enumerate()
        .for_each(|(y, out)| {
            for x in 0..size {
                let (src_x, src_y) = transform.to_source(x as f32 + 0.5, y as f32 + 0.5);
                out[x * 3..x * 3 + 3].copy_from_slice(&sample_rgb(frame, src_x, src_y));
            }
        });

    let array = Array4::<f32>::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build handpose crop tensor: {err}"))?;

    Ok((array, transform))
}

impl CropTransform {
    fn unit(&self) -> f32 {
        self.side / self.output_size as f32
    }

    /// Crop pixel coordinates to unclamped source frame coordinates.
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let dx = (x - half) * self.unit();
        let dy = (y - half) * self.unit();
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    /// Converts a handpose output point into a normalized frame landmark. The
    /// depth is scaled like `x`, matching the normalized image-width units.
    pub fn normalize(&self, [x, y, z]: [f32; 3]) -> Landmark {
        let (sx, sy) = self.to_source(x, y);
        let w = self.orig_w.max(1) as f32;
        let h = self.orig_h.max(1) as f32;
        Landmark::new(
            (sx / w).clamp(0.0, 1.0),
            (sy / h).clamp(0.0, 1.0),
            z * self.unit() / w,
        )
    }
}

pub fn decode_landmarks(flat: &[f32]) -> Result<[[f32; 3]; HAND_LANDMARK_COUNT]> {
    if flat.len() < HAND_LANDMARK_COUNT * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            HAND_LANDMARK_COUNT * 3
        ));
    }

    let mut landmarks = [[0f32; 3]; HAND_LANDMARK_COUNT];
    for (dst, chunk) in landmarks.iter_mut().zip(flat.chunks_exact(3)) {
        *dst = [chunk[0], chunk[1], chunk[2]];
    }
    Ok(landmarks)
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    let x0 = x.floor();
    let y0 = y.floor();

    let (w, h) = (frame.width as i32, frame.height as i32);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let (ix, iy) = (cx as i32, cy as i32);
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0, 0.0, 0.0];
        }
        let idx = ((iy as u32 * frame.width + ix as u32) as usize) * 4;
        match frame.rgba.get(idx..idx + 3) {
            Some(px) => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ],
            None => [0.0, 0.0, 0.0],
        }
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Frame {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn decode_requires_all_landmarks() {
        assert!(decode_landmarks(&[0.0; 62]).is_err());

        let flat: Vec<f32> = (0..63).map(|v| v as f32).collect();
        let decoded = decode_landmarks(&flat).unwrap();
        assert_eq!(decoded[0], [0.0, 1.0, 2.0]);
        assert_eq!(decoded[20], [60.0, 61.0, 62.0]);
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let frame = solid_frame(64, 32, [255, 255, 255]);
        let (tensor, letterbox) = letterbox_tensor(&frame, 32).unwrap();
        assert_eq!(tensor.shape(), &[1, 32, 32, 3]);
        assert_eq!(letterbox.scale, 0.5);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 8.0);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert!((tensor[[0, 16, 16, 0]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn rejects_truncated_frames() {
        let mut frame = solid_frame(4, 4, [0, 0, 0]);
        frame.rgba.truncate(10);
        assert!(letterbox_tensor(&frame, 16).is_err());
        assert!(rotated_crop_tensor(&frame, (2.0, 2.0), 4.0, 0.0, 8).is_err());
    }

    #[test]
    fn unrotated_crop_normalizes_to_frame_fractions() {
        let frame = solid_frame(200, 100, [10, 20, 30]);
        let (tensor, transform) = rotated_crop_tensor(&frame, (100.0, 50.0), 56.0, 0.0, 28).unwrap();
        assert_eq!(tensor.shape(), &[1, 28, 28, 3]);

        let center = transform.normalize([14.0, 14.0, 0.0]);
        assert!((center.x - 0.5).abs() < 1e-6);
        assert!((center.y - 0.5).abs() < 1e-6);

        // Two source pixels per crop pixel, depth scaled into width units.
        let offset = transform.normalize([24.0, 14.0, -10.0]);
        assert!((offset.x - 120.0 / 200.0).abs() < 1e-6);
        assert!((offset.z - (-20.0 / 200.0)).abs() < 1e-6);
    }
}
