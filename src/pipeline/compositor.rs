use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use rayon::prelude::*;

use super::canvas::{RgbaCanvas, Surface};
use crate::types::{DetectionResult, Frame};

/// Mirrored video with the overlay blended on top, sized to the display box.
#[derive(Clone, Debug)]
pub struct CompositedFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Size of the camera frame underneath, for aspect-ratio decisions.
    pub natural_size: (u32, u32),
    /// Hands drawn into this frame; empty when the overlay is blank.
    pub hands: DetectionResult,
}

pub fn composite(frame: &Frame, overlay: &RgbaCanvas) -> Result<CompositedFrame> {
    let (width, height) = overlay.size();
    if width == 0 || height == 0 {
        return Err(anyhow!("overlay surface has no area ({width}x{height})"));
    }

    let mut rgba = scale_frame(frame, width, height)?;
    let stride = width as usize * 4;

    rgba.par_chunks_mut(stride)
        .zip(overlay.pixels().par_chunks(stride))
        .for_each(|(row, overlay_row)| {
            mirror_row(row);
            for (dst, src) in row.chunks_exact_mut(4).zip(overlay_row.chunks_exact(4)) {
                blend_over(dst, src);
            }
        });

    Ok(CompositedFrame {
        rgba,
        width,
        height,
        natural_size: (frame.width, frame.height),
        hands: DetectionResult::default(),
    })
}

fn scale_frame(frame: &Frame, width: u32, height: u32) -> Result<Vec<u8>> {
    if frame.width == width && frame.height == height {
        return Ok(frame.rgba.clone());
    }

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )
    .context("video frame does not match its dimensions")?;
    let mut dst_image = fir::images::Image::new(width, height, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&options))
        .context("video resize failed")?;
    Ok(dst_image.into_vec())
}

fn mirror_row(row: &mut [u8]) {
    let pixels = row.len() / 4;
    for x in 0..pixels / 2 {
        let (left, right) = row.split_at_mut((pixels - 1 - x) * 4);
        left[x * 4..x * 4 + 4].swap_with_slice(&mut right[..4]);
    }
}

fn blend_over(dst: &mut [u8], src: &[u8]) {
    let alpha = src[3] as u32;
    if alpha == 0 {
        return;
    }
    for c in 0..3 {
        dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * (255 - alpha) + 127) / 255) as u8;
    }
    dst[3] = 255;
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::pipeline::canvas::Color;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut rgba = Vec::new();
        for _y in 0..height {
            for x in 0..width {
                rgba.extend_from_slice(&[x as u8 * 10, 0, 0, 255]);
            }
        }
        Frame {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn video_is_mirrored_horizontally() {
        let frame = gradient_frame(4, 2);
        let overlay = RgbaCanvas::new(4, 2);
        let out = composite(&frame, &overlay).unwrap();
        let reds: Vec<u8> = out.rgba.chunks_exact(4).take(4).map(|px| px[0]).collect();
        assert_eq!(reds, vec![30, 20, 10, 0]);
    }

    #[test]
    fn overlay_pixels_cover_the_video() {
        let frame = gradient_frame(5, 5);
        let mut overlay = RgbaCanvas::new(5, 5);
        overlay.fill_circle((2.0, 2.0), 0.0, Color::rgb(1, 2, 3));
        let out = composite(&frame, &overlay).unwrap();
        let idx = (2 * 5 + 2) * 4;
        assert_eq!(&out.rgba[idx..idx + 4], &[1, 2, 3, 255]);
        assert_eq!(out.rgba[0], 40);
    }

    #[test]
    fn output_takes_the_overlay_size() {
        let frame = gradient_frame(8, 6);
        let overlay = RgbaCanvas::new(16, 12);
        let out = composite(&frame, &overlay).unwrap();
        assert_eq!((out.width, out.height), (16, 12));
        assert_eq!(out.natural_size, (8, 6));
        assert_eq!(out.rgba.len(), 16 * 12 * 4);
    }

    #[test]
    fn empty_overlay_is_an_error() {
        let frame = gradient_frame(2, 2);
        assert!(composite(&frame, &RgbaCanvas::new(0, 0)).is_err());
    }
}
