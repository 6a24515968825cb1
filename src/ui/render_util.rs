use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use crate::pipeline::CompositedFrame;

pub(super) fn composited_to_image(frame: CompositedFrame) -> Option<Arc<RenderImage>> {
    let CompositedFrame {
        mut rgba,
        width,
        height,
        ..
    } = frame;

    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, rgba)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

/// Largest box with the video's aspect ratio that fits the available area.
pub(super) fn fit_video_box(available: (f32, f32), ratio: f32) -> (f32, f32) {
    let (avail_w, avail_h) = (available.0.max(1.0), available.1.max(1.0));
    let ratio = if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        super::DEFAULT_VIDEO_RATIO
    };

    let width = avail_w.min(avail_h * ratio);
    (width.floor(), (width / ratio).floor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_wide_area_by_height() {
        assert_eq!(fit_video_box((1000.0, 300.0), 4.0 / 3.0), (400.0, 300.0));
    }

    #[test]
    fn fits_tall_area_by_width() {
        assert_eq!(fit_video_box((640.0, 900.0), 16.0 / 9.0), (640.0, 360.0));
    }

    #[test]
    fn degenerate_ratio_uses_default() {
        assert_eq!(fit_video_box((800.0, 600.0), 0.0), (800.0, 600.0));
        assert_eq!(fit_video_box((800.0, 600.0), f32::NAN), (800.0, 600.0));
    }
}
