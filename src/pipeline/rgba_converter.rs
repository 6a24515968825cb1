use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use thiserror::Error;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{format} buffer too small: got {got} bytes, expected {expected}")]
    Truncated {
        format: &'static str,
        got: usize,
        expected: usize,
    },
    #[error("{format} conversion failed: {message}")]
    Conversion {
        format: &'static str,
        message: String,
    },
}

#[derive(Debug)]
pub struct RgbaImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Byte layouts that map onto RGBA with a per-pixel shuffle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PackedLayout {
    Rgb,
    Bgr,
    Gray,
}

impl PackedLayout {
    fn name(self) -> &'static str {
        match self {
            PackedLayout::Rgb => "RGB",
            PackedLayout::Bgr => "BGR",
            PackedLayout::Gray => "GRAY",
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            PackedLayout::Rgb | PackedLayout::Bgr => 3,
            PackedLayout::Gray => 1,
        }
    }

    fn write(self, src: &[u8], dst: &mut [u8]) {
        let [r, g, b] = match self {
            PackedLayout::Rgb => [src[0], src[1], src[2]],
            PackedLayout::Bgr => [src[2], src[1], src[0]],
            PackedLayout::Gray => [src[0]; 3],
        };
        dst.copy_from_slice(&[r, g, b, 255]);
    }
}

pub fn convert_camera_frame(frame: &Buffer) -> Result<RgbaImage, DecodeError> {
    let resolution = frame.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let data = frame.buffer();

    let rgba = match frame.source_frame_format() {
        FrameFormat::NV12 => nv12_to_rgba(data, width, height)?,
        FrameFormat::YUYV => yuyv_to_rgba(data, width, height)?,
        FrameFormat::MJPEG => mjpeg_to_rgba(data, width, height)?,
        FrameFormat::RAWRGB => packed_to_rgba(data, width, height, PackedLayout::Rgb)?,
        FrameFormat::RAWBGR => packed_to_rgba(data, width, height, PackedLayout::Bgr)?,
        FrameFormat::GRAY => packed_to_rgba(data, width, height, PackedLayout::Gray)?,
    };

    Ok(RgbaImage {
        rgba,
        width,
        height,
    })
}

fn require_len(format: &'static str, data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::Truncated {
            format,
            got: data.len(),
            expected,
        });
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, DecodeError> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;
    require_len("NV12", data, y_plane_len + uv_plane_len)?;

    let mut rgba = vec![0u8; y_plane_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| DecodeError::Conversion {
        format: "NV12",
        message: format!("{err:?}"),
    })?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, DecodeError> {
    require_len("YUYV", data, width as usize * height as usize * 2)?;

    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| DecodeError::Conversion {
        format: "YUYV",
        message: format!("{err:?}"),
    })?;

    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, DecodeError> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder.decode().map_err(|err| DecodeError::Conversion {
        format: "MJPEG",
        message: format!("{err:?}"),
    })?;

    // The frame is handed on with the negotiated resolution, so the payload must match it.
    let expected = width as usize * height as usize * 4;
    require_len("MJPEG", &rgba, expected)?;
    Ok(rgba)
}

fn packed_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    layout: PackedLayout,
) -> Result<Vec<u8>, DecodeError> {
    let pixels = width as usize * height as usize;
    let bpp = layout.bytes_per_pixel();
    require_len(layout.name(), data, pixels * bpp)?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(bpp))
        .for_each(|(dst, src)| layout.write(src, dst));

    Ok(rgba)
}
