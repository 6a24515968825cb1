use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Sender;
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::rgba_converter;
use crate::types::Frame;

// Built-in macOS cameras often reject YUYV even though it is reported, so the raw
// formats go first.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

/// Capture thread feeding decoded frames to the render loop.
#[derive(Debug)]
pub struct CameraStream {
    label: String,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn label(&self) -> &str {
        &self.label
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// First camera the platform reports, falling back to index 0.
fn default_camera() -> (CameraIndex, String) {
    match query(ApiBackend::Auto) {
        Ok(cameras) => {
            if let Some(info) = cameras.into_iter().next() {
                return (info.index().clone(), info.human_name());
            }
        }
        Err(err) => log::warn!("camera enumeration failed: {err:?}"),
    }
    (CameraIndex::Index(0), "default camera".to_string())
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// Opens the default camera (video only) and streams its frames into `frame_tx`,
/// dropping frames while the consumer is busy.
pub fn open_default_camera(frame_tx: Sender<Frame>) -> Result<CameraStream> {
    let (index, label) = default_camera();

    // Fail fast so the caller can report the error before any thread exists.
    build_camera(index.clone()).with_context(|| format!("cannot open {label}"))?;
    log::info!("opened camera {label}");

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let mut camera = match build_camera(index) {
            Ok(cam) => cam,
            Err(err) => {
                log::error!("failed to reopen camera: {err:?}");
                return;
            }
        };

        while !stop_flag.load(Ordering::Relaxed) {
            let read_start = Instant::now();
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!(
                        "camera frame read failed (after {:?}): {err:?}",
                        read_start.elapsed()
                    );
                    continue;
                }
            };

            let image = match rgba_converter::convert_camera_frame(&buffer) {
                Ok(image) => image,
                Err(err) => {
                    log::warn!("failed to decode camera frame: {err}");
                    continue;
                }
            };

            let frame = Frame {
                rgba: image.rgba,
                width: image.width,
                height: image.height,
                timestamp: Instant::now(),
            };
            let _ = frame_tx.try_send(frame);
        }

        if let Err(err) = camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    });

    Ok(CameraStream {
        label,
        stop,
        handle: Some(handle),
    })
}
