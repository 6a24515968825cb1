use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, tick};

use super::{
    canvas::{RgbaCanvas, Surface},
    compositor::{CompositedFrame, composite},
    landmarker::HandLandmarker,
    skeleton::draw_hand,
};
use crate::types::{DetectionResult, Frame};

const FIRST_FRAME_POLL: Duration = Duration::from_millis(50);

/// Stop flag shared between a loop and its owner.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// On-screen size of the video box in logical pixels. Written by the window,
/// read by the render loop on every iteration. Width and height share one word
/// so a reader never pairs a new width with an old height.
#[derive(Clone, Debug, Default)]
pub struct DisplayBox(Arc<AtomicU64>);

impl DisplayBox {
    pub fn set(&self, width: u32, height: u32) {
        let packed = (u64::from(width) << 32) | u64::from(height);
        self.0.store(packed, Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<(u32, u32)> {
        let packed = self.0.load(Ordering::Relaxed);
        let (width, height) = ((packed >> 32) as u32, packed as u32);
        (width > 0 && height > 0).then_some((width, height))
    }
}

/// The live video as the renderer sees it: the newest decoded frame and the box
/// it is displayed in.
#[derive(Debug, Default)]
pub struct VideoElement {
    frame: Option<Frame>,
    display: DisplayBox,
}

impl VideoElement {
    pub fn new(display: DisplayBox) -> Self {
        Self {
            frame: None,
            display,
        }
    }

    pub fn update(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn natural_size(&self) -> Option<(u32, u32)> {
        self.frame.as_ref().and_then(Frame::natural_size)
    }

    /// The display box, or the natural size until the window reported one.
    pub fn bounding_box(&self) -> Option<(u32, u32)> {
        self.display.get().or_else(|| self.natural_size())
    }
}

/// Strictly increasing milliseconds since the clock was created.
#[derive(Debug)]
pub struct FrameTimestamps {
    origin: Instant,
    last: Option<f64>,
}

impl FrameTimestamps {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: None,
        }
    }

    pub fn next_ms(&mut self) -> f64 {
        let mut now = self.origin.elapsed().as_secs_f64() * 1000.0;
        if let Some(last) = self.last {
            if now <= last {
                now = last + 1e-3;
            }
        }
        self.last = Some(now);
        now
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Detector not ready or the video has no geometry yet.
    Skipped,
    Rendered { hands: usize },
}

/// Everything one render iteration touches: the detector handle and the overlay
/// surface, both owned exclusively by the loop.
pub struct RenderContext<L, S> {
    detector: Option<L>,
    surface: S,
    last_result: DetectionResult,
}

impl<L: HandLandmarker, S: Surface> RenderContext<L, S> {
    pub fn new(surface: S) -> Self {
        Self {
            detector: None,
            surface,
            last_result: DetectionResult::default(),
        }
    }

    pub fn attach_detector(&mut self, detector: L) {
        self.detector = Some(detector);
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Hands drawn by the last rendered frame.
    pub fn last_result(&self) -> &DetectionResult {
        &self.last_result
    }

    pub fn render_frame(&mut self, video: &VideoElement, timestamp_ms: f64) -> Result<FrameOutcome> {
        let Some(detector) = self.detector.as_mut() else {
            return Ok(FrameOutcome::Skipped);
        };
        let (Some(frame), Some(_)) = (video.current_frame(), video.natural_size()) else {
            return Ok(FrameOutcome::Skipped);
        };

        log::trace!("detecting on a frame captured {:?} ago", frame.timestamp.elapsed());
        let result = detector.detect_for_video(frame, timestamp_ms)?;

        let (width, height) = video.bounding_box().unwrap_or((frame.width, frame.height));
        self.surface.resize(width, height);
        self.surface.clear();
        for hand in &result.hands {
            draw_hand(&mut self.surface, hand);
        }

        let hands = result.hands.len();
        self.last_result = result;
        Ok(FrameOutcome::Rendered { hands })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectorStatus {
    WaitingForVideo,
    Initializing,
    Ready,
    Failed(String),
}

/// Owner side of a running render loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct RenderLoopHandle {
    cancel: CancellationToken,
    handle: Option<thread::JoinHandle<()>>,
}

impl RenderLoopHandle {
    fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RenderLoopHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct RenderLoopChannels {
    pub frame_rx: Receiver<Frame>,
    pub status_tx: Sender<DetectorStatus>,
    pub output_tx: Sender<CompositedFrame>,
}

/// Spawns the render loop. `factory` builds the landmarker once the camera has
/// produced its first frame; drawing starts only after it succeeded. The factory
/// receives the loop's cancellation token and should give up once it is set.
pub fn start_render_loop<F, L>(
    factory: F,
    channels: RenderLoopChannels,
    display: DisplayBox,
    interval: Duration,
) -> RenderLoopHandle
where
    F: FnOnce(&CancellationToken) -> Result<L> + Send + 'static,
    L: HandLandmarker,
{
    let cancel = CancellationToken::default();
    let token = cancel.clone();

    let handle = thread::spawn(move || {
        run_render_loop(factory, channels, VideoElement::new(display), interval, token);
    });

    RenderLoopHandle {
        cancel,
        handle: Some(handle),
    }
}

fn run_render_loop<F, L>(
    factory: F,
    channels: RenderLoopChannels,
    mut video: VideoElement,
    interval: Duration,
    cancel: CancellationToken,
) where
    F: FnOnce(&CancellationToken) -> Result<L> + Send + 'static,
    L: HandLandmarker,
{
    let RenderLoopChannels {
        frame_rx,
        status_tx,
        output_tx,
    } = channels;

    loop {
        if cancel.is_cancelled() {
            return;
        }
        match frame_rx.recv_timeout(FIRST_FRAME_POLL) {
            Ok(frame) => {
                log::info!("first video frame {}x{}", frame.width, frame.height);
                video.update(frame);
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("camera stream ended before the first frame");
                return;
            }
        }
    }

    let _ = status_tx.send(DetectorStatus::Initializing);
    let init_rx = spawn_initialization(factory, cancel.clone());

    let mut context: RenderContext<L, RgbaCanvas> = RenderContext::new(RgbaCanvas::default());
    let mut timestamps = FrameTimestamps::new();
    let mut init_rx = Some(init_rx);
    let ticker = tick(interval);

    while !cancel.is_cancelled() {
        if ticker.recv().is_err() {
            break;
        }

        if let Some(rx) = init_rx.as_ref() {
            match rx.try_recv() {
                Ok(Ok(detector)) => {
                    context.attach_detector(detector);
                    let _ = status_tx.send(DetectorStatus::Ready);
                    init_rx = None;
                }
                Ok(Err(err)) => {
                    log::error!("failed to initialize hand landmarker: {err:?}");
                    let _ = status_tx.send(DetectorStatus::Failed(format!("{err:#}")));
                    init_rx = None;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    let _ = status_tx.send(DetectorStatus::Failed(
                        "hand landmarker initialization aborted".to_string(),
                    ));
                    init_rx = None;
                }
            }
        }

        if !drain_latest_frame(&frame_rx, &mut video) {
            log::info!("camera stream closed, stopping render loop");
            break;
        }

        let rendered = match context.render_frame(&video, timestamps.next_ms()) {
            Ok(FrameOutcome::Rendered { .. }) => true,
            Ok(FrameOutcome::Skipped) => false,
            Err(err) => {
                log::warn!("hand detection failed, skipping frame: {err:?}");
                false
            }
        };

        if let Some(mut output) = present(&video, rendered.then(|| context.surface())) {
            if rendered {
                output.hands = context.last_result().clone();
            }
            let _ = output_tx.try_send(output);
        }
    }
}

fn spawn_initialization<F, L>(factory: F, cancel: CancellationToken) -> Receiver<Result<L>>
where
    F: FnOnce(&CancellationToken) -> Result<L> + Send + 'static,
    L: HandLandmarker,
{
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        if cancel.is_cancelled() {
            return;
        }
        let result = factory(&cancel);
        if cancel.is_cancelled() {
            log::debug!("render loop stopped during initialization, dropping the landmarker");
            return;
        }
        let _ = tx.send(result);
    });
    rx
}

/// Pulls every queued frame and keeps the newest. Returns `false` once the camera
/// side hung up.
fn drain_latest_frame(frame_rx: &Receiver<Frame>, video: &mut VideoElement) -> bool {
    loop {
        match frame_rx.try_recv() {
            Ok(frame) => video.update(frame),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

/// Composites the current video frame with the overlay, or with a blank overlay
/// when nothing was drawn this iteration. A drawn overlay keeps the size it was
/// drawn at, even if the display box moved since.
fn present(video: &VideoElement, overlay: Option<&RgbaCanvas>) -> Option<CompositedFrame> {
    let frame = video.current_frame()?;

    let blank;
    let overlay = match overlay {
        Some(canvas) => canvas,
        None => {
            let (width, height) = video.bounding_box()?;
            blank = RgbaCanvas::new(width, height);
            &blank
        }
    };

    composite(frame, overlay)
        .map_err(|err| log::warn!("failed to composite overlay: {err:?}"))
        .ok()
}
