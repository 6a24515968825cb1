use std::sync::Arc;

use crossbeam_channel::{Receiver, bounded, unbounded};
use gpui::{
    AnyElement, App, AppContext, Context, IntoElement, ObjectFit, ParentElement, Render,
    RenderImage, Styled, StyledImage, TitlebarOptions, Window, WindowOptions, div, img, px,
};
use gpui_component::{ActiveTheme, Root, StyledExt, h_flex, v_flex};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    config::OverlayConfig,
    pipeline::{
        self, CameraStream, CompositedFrame, DetectorStatus, DisplayBox, RenderLoopChannels,
        RenderLoopHandle, landmarker,
    },
    types::DetectionResult,
};

mod alert_view;
mod overlay_view;
mod render_util;

const DEFAULT_VIDEO_RATIO: f32 = 4.0 / 3.0;
const STATUS_BAR_HEIGHT: f32 = 40.0;
const VIEW_PADDING: f32 = 16.0;

pub fn launch_ui(app: &mut App, config: OverlayConfig) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Hand Overlay".into()),
            appears_transparent: false,
            traffic_light_position: None,
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(config));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

enum Screen {
    /// Camera access failed; the video is hidden and only the alert shows.
    CameraUnavailable { message: String },
    Live(LiveState),
}

struct LiveState {
    camera_label: String,
    status_rx: Receiver<DetectorStatus>,
    output_rx: Receiver<CompositedFrame>,
    display: DisplayBox,
    status: DetectorStatus,
    natural_size: Option<(u32, u32)>,
    hands: DetectionResult,
    latest_image: Option<Arc<RenderImage>>,
    // Declared before the camera so the loop stops before capture does.
    _render_loop: RenderLoopHandle,
    _camera: CameraStream,
}

struct AppView {
    screen: Screen,
    max_hands: usize,
}

impl AppView {
    fn new(config: OverlayConfig) -> Self {
        let (frame_tx, frame_rx) = bounded(1);

        let camera = match pipeline::open_default_camera(frame_tx) {
            Ok(camera) => camera,
            Err(err) => {
                log::error!("could not access webcam: {err:?}");
                return Self {
                    screen: Screen::CameraUnavailable {
                        message: format!("Could not access webcam: {err:#}"),
                    },
                    max_hands: config.num_hands,
                };
            }
        };

        let (status_tx, status_rx) = unbounded();
        let (output_tx, output_rx) = bounded(1);
        let display = DisplayBox::default();
        let options = config.landmarker_options();

        let render_loop = pipeline::start_render_loop(
            move |cancel| landmarker::create_with_model_download(options, cancel),
            RenderLoopChannels {
                frame_rx,
                status_tx,
                output_tx,
            },
            display.clone(),
            config.frame_interval(),
        );

        Self {
            screen: Screen::Live(LiveState {
                camera_label: camera.label().to_string(),
                status_rx,
                output_rx,
                display,
                status: DetectorStatus::WaitingForVideo,
                natural_size: None,
                hands: DetectionResult::default(),
                latest_image: None,
                _render_loop: render_loop,
                _camera: camera,
            }),
            max_hands: config.num_hands,
        }
    }
}

impl Render for AppView {
    fn render(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> impl IntoElement {
        let body = if matches!(self.screen, Screen::Live(_)) {
            // Poll the render loop again on the next frame.
            cx.defer_in(window, |_, _, cx| {
                cx.notify();
            });
            self.render_live(window, cx)
        } else {
            self.render_camera_alert()
        };

        div()
            .size_full()
            .bg(cx.theme().background)
            .child(body)
    }
}
