use super::render_util::{composited_to_image, fit_video_box};
use super::{
    ActiveTheme, AnyElement, AppView, Context, DEFAULT_VIDEO_RATIO, DetectorStatus, IntoElement,
    ObjectFit, ParentElement, STATUS_BAR_HEIGHT, Screen, Styled, StyledImage, VIEW_PADDING, Window,
    div, h_flex, img, px, v_flex,
};

impl AppView {
    pub(super) fn render_live(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let max_hands = self.max_hands;
        let Screen::Live(live) = &mut self.screen else {
            return div().into_any_element();
        };

        while let Ok(status) = live.status_rx.try_recv() {
            live.status = status;
        }

        // Only the newest composited frame is worth uploading.
        let mut newest = None;
        while let Ok(frame) = live.output_rx.try_recv() {
            newest = Some(frame);
        }
        if let Some(mut frame) = newest {
            live.natural_size = Some(frame.natural_size);
            live.hands = std::mem::take(&mut frame.hands);
            if let Some(image) = composited_to_image(frame) {
                if let Some(old_image) = live.latest_image.replace(image) {
                    // Release the previous texture or the sprite atlas grows every frame.
                    cx.drop_image(old_image, Some(window));
                }
            }
        }

        let viewport = window.viewport_size();
        let available = (
            f32::from(viewport.width) - VIEW_PADDING * 2.0,
            f32::from(viewport.height) - VIEW_PADDING * 2.0 - STATUS_BAR_HEIGHT,
        );
        let ratio = live
            .natural_size
            .filter(|(w, h)| *w > 0 && *h > 0)
            .map(|(w, h)| w as f32 / h as f32)
            .unwrap_or(DEFAULT_VIDEO_RATIO);
        let (box_w, box_h) = fit_video_box(available, ratio);
        live.display.set(box_w as u32, box_h as u32);

        let video: AnyElement = if let Some(image) = &live.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Fill)
                .into_any_element()
        } else {
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for camera...")
                .into_any_element()
        };

        let theme = cx.theme();
        let (icon, status_text, status_color) = match &live.status {
            DetectorStatus::WaitingForVideo => {
                ("○", "Waiting for video".to_string(), theme.muted_foreground)
            }
            DetectorStatus::Initializing => (
                "○",
                "Loading hand landmarker...".to_string(),
                theme.muted_foreground,
            ),
            DetectorStatus::Ready if live.hands.is_empty() => (
                "●",
                format!("Tracking up to {max_hands} hands, none in view"),
                theme.success,
            ),
            DetectorStatus::Ready => (
                "●",
                format!("Tracking {}", live.hands.describe()),
                theme.success,
            ),
            DetectorStatus::Failed(message) => (
                "!",
                format!("Hand landmarker unavailable: {message}"),
                gpui::rgb(0xfca5a5).into(),
            ),
        };

        let frame_status = match live.natural_size {
            Some((w, h)) => format!("{} {w}x{h}", live.camera_label),
            None => format!("{}, waiting for frames", live.camera_label),
        };

        let status_bar = h_flex()
            .w(px(box_w))
            .h(px(STATUS_BAR_HEIGHT))
            .justify_between()
            .items_center()
            .gap_2()
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .text_xs()
                    .text_color(status_color)
                    .child(icon)
                    .child(status_text),
            )
            .child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0x8b95a5))
                    .overflow_hidden()
                    .text_ellipsis()
                    .whitespace_nowrap()
                    .child(frame_status),
            );

        v_flex()
            .size_full()
            .p(px(VIEW_PADDING))
            .items_center()
            .child(
                div()
                    .w(px(box_w))
                    .h(px(box_h))
                    .overflow_hidden()
                    .rounded_lg()
                    .bg(gpui::rgb(0x000000))
                    .child(video),
            )
            .child(status_bar)
            .into_any_element()
    }
}
