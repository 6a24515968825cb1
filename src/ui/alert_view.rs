use super::{AnyElement, AppView, IntoElement, ParentElement, Screen, Styled, StyledExt, div, h_flex, v_flex};

impl AppView {
    pub(super) fn render_camera_alert(&self) -> AnyElement {
        let Screen::CameraUnavailable { message } = &self.screen else {
            return div().into_any_element();
        };

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .child(
                h_flex()
                    .gap_3()
                    .items_start()
                    .max_w(super::px(480.0))
                    .p_4()
                    .rounded_xl()
                    .bg(gpui::rgba(0x7f1d1d33))
                    .border_1()
                    .border_color(gpui::rgba(0xef4444aa))
                    .shadow_lg()
                    .child(
                        div()
                            .text_base()
                            .flex_shrink_0()
                            .text_color(gpui::rgb(0xfca5a5))
                            .child("!"),
                    )
                    .child(
                        v_flex()
                            .gap_1()
                            .child(
                                div()
                                    .text_sm()
                                    .font_semibold()
                                    .text_color(gpui::rgb(0xfecaca))
                                    .child("Camera unavailable"),
                            )
                            .child(
                                div()
                                    .text_xs()
                                    .text_color(gpui::rgb(0xfca5a5))
                                    .child(message.clone()),
                            ),
                    ),
            )
            .into_any_element()
    }
}
