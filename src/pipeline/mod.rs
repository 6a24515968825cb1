pub mod camera;
pub mod canvas;
pub mod compositor;
pub mod landmarker;
pub mod render_loop;
pub mod rgba_converter;
pub mod skeleton;

pub use camera::{CameraStream, open_default_camera};
pub use compositor::CompositedFrame;
pub use render_loop::{DetectorStatus, DisplayBox, RenderLoopChannels, RenderLoopHandle, start_render_loop};
