use super::canvas::{Color, Surface};
use crate::types::{HAND_LANDMARK_COUNT, Hand, Landmark, WRIST};

pub const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

pub const SKELETON_LINE_WIDTH: f32 = 2.0;
pub const WRIST_RADIUS: f32 = 8.0;
pub const LANDMARK_RADIUS: f32 = 4.0;

/// Relative depths beyond this distance from the wrist saturate the gradient.
pub const DEPTH_WINDOW: f32 = 0.1;

/// Maps a wrist-relative depth onto the overlay gradient: green in front of the
/// wrist, blue at wrist depth, red behind it.
pub fn depth_to_color(relative_depth: f32) -> Color {
    let clamped = relative_depth.clamp(-DEPTH_WINDOW, DEPTH_WINDOW);
    let t = (clamped + DEPTH_WINDOW) / (2.0 * DEPTH_WINDOW);

    Color::rgb(
        channel(t),
        channel(1.0 - t),
        channel(1.0 - (t - 0.5).abs() * 2.0),
    )
}

fn channel(weight: f32) -> u8 {
    (255.0 * weight).round().clamp(0.0, 255.0) as u8
}

pub fn relative_depths(hand: &Hand) -> [f32; HAND_LANDMARK_COUNT] {
    let wrist_z = hand.wrist().z;
    hand.landmarks.map(|landmark| landmark.z - wrist_z)
}

/// Projects a normalized landmark onto a surface of the given size, flipping the
/// horizontal axis to line up with the mirrored video.
pub fn to_screen(landmark: &Landmark, width: u32, height: u32) -> (f32, f32) {
    let (w, h) = (width as f32, height as f32);
    (w - landmark.x * w, landmark.y * h)
}

pub fn landmark_radius(index: usize) -> f32 {
    if index == WRIST {
        WRIST_RADIUS
    } else {
        LANDMARK_RADIUS
    }
}

pub fn draw_hand<S: Surface + ?Sized>(surface: &mut S, hand: &Hand) {
    let (width, height) = surface.size();
    let depths = relative_depths(hand);

    for &(a, b) in CONNECTIONS {
        let color = depth_to_color((depths[a] + depths[b]) / 2.0);
        surface.stroke_line(
            to_screen(&hand.landmarks[a], width, height),
            to_screen(&hand.landmarks[b], width, height),
            color,
            SKELETON_LINE_WIDTH,
        );
    }

    for (index, landmark) in hand.landmarks.iter().enumerate() {
        surface.fill_circle(
            to_screen(landmark, width, height),
            landmark_radius(index),
            depth_to_color(depths[index]),
        );
    }
}
