use std::time::Instant;

/// Number of landmarks the handpose model produces for every hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
#[cfg(test)]
pub const INDEX_FINGER_TIP: usize = 8;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    /// Natural size of the frame, `None` until the camera produced real geometry.
    pub fn natural_size(&self) -> Option<(u32, u32)> {
        if self.width > 0 && self.height > 0 {
            Some((self.width, self.height))
        } else {
            None
        }
    }
}

/// A hand keypoint. `x`/`y` are fractions of the frame width/height, `z` is a depth
/// relative to the wrist where more negative means closer to the camera.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
    Unknown,
}

impl Handedness {
    /// The handpose model reports the probability of a right hand.
    pub fn from_score(score: f32) -> Self {
        if !score.is_finite() {
            Handedness::Unknown
        } else if score >= 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "left",
            Handedness::Right => "right",
            Handedness::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hand {
    pub landmarks: [Landmark; HAND_LANDMARK_COUNT],
    pub handedness: Handedness,
    pub score: f32,
}

impl Hand {
    pub fn new(landmarks: [Landmark; HAND_LANDMARK_COUNT]) -> Self {
        Self {
            landmarks,
            handedness: Handedness::Unknown,
            score: 1.0,
        }
    }

    pub fn wrist(&self) -> &Landmark {
        &self.landmarks[WRIST]
    }

    /// Short label such as `right 87%`.
    pub fn describe(&self) -> String {
        format!(
            "{} {:.0}%",
            self.handedness.label(),
            self.score.clamp(0.0, 1.0) * 100.0
        )
    }
}

/// Hands found in a single frame. Nothing carries over to the next frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub hands: Vec<Hand>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    /// One label per hand, joined for a status line.
    pub fn describe(&self) -> String {
        self.hands
            .iter()
            .map(Hand::describe)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(handedness: Handedness, score: f32) -> Hand {
        Hand {
            handedness,
            score,
            ..Hand::new([Landmark::default(); HAND_LANDMARK_COUNT])
        }
    }

    #[test]
    fn handedness_follows_right_hand_probability() {
        assert_eq!(Handedness::from_score(0.9), Handedness::Right);
        assert_eq!(Handedness::from_score(0.5), Handedness::Right);
        assert_eq!(Handedness::from_score(0.1), Handedness::Left);
        assert_eq!(Handedness::from_score(f32::NAN), Handedness::Unknown);
    }

    #[test]
    fn describes_every_hand_in_order() {
        let result = DetectionResult {
            hands: vec![hand(Handedness::Right, 0.874), hand(Handedness::Left, 1.2)],
        };
        assert!(!result.is_empty());
        assert_eq!(result.describe(), "right 87%, left 100%");
        assert_eq!(DetectionResult::default().describe(), "");
    }

    #[test]
    fn zero_sized_frames_have_no_natural_size() {
        let frame = Frame {
            rgba: Vec::new(),
            width: 0,
            height: 480,
            timestamp: Instant::now(),
        };
        assert_eq!(frame.natural_size(), None);
    }
}
