//! SSD anchors of the 192x192 palm detection network.

use std::sync::LazyLock;

/// Feature map layers as `(boxes per cell, grid size)`. Stride 8 gives a 24x24 grid
/// with 2 anchors per cell, the three stride-16 layers share a 12x12 grid with 6.
const LAYERS: &[(usize, usize)] = &[(2, 24), (6, 12)];

pub const NUM_ANCHORS: usize = 2016;

/// Anchor centers in `[0, 1]` input coordinates. Sizes are fixed at 1.0 so only
/// the centers are kept.
pub static ANCHORS: LazyLock<Vec<[f32; 2]>> = LazyLock::new(generate);

fn generate() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for &(boxes_per_cell, grid) in LAYERS {
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, boxes_per_cell));
            }
        }
    }
    anchors
}
