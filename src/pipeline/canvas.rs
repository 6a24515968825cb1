/// Opaque RGB color used for overlay strokes and fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

/// Immediate-mode 2D drawing target the skeleton is painted on.
pub trait Surface {
    fn size(&self) -> (u32, u32);

    /// Resizes the backing buffer. Existing content is not preserved.
    fn resize(&mut self, width: u32, height: u32);

    fn clear(&mut self);

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: Color, width: f32);

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Color);
}

/// RGBA8 pixel surface. Cleared pixels are fully transparent so the surface can be
/// blended over the video frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgbaCanvas {
    rgba: Vec<u8>,
    width: u32,
    height: u32,
}

impl RgbaCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            rgba: vec![0u8; pixel_len(width, height)],
            width,
            height,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.rgba
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) as usize) * 4;
        let px = self.rgba.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    fn put_pixel_safe(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = ((uy * self.width + ux) as usize) * 4;
        if idx + 3 < self.rgba.len() {
            self.rgba[idx..idx + 4].copy_from_slice(&color);
        }
    }

    fn stamp(&mut self, x: i32, y: i32, radius: i32, color: [u8; 4]) {
        self.put_pixel_safe(x, y, color);
        for ox in -radius..=radius {
            for oy in -radius..=radius {
                if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                    self.put_pixel_safe(x + ox, y + oy, color);
                }
            }
        }
    }
}

impl Surface for RgbaCanvas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.rgba.clear();
        self.rgba.resize(pixel_len(width, height), 0);
    }

    fn clear(&mut self) {
        self.rgba.fill(0);
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: Color, width: f32) {
        let color = color.rgba();
        let (mut x0, mut y0) = (from.0.round() as i32, from.1.round() as i32);
        let (x1, y1) = (to.0.round() as i32, to.1.round() as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = (width.round() as i32 / 2).max(0);

        loop {
            self.stamp(x0, y0, radius, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Color) {
        let color = color.rgba();
        let (cx, cy) = (center.0.round() as i32, center.1.round() as i32);
        let radius = radius.round().max(0.0) as i32;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel_safe(cx + dx, cy + dy, color);
                }
            }
        }
    }
}

fn pixel_len(width: u32, height: u32) -> usize {
    (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::rgb(255, 0, 0);

    #[test]
    fn resize_discards_content_and_matches_dimensions() {
        let mut canvas = RgbaCanvas::new(4, 4);
        canvas.fill_circle((1.0, 1.0), 1.0, RED);
        canvas.resize(10, 6);
        assert_eq!(canvas.size(), (10, 6));
        assert_eq!(canvas.pixels().len(), 10 * 6 * 4);
        assert!(canvas.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn clear_makes_every_pixel_transparent() {
        let mut canvas = RgbaCanvas::new(8, 8);
        canvas.stroke_line((0.0, 0.0), (7.0, 7.0), RED, 2.0);
        assert!(canvas.pixels().iter().any(|&b| b != 0));
        canvas.clear();
        assert!(canvas.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn line_covers_both_endpoints() {
        let mut canvas = RgbaCanvas::new(20, 20);
        canvas.stroke_line((2.0, 3.0), (15.0, 12.0), RED, 2.0);
        assert_eq!(canvas.pixel(2, 3), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(15, 12), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(19, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn circle_respects_radius() {
        let mut canvas = RgbaCanvas::new(30, 30);
        canvas.fill_circle((15.0, 15.0), 4.0, RED);
        assert_eq!(canvas.pixel(19, 15), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(15, 11), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(20, 15), Some([0, 0, 0, 0]));
        assert_eq!(canvas.pixel(18, 18), Some([0, 0, 0, 0]));
    }

    #[test]
    fn drawing_outside_the_buffer_is_clipped() {
        let mut canvas = RgbaCanvas::new(5, 5);
        canvas.fill_circle((-10.0, -10.0), 8.0, RED);
        canvas.stroke_line((-20.0, 2.0), (40.0, 2.0), RED, 2.0);
        assert_eq!(canvas.pixels().len(), 5 * 5 * 4);
        assert_eq!(canvas.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(canvas.pixel(4, 2), Some([255, 0, 0, 255]));
    }
}
