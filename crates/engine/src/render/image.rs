/// Linear RGBA. Channels may exceed 1.0 before the composite resolves them.
pub type Color = [f32; 4];

pub const TRANSPARENT: Color = [0.0, 0.0, 0.0, 0.0];
pub const BLACK: Color = [0.0, 0.0, 0.0, 1.0];

pub fn color_from_rgba8(rgba: [u8; 4]) -> Color {
    [
        rgba[0] as f32 / 255.0,
        rgba[1] as f32 / 255.0,
        rgba[2] as f32 / 255.0,
        rgba[3] as f32 / 255.0,
    ]
}

pub fn color_to_rgba8(color: Color) -> [u8; 4] {
    let quantize = |channel: f32| (channel.clamp(0.0, 1.0) * 255.0).round() as u8;
    [
        quantize(color[0]),
        quantize(color[1]),
        quantize(color[2]),
        quantize(color[3]),
    ]
}

/// Source-over blend of `src` onto `dst`.
pub fn blend_over(dst: Color, src: Color) -> Color {
    let alpha = src[3].clamp(0.0, 1.0);
    [
        dst[0] + (src[0] - dst[0]) * alpha,
        dst[1] + (src[1] - dst[1]) * alpha,
        dst[2] + (src[2] - dst[2]) * alpha,
        dst[3].max(alpha),
    ]
}

/// CPU color surface with an optional depth plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
    depth: Option<Vec<f32>>,
}

impl Image {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, TRANSPARENT)
    }

    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
            depth: None,
        }
    }

    pub fn with_depth(mut self) -> Self {
        self.depth = Some(vec![1.0; self.pixels.len()]);
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Color] {
        &mut self.pixels
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }

    pub fn get(&self, x: u32, y: u32) -> Color {
        self.index(x, y)
            .map(|index| self.pixels[index])
            .unwrap_or(TRANSPARENT)
    }

    /// Edge-clamped fetch.
    pub fn get_clamped(&self, x: i64, y: i64) -> Color {
        if self.width == 0 || self.height == 0 {
            return TRANSPARENT;
        }
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(x, y)
    }

    /// Nearest fetch at normalized coordinates, as a texture sampler would.
    pub fn sample(&self, u: f32, v: f32) -> Color {
        let x = (u * self.width as f32).floor() as i64;
        let y = (v * self.height as f32).floor() as i64;
        self.get_clamped(x, y)
    }

    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        if let Some(index) = self.index(x, y) {
            self.pixels[index] = color;
        }
    }

    pub fn blend(&mut self, x: u32, y: u32, color: Color) {
        if let Some(index) = self.index(x, y) {
            self.pixels[index] = blend_over(self.pixels[index], color);
        }
    }

    /// Writes `color` when `depth` is nearer than the stored depth. Images without a
    /// depth plane always accept the write.
    pub fn depth_tested_set(&mut self, x: u32, y: u32, depth: f32, color: Color) -> bool {
        let Some(index) = self.index(x, y) else {
            return false;
        };
        if let Some(plane) = self.depth.as_mut() {
            if depth >= plane[index] {
                return false;
            }
            plane[index] = depth;
        }
        self.pixels[index] = color;
        true
    }

    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        let index = self.index(x, y)?;
        self.depth.as_ref().map(|plane| plane[index])
    }

    pub fn clear(&mut self, color: Color, clear_depth: bool) {
        self.pixels.fill(color);
        if clear_depth {
            if let Some(plane) = self.depth.as_mut() {
                plane.fill(1.0);
            }
        }
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, width: i32, height: i32, color: Color) {
        let start_x = x.max(0);
        let start_y = y.max(0);
        let end_x = x.saturating_add(width).min(self.width as i32);
        let end_y = y.saturating_add(height).min(self.height as i32);
        for py in start_y..end_y {
            for px in start_x..end_x {
                self.blend(px as u32, py as u32, color);
            }
        }
    }

    /// Packed RGBA8 rows, as a window surface or PNG encoder expects.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|&color| color_to_rgba8(color))
            .collect()
    }

    pub fn write_rgba8(&self, frame: &mut [u8]) {
        for (chunk, &color) in frame.chunks_exact_mut(4).zip(self.pixels.iter()) {
            chunk.copy_from_slice(&color_to_rgba8(color));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_test_keeps_nearest_write() {
        let mut image = Image::new(2, 2).with_depth();
        assert!(image.depth_tested_set(1, 1, 0.5, [1.0, 0.0, 0.0, 1.0]));
        assert!(!image.depth_tested_set(1, 1, 0.7, [0.0, 1.0, 0.0, 1.0]));
        assert!(image.depth_tested_set(1, 1, 0.2, [0.0, 0.0, 1.0, 1.0]));
        assert_eq!(image.get(1, 1), [0.0, 0.0, 1.0, 1.0]);

        image.clear(BLACK, true);
        assert_eq!(image.depth_at(1, 1), Some(1.0));
    }

    #[test]
    fn rgba8_quantization_clamps_hdr_values() {
        assert_eq!(color_to_rgba8([2.0, -1.0, 0.5, 1.0]), [255, 0, 128, 255]);
        let back = color_from_rgba8([20, 20, 20, 255]);
        assert!((back[0] - 20.0 / 255.0).abs() < 0.0001);
    }

    #[test]
    fn out_of_range_access_is_ignored() {
        let mut image = Image::filled(1, 1, BLACK);
        image.set(5, 5, [1.0; 4]);
        assert_eq!(image.get(5, 5), TRANSPARENT);
        assert_eq!(image.get_clamped(-3, 9), BLACK);
    }
}
