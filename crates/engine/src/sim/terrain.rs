use crate::math::Vec3;

/// Axis-aligned playable area on the XY plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl TerrainBounds {
    pub fn contains(&self, position: Vec3) -> bool {
        position.x >= self.min_x
            && position.x <= self.max_x
            && position.y >= self.min_y
            && position.y <= self.max_y
    }
}

/// Grounding queries. Implementations must be side-effect free.
pub trait TerrainQuery {
    fn height_at(&self, position: Vec3) -> f32;

    fn water_level_at(&self, _position: Vec3) -> f32 {
        f32::NEG_INFINITY
    }

    fn bounds(&self) -> Option<TerrainBounds> {
        None
    }

    /// Frame id of the last height edit; shadow casting skips waypoints on that frame.
    fn last_edit_frame(&self) -> Option<u64> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlatTerrain {
    pub height: f32,
    pub water_level: Option<f32>,
}

impl TerrainQuery for FlatTerrain {
    fn height_at(&self, _position: Vec3) -> f32 {
        self.height
    }

    fn water_level_at(&self, _position: Vec3) -> f32 {
        self.water_level.unwrap_or(f32::NEG_INFINITY)
    }
}

/// Regular grid of heights with bilinear sampling. Cell (0,0) sits at `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    width: u32,
    height: u32,
    cell_size: f32,
    origin_x: f32,
    origin_y: f32,
    heights: Vec<f32>,
    water_level: Option<f32>,
}

impl HeightField {
    pub fn new(
        width: u32,
        height: u32,
        cell_size: f32,
        heights: Vec<f32>,
        water_level: Option<f32>,
    ) -> Option<Self> {
        let expected = (width as usize).checked_mul(height as usize)?;
        if width == 0 || height == 0 || heights.len() != expected || cell_size <= 0.0 {
            return None;
        }
        Some(Self {
            width,
            height,
            cell_size,
            origin_x: -(width as f32 - 1.0) * cell_size * 0.5,
            origin_y: -(height as f32 - 1.0) * cell_size * 0.5,
            heights,
            water_level,
        })
    }

    pub fn flat(width: u32, height: u32, cell_size: f32, level: f32) -> Option<Self> {
        let count = (width as usize).checked_mul(height as usize)?;
        Self::new(width, height, cell_size, vec![level; count], None)
    }

    fn sample(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        self.heights[y * self.width as usize + x]
    }
}

impl TerrainQuery for HeightField {
    fn height_at(&self, position: Vec3) -> f32 {
        let fx = ((position.x - self.origin_x) / self.cell_size)
            .clamp(0.0, (self.width - 1) as f32);
        let fy = ((position.y - self.origin_y) / self.cell_size)
            .clamp(0.0, (self.height - 1) as f32);
        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;
        let top = self.sample(x0, y0) * (1.0 - tx) + self.sample(x0 + 1, y0) * tx;
        let bottom = self.sample(x0, y0 + 1) * (1.0 - tx) + self.sample(x0 + 1, y0 + 1) * tx;
        top * (1.0 - ty) + bottom * ty
    }

    fn water_level_at(&self, _position: Vec3) -> f32 {
        self.water_level.unwrap_or(f32::NEG_INFINITY)
    }

    fn bounds(&self) -> Option<TerrainBounds> {
        Some(TerrainBounds {
            min_x: self.origin_x,
            min_y: self.origin_y,
            max_x: self.origin_x + (self.width - 1) as f32 * self.cell_size,
            max_y: self.origin_y + (self.height - 1) as f32 * self.cell_size,
        })
    }
}
