use crate::math::Vec3;
use crate::mode::Mode;
use crate::sim::{ActorArena, ActorId, Camera, GhostDraw, TeamColor, TerrainQuery, ThingKind};

use super::image::{blend_over, Color, Image};

/// Half-width of the square of world XY covered by the shadow map.
pub const SHADOW_EXTENT: f32 = 64.0;
/// View distance that maps to depth 1.0 in the effects target.
pub const DEPTH_RANGE: f32 = 200.0;
const VERTICAL_FOV_RADIANS: f32 = 1.047_197_6;
const SKY_TOP: Color = [0.28, 0.46, 0.78, 1.0];
const SKY_HORIZON: Color = [0.74, 0.84, 0.95, 1.0];
const GROUND_LIGHT: Color = [0.36, 0.58, 0.30, 1.0];
const GROUND_DARK: Color = [0.31, 0.51, 0.26, 1.0];
const WATER: Color = [0.20, 0.38, 0.62, 1.0];
const BRUSH_TINT: Color = [1.0, 0.9, 0.3, 0.35];
const AURA: Color = [1.0, 1.0, 0.6, 1.0];
const SHADOW_STRENGTH: f32 = 0.45;

/// Which representation a pass asks the scene for. Threaded through every paint call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderEffect {
    ShadowPass,
    DepthPass,
    BloomPass,
    #[default]
    Normal,
    GhostPass,
    Aura,
}

/// Interactive terrain brush drawn in the color pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brush {
    pub position: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    pub effect: RenderEffect,
    pub mode: Mode,
    pub frame: u64,
    pub brush: Option<Brush>,
    /// Waypoint and path opacity; lowered while terrain is being edited.
    pub waypoint_alpha: f32,
    pub anti_alias_samples: u8,
}

impl RenderContext {
    pub fn with_effect(self, effect: RenderEffect) -> Self {
        Self { effect, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneLayer {
    ShadowCasters,
    Sky,
    Terrain,
    Actors,
    Transparent,
    Ghosts,
    Glow,
    Distortion,
}

/// Read-only view of everything the painter may draw.
#[derive(Clone, Copy)]
pub struct SceneView<'a> {
    pub actors: &'a ActorArena,
    pub content: &'a [ActorId],
    pub camera: &'a Camera,
    pub terrain: &'a dyn TerrainQuery,
    pub ghosts: &'a [GhostDraw],
    pub cursor: Option<Vec3>,
    pub selected: Option<ActorId>,
    /// Blurred shadow texture, present once the shadow pass ran this frame.
    pub shadow: Option<&'a Image>,
}

/// World and actor renderers. The render graph decides targets and order.
pub trait ScenePainter {
    fn paint(
        &mut self,
        layer: SceneLayer,
        ctx: &RenderContext,
        scene: &SceneView<'_>,
        target: &mut Image,
    );
}

/// Pinhole projection for one camera and target size.
#[derive(Debug, Clone, Copy)]
struct Projection {
    eye: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    focal: f32,
    half_width: f32,
    half_height: f32,
    near: f32,
}

impl Projection {
    fn new(camera: &Camera, width: u32, height: u32) -> Self {
        let forward = camera.view_dir();
        let mut right = forward.cross(Vec3::UNIT_Z).normalized_or_zero();
        if right == Vec3::ZERO {
            right = Vec3::new(1.0, 0.0, 0.0);
        }
        let up = right.cross(forward).normalized_or_zero();
        Self {
            eye: camera.from,
            forward,
            right,
            up,
            focal: 1.0 / (VERTICAL_FOV_RADIANS * 0.5).tan(),
            half_width: width as f32 * 0.5,
            half_height: height as f32 * 0.5,
            near: camera.near_clip.max(0.01),
        }
    }

    /// Screen position and view depth, or None behind the near plane.
    fn project(&self, point: Vec3) -> Option<(f32, f32, f32)> {
        let offset = point - self.eye;
        let depth = offset.dot(self.forward);
        if depth <= self.near {
            return None;
        }
        let scale = self.focal * self.half_height / depth;
        Some((
            self.half_width + offset.dot(self.right) * scale,
            self.half_height - offset.dot(self.up) * scale,
            depth,
        ))
    }

    fn pixel_radius(&self, world_radius: f32, depth: f32) -> f32 {
        world_radius * self.focal * self.half_height / depth
    }

    fn ray(&self, x: f32, y: f32) -> Vec3 {
        let nx = (x - self.half_width) / (self.focal * self.half_height);
        let ny = (self.half_height - y) / (self.focal * self.half_height);
        (self.forward + self.right * nx + self.up * ny).normalized_or_zero()
    }
}

/// CPU scene renderer: gradient sky, checkered ground plane, actors as shaded discs.
#[derive(Debug, Default)]
pub struct SoftwarePainter;

impl ScenePainter for SoftwarePainter {
    fn paint(
        &mut self,
        layer: SceneLayer,
        ctx: &RenderContext,
        scene: &SceneView<'_>,
        target: &mut Image,
    ) {
        match layer {
            SceneLayer::ShadowCasters => paint_shadow_casters(scene, target),
            SceneLayer::Sky => paint_sky(target),
            SceneLayer::Terrain => paint_terrain(ctx, scene, target),
            SceneLayer::Actors => paint_actors(ctx, scene, target),
            SceneLayer::Transparent => paint_transparent(ctx, scene, target),
            SceneLayer::Ghosts => paint_ghosts(ctx, scene, target),
            SceneLayer::Glow => paint_glow(scene, target),
            SceneLayer::Distortion => paint_distortion(scene, target),
        }
    }
}

fn team_color(color: TeamColor) -> Color {
    match color {
        TeamColor::White => [0.92, 0.92, 0.92, 1.0],
        TeamColor::Red => [0.86, 0.22, 0.18, 1.0],
        TeamColor::Green => [0.24, 0.78, 0.30, 1.0],
        TeamColor::Blue => [0.22, 0.40, 0.90, 1.0],
        TeamColor::Yellow => [0.95, 0.85, 0.22, 1.0],
        TeamColor::Purple => [0.62, 0.30, 0.82, 1.0],
    }
}

fn depth_encoding(depth: f32) -> Color {
    [(depth / DEPTH_RANGE).clamp(0.0, 1.0), 0.0, 0.0, 1.0]
}

fn paint_sky(target: &mut Image) {
    let height = target.height().max(1) as f32;
    for y in 0..target.height() {
        let t = y as f32 / height;
        let color = [
            SKY_TOP[0] + (SKY_HORIZON[0] - SKY_TOP[0]) * t,
            SKY_TOP[1] + (SKY_HORIZON[1] - SKY_TOP[1]) * t,
            SKY_TOP[2] + (SKY_HORIZON[2] - SKY_TOP[2]) * t,
            1.0,
        ];
        for x in 0..target.width() {
            target.set(x, y, color);
        }
    }
}

fn shadow_at(shadow: &Image, point: Vec3) -> f32 {
    let u = (point.x + SHADOW_EXTENT) / (SHADOW_EXTENT * 2.0);
    let v = (point.y + SHADOW_EXTENT) / (SHADOW_EXTENT * 2.0);
    if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
        return 0.0;
    }
    shadow.sample(u, v)[3]
}

/// Ray-casts every pixel against the terrain height under the camera's focus.
fn paint_terrain(ctx: &RenderContext, scene: &SceneView<'_>, target: &mut Image) {
    let projection = Projection::new(scene.camera, target.width(), target.height());
    let ground = scene.terrain.height_at(scene.camera.at);
    let water = scene.terrain.water_level_at(scene.camera.at);
    let plane = if water > ground { water } else { ground };
    for y in 0..target.height() {
        for x in 0..target.width() {
            let ray = projection.ray(x as f32 + 0.5, y as f32 + 0.5);
            if ray.z >= -f32::EPSILON {
                continue;
            }
            let distance = (plane - projection.eye.z) / ray.z;
            if distance <= 0.0 {
                continue;
            }
            let hit = projection.eye + ray * distance;
            let depth = (hit - projection.eye).dot(projection.forward);
            let color = if ctx.effect == RenderEffect::DepthPass {
                depth_encoding(depth)
            } else {
                let mut base = if water > ground {
                    WATER
                } else if (hit.x.floor() as i64 + hit.y.floor() as i64).rem_euclid(2) == 0 {
                    GROUND_LIGHT
                } else {
                    GROUND_DARK
                };
                if let Some(shadow) = scene.shadow {
                    let darken = 1.0 - shadow_at(shadow, hit) * SHADOW_STRENGTH;
                    base = [base[0] * darken, base[1] * darken, base[2] * darken, 1.0];
                }
                match ctx.brush {
                    Some(brush) if hit.distance_squared(brush.position) <= brush.radius.powi(2) => {
                        blend_over(base, BRUSH_TINT)
                    }
                    _ => base,
                }
            };
            target.depth_tested_set(x, y, depth / DEPTH_RANGE, color);
        }
    }
}

fn drawable<'a>(scene: &'a SceneView<'a>) -> impl Iterator<Item = &'a crate::sim::Actor> + 'a {
    scene
        .content
        .iter()
        .filter_map(|id| scene.actors.get(*id))
        .filter(|actor| !actor.hidden_creatable && actor.visibility.visible)
}

fn is_ghosted(scene: &SceneView<'_>, id: ActorId) -> bool {
    scene.ghosts.iter().any(|ghost| ghost.actor == id)
}

fn paint_actors(ctx: &RenderContext, scene: &SceneView<'_>, target: &mut Image) {
    let projection = Projection::new(scene.camera, target.width(), target.height());
    let samples = ctx.anti_alias_samples.max(1);
    for actor in drawable(scene) {
        if is_ghosted(scene, actor.id) {
            continue;
        }
        let Some((sx, sy, depth)) = projection.project(actor.position()) else {
            continue;
        };
        let radius = projection.pixel_radius(actor.collision_radius(), depth);
        let color = match ctx.effect {
            RenderEffect::DepthPass => depth_encoding(depth),
            _ => team_color(actor.classification.color),
        };
        fill_disc(target, sx, sy, radius, depth / DEPTH_RANGE, color, samples);
    }
}

/// Cursor marker, plus the selection aura when painted with `RenderEffect::Aura`.
fn paint_transparent(ctx: &RenderContext, scene: &SceneView<'_>, target: &mut Image) {
    let projection = Projection::new(scene.camera, target.width(), target.height());
    if ctx.effect == RenderEffect::Aura {
        let selected = scene.selected.and_then(|id| scene.actors.get(id));
        if let Some(actor) = selected {
            if let Some((sx, sy, depth)) = projection.project(actor.position()) {
                let radius = projection.pixel_radius(actor.collision_radius(), depth);
                ring(target, sx, sy, radius + 2.0, AURA);
            }
        }
    }
    if let Some((sx, sy, _)) = scene.cursor.and_then(|cursor| projection.project(cursor)) {
        let color = [1.0, 1.0, 1.0, ctx.waypoint_alpha];
        for step in -6..=6 {
            blend_at(target, sx + step as f32, sy, color);
            blend_at(target, sx, sy + step as f32, color);
        }
    }
}

fn paint_ghosts(ctx: &RenderContext, scene: &SceneView<'_>, target: &mut Image) {
    debug_assert_eq!(ctx.effect, RenderEffect::GhostPass);
    let projection = Projection::new(scene.camera, target.width(), target.height());
    for ghost in scene.ghosts {
        let Some(actor) = scene.actors.get(ghost.actor) else {
            continue;
        };
        let Some((sx, sy, depth)) = projection.project(actor.position()) else {
            continue;
        };
        let radius = projection.pixel_radius(actor.collision_radius(), depth);
        let base = team_color(actor.classification.color);
        let glow = ghost.glow;
        let color = [
            base[0] + glow,
            base[1] + glow,
            base[2] + glow,
            ghost.opacity,
        ];
        blend_disc(target, sx, sy, radius, color);
    }
}

/// Selection and ghost glow into the glow chain.
fn paint_glow(scene: &SceneView<'_>, target: &mut Image) {
    let projection = Projection::new(scene.camera, target.width(), target.height());
    for actor in drawable(scene) {
        let ghost_glow = scene
            .ghosts
            .iter()
            .find(|ghost| ghost.actor == actor.id)
            .map_or(0.0, |ghost| ghost.glow);
        let strength = if scene.selected == Some(actor.id) {
            1.0
        } else {
            ghost_glow
        };
        if strength <= 0.0 {
            continue;
        }
        let Some((sx, sy, depth)) = projection.project(actor.position()) else {
            continue;
        };
        let radius = projection.pixel_radius(actor.collision_radius() * 1.5, depth);
        blend_disc(target, sx, sy, radius, [strength, strength, strength * 0.6, 1.0]);
    }
}

/// Lights with live emitters push pixels radially outward.
fn paint_distortion(scene: &SceneView<'_>, target: &mut Image) {
    let projection = Projection::new(scene.camera, target.width(), target.height());
    for actor in drawable(scene) {
        if actor.kind != ThingKind::Light || !actor.emitters_enabled {
            continue;
        }
        let Some((sx, sy, depth)) = projection.project(actor.position()) else {
            continue;
        };
        let radius = projection.pixel_radius(actor.collision_radius() * 2.0, depth).max(1.0);
        for_disc(target, sx, sy, radius, |target, x, y, falloff| {
            let dx = (x as f32 + 0.5 - sx) / radius;
            let dy = (y as f32 + 0.5 - sy) / radius;
            let offset = [dx * falloff * 0.5, dy * falloff * 0.5, 0.0, 1.0];
            target.set(x, y, offset);
        });
    }
}

/// Top-down occluder coverage in alpha, over the shadow extent.
fn paint_shadow_casters(scene: &SceneView<'_>, target: &mut Image) {
    let (width, height) = target.size();
    let texels_per_unit = width as f32 / (SHADOW_EXTENT * 2.0);
    for actor in drawable(scene) {
        let position = actor.position();
        let sx = (position.x + SHADOW_EXTENT) * texels_per_unit;
        let sy = (position.y + SHADOW_EXTENT) * (height as f32 / (SHADOW_EXTENT * 2.0));
        let radius = actor.collision_radius() * texels_per_unit;
        for_disc(target, sx, sy, radius, |target, x, y, _| {
            target.set(x, y, [0.0, 0.0, 0.0, 1.0]);
        });
    }
}

fn for_disc(
    target: &mut Image,
    cx: f32,
    cy: f32,
    radius: f32,
    mut write: impl FnMut(&mut Image, u32, u32, f32),
) {
    if radius <= 0.0 || !cx.is_finite() || !cy.is_finite() {
        return;
    }
    let min_x = (cx - radius).floor().max(0.0) as u32;
    let min_y = (cy - radius).floor().max(0.0) as u32;
    let max_x = ((cx + radius).ceil().max(0.0) as u32).min(target.width());
    let max_y = ((cy + radius).ceil().max(0.0) as u32).min(target.height());
    for y in min_y..max_y {
        for x in min_x..max_x {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance <= radius {
                write(target, x, y, 1.0 - distance / radius);
            }
        }
    }
}

/// Depth-tested opaque disc. Edge pixels use `samples`x`samples` coverage.
fn fill_disc(
    target: &mut Image,
    cx: f32,
    cy: f32,
    radius: f32,
    depth: f32,
    color: Color,
    samples: u8,
) {
    let grow = if samples > 1 { 1.0 } else { 0.0 };
    for_disc(target, cx, cy, radius + grow, |target, x, y, _| {
        let coverage = disc_coverage(cx, cy, radius, x, y, samples);
        if coverage >= 1.0 {
            target.depth_tested_set(x, y, depth, color);
        } else if coverage > 0.0 && target.depth_at(x, y).map_or(true, |stored| depth < stored) {
            target.blend(x, y, [color[0], color[1], color[2], coverage]);
        }
    });
}

fn disc_coverage(cx: f32, cy: f32, radius: f32, x: u32, y: u32, samples: u8) -> f32 {
    let samples = samples.max(1) as u32;
    let step = 1.0 / samples as f32;
    let mut inside = 0u32;
    for sy in 0..samples {
        for sx in 0..samples {
            let px = x as f32 + (sx as f32 + 0.5) * step - cx;
            let py = y as f32 + (sy as f32 + 0.5) * step - cy;
            if px * px + py * py <= radius * radius {
                inside += 1;
            }
        }
    }
    inside as f32 / (samples * samples) as f32
}

fn blend_disc(target: &mut Image, cx: f32, cy: f32, radius: f32, color: Color) {
    for_disc(target, cx, cy, radius, |target, x, y, _| target.blend(x, y, color));
}

fn ring(target: &mut Image, cx: f32, cy: f32, radius: f32, color: Color) {
    let steps = (radius * 8.0).max(16.0) as u32;
    for step in 0..steps {
        let angle = step as f32 / steps as f32 * std::f32::consts::TAU;
        blend_at(target, cx + angle.cos() * radius, cy + angle.sin() * radius, color);
    }
}

fn blend_at(target: &mut Image, x: f32, y: f32, color: Color) {
    if x < 0.0 || y < 0.0 || !x.is_finite() || !y.is_finite() {
        return;
    }
    target.blend(x as u32, y as u32, color);
}
