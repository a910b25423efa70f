use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::mode::Mode;

use super::device::{DeviceError, GraphicsDevice, SurfaceId, Target};
use super::filters::{
    box_downsample, dof_composite, gaussian_blur, stretch_copy, stretch_into, threshold, BlurAxis,
    CompositeInputs,
};
use super::image::{Color, Image, BLACK, TRANSPARENT};
use super::messages::MessageStack;
use super::overlay::{
    draw_budget_hud, draw_compass, draw_overlay, draw_scores, BudgetHud, OverlayData,
};
use super::painter::{Brush, RenderContext, RenderEffect, SceneLayer, ScenePainter, SceneView};
use super::targets::{RenderTargetSet, TargetOptions, TargetSlot};
use super::thumbnail::{export_png, ThumbnailError};
use super::viewport::{ViewportRect, ViewportStack};

/// Clear color behind the stretched edit-mode thumbnail.
pub const BACKDROP_CLEAR: Color = [20.0 / 255.0, 20.0 / 255.0, 20.0 / 255.0, 1.0];
/// The effects target clears to this so "nothing rendered" differs from black.
pub const EFFECTS_CLEAR: Color = [1.0, 0.0, 0.0, 0.0];
pub const BLOOM_THRESHOLD: f32 = 5.0;
/// Waypoint opacity while the height map is being edited.
const EDITING_TERRAIN_WAYPOINT_ALPHA: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub post_effects: bool,
    pub distortion: bool,
    pub camera_ghosting: bool,
    pub anti_alias_samples: u8,
    /// Pixels trimmed from every screen edge while a tutorial panel is docked.
    pub tutorial_crop: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            post_effects: true,
            distortion: true,
            camera_ghosting: true,
            anti_alias_samples: 2,
            tutorial_crop: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStrategy {
    FullPipeline,
    ThumbnailBackdrop,
    FrameSkip,
    /// Device loss or a failed pass; the frame shows black plus overlays.
    Fallback,
}

impl RenderStrategy {
    pub fn label(self) -> &'static str {
        match self {
            RenderStrategy::FullPipeline => "full",
            RenderStrategy::ThumbnailBackdrop => "thumbnail",
            RenderStrategy::FrameSkip => "frame-skip",
            RenderStrategy::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPass {
    Shadow,
    Color,
    Effects,
    Distortion,
    Bloom,
    Glow,
    Composite,
    ThumbnailCapture,
    Blit,
    ThumbnailBackdrop,
    StaleBlit,
    FallbackClear,
    Overlays,
}

/// Screen-space layers drawn after the 3-D image.
#[derive(Debug, Clone, Copy, Default)]
pub struct HudRequest<'a> {
    pub panel: Option<&'a OverlayData>,
    pub budget: Option<BudgetHud>,
    pub compass: bool,
    pub scores: &'a [(u8, i32)],
}

pub struct FrameRequest<'a> {
    pub mode: Mode,
    pub frame: u64,
    pub scene: SceneView<'a>,
    /// Set by the loop when the previous frame ran over its budget.
    pub frame_skip: bool,
    pub brush: Option<Brush>,
    pub editing_terrain: bool,
    /// Eyedropper modifier held; hides the terrain brush.
    pub eyedropper: bool,
    /// Active modal editor, drawn over the thumbnail backdrop.
    pub modal: Option<&'a dyn Fn(&mut Image)>,
    pub hud: HudRequest<'a>,
    pub messages: &'a MessageStack,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub strategy: Option<RenderStrategy>,
    pub passes: Vec<RenderPass>,
    pub reallocated: bool,
    pub thumbnail_captured: bool,
}

/// The compass shows in every edit mode, and in play when the level asks for it.
pub fn compass_visible(mode: Mode, level_shows_compass: bool) -> bool {
    level_shows_compass || !mode.is_run_sim()
}

pub fn budget_hud_visible(mode: Mode, show_resource_meter: bool, limit_budget: bool) -> bool {
    (!mode.is_run_sim() || show_resource_meter) && limit_budget
}

/// Owns the intermediate targets and runs the per-frame pass sequence.
#[derive(Debug, Default)]
pub struct RenderGraph {
    settings: RenderSettings,
    targets: RenderTargetSet,
    viewports: ViewportStack,
    refresh_thumbnail: bool,
    small_thumbnail_valid: bool,
    save_thumbnail_valid: bool,
    color_valid: bool,
    frames_rendered: u64,
    last_report: FrameReport,
}

impl RenderGraph {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    /// Takes effect on the next render; changed target options reallocate the set.
    pub fn set_settings(&mut self, settings: RenderSettings) {
        self.settings = settings;
    }

    pub fn targets(&self) -> &RenderTargetSet {
        &self.targets
    }

    pub fn last_report(&self) -> &FrameReport {
        &self.last_report
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn request_thumbnail_refresh(&mut self) {
        self.refresh_thumbnail = true;
    }

    pub fn thumbnail_refresh_pending(&self) -> bool {
        self.refresh_thumbnail
    }

    /// Blurred quarter-size capture used as the edit backdrop.
    pub fn small_thumbnail<'d>(&self, device: &'d dyn GraphicsDevice) -> Option<&'d Image> {
        if !self.small_thumbnail_valid {
            return None;
        }
        let id = self.targets.get(TargetSlot::SmallEffectThumb)?;
        device.image(Target::Surface(id)).ok()
    }

    /// 128x128 capture for save-game previews.
    pub fn save_thumbnail<'d>(&self, device: &'d dyn GraphicsDevice) -> Option<&'d Image> {
        if !self.save_thumbnail_valid {
            return None;
        }
        let id = self.targets.get(TargetSlot::SaveThumbnail)?;
        device.image(Target::Surface(id)).ok()
    }

    pub fn export_save_thumbnail(
        &self,
        device: &dyn GraphicsDevice,
        path: &Path,
    ) -> Result<(), ThumbnailError> {
        let thumbnail = self
            .save_thumbnail(device)
            .ok_or(ThumbnailError::NotCaptured)?;
        export_png(thumbnail, path)
    }

    /// Drops every target, as on content unload.
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.targets.release(device);
        self.invalidate_cached_images();
    }

    fn invalidate_cached_images(&mut self) {
        self.color_valid = false;
        self.small_thumbnail_valid = false;
        self.save_thumbnail_valid = false;
    }

    fn target_options(&self) -> TargetOptions {
        TargetOptions {
            post_effects: self.settings.post_effects,
            distortion: self.settings.distortion,
        }
    }

    fn screen_rect(&self, width: u32, height: u32) -> ViewportRect {
        if self.settings.tutorial_crop > 0 {
            ViewportRect::cropped(width, height, self.settings.tutorial_crop)
        } else {
            ViewportRect::full(width, height)
        }
    }

    fn slot(&self, slot: TargetSlot) -> Result<SurfaceId, DeviceError> {
        self.targets
            .get(slot)
            .ok_or(DeviceError::Unallocated(slot.label()))
    }

    /// Renders one frame into the device back buffer. Device trouble never escapes;
    /// the frame degrades to a black clear with overlays instead.
    pub fn render(
        &mut self,
        device: &mut dyn GraphicsDevice,
        painter: &mut dyn ScenePainter,
        request: &FrameRequest<'_>,
    ) -> &FrameReport {
        let mut report = FrameReport::default();
        let (width, height) = device.back_buffer_size();
        device.restore_target();

        let mut strategy = if device.is_lost() {
            debug!("render_device_lost");
            RenderStrategy::Fallback
        } else {
            match self
                .targets
                .ensure(device, width, height, self.target_options())
            {
                Ok(reallocated) => {
                    if reallocated {
                        report.reallocated = true;
                        self.invalidate_cached_images();
                    }
                    self.choose_strategy(&*device, request)
                }
                Err(_) => {
                    self.invalidate_cached_images();
                    RenderStrategy::Fallback
                }
            }
        };

        let result = match strategy {
            RenderStrategy::ThumbnailBackdrop => self.render_backdrop(device, request, &mut report),
            RenderStrategy::FrameSkip => self.blit_stale(device, &mut report),
            RenderStrategy::FullPipeline => self.render_full(device, painter, request, &mut report),
            RenderStrategy::Fallback => Ok(()),
        };
        if let Err(error) = result {
            warn!(error = %error, strategy = strategy.label(), "render_pass_failed");
            self.color_valid = false;
            strategy = RenderStrategy::Fallback;
        }
        if strategy == RenderStrategy::Fallback {
            self.fallback_clear(device, &mut report);
        }

        let full_hud = strategy != RenderStrategy::ThumbnailBackdrop;
        self.render_overlays(device, request, full_hud, &mut report);
        debug_assert_eq!(self.viewports.depth(), 0, "unbalanced viewport push");

        report.strategy = Some(strategy);
        self.frames_rendered += 1;
        self.last_report = report;
        &self.last_report
    }

    fn choose_strategy(
        &mut self,
        device: &dyn GraphicsDevice,
        request: &FrameRequest<'_>,
    ) -> RenderStrategy {
        if request.mode.uses_thumbnail_backdrop() && !self.refresh_thumbnail {
            if self.small_thumbnail_valid {
                return RenderStrategy::ThumbnailBackdrop;
            }
            debug!(mode = ?request.mode, "thumbnail_backdrop_missing");
            self.refresh_thumbnail = true;
            return RenderStrategy::FullPipeline;
        }

        if request.frame_skip && !self.refresh_thumbnail {
            let cached = self
                .targets
                .get(TargetSlot::Full0)
                .filter(|id| self.color_valid && !device.is_content_lost(*id));
            if cached.is_some() {
                return RenderStrategy::FrameSkip;
            }
            debug!("frame_skip_disabled_stale_color");
        }
        RenderStrategy::FullPipeline
    }

    fn render_backdrop(
        &mut self,
        device: &mut dyn GraphicsDevice,
        request: &FrameRequest<'_>,
        report: &mut FrameReport,
    ) -> Result<(), DeviceError> {
        let thumbnail = device
            .image(Target::Surface(self.slot(TargetSlot::SmallEffectThumb)?))?
            .clone();
        let (width, height) = device.back_buffer_size();
        let screen = self.screen_rect(width, height);
        device.restore_target();
        self.viewports.bracket(device, screen, |device| {
            device.clear(BACKDROP_CLEAR, true);
            let back = device.image_mut(Target::BackBuffer)?;
            stretch_into(&thumbnail, back, screen);
            if let Some(modal) = request.modal {
                modal(back);
            }
            Ok::<(), DeviceError>(())
        })?;
        report.passes.push(RenderPass::ThumbnailBackdrop);
        Ok(())
    }

    fn blit_stale(
        &mut self,
        device: &mut dyn GraphicsDevice,
        report: &mut FrameReport,
    ) -> Result<(), DeviceError> {
        let color = self.slot(TargetSlot::Full0)?;
        self.present(device, color)?;
        report.passes.push(RenderPass::StaleBlit);
        Ok(())
    }

    fn fallback_clear(&mut self, device: &mut dyn GraphicsDevice, report: &mut FrameReport) {
        device.restore_target();
        device.clear(BLACK, true);
        report.passes.push(RenderPass::FallbackClear);
    }

    fn render_full(
        &mut self,
        device: &mut dyn GraphicsDevice,
        painter: &mut dyn ScenePainter,
        request: &FrameRequest<'_>,
        report: &mut FrameReport,
    ) -> Result<(), DeviceError> {
        let brush_allowed = (request.mode.is_terrain_tool() || request.mode == Mode::MouseEdit)
            && !request.eyedropper;
        let waypoint_alpha = if request.editing_terrain && !request.mode.is_run_sim() {
            EDITING_TERRAIN_WAYPOINT_ALPHA
        } else {
            1.0
        };
        let ctx = RenderContext {
            effect: RenderEffect::Normal,
            mode: request.mode,
            frame: request.frame,
            brush: request.brush.filter(|_| brush_allowed),
            waypoint_alpha,
            anti_alias_samples: self.settings.anti_alias_samples,
        };
        let plain = RenderContext { brush: None, ..ctx };

        let shadow_map = self.slot(TargetSlot::Shadow)?;
        let shadow_small0 = self.slot(TargetSlot::ShadowSmall0)?;
        let shadow_small1 = self.slot(TargetSlot::ShadowSmall1)?;
        self.scene_pass(
            device,
            painter,
            shadow_map,
            TRANSPARENT,
            &[(SceneLayer::ShadowCasters, plain.with_effect(RenderEffect::ShadowPass))],
            &request.scene,
        )?;
        filter(device, shadow_map, shadow_small0, box_downsample)?;
        filter(device, shadow_small0, shadow_small1, |src, dst| {
            gaussian_blur(src, dst, BlurAxis::Vertical)
        })?;
        filter(device, shadow_small1, shadow_small0, |src, dst| {
            gaussian_blur(src, dst, BlurAxis::Horizontal)
        })?;
        report.passes.push(RenderPass::Shadow);

        let shadow_texture = device.image(Target::Surface(shadow_small0))?.clone();
        let lit_scene = SceneView {
            shadow: Some(&shadow_texture),
            ..request.scene
        };
        let full0 = self.slot(TargetSlot::Full0)?;
        let mut color_layers = vec![
            (SceneLayer::Sky, plain),
            (SceneLayer::Terrain, ctx),
            (SceneLayer::Actors, plain),
            (SceneLayer::Transparent, plain.with_effect(RenderEffect::Aura)),
        ];
        if self.settings.camera_ghosting && !request.scene.ghosts.is_empty() {
            color_layers.push((SceneLayer::Ghosts, plain.with_effect(RenderEffect::GhostPass)));
        }
        self.scene_pass(device, painter, full0, BLACK, &color_layers, &lit_scene)?;
        report.passes.push(RenderPass::Color);

        let screen_source = if self.settings.post_effects {
            self.render_post_effects(device, painter, request, plain, full0, report)?
        } else {
            full0
        };

        if self.refresh_thumbnail {
            self.capture_thumbnails(device, screen_source)?;
            report.passes.push(RenderPass::ThumbnailCapture);
            report.thumbnail_captured = true;
        }

        self.present(device, screen_source)?;
        report.passes.push(RenderPass::Blit);
        self.color_valid = true;
        Ok(())
    }

    /// Effects, distortion, bloom, glow and the composite. Returns the composited target.
    fn render_post_effects(
        &mut self,
        device: &mut dyn GraphicsDevice,
        painter: &mut dyn ScenePainter,
        request: &FrameRequest<'_>,
        plain: RenderContext,
        full0: SurfaceId,
        report: &mut FrameReport,
    ) -> Result<SurfaceId, DeviceError> {
        let effects = self.slot(TargetSlot::Effects)?;
        let depth = plain.with_effect(RenderEffect::DepthPass);
        self.scene_pass(
            device,
            painter,
            effects,
            EFFECTS_CLEAR,
            &[(SceneLayer::Terrain, depth), (SceneLayer::Actors, depth)],
            &request.scene,
        )?;
        report.passes.push(RenderPass::Effects);

        let distort = match (
            self.targets.get(TargetSlot::Distort0),
            self.targets.get(TargetSlot::Distort1),
        ) {
            (Some(distort0), Some(distort1)) => {
                self.scene_pass(
                    device,
                    painter,
                    distort0,
                    TRANSPARENT,
                    &[(SceneLayer::Distortion, plain)],
                    &request.scene,
                )?;
                filter(device, distort0, distort1, |src, dst| {
                    gaussian_blur(src, dst, BlurAxis::Vertical)
                })?;
                report.passes.push(RenderPass::Distortion);
                Some((distort0, distort1))
            }
            _ => None,
        };

        let full1 = self.slot(TargetSlot::Full1)?;
        let small0 = self.slot(TargetSlot::Small0)?;
        let small_no_effect = self.slot(TargetSlot::SmallNoEffect)?;
        let bloom = self.slot(TargetSlot::Bloom)?;
        let glow = self.slot(TargetSlot::Glow)?;
        let tiny = self.slot(TargetSlot::Tiny)?;

        filter(device, full0, small_no_effect, box_downsample)?;
        filter(device, full0, full1, |src, dst| threshold(src, dst, BLOOM_THRESHOLD))?;
        filter(device, full1, small0, box_downsample)?;
        filter(device, small0, bloom, box_downsample)?;
        filter(device, bloom, tiny, |src, dst| {
            gaussian_blur(src, dst, BlurAxis::Horizontal)
        })?;
        filter(device, tiny, bloom, |src, dst| {
            gaussian_blur(src, dst, BlurAxis::Vertical)
        })?;
        report.passes.push(RenderPass::Bloom);

        self.scene_pass(
            device,
            painter,
            small0,
            TRANSPARENT,
            &[(SceneLayer::Glow, plain.with_effect(RenderEffect::BloomPass))],
            &request.scene,
        )?;
        filter(device, small0, glow, box_downsample)?;
        filter(device, glow, tiny, |src, dst| {
            gaussian_blur(src, dst, BlurAxis::Horizontal)
        })?;
        filter(device, tiny, glow, |src, dst| {
            gaussian_blur(src, dst, BlurAxis::Vertical)
        })?;
        report.passes.push(RenderPass::Glow);

        let read = |device: &dyn GraphicsDevice, id: SurfaceId| -> Result<Image, DeviceError> {
            Ok(device.image(Target::Surface(id))?.clone())
        };
        let color_image = read(&*device, full0)?;
        let blurred_image = read(&*device, small_no_effect)?;
        let bloom_image = read(&*device, bloom)?;
        let glow_image = read(&*device, glow)?;
        let effects_image = read(&*device, effects)?;
        let distort_images = match distort {
            Some((distort0, distort1)) => {
                Some((read(&*device, distort0)?, read(&*device, distort1)?))
            }
            None => None,
        };
        device.set_targets(&[full1])?;
        let (width, height) = device.surface_size(full1).unwrap_or((0, 0));
        self.viewports
            .bracket(device, ViewportRect::full(width, height), |device| {
                let destination = device.image_mut(Target::Surface(full1))?;
                dof_composite(
                    CompositeInputs {
                        color: &color_image,
                        blurred: &blurred_image,
                        bloom: Some(&bloom_image),
                        glow: Some(&glow_image),
                        effects: Some(&effects_image),
                        distort: match &distort_images {
                            Some((first, second)) => [Some(first), Some(second)],
                            None => [None, None],
                        },
                    },
                    destination,
                );
                Ok::<(), DeviceError>(())
            })?;
        device.restore_target();
        report.passes.push(RenderPass::Composite);
        Ok(full1)
    }

    /// One-shot capture of the edit backdrop and the save preview from `source`.
    fn capture_thumbnails(
        &mut self,
        device: &mut dyn GraphicsDevice,
        source: SurfaceId,
    ) -> Result<(), DeviceError> {
        let small_thumb = self.slot(TargetSlot::SmallEffectThumb)?;
        let scratch = self.slot(TargetSlot::Small0)?;
        let save = self.slot(TargetSlot::SaveThumbnail)?;
        filter(device, source, small_thumb, box_downsample)?;
        filter(device, small_thumb, scratch, |src, dst| {
            gaussian_blur(src, dst, BlurAxis::Horizontal)
        })?;
        filter(device, scratch, small_thumb, |src, dst| {
            gaussian_blur(src, dst, BlurAxis::Vertical)
        })?;
        filter(device, source, save, stretch_copy)?;
        self.refresh_thumbnail = false;
        self.small_thumbnail_valid = true;
        self.save_thumbnail_valid = true;
        info!(frame = self.frames_rendered, "thumbnail_captured");
        Ok(())
    }

    /// Copies `source` to the back buffer inside the screen viewport.
    fn present(
        &mut self,
        device: &mut dyn GraphicsDevice,
        source: SurfaceId,
    ) -> Result<(), DeviceError> {
        let image = device.image(Target::Surface(source))?.clone();
        let (width, height) = device.back_buffer_size();
        let screen = self.screen_rect(width, height);
        device.restore_target();
        self.viewports.bracket(device, screen, |device| {
            device.clear(BLACK, true);
            stretch_into(&image, device.image_mut(Target::BackBuffer)?, screen);
            Ok::<(), DeviceError>(())
        })
    }

    fn scene_pass(
        &mut self,
        device: &mut dyn GraphicsDevice,
        painter: &mut dyn ScenePainter,
        target: SurfaceId,
        clear: Color,
        layers: &[(SceneLayer, RenderContext)],
        scene: &SceneView<'_>,
    ) -> Result<(), DeviceError> {
        device.set_targets(&[target])?;
        let (width, height) = device
            .surface_size(target)
            .ok_or(DeviceError::UnknownSurface(target))?;
        let result = self
            .viewports
            .bracket(device, ViewportRect::full(width, height), |device| {
                device.clear(clear, true);
                let image = device.image_mut(Target::Surface(target))?;
                for (layer, ctx) in layers {
                    painter.paint(*layer, ctx, scene, image);
                }
                Ok(())
            });
        device.restore_target();
        result
    }

    fn render_overlays(
        &mut self,
        device: &mut dyn GraphicsDevice,
        request: &FrameRequest<'_>,
        full_hud: bool,
        report: &mut FrameReport,
    ) {
        let (width, height) = device.back_buffer_size();
        let screen = self.screen_rect(width, height);
        device.restore_target();
        let hud = request.hud;
        let view = request.scene.camera.view_dir();
        let mode = request.mode;
        self.viewports.bracket(device, screen, |device| {
            let Ok(back) = device.image_mut(Target::BackBuffer) else {
                return;
            };
            if full_hud {
                if hud.compass {
                    draw_compass(back, view.x.atan2(view.y));
                }
                if mode.is_run_sim() {
                    draw_scores(back, hud.scores);
                }
                if let Some(budget) = hud.budget {
                    draw_budget_hud(back, budget);
                }
                if let Some(panel) = hud.panel {
                    draw_overlay(back, panel);
                }
            }
            request.messages.render(back);
        });
        report.passes.push(RenderPass::Overlays);
    }
}

/// Runs `apply` from `src` into `dst` with `dst` bound as the render target.
fn filter(
    device: &mut dyn GraphicsDevice,
    src: SurfaceId,
    dst: SurfaceId,
    apply: impl FnOnce(&Image, &mut Image),
) -> Result<(), DeviceError> {
    let source = device.image(Target::Surface(src))?.clone();
    device.set_targets(&[dst])?;
    apply(&source, device.image_mut(Target::Surface(dst))?);
    device.restore_target();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::SoftwareDevice;
    use crate::render::messages::MessageKey;
    use crate::render::overlay::draw_notice;
    use crate::sim::{ActorArena, Camera, FlatTerrain};

    const SKY_RED: Color = [1.0, 0.0, 0.0, 1.0];

    #[derive(Default)]
    struct RecordingPainter {
        calls: Vec<(SceneLayer, RenderEffect)>,
    }

    impl ScenePainter for RecordingPainter {
        fn paint(
            &mut self,
            layer: SceneLayer,
            ctx: &RenderContext,
            _scene: &SceneView<'_>,
            target: &mut Image,
        ) {
            self.calls.push((layer, ctx.effect));
            if layer == SceneLayer::Sky {
                target.clear(SKY_RED, false);
            }
        }
    }

    struct Fixture {
        arena: ActorArena,
        camera: Camera,
        terrain: FlatTerrain,
        messages: MessageStack,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                arena: ActorArena::default(),
                camera: Camera::default(),
                terrain: FlatTerrain::default(),
                messages: MessageStack::default(),
            }
        }

        fn request(&self, mode: Mode, frame_skip: bool) -> FrameRequest<'_> {
            FrameRequest {
                mode,
                frame: 1,
                scene: SceneView {
                    actors: &self.arena,
                    content: &[],
                    camera: &self.camera,
                    terrain: &self.terrain,
                    ghosts: &[],
                    cursor: None,
                    selected: None,
                    shadow: None,
                },
                frame_skip,
                brush: None,
                editing_terrain: false,
                eyedropper: false,
                modal: None,
                hud: HudRequest::default(),
                messages: &self.messages,
            }
        }
    }

    fn graph(post_effects: bool) -> RenderGraph {
        RenderGraph::new(RenderSettings {
            post_effects,
            ..RenderSettings::default()
        })
    }

    #[test]
    fn full_pipeline_runs_passes_in_order() {
        let fixture = Fixture::new();
        let mut device = SoftwareDevice::new(64, 32);
        let mut painter = RecordingPainter::default();
        let mut graph = graph(true);

        let report = graph
            .render(&mut device, &mut painter, &fixture.request(Mode::RunSim, false))
            .clone();

        assert_eq!(report.strategy, Some(RenderStrategy::FullPipeline));
        assert!(report.reallocated);
        assert_eq!(
            report.passes,
            vec![
                RenderPass::Shadow,
                RenderPass::Color,
                RenderPass::Effects,
                RenderPass::Distortion,
                RenderPass::Bloom,
                RenderPass::Glow,
                RenderPass::Composite,
                RenderPass::Blit,
                RenderPass::Overlays,
            ]
        );
        assert_eq!(
            painter.calls[0],
            (SceneLayer::ShadowCasters, RenderEffect::ShadowPass)
        );
        assert!(painter
            .calls
            .contains(&(SceneLayer::Actors, RenderEffect::DepthPass)));
        assert!(painter
            .calls
            .contains(&(SceneLayer::Glow, RenderEffect::BloomPass)));

        let effects = graph.targets().get(TargetSlot::Effects).expect("effects");
        let untouched = device
            .image(Target::Surface(effects))
            .expect("effects image")
            .get(0, 0);
        assert_eq!(untouched, EFFECTS_CLEAR);
    }

    #[test]
    fn disabled_post_effects_blit_the_color_buffer() {
        let fixture = Fixture::new();
        let mut device = SoftwareDevice::new(32, 32);
        let mut painter = RecordingPainter::default();
        let mut graph = graph(false);

        let report = graph
            .render(&mut device, &mut painter, &fixture.request(Mode::RunSim, false))
            .clone();

        assert_eq!(
            report.passes,
            vec![
                RenderPass::Shadow,
                RenderPass::Color,
                RenderPass::Blit,
                RenderPass::Overlays
            ]
        );
        assert_eq!(device.back_buffer().get(5, 5), SKY_RED);
        assert!(graph.targets().get(TargetSlot::Bloom).is_none());
    }

    #[test]
    fn thumbnail_capture_is_one_shot_and_feeds_the_backdrop() {
        let fixture = Fixture::new();
        let mut device = SoftwareDevice::new(64, 64);
        let mut painter = RecordingPainter::default();
        let mut graph = graph(false);

        graph.request_thumbnail_refresh();
        let first = graph
            .render(&mut device, &mut painter, &fixture.request(Mode::RunSim, false))
            .clone();
        assert!(first.thumbnail_captured);
        assert!(!graph.thumbnail_refresh_pending());
        let second = graph
            .render(&mut device, &mut painter, &fixture.request(Mode::RunSim, false))
            .clone();
        assert!(!second.thumbnail_captured);

        let save = graph.save_thumbnail(&device).expect("save thumbnail");
        assert_eq!(save.size(), (128, 128));

        painter.calls.clear();
        device.image_mut(Target::BackBuffer).expect("back").clear(BLACK, true);
        let backdrop = graph
            .render(
                &mut device,
                &mut painter,
                &fixture.request(Mode::EditWorldParameters, false),
            )
            .clone();
        assert_eq!(backdrop.strategy, Some(RenderStrategy::ThumbnailBackdrop));
        assert!(painter.calls.is_empty());
        let pixel = device.back_buffer().get(32, 32);
        assert!((pixel[0] - 1.0).abs() < 0.0001);
    }

    #[test]
    fn backdrop_without_thumbnail_renders_fully_and_captures() {
        let fixture = Fixture::new();
        let mut device = SoftwareDevice::new(32, 32);
        let mut painter = RecordingPainter::default();
        let mut graph = graph(false);

        let report = graph
            .render(
                &mut device,
                &mut painter,
                &fixture.request(Mode::EditObjectParameters, false),
            )
            .clone();
        assert_eq!(report.strategy, Some(RenderStrategy::FullPipeline));
        assert!(report.thumbnail_captured);
        assert!(graph.small_thumbnail(&device).is_some());
    }

    #[test]
    fn modal_editor_draws_over_the_backdrop() {
        let fixture = Fixture::new();
        let mut device = SoftwareDevice::new(32, 32);
        let mut painter = RecordingPainter::default();
        let mut graph = graph(false);
        graph.request_thumbnail_refresh();
        graph.render(&mut device, &mut painter, &fixture.request(Mode::RunSim, false));

        let modal: &dyn Fn(&mut Image) = &|image: &mut Image| {
            image.set(0, 0, [0.0, 0.0, 1.0, 1.0]);
        };
        let mut request = fixture.request(Mode::SelectNextLevel, false);
        request.modal = Some(modal);
        graph.render(&mut device, &mut painter, &request);
        assert_eq!(device.back_buffer().get(0, 0), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn frame_skip_reuses_valid_color_buffer_only() {
        let fixture = Fixture::new();
        let mut device = SoftwareDevice::new(32, 32);
        let mut painter = RecordingPainter::default();
        let mut graph = graph(false);

        let skipped_first = graph
            .render(&mut device, &mut painter, &fixture.request(Mode::RunSim, true))
            .clone();
        assert_eq!(skipped_first.strategy, Some(RenderStrategy::FullPipeline));

        painter.calls.clear();
        let skipped = graph
            .render(&mut device, &mut painter, &fixture.request(Mode::RunSim, true))
            .clone();
        assert_eq!(skipped.strategy, Some(RenderStrategy::FrameSkip));
        assert!(painter.calls.is_empty());
        assert_eq!(device.back_buffer().get(3, 3), SKY_RED);

        device.lose_device();
        device.reset_device();
        let after_reset = graph
            .render(&mut device, &mut painter, &fixture.request(Mode::RunSim, true))
            .clone();
        assert_eq!(after_reset.strategy, Some(RenderStrategy::FullPipeline));
    }

    #[test]
    fn lost_device_falls_back_to_black_with_messages() {
        let mut fixture = Fixture::new();
        fixture
            .messages
            .add_message(MessageKey::new("loading", 0), |image| draw_notice(image, "WAIT"));
        let mut device = SoftwareDevice::new(120, 60);
        let mut painter = RecordingPainter::default();
        let mut graph = graph(true);
        device.lose_device();

        let report = graph
            .render(&mut device, &mut painter, &fixture.request(Mode::RunSim, false))
            .clone();

        assert_eq!(report.strategy, Some(RenderStrategy::Fallback));
        assert_eq!(
            report.passes,
            vec![RenderPass::FallbackClear, RenderPass::Overlays]
        );
        assert_eq!(device.back_buffer().get(0, 0), BLACK);
        assert!(painter.calls.is_empty());
    }

    #[test]
    fn viewport_change_reallocates_all_targets() {
        let fixture = Fixture::new();
        let mut device = SoftwareDevice::new(64, 48);
        let mut painter = RecordingPainter::default();
        let mut graph = graph(true);
        graph.render(&mut device, &mut painter, &fixture.request(Mode::RunSim, false));

        device.resize_back_buffer(96, 64);
        let report = graph
            .render(&mut device, &mut painter, &fixture.request(Mode::RunSim, false))
            .clone();
        assert!(report.reallocated);
        let full1 = graph.targets().get(TargetSlot::Full1).expect("full1");
        let tiny = graph.targets().get(TargetSlot::Tiny).expect("tiny");
        assert_eq!(device.surface_size(full1), Some((96, 64)));
        assert_eq!(device.surface_size(tiny), Some((6, 4)));
        assert_eq!(device.live_surfaces(), graph.targets().len());
    }

    #[test]
    fn save_thumbnail_exports_png() {
        let fixture = Fixture::new();
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("thumb.png");
        let mut device = SoftwareDevice::new(32, 32);
        let mut painter = RecordingPainter::default();
        let mut graph = graph(true);

        assert!(matches!(
            graph.export_save_thumbnail(&device, &path),
            Err(ThumbnailError::NotCaptured)
        ));
        graph.request_thumbnail_refresh();
        graph.render(&mut device, &mut painter, &fixture.request(Mode::RunSim, false));
        graph
            .export_save_thumbnail(&device, &path)
            .expect("export");
        assert!(path.exists());
    }

    #[test]
    fn hud_visibility_rules() {
        assert!(compass_visible(Mode::EditObject, false));
        assert!(!compass_visible(Mode::RunSim, false));
        assert!(compass_visible(Mode::RunSim, true));
        assert!(budget_hud_visible(Mode::ToolMenu, false, true));
        assert!(!budget_hud_visible(Mode::ToolMenu, true, false));
        assert!(!budget_hud_visible(Mode::RunSim, false, true));
        assert!(budget_hud_visible(Mode::RunSim, true, true));
    }
}
