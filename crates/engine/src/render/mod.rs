mod device;
mod filters;
mod graph;
mod image;
mod messages;
mod overlay;
mod painter;
mod targets;
mod thumbnail;
mod viewport;

pub use device::{DeviceError, GraphicsDevice, SoftwareDevice, SurfaceDesc, SurfaceId, Target};
pub use filters::{
    box_downsample, dof_composite, gaussian_blur, stretch_copy, stretch_into, threshold, BlurAxis,
    CompositeInputs,
};
pub use graph::{
    budget_hud_visible, compass_visible, FrameReport, FrameRequest, HudRequest, RenderGraph,
    RenderPass, RenderSettings, RenderStrategy, BACKDROP_CLEAR, BLOOM_THRESHOLD, EFFECTS_CLEAR,
};
pub use image::{blend_over, color_from_rgba8, color_to_rgba8, Color, Image, BLACK, TRANSPARENT};
pub use messages::{MessageKey, MessageStack};
pub use overlay::{
    draw_budget_hud, draw_compass, draw_notice, draw_overlay, draw_scores, BudgetHud,
    OverlayData,
};
pub use painter::{
    Brush, RenderContext, RenderEffect, SceneLayer, ScenePainter, SceneView, SoftwarePainter,
};
pub use targets::{
    RenderTargetSet, TargetOptions, TargetSlot, ALL_TARGET_SLOTS, SAVE_THUMBNAIL_SIZE,
    SHADOW_MAP_SIZE,
};
pub use thumbnail::{encode_png, export_png, ThumbnailError};
pub use viewport::{ViewportRect, ViewportStack};
