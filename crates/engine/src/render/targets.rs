use std::collections::BTreeMap;

use tracing::{info, warn};

use super::device::{DeviceError, GraphicsDevice, SurfaceDesc, SurfaceId};

pub const SHADOW_MAP_SIZE: u32 = 1024;
pub const SHADOW_SMALL_SIZE: u32 = SHADOW_MAP_SIZE / 4;
pub const SAVE_THUMBNAIL_SIZE: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetSlot {
    Full0,
    Full1,
    Shadow,
    ShadowSmall0,
    ShadowSmall1,
    Effects,
    Distort0,
    Distort1,
    Small0,
    SmallNoEffect,
    SmallEffectThumb,
    Bloom,
    Glow,
    Tiny,
    SaveThumbnail,
}

/// Which optional targets exist. Changing it forces a reallocation like a resize does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetOptions {
    pub post_effects: bool,
    pub distortion: bool,
}

impl TargetSlot {
    pub fn label(self) -> &'static str {
        match self {
            TargetSlot::Full0 => "full0",
            TargetSlot::Full1 => "full1",
            TargetSlot::Shadow => "shadow",
            TargetSlot::ShadowSmall0 => "shadow_small0",
            TargetSlot::ShadowSmall1 => "shadow_small1",
            TargetSlot::Effects => "effects",
            TargetSlot::Distort0 => "distort0",
            TargetSlot::Distort1 => "distort1",
            TargetSlot::Small0 => "small0",
            TargetSlot::SmallNoEffect => "small_no_effect",
            TargetSlot::SmallEffectThumb => "small_effect_thumb",
            TargetSlot::Bloom => "bloom",
            TargetSlot::Glow => "glow",
            TargetSlot::Tiny => "tiny",
            TargetSlot::SaveThumbnail => "save_thumbnail",
        }
    }

    fn wanted(self, options: TargetOptions) -> bool {
        match self {
            TargetSlot::Effects | TargetSlot::Bloom | TargetSlot::Glow | TargetSlot::Tiny => {
                options.post_effects
            }
            TargetSlot::Distort0 | TargetSlot::Distort1 => {
                options.post_effects && options.distortion
            }
            _ => true,
        }
    }

    fn desc(self, width: u32, height: u32) -> SurfaceDesc {
        let quarter = ((width / 4).max(1), (height / 4).max(1));
        let sixteenth = ((width / 16).max(1), (height / 16).max(1));
        let (surface_width, surface_height, depth) = match self {
            TargetSlot::Full0 | TargetSlot::Full1 | TargetSlot::Effects => (width, height, true),
            TargetSlot::Distort0 | TargetSlot::Distort1 => (width, height, false),
            TargetSlot::Shadow => (SHADOW_MAP_SIZE, SHADOW_MAP_SIZE, true),
            TargetSlot::ShadowSmall0 | TargetSlot::ShadowSmall1 => {
                (SHADOW_SMALL_SIZE, SHADOW_SMALL_SIZE, false)
            }
            TargetSlot::Small0 | TargetSlot::SmallNoEffect | TargetSlot::SmallEffectThumb => {
                (quarter.0, quarter.1, false)
            }
            TargetSlot::Bloom | TargetSlot::Glow | TargetSlot::Tiny => {
                (sixteenth.0, sixteenth.1, false)
            }
            TargetSlot::SaveThumbnail => (SAVE_THUMBNAIL_SIZE, SAVE_THUMBNAIL_SIZE, false),
        };
        SurfaceDesc {
            label: self.label(),
            width: surface_width,
            height: surface_height,
            depth,
        }
    }
}

pub const ALL_TARGET_SLOTS: [TargetSlot; 15] = [
    TargetSlot::Full0,
    TargetSlot::Full1,
    TargetSlot::Shadow,
    TargetSlot::ShadowSmall0,
    TargetSlot::ShadowSmall1,
    TargetSlot::Effects,
    TargetSlot::Distort0,
    TargetSlot::Distort1,
    TargetSlot::Small0,
    TargetSlot::SmallNoEffect,
    TargetSlot::SmallEffectThumb,
    TargetSlot::Bloom,
    TargetSlot::Glow,
    TargetSlot::Tiny,
    TargetSlot::SaveThumbnail,
];

/// Intermediate render targets, always sized for one viewport.
#[derive(Debug, Default)]
pub struct RenderTargetSet {
    slots: BTreeMap<TargetSlot, SurfaceId>,
    size: Option<(u32, u32)>,
    options: Option<TargetOptions>,
    generation: u64,
}

impl RenderTargetSet {
    pub fn get(&self, slot: TargetSlot) -> Option<SurfaceId> {
        self.slots.get(&slot).copied()
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bumped on every successful reallocation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn iter(&self) -> impl Iterator<Item = (TargetSlot, SurfaceId)> + '_ {
        self.slots.iter().map(|(slot, id)| (*slot, *id))
    }

    pub fn needs_realloc(&self, width: u32, height: u32, options: TargetOptions) -> bool {
        self.size != Some((width, height)) || self.options != Some(options)
    }

    /// Reallocates every target when the viewport or options changed. Existing targets
    /// are released before any new one is created; on failure the set is left empty.
    /// Returns true when a reallocation happened.
    pub fn ensure(
        &mut self,
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        options: TargetOptions,
    ) -> Result<bool, DeviceError> {
        if !self.needs_realloc(width, height, options) {
            return Ok(false);
        }

        self.release(device);
        let mut created = BTreeMap::new();
        for slot in ALL_TARGET_SLOTS {
            if !slot.wanted(options) {
                continue;
            }
            match device.create_surface(slot.desc(width, height)) {
                Ok(id) => {
                    created.insert(slot, id);
                }
                Err(error) => {
                    for id in created.into_values() {
                        device.release_surface(id);
                    }
                    warn!(error = %error, width, height, "render_targets_alloc_failed");
                    return Err(error);
                }
            }
        }

        self.slots = created;
        self.size = Some((width, height));
        self.options = Some(options);
        self.generation += 1;
        info!(
            width,
            height,
            targets = self.slots.len(),
            post_effects = options.post_effects,
            "render_targets_reallocated"
        );
        Ok(true)
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        device.restore_target();
        for id in std::mem::take(&mut self.slots).into_values() {
            device.release_surface(id);
        }
        self.size = None;
        self.options = None;
    }
}
