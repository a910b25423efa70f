use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use super::image::{Color, Image};
use super::viewport::ViewportRect;

/// Largest surface edge the software device will allocate.
pub const MAX_SURFACE_EDGE: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

/// Render destination. The back buffer is the window's presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    BackBuffer,
    Surface(SurfaceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub depth: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("graphics device is lost")]
    Lost,
    #[error("surface {label} has zero area ({width}x{height})")]
    ZeroSize {
        label: &'static str,
        width: u32,
        height: u32,
    },
    #[error("surface {label} exceeds the edge limit ({width}x{height})")]
    TooLarge {
        label: &'static str,
        width: u32,
        height: u32,
    },
    #[error("unknown surface {0:?}")]
    UnknownSurface(SurfaceId),
    #[error("render target {0} is not allocated")]
    Unallocated(&'static str),
}

/// Surface allocation and pixel access. Rendering code only sees this trait.
pub trait GraphicsDevice {
    fn create_surface(&mut self, desc: SurfaceDesc) -> Result<SurfaceId, DeviceError>;

    fn release_surface(&mut self, id: SurfaceId);

    fn surface_size(&self, id: SurfaceId) -> Option<(u32, u32)>;

    fn live_surfaces(&self) -> usize;

    /// True once the surface's contents were discarded by a device reset.
    fn is_content_lost(&self, id: SurfaceId) -> bool;

    fn set_targets(&mut self, targets: &[SurfaceId]) -> Result<(), DeviceError>;

    /// Returns rendering to the back buffer.
    fn restore_target(&mut self);

    fn active_target(&self) -> Target;

    /// Clears the active target inside the current viewport.
    fn clear(&mut self, color: Color, clear_depth: bool);

    fn set_viewport(&mut self, rect: ViewportRect);

    fn viewport(&self) -> ViewportRect;

    fn back_buffer_size(&self) -> (u32, u32);

    /// Follows a window resize. Surfaces keep their size until reallocated.
    fn resize_back_buffer(&mut self, width: u32, height: u32);

    fn is_lost(&self) -> bool;

    fn image(&self, target: Target) -> Result<&Image, DeviceError>;

    fn image_mut(&mut self, target: Target) -> Result<&mut Image, DeviceError>;
}

#[derive(Debug)]
struct SurfaceSlot {
    desc: SurfaceDesc,
    image: Image,
    content_lost: bool,
}

/// CPU implementation of [`GraphicsDevice`]. The back buffer is presented by copying
/// it into the window frame.
#[derive(Debug)]
pub struct SoftwareDevice {
    back_buffer: Image,
    surfaces: BTreeMap<SurfaceId, SurfaceSlot>,
    next_id: u32,
    active: Vec<SurfaceId>,
    viewport: ViewportRect,
    lost: bool,
}

impl SoftwareDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            back_buffer: Image::new(width, height).with_depth(),
            surfaces: BTreeMap::new(),
            next_id: 1,
            active: Vec::new(),
            viewport: ViewportRect::full(width, height),
            lost: false,
        }
    }

    pub fn back_buffer(&self) -> &Image {
        &self.back_buffer
    }

    /// Simulates a lost device: surface allocation and surface access fail until
    /// `reset_device`. The back buffer stays writable so a fallback frame can be shown.
    pub fn lose_device(&mut self) {
        warn!(surfaces = self.surfaces.len(), "graphics_device_lost");
        self.lost = true;
    }

    /// Recovers from a loss. Every surface survives but its contents are gone.
    pub fn reset_device(&mut self) {
        if !self.lost {
            return;
        }
        self.lost = false;
        for slot in self.surfaces.values_mut() {
            slot.image.clear(super::image::TRANSPARENT, true);
            slot.content_lost = true;
        }
        debug!("graphics_device_reset");
    }

    pub fn surface_desc(&self, id: SurfaceId) -> Option<SurfaceDesc> {
        self.surfaces.get(&id).map(|slot| slot.desc)
    }

    fn active_image_mut(&mut self) -> Option<&mut Image> {
        match self.active.first() {
            Some(id) => self.surfaces.get_mut(id).map(|slot| &mut slot.image),
            None => Some(&mut self.back_buffer),
        }
    }
}

impl GraphicsDevice for SoftwareDevice {
    fn create_surface(&mut self, desc: SurfaceDesc) -> Result<SurfaceId, DeviceError> {
        if self.lost {
            return Err(DeviceError::Lost);
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::ZeroSize {
                label: desc.label,
                width: desc.width,
                height: desc.height,
            });
        }
        if desc.width > MAX_SURFACE_EDGE || desc.height > MAX_SURFACE_EDGE {
            return Err(DeviceError::TooLarge {
                label: desc.label,
                width: desc.width,
                height: desc.height,
            });
        }

        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        let mut image = Image::new(desc.width, desc.height);
        if desc.depth {
            image = image.with_depth();
        }
        self.surfaces.insert(
            id,
            SurfaceSlot {
                desc,
                image,
                content_lost: false,
            },
        );
        Ok(id)
    }

    fn release_surface(&mut self, id: SurfaceId) {
        self.active.retain(|active| *active != id);
        self.surfaces.remove(&id);
    }

    fn surface_size(&self, id: SurfaceId) -> Option<(u32, u32)> {
        self.surfaces.get(&id).map(|slot| slot.image.size())
    }

    fn live_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    fn is_content_lost(&self, id: SurfaceId) -> bool {
        self.surfaces
            .get(&id)
            .map_or(true, |slot| slot.content_lost)
    }

    fn set_targets(&mut self, targets: &[SurfaceId]) -> Result<(), DeviceError> {
        if self.lost {
            return Err(DeviceError::Lost);
        }
        if let Some(missing) = targets.iter().find(|id| !self.surfaces.contains_key(*id)) {
            return Err(DeviceError::UnknownSurface(*missing));
        }
        self.active = targets.to_vec();
        for id in targets {
            if let Some(slot) = self.surfaces.get_mut(id) {
                slot.content_lost = false;
            }
        }
        if let Some((width, height)) = targets.first().and_then(|id| self.surface_size(*id)) {
            self.viewport = ViewportRect::full(width, height);
        }
        Ok(())
    }

    fn restore_target(&mut self) {
        self.active.clear();
        let (width, height) = self.back_buffer.size();
        self.viewport = ViewportRect::full(width, height);
    }

    fn active_target(&self) -> Target {
        match self.active.first() {
            Some(id) => Target::Surface(*id),
            None => Target::BackBuffer,
        }
    }

    fn clear(&mut self, color: Color, clear_depth: bool) {
        if self.lost && !self.active.is_empty() {
            return;
        }
        let viewport = self.viewport;
        let Some(image) = self.active_image_mut() else {
            return;
        };
        if viewport.covers(image.size()) {
            image.clear(color, clear_depth);
            return;
        }
        for y in viewport.y..viewport.bottom().min(image.height()) {
            for x in viewport.x..viewport.right().min(image.width()) {
                image.set(x, y, color);
            }
        }
    }

    fn set_viewport(&mut self, rect: ViewportRect) {
        self.viewport = rect;
    }

    fn viewport(&self) -> ViewportRect {
        self.viewport
    }

    fn back_buffer_size(&self) -> (u32, u32) {
        self.back_buffer.size()
    }

    fn resize_back_buffer(&mut self, width: u32, height: u32) {
        if self.back_buffer.size() == (width, height) {
            return;
        }
        debug!(width, height, "back_buffer_resized");
        self.back_buffer = Image::new(width, height).with_depth();
        if self.active.is_empty() {
            self.viewport = ViewportRect::full(width, height);
        }
    }

    fn is_lost(&self) -> bool {
        self.lost
    }

    fn image(&self, target: Target) -> Result<&Image, DeviceError> {
        match target {
            Target::BackBuffer => Ok(&self.back_buffer),
            Target::Surface(_) if self.lost => Err(DeviceError::Lost),
            Target::Surface(id) => self
                .surfaces
                .get(&id)
                .map(|slot| &slot.image)
                .ok_or(DeviceError::UnknownSurface(id)),
        }
    }

    fn image_mut(&mut self, target: Target) -> Result<&mut Image, DeviceError> {
        match target {
            Target::BackBuffer => Ok(&mut self.back_buffer),
            Target::Surface(_) if self.lost => Err(DeviceError::Lost),
            Target::Surface(id) => {
                let slot = self
                    .surfaces
                    .get_mut(&id)
                    .ok_or(DeviceError::UnknownSurface(id))?;
                slot.content_lost = false;
                Ok(&mut slot.image)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::image::BLACK;

    fn desc(width: u32, height: u32) -> SurfaceDesc {
        SurfaceDesc {
            label: "test",
            width,
            height,
            depth: false,
        }
    }

    #[test]
    fn clear_writes_the_active_target_only() {
        let mut device = SoftwareDevice::new(4, 4);
        let surface = device.create_surface(desc(2, 2)).expect("surface");
        device.set_targets(&[surface]).expect("targets");
        device.clear([1.0, 0.0, 0.0, 0.0], true);
        device.restore_target();
        device.clear(BLACK, true);

        let image = device.image(Target::Surface(surface)).expect("image");
        assert_eq!(image.get(1, 1), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(
            device.image(Target::BackBuffer).expect("back").get(0, 0),
            BLACK
        );
        assert_eq!(device.active_target(), Target::BackBuffer);
    }

    #[test]
    fn lost_device_refuses_work_and_reset_marks_contents_lost() {
        let mut device = SoftwareDevice::new(4, 4);
        let surface = device.create_surface(desc(2, 2)).expect("surface");
        assert!(!device.is_content_lost(surface));

        device.lose_device();
        assert_eq!(device.create_surface(desc(2, 2)), Err(DeviceError::Lost));
        assert!(device.image(Target::Surface(surface)).is_err());
        assert!(device.image(Target::BackBuffer).is_ok());

        device.reset_device();
        assert!(device.is_content_lost(surface));
        device.set_targets(&[surface]).expect("targets");
        assert!(!device.is_content_lost(surface));
    }

    #[test]
    fn zero_sized_surfaces_are_rejected() {
        let mut device = SoftwareDevice::new(4, 4);
        assert!(matches!(
            device.create_surface(desc(0, 4)),
            Err(DeviceError::ZeroSize { .. })
        ));
    }

    #[test]
    fn clear_respects_cropped_viewport() {
        let mut device = SoftwareDevice::new(4, 4);
        device.set_viewport(ViewportRect {
            x: 1,
            y: 1,
            width: 2,
            height: 2,
        });
        device.clear(BLACK, false);
        let back = device.image(Target::BackBuffer).expect("back");
        assert_eq!(back.get(0, 0), [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(back.get(2, 2), BLACK);
    }
}
