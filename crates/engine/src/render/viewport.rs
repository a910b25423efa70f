use super::device::GraphicsDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn covers(&self, size: (u32, u32)) -> bool {
        self.x == 0 && self.y == 0 && self.width >= size.0 && self.height >= size.1
    }

    /// Screen rectangle with `crop` removed from every edge, as the tutorial panel does.
    pub fn cropped(width: u32, height: u32, crop: u32) -> Self {
        let crop = crop.min(width / 2).min(height / 2);
        Self {
            x: crop,
            y: crop,
            width: width - crop * 2,
            height: height - crop * 2,
        }
    }
}

/// Push/pop discipline for the device viewport. Every pass runs inside `bracket`, so
/// the viewport a pass leaves behind never leaks into the next one.
#[derive(Debug, Default)]
pub struct ViewportStack {
    saved: Vec<ViewportRect>,
}

impl ViewportStack {
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    pub fn push(&mut self, device: &mut dyn GraphicsDevice, rect: ViewportRect) {
        self.saved.push(device.viewport());
        device.set_viewport(rect);
    }

    pub fn pop(&mut self, device: &mut dyn GraphicsDevice) {
        debug_assert!(!self.saved.is_empty(), "viewport pop without matching push");
        if let Some(rect) = self.saved.pop() {
            device.set_viewport(rect);
        }
    }

    pub fn bracket<R>(
        &mut self,
        device: &mut dyn GraphicsDevice,
        rect: ViewportRect,
        pass: impl FnOnce(&mut dyn GraphicsDevice) -> R,
    ) -> R {
        self.push(device, rect);
        let result = pass(device);
        self.pop(device);
        result
    }
}
