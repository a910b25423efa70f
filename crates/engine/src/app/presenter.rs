use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::render::Image;

/// Puts the software back buffer on screen through a `pixels` surface.
pub(crate) struct Presenter {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    size: (u32, u32),
}

impl Presenter {
    pub(crate) fn new(window: Arc<Window>) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            size: (size.width, size.height),
        })
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Minimized windows report zero size; the previous surface is kept.
    pub(crate) fn resize(&mut self, width: u32, height: u32) -> Result<bool, Error> {
        if width == 0 || height == 0 || (width, height) == self.size {
            return Ok(false);
        }
        self.pixels = build_pixels(Arc::clone(&self.window), width, height)?;
        self.size = (width, height);
        Ok(true)
    }

    /// A back buffer that has not caught up with a resize yet is skipped.
    pub(crate) fn present(&mut self, back_buffer: &Image) -> Result<bool, Error> {
        if back_buffer.size() != self.size {
            return Ok(false);
        }
        back_buffer.write_rgba8(self.pixels.frame_mut());
        self.pixels.render()?;
        Ok(true)
    }

    pub(crate) fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }
}

fn build_pixels(window: Arc<Window>, width: u32, height: u32) -> Result<Pixels<'static>, Error> {
    let surface = SurfaceTexture::new(width, height, window);
    Pixels::new(width, height, surface)
}
