use core::convert::Infallible;

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::geometry::Dimensions;
use embedded_graphics::geometry::Point;
use embedded_graphics::geometry::Size;
use embedded_graphics::primitives::Rectangle;
use embedded_graphics::Pixel;

use crate::colorspace::Colorspace;

/// Frame buffer the application draws into, row major.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer<C: Colorspace> {
    width: usize,
    height: usize,
    data: Vec<C>,
}

impl<C: Colorspace> FrameBuffer<C> {
    /// Create a black frame buffer
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![C::BLACK; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Clear the frame buffer to black.
    pub fn clear(&mut self) {
        self.data.fill(C::BLACK);
    }

    /// Set a pixel in the frame buffer
    ///
    /// # Panics
    /// If `(x, y)` is outside the frame buffer.
    pub fn set_pixel(&mut self, x: usize, y: usize, color: C) {
        assert!(x < self.width && y < self.height);
        self.data[y * self.width + x] = color;
    }

    /// Get a pixel from the frame buffer
    pub fn get_pixel(&self, x: usize, y: usize) -> C {
        assert!(x < self.width && y < self.height);
        self.data[y * self.width + x]
    }

    pub fn as_slice(&self) -> &[C] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [C] {
        &mut self.data
    }
}

impl<C: Colorspace> Dimensions for FrameBuffer<C> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle::new(Point::zero(), Size::new(self.width as u32, self.height as u32))
    }
}

impl<C: Colorspace> DrawTarget for FrameBuffer<C> {
    type Color = C;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if p.x < 0 || p.x as usize >= self.width || p.y < 0 || p.y as usize >= self.height {
                continue;
            }
            self.set_pixel(p.x as usize, p.y as usize, c);
        }

        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.data.fill(color);
        Ok(())
    }
}
