//! Conversion of framebuffer pixels to the encoder's 10-bit-per-channel
//! format (`r << 20 | g << 10 | b`).
//!
//! Channels are widened by bit replication so full scale stays full scale.
//! No gamma correction is applied; do that before drawing if needed.

use embedded_graphics::pixelcolor::Bgr888;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::pixelcolor::RgbColor;

/// Bits per channel of the converted pixels.
pub const CHANNEL_BITS: u32 = 10;

/// A pixel format the driver can display.
pub trait Colorspace: RgbColor + Send + Sync + 'static {
    fn to_rgb10(self) -> u32;
}

const fn pack(r: u32, g: u32, b: u32) -> u32 {
    r << (2 * CHANNEL_BITS) | g << CHANNEL_BITS | b
}

const fn widen8(v: u8) -> u32 {
    let v = v as u32;
    v << 2 | v >> 6
}

impl Colorspace for Rgb888 {
    fn to_rgb10(self) -> u32 {
        pack(widen8(self.r()), widen8(self.g()), widen8(self.b()))
    }
}

impl Colorspace for Bgr888 {
    fn to_rgb10(self) -> u32 {
        pack(widen8(self.r()), widen8(self.g()), widen8(self.b()))
    }
}

impl Colorspace for Rgb565 {
    fn to_rgb10(self) -> u32 {
        let r = self.r() as u32;
        let g = self.g() as u32;
        let b = self.b() as u32;
        pack(r << 5 | r, g << 4 | g >> 2, b << 5 | b)
    }
}

/// Converts `pixels` into `out`, reusing its allocation.
pub fn convert<C: Colorspace>(pixels: &[C], out: &mut Vec<u32>) {
    out.clear();
    out.extend(pixels.iter().map(|&p| p.to_rgb10()));
}
