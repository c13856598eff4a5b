//! Wiring of the HUB75 signals to Raspberry Pi GPIOs.
//!
//! A [`Pinout`] is a zero-sized type carrying the GPIO number of every
//! signal as associated constants, so the encoder is specialized per board
//! at compile time.

/// GPIO assignment of the HUB75 signals.
///
/// Every pin must be below 28, the PIO program drives GPIO 0..27.
pub trait Pinout: Send + Sync + 'static {
    /// Color pins, three per lane in R, G, B order.
    const PIN_RGB: &'static [u8];
    /// Address pins, least significant first.
    const PIN_ADDR: &'static [u8];
    /// Output enable, active low.
    const PIN_OE: u8;
    /// Shift clock, data is sampled on the rising edge.
    const PIN_CLK: u8;
    /// Latch, the shifted row is latched on the rising edge.
    const PIN_LAT: u8;
    /// Loop iterations to wait after switching the row address.
    const POST_ADDR_DELAY: u32 = 5;

    fn n_lanes() -> usize {
        Self::PIN_RGB.len() / 3
    }

    /// Pin word bits selecting row `addr`.
    fn addr_bits(addr: usize) -> u32 {
        Self::PIN_ADDR
            .iter()
            .enumerate()
            .filter(|(bit, _)| addr & (1 << bit) != 0)
            .fold(0, |bits, (_, &pin)| bits | 1 << pin)
    }

    fn oe_active() -> u32 {
        0
    }

    fn oe_inactive() -> u32 {
        1 << Self::PIN_OE
    }

    fn clk_bit() -> u32 {
        1 << Self::PIN_CLK
    }

    fn lat_bit() -> u32 {
        1 << Self::PIN_LAT
    }

    /// Pins handed to the PIO, in the order they are configured: OE, clock,
    /// latch, colors, then the first `n_addr_lines` address pins.
    fn role_pins(n_addr_lines: usize) -> impl Iterator<Item = u8> {
        [Self::PIN_OE, Self::PIN_CLK, Self::PIN_LAT]
            .into_iter()
            .chain(Self::PIN_RGB.iter().copied())
            .chain(Self::PIN_ADDR.iter().copied().take(n_addr_lines))
    }
}

/// Adafruit RGB Matrix Bonnet (and HAT).
#[derive(Debug, Clone, Copy, Default)]
pub struct AdafruitMatrixBonnet;

impl Pinout for AdafruitMatrixBonnet {
    const PIN_RGB: &'static [u8] = &[5, 13, 6, 12, 16, 23];
    const PIN_ADDR: &'static [u8] = &[22, 26, 27, 20, 24];
    const PIN_OE: u8 = 4;
    const PIN_CLK: u8 = 17;
    const PIN_LAT: u8 = 21;
}

/// Adafruit RGB Matrix Bonnet driving panels with swapped red and blue.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdafruitMatrixBonnetBgr;

impl Pinout for AdafruitMatrixBonnetBgr {
    const PIN_RGB: &'static [u8] = &[6, 13, 5, 23, 16, 12];
    const PIN_ADDR: &'static [u8] = AdafruitMatrixBonnet::PIN_ADDR;
    const PIN_OE: u8 = AdafruitMatrixBonnet::PIN_OE;
    const PIN_CLK: u8 = AdafruitMatrixBonnet::PIN_CLK;
    const PIN_LAT: u8 = AdafruitMatrixBonnet::PIN_LAT;
}

pub type AdafruitMatrixHat = AdafruitMatrixBonnet;
pub type AdafruitMatrixHatBgr = AdafruitMatrixBonnetBgr;

/// Active-3 board: three HUB75 connectors, six lanes.
///
/// Use it with a six lane geometry, e.g. from
/// [`multilane_map`](crate::geometry::multilane_map).
#[derive(Debug, Clone, Copy, Default)]
pub struct Active3;

impl Pinout for Active3 {
    const PIN_RGB: &'static [u8] = &[
        7, 27, 11, //
        10, 9, 8, //
        6, 5, 12, //
        20, 13, 19, //
        3, 2, 14, //
        21, 16, 26, //
    ];
    const PIN_ADDR: &'static [u8] = &[22, 23, 24, 25, 15];
    const PIN_OE: u8 = 18;
    const PIN_CLK: u8 = 17;
    const PIN_LAT: u8 = 4;
}

/// Active-3 board driving panels with swapped red and blue.
#[derive(Debug, Clone, Copy, Default)]
pub struct Active3Bgr;

impl Pinout for Active3Bgr {
    const PIN_RGB: &'static [u8] = &[
        11, 27, 7, //
        8, 9, 10, //
        12, 5, 6, //
        19, 13, 20, //
        14, 2, 3, //
        26, 16, 21, //
    ];
    const PIN_ADDR: &'static [u8] = Active3::PIN_ADDR;
    const PIN_OE: u8 = Active3::PIN_OE;
    const PIN_CLK: u8 = Active3::PIN_CLK;
    const PIN_LAT: u8 = Active3::PIN_LAT;
}
