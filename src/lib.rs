//! HUB75 LED matrix driver for the Raspberry Pi 5 PIO.
//!
//! The application draws into a [`FrameBuffer`] with `embedded-graphics` and
//! calls [`Hub75::show`]. The frame is encoded into a program of data and
//! delay words (see [`protocol`]) and handed, through a triple buffer, to a
//! background thread that streams it to a PIO state machine in a loop.
//!
//! ```ignore
//! let geometry = Geometry::new(64, 32, 4, 10, Orientation::Normal, false)?;
//! let framebuffer = FrameBuffer::<Rgb888>::new(64, 32);
//! let mut matrix: Hub75<_> = Hub75::new(pio, framebuffer, geometry, Config::default())?;
//! Circle::new(Point::new(16, 0), 32)
//!     .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
//!     .draw(matrix.framebuffer_mut())?;
//! matrix.show()?;
//! ```

use std::fmt;
use std::io;
use std::time::Duration;

pub mod buffer_manager;
pub mod colorspace;
pub mod driver;
pub mod framebuffer;
pub mod geometry;
pub mod pinout;
pub mod pio;
pub mod protocol;
pub mod render;

pub use colorspace::Colorspace;
pub use driver::Hub75;
pub use framebuffer::FrameBuffer;
pub use geometry::Geometry;
pub use geometry::Orientation;
pub use pinout::Pinout;
pub use pio::Pio;

/// Resource the PIO block ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    StateMachine,
    ProgramSpace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hub75Error {
    /// The geometry uses more address lines than the pinout has.
    TooManyAddressLines { requested: usize, available: usize },
    /// The geometry's lane count differs from the pinout's.
    LaneMismatch { geometry: usize, pinout: usize },
    InvalidGeometry(&'static str),
    /// A [`Config`] value the hardware can't run with.
    InvalidConfig(&'static str),
    /// The framebuffer dimensions differ from the geometry's, as
    /// `(width, height)`.
    FrameBufferSize {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    ResourceExhausted(Resource),
    /// A platform call failed during setup.
    Hardware { op: &'static str, status: i32 },
    /// The blit thread couldn't be started.
    Spawn(io::ErrorKind),
    /// A data transfer to the state machine failed.
    Transfer { status: i32 },
    /// The driver is shutting down or its blit thread has stopped.
    Shutdown,
}

impl fmt::Display for Hub75Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hub75Error::TooManyAddressLines {
                requested,
                available,
            } => write!(
                f,
                "geometry needs {requested} address lines but the pinout has {available}"
            ),
            Hub75Error::LaneMismatch { geometry, pinout } => write!(
                f,
                "geometry has {geometry} lanes but the pinout has {pinout}"
            ),
            Hub75Error::InvalidGeometry(reason) => write!(f, "invalid geometry: {reason}"),
            Hub75Error::InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
            Hub75Error::FrameBufferSize { expected, actual } => write!(
                f,
                "framebuffer is {}x{} but the geometry is {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            Hub75Error::ResourceExhausted(Resource::StateMachine) => {
                write!(f, "no free PIO state machine")
            }
            Hub75Error::ResourceExhausted(Resource::ProgramSpace) => {
                write!(f, "no room for the program in PIO instruction memory")
            }
            Hub75Error::Hardware { op, status } => write!(f, "{op} failed with status {status}"),
            Hub75Error::Spawn(kind) => write!(f, "failed to start the blit thread: {kind}"),
            Hub75Error::Transfer { status } => write!(
                f,
                "PIO transfer failed with status {status}, a reboot may be required"
            ),
            Hub75Error::Shutdown => write!(f, "driver is shut down"),
        }
    }
}

impl std::error::Error for Hub75Error {}

/// Driver tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Rate at which words are clocked out, in Hz.
    pub pixel_clock: u32,
    /// Transfer buffers the platform keeps in flight.
    pub xfer_buffers: usize,
    /// How long the blit thread waits between frames when nothing has been
    /// shown yet.
    pub idle_wait: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pixel_clock: 2_700_000,
            xfer_buffers: 2,
            idle_wait: Duration::from_millis(1),
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_pixel_clock(mut self, hz: u32) -> Self {
        self.pixel_clock = hz;
        self
    }

    #[must_use]
    pub fn with_xfer_buffers(mut self, count: usize) -> Self {
        self.xfer_buffers = count;
        self
    }

    #[must_use]
    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }
}

/// Something that can put a frame on the panel.
pub trait Displayable {
    /// Publishes the current framebuffer contents.
    ///
    /// # Errors
    /// Any fault of the display loop since the last call.
    fn show(&mut self) -> Result<(), Hub75Error>;

    /// Frames per second the display loop achieved most recently.
    fn fps(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pixel_clock, 2_700_000);
        assert_eq!(config.xfer_buffers, 2);
        assert_eq!(config.idle_wait, Duration::from_millis(1));
    }

    #[test]
    fn test_transfer_error_mentions_reboot() {
        let msg = Hub75Error::Transfer { status: -5 }.to_string();
        assert!(msg.contains("-5"));
        assert!(msg.contains("reboot"));
    }
}
