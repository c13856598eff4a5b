//! Access to the PIO block of the host platform.
//!
//! [`Pio`] is the narrow contract the driver needs from the platform PIO
//! library: claiming state machines, loading programs, configuring pins and
//! pushing data into the TX FIFO. A platform backend implements it once;
//! [`PioSession`] builds the HUB75 specific setup on top.

use crate::protocol::Program;

pub mod session;

#[cfg(test)]
pub(crate) mod mock;

pub use session::PioSession;
pub use session::MAX_XFER;

/// Index of a state machine within a PIO block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateMachine(pub u8);

/// Direction of a FIFO transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToSm,
    FromSm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoJoin {
    None,
    Tx,
    Rx,
}

/// State machine configuration, applied by [`Pio::sm_init`].
///
/// The defaults match the platform library's default configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmConfig {
    pub wrap_target: u8,
    pub wrap: u8,
    pub sideset_bits: u8,
    pub sideset_optional: bool,
    pub sideset_pindirs: bool,
    pub sideset_base: u8,
    pub out_shift: ShiftDirection,
    pub autopull: bool,
    pub pull_threshold: u8,
    pub fifo_join: FifoJoin,
    pub clkdiv: f32,
    pub out_base: u8,
    pub out_count: u8,
}

impl Default for SmConfig {
    fn default() -> Self {
        Self {
            wrap_target: 0,
            wrap: 31,
            sideset_bits: 0,
            sideset_optional: false,
            sideset_pindirs: false,
            sideset_base: 0,
            out_shift: ShiftDirection::Right,
            autopull: false,
            pull_threshold: 32,
            fifo_join: FifoJoin::None,
            clkdiv: 1.0,
            out_base: 0,
            out_count: 32,
        }
    }
}

impl SmConfig {
    pub fn with_wrap(mut self, wrap_target: u8, wrap: u8) -> Self {
        self.wrap_target = wrap_target;
        self.wrap = wrap;
        self
    }

    /// `bits` includes the enable bit when `optional` is set.
    pub fn with_sideset(mut self, bits: u8, optional: bool, pindirs: bool) -> Self {
        self.sideset_bits = bits;
        self.sideset_optional = optional;
        self.sideset_pindirs = pindirs;
        self
    }

    pub fn with_sideset_pins(mut self, base: u8) -> Self {
        self.sideset_base = base;
        self
    }

    pub fn with_out_shift(mut self, direction: ShiftDirection, autopull: bool, threshold: u8) -> Self {
        self.out_shift = direction;
        self.autopull = autopull;
        self.pull_threshold = threshold;
        self
    }

    pub fn with_fifo_join(mut self, join: FifoJoin) -> Self {
        self.fifo_join = join;
        self
    }

    pub fn with_clkdiv(mut self, div: f32) -> Self {
        self.clkdiv = div;
        self
    }

    pub fn with_out_pins(mut self, base: u8, count: u8) -> Self {
        self.out_base = base;
        self.out_count = count;
        self
    }
}

/// Platform PIO library.
///
/// Calls that can fail report the platform's non-zero status code.
pub trait Pio: Send {
    /// Claims a state machine nobody else uses, `None` if all are taken.
    fn claim_unused_sm(&mut self) -> Option<StateMachine>;

    fn unclaim_sm(&mut self, sm: StateMachine);

    /// Sets up the kernel side transfer buffers for `sm`.
    fn sm_config_xfer(
        &mut self,
        sm: StateMachine,
        direction: Direction,
        buf_size: usize,
        buf_count: usize,
    ) -> Result<(), i32>;

    /// Loads `program`, returning its offset or `None` when there is no room.
    fn add_program(&mut self, program: &Program) -> Option<u8>;

    fn remove_program(&mut self, program: &Program, offset: u8);

    fn clear_fifos(&mut self, sm: StateMachine);

    fn set_clkdiv(&mut self, sm: StateMachine, div: f32);

    fn sm_init(&mut self, sm: StateMachine, initial_pc: u8, config: &SmConfig);

    fn set_enabled(&mut self, sm: StateMachine, enabled: bool);

    /// Hands `pin` to the PIO block.
    fn gpio_init(&mut self, pin: u8);

    /// Returns `pin` to its default function.
    fn gpio_release(&mut self, pin: u8);

    fn set_consecutive_pindirs(&mut self, sm: StateMachine, base: u8, count: u8, output: bool);

    /// Frequency of the clock feeding the PIO block, in Hz.
    fn clock_hz(&self) -> u32;

    /// Synchronous FIFO transfer of at most the configured buffer size.
    fn xfer_data(&mut self, sm: StateMachine, direction: Direction, data: &[u8]) -> Result<(), i32>;
}
