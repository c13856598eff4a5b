use log::debug;
use log::info;

use super::Direction;
use super::FifoJoin;
use super::Pio;
use super::ShiftDirection;
use super::SmConfig;
use super::StateMachine;
use crate::pinout::Pinout;
use crate::protocol::PROGRAM;
use crate::Config;
use crate::Hub75Error;
use crate::Resource;

/// Largest single FIFO transfer the platform accepts, in bytes.
pub const MAX_XFER: usize = 65532;

/// Output pins driven by `out pins, 32`.
const OUT_PIN_COUNT: u8 = 28;

/// A claimed state machine running the frame program, with its pins.
///
/// Dropping the session undoes exactly what construction managed to set up,
/// so a partially initialized session is released correctly too.
pub struct PioSession<P: Pio> {
    pio: P,
    sm: Option<StateMachine>,
    program_offset: Option<u8>,
    enabled: bool,
    // in acquisition order
    pins: Vec<u8>,
}

impl<P: Pio> PioSession<P> {
    /// Claims a state machine, loads the program and hands the role pins of
    /// `PO` (with `n_addr_lines` address pins) to it.
    ///
    /// # Arguments
    /// * `pio` - The platform PIO block to run on
    /// * `n_addr_lines` - How many of the pinout's address pins to drive
    /// * `config` - Pixel clock and transfer buffering
    ///
    /// # Returns
    /// A running session that owns the state machine, the program and the
    /// pins until it is dropped
    ///
    /// # Errors
    /// - [`Hub75Error::InvalidConfig`] for a zero pixel clock or zero
    ///   transfer buffers; nothing is claimed in that case
    /// - [`Hub75Error::ResourceExhausted`] if no state machine or no program
    ///   space is available
    /// - [`Hub75Error::Hardware`] if the transfer buffers can't be set up
    pub fn new<PO: Pinout>(pio: P, n_addr_lines: usize, config: &Config) -> Result<Self, Hub75Error> {
        if config.pixel_clock == 0 {
            return Err(Hub75Error::InvalidConfig("pixel clock must not be zero"));
        }
        if config.xfer_buffers == 0 {
            return Err(Hub75Error::InvalidConfig("at least one transfer buffer is needed"));
        }

        let mut session = Self {
            pio,
            sm: None,
            program_offset: None,
            enabled: false,
            pins: Vec::new(),
        };

        let sm = session
            .pio
            .claim_unused_sm()
            .ok_or(Hub75Error::ResourceExhausted(Resource::StateMachine))?;
        session.sm = Some(sm);

        session
            .pio
            .sm_config_xfer(sm, Direction::ToSm, MAX_XFER, config.xfer_buffers)
            .map_err(|status| Hub75Error::Hardware {
                op: "sm_config_xfer",
                status,
            })?;

        let offset = session
            .pio
            .add_program(&PROGRAM)
            .ok_or(Hub75Error::ResourceExhausted(Resource::ProgramSpace))?;
        session.program_offset = Some(offset);

        session.pio.clear_fifos(sm);
        session.pio.set_clkdiv(sm, 1.0);

        // one word per two PIO cycles: `out pins` then `jmp y--`
        let clkdiv = session.pio.clock_hz() as f32 / (config.pixel_clock as f32 * 2.0);
        let sm_config = SmConfig::default()
            .with_wrap(offset + PROGRAM.wrap_target, offset + PROGRAM.wrap)
            // one side-set pin plus the enable bit
            .with_sideset(2, true, false)
            .with_out_shift(ShiftDirection::Left, true, 32)
            .with_fifo_join(FifoJoin::Tx)
            .with_clkdiv(clkdiv)
            .with_out_pins(0, OUT_PIN_COUNT)
            .with_sideset_pins(PO::PIN_CLK);
        session.pio.sm_init(sm, offset, &sm_config);
        session.pio.set_enabled(sm, true);
        session.enabled = true;
        info!(
            "PIO state machine {} running at offset {} (clkdiv {:.3})",
            sm.0, offset, clkdiv
        );

        for pin in PO::role_pins(n_addr_lines) {
            session.pio.gpio_init(pin);
            session.pio.set_consecutive_pindirs(sm, pin, 1, true);
            session.pins.push(pin);
        }
        debug!("configured pins {:?}", session.pins);

        Ok(session)
    }

    /// Sends `data` in chunks of at most [`MAX_XFER`] bytes.
    ///
    /// # Errors
    /// [`Hub75Error::Transfer`] as soon as a chunk fails. The peripheral state
    /// is unknown afterwards and a reboot may be required.
    pub fn transfer(&mut self, direction: Direction, data: &[u8]) -> Result<(), Hub75Error> {
        let Some(sm) = self.sm else {
            return Err(Hub75Error::Shutdown);
        };
        for chunk in data.chunks(MAX_XFER) {
            self.pio
                .xfer_data(sm, direction, chunk)
                .map_err(|status| Hub75Error::Transfer { status })?;
        }
        Ok(())
    }

    /// Sends a frame program to the state machine.
    pub fn transfer_words(&mut self, words: &[u32]) -> Result<(), Hub75Error> {
        self.transfer(Direction::ToSm, bytemuck::cast_slice(words))
    }

    pub fn state_machine(&self) -> Option<StateMachine> {
        self.sm
    }

    fn teardown(&mut self) {
        let Some(sm) = self.sm.take() else {
            return;
        };
        for pin in self.pins.drain(..).rev() {
            self.pio.set_consecutive_pindirs(sm, pin, 1, false);
            self.pio.gpio_release(pin);
        }
        if self.enabled {
            self.pio.set_enabled(sm, false);
            self.enabled = false;
        }
        if let Some(offset) = self.program_offset.take() {
            self.pio.remove_program(&PROGRAM, offset);
        }
        self.pio.unclaim_sm(sm);
        debug!("released PIO state machine {}", sm.0);
    }
}

impl<P: Pio> Drop for PioSession<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
