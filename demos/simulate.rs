//! Drives a simulated 64x32 matrix without any hardware
//!
//! `SimulatedPio` stands in for the platform PIO library: it accepts the same
//! calls a real backend gets, walks the data/delay stream the state machine
//! would execute and sleeps for as long as the state machine would take to
//! clock it out. Swap it for a real [`Pio`] backend to drive a panel.
//!
//! Run with `RUST_LOG=info cargo run --example simulate`.

use std::time::Duration;
use std::time::Instant;

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Circle;
use embedded_graphics::primitives::PrimitiveStyle;
use embedded_graphics::primitives::Rectangle;
use log::debug;
use log::info;
use rpi5_hub75::pio::Direction;
use rpi5_hub75::pio::SmConfig;
use rpi5_hub75::pio::StateMachine;
use rpi5_hub75::protocol::Instruction;
use rpi5_hub75::protocol::Opcode;
use rpi5_hub75::protocol::Program;
use rpi5_hub75::Config;
use rpi5_hub75::FrameBuffer;
use rpi5_hub75::Geometry;
use rpi5_hub75::Hub75;
use rpi5_hub75::Orientation;
use rpi5_hub75::Pio;

const WIDTH: usize = 64;
const HEIGHT: usize = 32;
const RUN_FOR: Duration = Duration::from_secs(5);

/// PIO block of a Pi 5 with nothing attached.
///
/// Transfers are paced by the cycles the program would spend on them at the
/// configured clock divider, so the driver's frame rate is realistic.
#[derive(Debug)]
struct SimulatedPio {
    claimed: bool,
    clkdiv: f32,
    // data words still owed to the current data instruction
    pending_data: u64,
    cycles: u64,
}

impl SimulatedPio {
    const CLOCK_HZ: u32 = 200_000_000;
    // cycles the program spends per data word
    const CYCLES_PER_WORD: u64 = 2;

    fn new() -> Self {
        Self {
            claimed: false,
            clkdiv: 1.0,
            pending_data: 0,
            cycles: 0,
        }
    }

    /// Counts the state machine cycles `words` cost. Instructions may span
    /// transfer boundaries.
    fn execute(&mut self, words: impl Iterator<Item = u32>) -> u64 {
        let mut cycles = 0;
        for word in words {
            if self.pending_data > 0 {
                self.pending_data -= 1;
                cycles += Self::CYCLES_PER_WORD;
                continue;
            }
            let instruction = Instruction::from_word(word);
            match instruction.opcode() {
                Opcode::Data => self.pending_data = u64::from(instruction.count()),
                Opcode::Delay => cycles += u64::from(instruction.count()),
            }
        }
        cycles
    }
}

impl Pio for SimulatedPio {
    fn claim_unused_sm(&mut self) -> Option<StateMachine> {
        if self.claimed {
            return None;
        }
        self.claimed = true;
        Some(StateMachine(0))
    }

    fn unclaim_sm(&mut self, _sm: StateMachine) {
        self.claimed = false;
        info!("state machine released after {} cycles", self.cycles);
    }

    fn sm_config_xfer(
        &mut self,
        _sm: StateMachine,
        _direction: Direction,
        buf_size: usize,
        buf_count: usize,
    ) -> Result<(), i32> {
        debug!("{buf_count} transfer buffers of {buf_size} bytes");
        Ok(())
    }

    fn add_program(&mut self, program: &Program) -> Option<u8> {
        debug!("loading {} instructions", program.len());
        Some(0)
    }

    fn remove_program(&mut self, _program: &Program, _offset: u8) {}

    fn clear_fifos(&mut self, _sm: StateMachine) {
        self.pending_data = 0;
    }

    fn set_clkdiv(&mut self, _sm: StateMachine, div: f32) {
        self.clkdiv = div;
    }

    fn sm_init(&mut self, _sm: StateMachine, _initial_pc: u8, config: &SmConfig) {
        self.clkdiv = config.clkdiv;
    }

    fn set_enabled(&mut self, _sm: StateMachine, enabled: bool) {
        debug!("state machine enabled: {enabled}");
    }

    fn gpio_init(&mut self, _pin: u8) {}

    fn gpio_release(&mut self, _pin: u8) {}

    fn set_consecutive_pindirs(&mut self, _sm: StateMachine, _base: u8, _count: u8, _output: bool) {}

    fn clock_hz(&self) -> u32 {
        Self::CLOCK_HZ
    }

    fn xfer_data(&mut self, _sm: StateMachine, _direction: Direction, data: &[u8]) -> Result<(), i32> {
        let words = data
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        let cycles = self.execute(words);
        self.cycles += cycles;
        let seconds = cycles as f64 * f64::from(self.clkdiv) / f64::from(Self::CLOCK_HZ);
        std::thread::sleep(Duration::from_secs_f64(seconds));
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let geometry = Geometry::new(WIDTH, HEIGHT, 4, 10, Orientation::Normal, false)?.with_temporal_planes(2)?;
    let mut matrix: Hub75<_> = Hub75::new(
        SimulatedPio::new(),
        FrameBuffer::<Rgb888>::new(WIDTH, HEIGHT),
        geometry,
        Config::default(),
    )?;

    let start = Instant::now();
    let mut frames = 0u32;
    while start.elapsed() < RUN_FOR {
        let x = (frames % WIDTH as u32) as i32;
        let fb = matrix.framebuffer_mut();
        fb.clear();
        Rectangle::new(Point::new(0, 0), Size::new(WIDTH as u32, 4))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::new(0, 0, 64)))
            .draw(fb)?;
        Circle::new(Point::new(x - 8, 8), 16)
            .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
            .draw(fb)?;
        matrix.show()?;
        frames += 1;
        if frames % 100 == 0 {
            info!("{frames} frames shown, display at {:.1} fps", matrix.fps());
        }
    }
    info!("done, {frames} frames in {:.1?}", start.elapsed());
    Ok(())
}
