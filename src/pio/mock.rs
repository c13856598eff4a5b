//! Recording [`Pio`] implementation for tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use super::Direction;
use super::Pio;
use super::SmConfig;
use super::StateMachine;
use crate::protocol::Program;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ClaimSm(u8),
    UnclaimSm(u8),
    ConfigXfer {
        sm: u8,
        buf_size: usize,
        buf_count: usize,
    },
    AddProgram(u8),
    RemoveProgram(u8),
    ClearFifos(u8),
    SetClkdiv(u8),
    SmInit {
        sm: u8,
        pc: u8,
        config: SmConfig,
    },
    SetEnabled(bool),
    GpioInit(u8),
    GpioRelease(u8),
    PinDirs {
        base: u8,
        count: u8,
        output: bool,
    },
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    outputs: Vec<u8>,
    chunk_sizes: Vec<usize>,
    chunks: VecDeque<Vec<u8>>,
    xfer_count: usize,
}

/// Shared view of everything a [`MockPio`] saw, usable after the mock has
/// moved into a driver.
#[derive(Debug, Clone, Default)]
pub struct MockLog(Arc<Mutex<State>>);

impl MockLog {
    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.0.lock().unwrap();
        f(&mut state)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    /// Pins currently configured as outputs, in configuration order.
    pub fn output_pins(&self) -> Vec<u8> {
        self.with(|s| s.outputs.clone())
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.with(|s| s.chunk_sizes.clone())
    }

    pub fn xfer_count(&self) -> usize {
        self.with(|s| s.xfer_count)
    }

    /// Concatenation of every recorded chunk.
    pub fn received(&self) -> Vec<u8> {
        self.with(|s| s.chunks.iter().flatten().copied().collect())
    }

    /// The most recent `n` recorded chunks, oldest first.
    pub fn recent_chunks(&self, n: usize) -> Vec<Vec<u8>> {
        self.with(|s| {
            let skip = s.chunks.len().saturating_sub(n);
            s.chunks.iter().skip(skip).cloned().collect()
        })
    }
}

pub struct MockPio {
    log: MockLog,
    free_sm: bool,
    program_space: bool,
    config_xfer_status: i32,
    fail_xfer: Option<(usize, i32)>,
    record_limit: usize,
    xfer_delay: Duration,
    clock_hz: u32,
}

impl Default for MockPio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPio {
    pub fn new() -> Self {
        Self {
            log: MockLog::default(),
            free_sm: true,
            program_space: true,
            config_xfer_status: 0,
            fail_xfer: None,
            record_limit: 0,
            xfer_delay: Duration::ZERO,
            clock_hz: 200_000_000,
        }
    }

    pub fn log(&self) -> MockLog {
        self.log.clone()
    }

    pub fn without_free_sm(mut self) -> Self {
        self.free_sm = false;
        self
    }

    pub fn without_program_space(mut self) -> Self {
        self.program_space = false;
        self
    }

    pub fn with_config_xfer_status(mut self, status: i32) -> Self {
        self.config_xfer_status = status;
        self
    }

    /// Lets `ok` chunks through, then fails every chunk with `status`.
    pub fn failing_xfer_after(mut self, ok: usize, status: i32) -> Self {
        self.fail_xfer = Some((ok, status));
        self
    }

    pub fn recording_data(self) -> Self {
        self.recording_recent(usize::MAX)
    }

    /// Keeps the payload of the last `limit` chunks.
    pub fn recording_recent(mut self, limit: usize) -> Self {
        self.record_limit = limit;
        self
    }

    pub fn with_xfer_delay(mut self, delay: Duration) -> Self {
        self.xfer_delay = delay;
        self
    }

    fn record(&self, call: Call) {
        self.log.with(|s| s.calls.push(call));
    }
}

impl Pio for MockPio {
    fn claim_unused_sm(&mut self) -> Option<StateMachine> {
        if !self.free_sm {
            return None;
        }
        self.free_sm = false;
        self.record(Call::ClaimSm(0));
        Some(StateMachine(0))
    }

    fn unclaim_sm(&mut self, sm: StateMachine) {
        self.free_sm = true;
        self.record(Call::UnclaimSm(sm.0));
    }

    fn sm_config_xfer(
        &mut self,
        sm: StateMachine,
        _direction: Direction,
        buf_size: usize,
        buf_count: usize,
    ) -> Result<(), i32> {
        self.record(Call::ConfigXfer {
            sm: sm.0,
            buf_size,
            buf_count,
        });
        match self.config_xfer_status {
            0 => Ok(()),
            status => Err(status),
        }
    }

    fn add_program(&mut self, program: &Program) -> Option<u8> {
        assert_eq!(program.len(), 32);
        if !self.program_space {
            return None;
        }
        self.program_space = false;
        self.record(Call::AddProgram(0));
        Some(0)
    }

    fn remove_program(&mut self, _program: &Program, offset: u8) {
        self.program_space = true;
        self.record(Call::RemoveProgram(offset));
    }

    fn clear_fifos(&mut self, sm: StateMachine) {
        self.record(Call::ClearFifos(sm.0));
    }

    fn set_clkdiv(&mut self, sm: StateMachine, _div: f32) {
        self.record(Call::SetClkdiv(sm.0));
    }

    fn sm_init(&mut self, sm: StateMachine, initial_pc: u8, config: &SmConfig) {
        self.record(Call::SmInit {
            sm: sm.0,
            pc: initial_pc,
            config: *config,
        });
    }

    fn set_enabled(&mut self, _sm: StateMachine, enabled: bool) {
        self.record(Call::SetEnabled(enabled));
    }

    fn gpio_init(&mut self, pin: u8) {
        self.record(Call::GpioInit(pin));
    }

    fn gpio_release(&mut self, pin: u8) {
        self.record(Call::GpioRelease(pin));
    }

    fn set_consecutive_pindirs(&mut self, _sm: StateMachine, base: u8, count: u8, output: bool) {
        self.log.with(|s| {
            s.calls.push(Call::PinDirs {
                base,
                count,
                output,
            });
            for pin in base..base + count {
                if output {
                    s.outputs.push(pin);
                } else {
                    s.outputs.retain(|&p| p != pin);
                }
            }
        });
    }

    fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    fn xfer_data(&mut self, _sm: StateMachine, _direction: Direction, data: &[u8]) -> Result<(), i32> {
        assert!(data.len() <= super::MAX_XFER);
        if !self.xfer_delay.is_zero() {
            thread::sleep(self.xfer_delay);
        }
        let limit = self.record_limit;
        let fail = self.fail_xfer;
        self.log.with(|s| {
            if let Some((ok, status)) = fail {
                if s.xfer_count >= ok {
                    return Err(status);
                }
            }
            s.xfer_count += 1;
            s.chunk_sizes.push(data.len());
            if limit > 0 {
                s.chunks.push_back(data.to_vec());
                while s.chunks.len() > limit {
                    s.chunks.pop_front();
                }
            }
            Ok(())
        })
    }
}
