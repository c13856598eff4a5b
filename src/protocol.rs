//! Instruction protocol executed by the PIO state machine.
//!
//! The state machine runs a tiny fixed program in an endless loop. Every
//! iteration it pulls one 32-bit [`Instruction`] from its TX FIFO and either
//! shifts the following words straight out to GPIO 0..27 or idles for a
//! number of cycles.
//!
//! # Frame program
//! A frame program is a flat sequence of instructions:
//! - `data(n)` followed by exactly `n` raw pin words
//! - `delay(n)` on its own, consuming no further words
//!
//! Pin state is held between words, so a delay keeps whatever the last data
//! word drove (this is how a bit plane stays lit without spending FIFO
//! bandwidth).
//!
//! # Count encoding
//! The program loads the count into `y` and loops on `jmp y--`, which runs
//! `y + 1` times. The 31-bit field therefore carries `n - 1`; use
//! [`Instruction::count`] to get the logical count back.

use core::fmt;

use bitfield::bitfield;

/// Largest logical count a single instruction can carry.
pub const MAX_COUNT: u32 = 1 << 31;

/// Number of instruction slots in a PIO instruction memory.
pub const PROGRAM_LEN: usize = 32;

bitfield! {
    /// One instruction word of the frame program.
    ///
    /// - Bit 31: mode, 1 = data, 0 = delay
    /// - Bits 30-0: count minus one
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct Instruction(u32);
    impl Debug;
    pub is_data, set_is_data: 31;
    pub raw_count, set_raw_count: 30, 0;
}

/// The two operations understood by the PIO program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Shift out the following words to the output pins, one per loop.
    Data,
    /// Idle without consuming words.
    Delay,
}

impl Instruction {
    const DATA_TAG: u32 = 1 << 31;
    const COUNT_MASK: u32 = MAX_COUNT - 1;

    /// Raw count field for a logical `count`, saturated to `1..=MAX_COUNT`.
    const fn raw(count: u32) -> u32 {
        let count = if count == 0 {
            1
        } else if count > MAX_COUNT {
            MAX_COUNT
        } else {
            count
        };
        (count - 1) & Self::COUNT_MASK
    }

    /// Shift out the next `count` words.
    ///
    /// The count saturates to `1..=MAX_COUNT`; the caller must follow the
    /// instruction with exactly [`Instruction::count`] words.
    pub const fn data(count: u32) -> Self {
        Self(Self::DATA_TAG | Self::raw(count))
    }

    /// Idle for `count` loop iterations.
    ///
    /// The program can't idle for less than one iteration, so 0 behaves
    /// like 1. Counts above `MAX_COUNT` saturate.
    pub const fn delay(count: u32) -> Self {
        Self(Self::raw(count))
    }

    pub const fn from_word(word: u32) -> Self {
        Self(word)
    }

    pub const fn word(self) -> u32 {
        self.0
    }

    pub fn opcode(&self) -> Opcode {
        if self.is_data() {
            Opcode::Data
        } else {
            Opcode::Delay
        }
    }

    /// Logical count, i.e. the number of words shifted or cycles idled.
    pub fn count(&self) -> u32 {
        self.raw_count() + 1
    }
}

/// A PIO program image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Program {
    pub instructions: &'static [u16],
    /// Fixed load address, `None` to let the loader pick one.
    pub origin: Option<u8>,
    pub wrap_target: u8,
    pub wrap: u8,
}

impl Program {
    pub const fn len(&self) -> usize {
        self.instructions.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

// .wrap_target
// top:
//     out x, 1
//     out y, 31
//     jmp !x delay_loop
// data_loop:
//     out pins, 32
//     jmp y--, data_loop
// .wrap
// delay_loop:
//     jmp y--, delay_loop
//     jmp top
//
// padded with nops to the full 32 instructions so nothing else can be loaded
const INSTRUCTIONS: [u16; PROGRAM_LEN] = [
    0x6021, 0x605f, 0x0025, 0x6000, 0x0083, 0x0085, 0x0000, 0xa042, //
    0xa042, 0xa042, 0xa042, 0xa042, 0xa042, 0xa042, 0xa042, 0xa042, //
    0xa042, 0xa042, 0xa042, 0xa042, 0xa042, 0xa042, 0xa042, 0xa042, //
    0xa042, 0xa042, 0xa042, 0xa042, 0xa042, 0xa042, 0xa042, 0xa042, //
];

/// The program replaying frame programs, shared by every driver instance.
pub const PROGRAM: Program = Program {
    instructions: &INSTRUCTIONS,
    origin: None,
    wrap_target: 0,
    wrap: 4,
};

/// A decoded step of a frame program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op<'a> {
    Data(&'a [u32]),
    Delay(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A data instruction at word `offset` announced more words than remain.
    Truncated {
        offset: usize,
        expected: usize,
        available: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated {
                offset,
                expected,
                available,
            } => write!(
                f,
                "data instruction at word {offset} needs {expected} words, only {available} left"
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Walks a frame program the way the state machine does.
pub fn decode(words: &[u32]) -> Ops<'_> {
    Ops { words, offset: 0 }
}

/// Iterator returned by [`decode`].
#[derive(Debug, Clone)]
pub struct Ops<'a> {
    words: &'a [u32],
    offset: usize,
}

impl<'a> Iterator for Ops<'a> {
    type Item = Result<Op<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let word = *self.words.get(self.offset)?;
        let instruction = Instruction::from_word(word);
        let start = self.offset + 1;
        match instruction.opcode() {
            Opcode::Delay => {
                self.offset = start;
                Some(Ok(Op::Delay(instruction.count())))
            }
            Opcode::Data => {
                let expected = instruction.count() as usize;
                let available = self.words.len() - start;
                if expected > available {
                    let offset = self.offset;
                    // nothing sensible follows a truncated block
                    self.offset = self.words.len();
                    return Some(Err(DecodeError::Truncated {
                        offset,
                        expected,
                        available,
                    }));
                }
                self.offset = start + expected;
                Some(Ok(Op::Data(&self.words[start..start + expected])))
            }
        }
    }
}
