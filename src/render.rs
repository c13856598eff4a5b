//! Bit-plane encoder: turns converted pixels into a frame program.
//!
//! Brightness uses Binary Code Modulation. Every row is shifted out once per
//! bit plane, most significant plane first, and each latched plane is kept
//! lit for a time proportional to its weight (`1 << bit` columns). The
//! shifting of the next plane overlaps with the display of the current one;
//! when the weight outlasts the shifting, the rest is spent in a delay
//! instruction so no FIFO bandwidth is wasted.
//!
//! Each column takes two words (clock low, then clock high), so one column is
//! four PIO cycles; delays are scaled to keep that pace.
//!
//! With temporal dithering ([`Geometry::with_temporal_planes`]) a frame only
//! carries one of the low planes, picked by the frame phase, and lights it
//! for as many times its weight as there are phases.

use crate::colorspace::CHANNEL_BITS;
use crate::geometry::Geometry;
use crate::pinout::Pinout;
use crate::protocol::Instruction;

/// PIO cycles per shifted column.
const CYCLES_PER_COLUMN: u32 = 4;

struct Emitter<'a> {
    out: &'a mut Vec<u32>,
    // data words still owed to the last data instruction
    pending: u32,
}

impl Emitter<'_> {
    fn data(&mut self, count: u32) {
        debug_assert_eq!(self.pending, 0);
        self.out.push(Instruction::data(count).word());
        self.pending = count;
    }

    fn word(&mut self, word: u32) {
        debug_assert!(self.pending > 0);
        self.pending -= 1;
        self.out.push(word);
    }

    fn delay(&mut self, cycles: u32) {
        debug_assert_eq!(self.pending, 0);
        if cycles > 0 {
            self.out.push(Instruction::delay(cycles).word());
        }
    }
}

/// Pin bits of plane `bit` for the pixels of one column, one per lane.
fn color_bits<P: Pinout>(column: &[usize], pixels: &[u32], bit: u32) -> u32 {
    let mut word = 0;
    for (lane, &index) in column.iter().enumerate() {
        let pixel = pixels[index];
        let pins = &P::PIN_RGB[lane * 3..lane * 3 + 3];
        for (channel, &pin) in pins.iter().enumerate() {
            let shift = (2 - channel as u32) * CHANNEL_BITS + bit;
            if pixel >> shift & 1 != 0 {
                word |= 1 << pin;
            }
        }
    }
    word
}

/// Keeps the latched plane lit for its remaining `lit` columns, then blanks.
fn finish_plane<P: Pinout>(emit: &mut Emitter<'_>, addr_bits: u32, lit: &mut u32) {
    if *lit == 0 {
        return;
    }
    emit.data(1);
    emit.word(addr_bits | P::oe_active());
    emit.delay(*lit * CYCLES_PER_COLUMN);
    emit.data(1);
    emit.word(addr_bits | P::oe_inactive());
    *lit = 0;
}

/// Bit planes shown in frame `phase`, most significant first, each with the
/// number of columns it stays lit.
pub fn planes(geometry: &Geometry, phase: usize) -> impl Iterator<Item = (u32, u32)> {
    let lowest = CHANNEL_BITS - geometry.n_planes() as u32;
    let phases = geometry.temporal_phases();
    // planes below this one take turns
    let temporal_top = if phases > 1 { lowest + phases as u32 } else { lowest };
    let shown = lowest + (phase % phases) as u32;
    (lowest..CHANNEL_BITS).rev().filter_map(move |bit| {
        if bit >= temporal_top {
            Some((bit, 1 << bit))
        } else if bit == shown {
            Some((bit, (phases as u32) << bit))
        } else {
            None
        }
    })
}

/// Encodes `pixels` (10 bits per channel, framebuffer order) into `out`.
///
/// `phase` counts frames and selects the low plane shown when temporal
/// dithering is enabled; it is ignored otherwise.
///
/// `geometry` must have been validated against `P`: its lane count matches
/// the pinout and every map entry indexes into `pixels`.
pub fn render<P: Pinout>(out: &mut Vec<u32>, geometry: &Geometry, pixels: &[u32], phase: usize) {
    out.clear();
    let mut emit = Emitter { out, pending: 0 };

    let n_addr = geometry.n_addr();
    let n_lanes = geometry.n_lanes();
    let across = geometry.pixels_across();

    // the program loops, so the last row is still latched when we start
    let mut addr_bits = P::addr_bits(n_addr - 1);
    let mut lit: u32 = 0;

    for (addr, row) in geometry.map().chunks_exact(across * n_lanes).enumerate() {
        for (bit, weight) in planes(geometry, phase) {
            emit.data(2 * across as u32);
            for column in row.chunks_exact(n_lanes) {
                let mut word = addr_bits | color_bits::<P>(column, pixels, bit);
                if lit > 0 {
                    lit -= 1;
                    word |= P::oe_active();
                } else {
                    word |= P::oe_inactive();
                }
                emit.word(word);
                emit.word(word | P::clk_bit());
            }
            finish_plane::<P>(&mut emit, addr_bits, &mut lit);

            // blank, select the new row and latch what was just shifted
            addr_bits = P::addr_bits(addr);
            emit.data(2);
            emit.word(addr_bits | P::oe_inactive() | P::lat_bit());
            emit.word(addr_bits | P::oe_inactive());
            emit.delay(P::POST_ADDR_DELAY);
            lit = weight;
        }
    }
    finish_plane::<P>(&mut emit, addr_bits, &mut lit);
    debug_assert_eq!(emit.pending, 0);
}
