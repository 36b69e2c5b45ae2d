//! Hop selection.
//!
//! BR/EDR devices hop between 79 RF channels, 1 MHz apart starting at 2402 MHz. The channel used
//! in a slot is a function of the clock and of the address of the piconet (or inquiry/page
//! target) through the hop selection kernel: an adder, a 5-bit butterfly permutation
//! ([`perm5`]), a second adder and a lookup in a register bank holding the channels in the order
//! `0, 2, 4, ..., 78, 1, 3, ..., 77`.
//!
//! Two sequences are implemented:
//!
//! * The inquiry/page sequence ([`HopState::inquiry`]), with the phase input `X` taken from a
//!   counter that is bumped with [`HopState::increment`] before each master transmission.
//! * The basic (connection) sequence ([`HopState::basic`]), optionally restricted to a set of
//!   channels by adaptive frequency hopping.
//!
//! [`perm5`]: fn.perm5.html
//! [`HopState::inquiry`]: struct.HopState.html#method.inquiry
//! [`HopState::increment`]: struct.HopState.html#method.increment
//! [`HopState::basic`]: struct.HopState.html#method.basic

mod channel_map;

pub use self::channel_map::ChannelMap;

use crate::{bytes::ByteReader, time::Clkn, Error};
use core::fmt;

/// Number of BR/EDR RF channels.
pub const NUM_CHANNELS: usize = 79;

/// One of the 79 BR/EDR RF channels.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Channel(u8);

impl Channel {
    /// Creates a `Channel` from a raw channel number.
    ///
    /// # Panics
    ///
    /// This will panic if `index` is not a valid channel. Valid channels are 0..=78.
    pub fn new(index: u8) -> Self {
        assert!(usize::from(index) < NUM_CHANNELS);
        Channel(index)
    }

    /// Returns the channel number (0..=78).
    pub fn index(&self) -> u8 {
        self.0
    }

    /// Returns the center frequency of this channel in MHz.
    pub fn freq(&self) -> u16 {
        2402 + u16::from(self.0)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Swap stages of the permutation, as `(index1, index2)` pairs controlled by bits 0 to 13.
const PERM5_SWAPS: [(u8, u8); 14] = [
    (0, 1),
    (2, 3),
    (1, 2),
    (3, 4),
    (0, 4),
    (1, 3),
    (0, 2),
    (3, 4),
    (1, 4),
    (0, 3),
    (2, 4),
    (1, 3),
    (0, 3),
    (1, 2),
];

/// Runs `z` through the swap stages `hi` down to `lo` (inclusive), enabled by the bits of `p`.
const fn perm5_stages(mut z: u8, p: u16, hi: usize, lo: usize) -> u8 {
    let mut i = hi + 1;
    while i > lo {
        i -= 1;
        if p & (1 << i) != 0 {
            let (a, b) = PERM5_SWAPS[i];
            if ((z >> a) ^ (z >> b)) & 1 != 0 {
                z ^= (1 << a) | (1 << b);
            }
        }
    }
    z
}

const fn perm5_lut() -> [[u8; 4096]; 2] {
    let mut lut = [[0; 4096]; 2];
    let mut idx = 0;
    while idx < 4096 {
        let z = (idx & 0x1f) as u8;
        let ctl = (idx >> 5) as u16;
        lut[0][idx] = perm5_stages(z, ctl << 7, 13, 7);
        lut[1][idx] = perm5_stages(z, ctl, 6, 0);
        idx += 1;
    }
    lut
}

/// Precomputed permutation: stages 13 to 7 in the first table, 6 to 0 in the second, each indexed
/// by `control << 5 | z`.
static PERM5_LUT: [[u8; 4096]; 2] = perm5_lut();

/// Permutes the 5-bit value `z` with the 14 control bits `p_high` (5 bits, stages 9 to 13) and
/// `p_low` (9 bits, stages 0 to 8).
pub fn perm5(z: u8, p_high: u8, p_low: u16) -> u8 {
    let p = (p_low & 0x1ff) | (u16::from(p_high & 0x1f) << 9);
    let z = PERM5_LUT[0][(usize::from(p >> 7) << 5) | usize::from(z & 0x1f)];
    PERM5_LUT[1][(usize::from(p & 0x7f) << 5) | usize::from(z)]
}

/// Bit-by-bit form of [`perm5`], applying one swap stage at a time.
///
/// [`perm5`]: fn.perm5.html
pub fn perm5_direct(z: u8, p_high: u8, p_low: u16) -> u8 {
    let p = (p_low & 0x1ff) | (u16::from(p_high & 0x1f) << 9);
    perm5_stages(z & 0x1f, p, 13, 0)
}

/// The register bank: index `i` maps to channel `2i mod 79`.
const BASIC_BANK: [u8; NUM_CHANNELS] = {
    let mut bank = [0; NUM_CHANNELS];
    let mut i = 0;
    while i < NUM_CHANNELS {
        bank[i] = ((i * 2) % NUM_CHANNELS) as u8;
        i += 1;
    }
    bank
};

/// Inputs of the hop selection kernel.
struct KernelInputs {
    x: u8,
    y1: bool,
    a: u8,
    b: u8,
    c: u8,
    d: u16,
    e: u8,
    f: u16,
}

/// The hop sequence selector.
///
/// A `HopState` is created from the 28 address bits `LAP | UAP << 24` of the device whose hop
/// sequence is followed. Recreating it (or calling [`init`]) discards any AFH configuration.
///
/// [`init`]: #method.init
pub struct HopState {
    a27_23: u8,
    a22_19: u8,
    c: u8,
    a18_10: u16,
    e: u8,

    /// Phase counter of the inquiry/page sequence.
    x: u8,

    afh_enabled: bool,
    afh_bank: [u8; NUM_CHANNELS],
    afh_chan_count: u8,
}

impl HopState {
    /// Derives the kernel constants from `address` (`LAP | UAP << 24`).
    pub fn new(address: u32) -> Self {
        let mut state = Self {
            a27_23: 0,
            a22_19: 0,
            c: 0,
            a18_10: 0,
            e: 0,
            x: 0,
            afh_enabled: false,
            afh_bank: [0; NUM_CHANNELS],
            afh_chan_count: 0,
        };
        state.init(address);
        state
    }

    /// Reinitializes `self` for a new address.
    pub fn init(&mut self, address: u32) {
        let a = address;
        self.a27_23 = ((a >> 23) & 0x1f) as u8;
        self.a22_19 = ((a >> 19) & 0x0f) as u8;
        // A8, A6, A4, A2, A0
        self.c = (((a >> 4) & 0x10) | ((a >> 3) & 0x08) | ((a >> 2) & 0x04) | ((a >> 1) & 0x02)
            | (a & 0x01)) as u8;
        self.a18_10 = ((a >> 10) & 0x1ff) as u16;
        // A13, A11, A9, A7, A5, A3, A1
        self.e = (((a >> 7) & 0x40)
            | ((a >> 6) & 0x20)
            | ((a >> 5) & 0x10)
            | ((a >> 4) & 0x08)
            | ((a >> 3) & 0x04)
            | ((a >> 2) & 0x02)
            | ((a >> 1) & 0x01)) as u8;
        self.x = 0;
        self.afh_enabled = false;
        self.afh_chan_count = 0;
    }

    /// Returns the current phase of the inquiry/page sequence.
    pub fn x(&self) -> u8 {
        self.x
    }

    /// Advances the inquiry/page sequence.
    ///
    /// Called before each master transmission (and before each page scan receive).
    pub fn increment(&mut self) {
        self.x = self.x.wrapping_add(1);
    }

    /// Returns whether adaptive frequency hopping is enabled.
    pub fn afh_enabled(&self) -> bool {
        self.afh_enabled
    }

    /// Returns the number of channels the basic sequence hops over.
    pub fn chan_count(&self) -> u8 {
        if self.afh_enabled {
            self.afh_chan_count
        } else {
            NUM_CHANNELS as u8
        }
    }

    fn bank(&self) -> &[u8] {
        if self.afh_enabled {
            &self.afh_bank[..usize::from(self.afh_chan_count)]
        } else {
            &BASIC_BANK
        }
    }

    fn kernel(&self, k: KernelInputs) -> u16 {
        // Y1 is extended to 5 bits.
        let y1 = if k.y1 { 0x1f } else { 0 };
        let y2 = if k.y1 { 32 } else { 0 };
        let z = (k.a.wrapping_add(k.x) & 0x1f) ^ k.b;
        u16::from(perm5(z, y1 ^ k.c, k.d)) + u16::from(k.e) + k.f + y2
    }

    /// Returns the inquiry/page hopping channel for `clk`.
    pub fn inquiry(&self, clk: Clkn) -> Channel {
        let sel = self.kernel(KernelInputs {
            x: self.x,
            y1: clk.raw() & 0b10 != 0,
            a: self.a27_23,
            b: self.a22_19,
            c: self.c,
            d: self.a18_10,
            e: self.e,
            f: 0,
        });
        Channel(BASIC_BANK[usize::from(sel) % NUM_CHANNELS])
    }

    /// Returns the basic (connection) hopping channel for `clk`.
    ///
    /// With AFH enabled, the sequence only visits the used channels, and master and slave slots of
    /// a frame share a channel.
    pub fn basic(&self, clk: Clkn) -> Channel {
        let clk = clk.raw();
        let n = u32::from(self.chan_count());
        let sel = self.kernel(KernelInputs {
            x: ((clk >> 2) & 0x1f) as u8,
            y1: !self.afh_enabled && clk & 0b10 != 0,
            a: self.a27_23 ^ ((clk >> 21) & 0x1f) as u8,
            b: self.a22_19,
            c: self.c ^ ((clk >> 16) & 0x1f) as u8,
            d: self.a18_10 ^ ((clk >> 7) & 0x1ff) as u16,
            e: self.e,
            // 16 * CLK27_7 mod N
            f: (((clk >> 3) & (0x1f_ffff << 4)) % n) as u16,
        });
        Channel(self.bank()[usize::from(sel) % self.bank().len()])
    }

    /// Applies an AFH configuration.
    ///
    /// `cfg` holds an enable flag in bit 0 of the first byte, followed by the 10-byte
    /// [`ChannelMap`]. An enabling configuration whose map marks no channel as used is rejected
    /// with `Error::EmptyChannelMap`, leaving the current configuration in place.
    ///
    /// [`ChannelMap`]: struct.ChannelMap.html
    pub fn configure_afh(&mut self, cfg: &[u8; 11]) -> Result<(), Error> {
        let mut bytes = ByteReader::new(cfg);
        let enabled = bytes.read_u8()? & 1 != 0;
        let map = ChannelMap::from_raw(bytes.read_array()?);

        if enabled {
            self.set_afh_map(&map)?;
            debug!("(+afh) {:?}", map);
        } else {
            self.afh_enabled = false;
            debug!("(-afh)");
        }
        Ok(())
    }

    /// Enables AFH with the channels marked in `map`.
    pub fn set_afh_map(&mut self, map: &ChannelMap) -> Result<(), Error> {
        if map.num_used_channels() == 0 {
            return fatal!(Error::EmptyChannelMap, "AFH map without channels");
        }

        let mut count = 0;
        for chan in BASIC_BANK.iter() {
            if map.is_used(Channel(*chan)) {
                self.afh_bank[count] = *chan;
                count += 1;
            }
        }
        self.afh_chan_count = count as u8;
        self.afh_enabled = true;
        Ok(())
    }
}
