//! The native Bluetooth clock (CLKN) and the tick timer driving it.
//!
//! CLKN runs at 3.2 kHz: one tick every 312.5 µs, two ticks per 625 µs slot. It is a 28-bit
//! counter that wraps around. Sub-tick timing (sync word detection, transmit deadlines) is
//! measured by the [`Timer`] in units of 100 ns since the start of the current tick.
//!
//! [`Timer`]: trait.Timer.html

use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Number of CLKN ticks per second.
pub const CLKN_RATE: u32 = 3200;

/// Nominal length of one tick, in 100 ns units of the tick timer.
pub const TICK_LENGTH: u32 = 3125;

/// A number of CLKN ticks.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticks(u32);

impl Ticks {
    /// Creates a [`Ticks`] value from a raw tick count.
    pub const fn new(ticks: u32) -> Self {
        Ticks(ticks)
    }

    /// The ticks elapsing in `secs` seconds.
    pub const fn from_secs(secs: u32) -> Self {
        Ticks(secs * CLKN_RATE)
    }

    /// Returns the raw tick count.
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Returns the duration of `self` in whole microseconds.
    pub fn as_micros(&self) -> u64 {
        u64::from(self.0) * 3125 / 10
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.as_micros();
        if micros >= 1_000_000 {
            write!(f, "{}.{:06}s", micros / 1_000_000, micros % 1_000_000)
        } else if micros >= 1000 {
            write!(f, "{}.{:03}ms", micros / 1000, micros % 1000)
        } else {
            write!(f, "{}µs", micros)
        }
    }
}

impl fmt::Debug for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}

/// A value of the 28-bit native clock.
///
/// Arithmetic wraps at 2^28, like the clock itself.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Clkn(u32);

impl Clkn {
    /// Mask of the significant clock bits.
    pub const MASK: u32 = 0x0fff_ffff;

    /// Creates a clock value, discarding bits above bit 27.
    pub const fn new(raw: u32) -> Self {
        Clkn(raw & Self::MASK)
    }

    /// Returns the raw 28-bit clock value.
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Returns the position of this tick inside a 4-tick (2-slot) frame.
    ///
    /// Index 0 starts a master transmit slot, index 2 a slave transmit slot.
    pub fn slot_idx(&self) -> u8 {
        (self.0 & 3) as u8
    }

    /// Returns the ticks elapsed from `earlier` to `self`, assuming no more than one wrap.
    pub fn ticks_since(&self, earlier: Clkn) -> Ticks {
        Ticks(self.0.wrapping_sub(earlier.0) & Self::MASK)
    }

    /// Returns the clock value shifted right by 2 (CLK27-2), as carried in FHS packets.
    pub fn clk27_2(&self) -> u32 {
        self.0 >> 2
    }
}

impl Add<Ticks> for Clkn {
    type Output = Self;

    fn add(self, t: Ticks) -> Self {
        Clkn::new(self.0.wrapping_add(t.0))
    }
}

impl Add<u32> for Clkn {
    type Output = Self;

    fn add(self, t: u32) -> Self {
        self + Ticks(t)
    }
}

impl AddAssign<u32> for Clkn {
    fn add_assign(&mut self, t: u32) {
        *self = *self + t;
    }
}

impl Sub<Clkn> for Clkn {
    type Output = Ticks;

    fn sub(self, rhs: Clkn) -> Ticks {
        self.ticks_since(rhs)
    }
}

impl fmt::Debug for Clkn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clkn:{:#09x}", self.0)
    }
}

impl fmt::Display for Clkn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for the hardware timer generating the CLKN tick.
///
/// The hardware interface has to provide an implementation of `Timer` to the stack. The timer
/// calls into [`Controller::tick`] once per tick and counts the time elapsed within the tick in
/// 100 ns units.
///
/// This trait can also be implemented by a mock timer for testing.
///
/// [`Controller::tick`]: ../ctl/struct.Controller.html#method.tick
pub trait Timer {
    /// Returns the time elapsed since the start of the current tick, in units of 100 ns.
    ///
    /// This is polled in busy-wait loops with a deadline, so it must advance on its own.
    fn offset(&self) -> u32;

    /// Sets the length of the current tick to `units` (100 ns each).
    ///
    /// The nominal length is [`TICK_LENGTH`]; the baseband temporarily stretches or shrinks a
    /// tick to move its timebase onto a remote device's clock.
    ///
    /// [`TICK_LENGTH`]: constant.TICK_LENGTH.html
    fn set_tick_length(&mut self, units: u32);
}
