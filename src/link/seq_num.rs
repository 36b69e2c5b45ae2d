use crate::packet::HdrFlags;
use core::{
    fmt::{self, Write},
    ops::{Add, AddAssign},
};

/// A 1-bit ARQ sequence number (the `SEQN` header bit).
///
/// Adding wraps around, so toggling a sequence number is `seqn += SeqNum::ONE`.
#[derive(PartialEq, Eq, Copy, Clone, Default)]
pub struct SeqNum(bool);

impl SeqNum {
    pub const ZERO: Self = SeqNum(false);
    pub const ONE: Self = SeqNum(true);

    /// Extracts the `SEQN` bit of a packet header.
    pub fn of(flags: HdrFlags) -> Self {
        SeqNum(flags.contains(HdrFlags::SEQN))
    }

    /// Returns the header flag carrying this sequence number.
    pub fn to_flag(self) -> HdrFlags {
        if self.0 {
            HdrFlags::SEQN
        } else {
            HdrFlags::empty()
        }
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char(if self.0 { '1' } else { '0' })
    }
}

impl fmt::Debug for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

impl Add for SeqNum {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)] // 1-bit addition is XOR
    fn add(self, rhs: Self) -> Self {
        SeqNum(self.0 ^ rhs.0)
    }
}

impl AddAssign for SeqNum {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
