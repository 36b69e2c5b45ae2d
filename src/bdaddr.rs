use core::fmt;

/// A 48-bit BR/EDR device address.
///
/// The address is split into the 24-bit Lower Address Part (LAP), the 8-bit Upper Address Part
/// (UAP) and the 16-bit Non-significant Address Part (NAP). The LAP selects the sync word, the
/// UAP seeds the HEC and CRC, and LAP and UAP together select the hop sequence.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct BdAddr(u64);

impl BdAddr {
    /// Creates an address from its raw 48-bit value (`NAP << 32 | UAP << 24 | LAP`).
    ///
    /// Bits above bit 47 are discarded.
    pub const fn new(raw: u64) -> Self {
        BdAddr(raw & 0xffff_ffff_ffff)
    }

    /// Assembles an address from its parts.
    pub fn from_parts(lap: u32, uap: u8, nap: u16) -> Self {
        BdAddr(u64::from(lap & 0xff_ffff) | u64::from(uap) << 24 | u64::from(nap) << 32)
    }

    /// Returns the raw 48-bit address.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Lower Address Part.
    pub fn lap(&self) -> u32 {
        (self.0 & 0xff_ffff) as u32
    }

    /// Upper Address Part.
    pub fn uap(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Non-significant Address Part.
    pub fn nap(&self) -> u16 {
        (self.0 >> 32) as u16
    }

    /// Returns the 28 address bits feeding the hop selection kernel (`UAP << 24 | LAP`).
    pub fn hop_address(&self) -> u32 {
        (self.0 & 0xffff_ffff) as u32
    }
}

impl fmt::Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..6).rev() {
            write!(f, "{:02x}", (self.0 >> (8 * i)) as u8)?;
            if i != 0 {
                f.write_str(":")?;
            }
        }
        Ok(())
    }
}
