use super::{Channel, NUM_CHANNELS};
use core::fmt;

/// A map marking BR/EDR channels as used or unused for adaptive frequency hopping.
///
/// An AFH map must mark at least one channel as used to be applied; the Bluetooth specification
/// requires at least 20.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    raw: [u8; 10],
    num_used_channels: u8,
}

impl ChannelMap {
    /// Create a new channel map from the raw format used by `LMP_set_AFH` (`AFH_Channel_Map`).
    ///
    /// The first byte (LSB) contains flags for channels 0 to 7, where the least significant bit is
    /// the flag for channel 0, and so on.
    ///
    /// Since there are only 79 channels, but 80 bits in the 10 Bytes, the most significant bit of
    /// the last Byte is reserved and ignored by this function.
    pub fn from_raw(mut raw: [u8; 10]) -> Self {
        raw[9] &= 0x7f;
        Self {
            raw,
            num_used_channels: raw.iter().map(|b| b.count_ones() as u8).sum(),
        }
    }

    /// Returns the raw bytes encoding this channel map.
    pub fn to_raw(&self) -> [u8; 10] {
        self.raw
    }

    /// Creates a new channel map that marks all channels as used.
    pub fn with_all_channels() -> Self {
        Self::from_raw([0xff; 10])
    }

    /// Returns the number of channels marked as used by this map.
    pub fn num_used_channels(&self) -> u8 {
        self.num_used_channels
    }

    /// Returns whether the given channel is marked as used.
    pub fn is_used(&self, channel: Channel) -> bool {
        let byte = self.raw[usize::from(channel.index()) / 8];
        let mask = 1 << (channel.index() % 8);

        byte & mask != 0
    }

    /// Returns an iterator over all channels marked as used, in ascending order.
    pub fn iter_used<'a>(&'a self) -> impl Iterator<Item = Channel> + 'a {
        (0..NUM_CHANNELS as u8)
            .map(Channel::new)
            .filter(move |ch| self.is_used(*ch))
    }
}

impl fmt::Display for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.raw[..9] {
            write!(f, "{:08b}", b.reverse_bits())?;
        }
        write!(f, "{:07b}", self.raw[9].reverse_bits() >> 1)
    }
}

impl fmt::Debug for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} used)", self, self.num_used_channels)
    }
}
