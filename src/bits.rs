//! Bit-level helpers for air-order buffers.
//!
//! Bluetooth transmits every field LSB first. Buffers in this crate store the first bit on air in
//! bit 0 of byte 0, the ninth bit in bit 0 of byte 1, and so on. Bit offsets used by the codecs
//! index into this bit stream.
//!
//! The radio shifts bytes in and out MSB first, so data crossing the radio FIFO has to be bit
//! reversed with [`reverse8`].
//!
//! [`reverse8`]: fn.reverse8.html

const fn rev8_table() -> [u8; 256] {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        let mut v = i as u8;
        let mut r = 0u8;
        let mut b = 0;
        while b < 8 {
            r = (r << 1) | (v & 1);
            v >>= 1;
            b += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

static REV8: [u8; 256] = rev8_table();

/// Reverses the bit order of a byte.
#[inline]
pub fn reverse8(data: u8) -> u8 {
    REV8[usize::from(data)]
}

/// Reverses the bit order of a 16-bit value.
#[inline]
pub fn reverse16(data: u16) -> u16 {
    u16::from(reverse8((data >> 8) as u8)) | (u16::from(reverse8(data as u8)) << 8)
}

/// Reverses the bit order of a 32-bit value.
#[inline]
pub fn reverse32(data: u32) -> u32 {
    u32::from(reverse16((data >> 16) as u16)) | (u32::from(reverse16(data as u16)) << 16)
}

/// Returns the number of bytes needed to hold `nbits` bits.
#[inline]
pub const fn byte_align(nbits: usize) -> usize {
    (nbits + 7) >> 3
}

/// Reads bit `idx` of the bit stream in `buf`.
#[inline]
pub fn get_bit(buf: &[u8], idx: usize) -> u8 {
    (buf[idx >> 3] >> (idx & 7)) & 1
}

/// Sets bit `idx` of the bit stream in `buf` to the lowest bit of `val`.
#[inline]
pub fn set_bit(buf: &mut [u8], idx: usize, val: u8) {
    let bi = idx & 7;
    buf[idx >> 3] = (buf[idx >> 3] & !(1 << bi)) | ((val & 1) << bi);
}

/// Extracts a field of `width` bits (at most 25) starting at `bit_off`.
///
/// The first bit of the field ends up in bit 0 of the result. Bytes past the end of `buf` read as
/// zero, so a field may end exactly at the end of the buffer.
///
/// # Panics
///
/// Panics if `width` is larger than 25 or if the field starts past the end of `buf`.
#[inline]
pub fn extract(buf: &[u8], bit_off: usize, width: u32) -> u32 {
    assert!(width <= 25);
    let start = bit_off >> 3;
    let shift = bit_off & 7;
    let mut word = 0u32;
    for (i, byte) in buf[start..].iter().take(4).enumerate() {
        word |= u32::from(*byte) << (8 * i);
    }
    (word >> shift) & ((1 << width) - 1)
}

/// Writes the low `width` bits (at most 25) of `val` into `buf` starting at `bit_off`.
///
/// Bits of `buf` outside the field are preserved.
///
/// # Panics
///
/// Panics if `width` is larger than 25 or the field does not fit into `buf`.
#[inline]
pub fn insert(buf: &mut [u8], bit_off: usize, width: u32, val: u32) {
    assert!(width <= 25);
    let start = bit_off >> 3;
    let shift = bit_off & 7;
    let mask = ((1u32 << width) - 1) << shift;
    let val = (val << shift) & mask;
    let nbytes = byte_align(shift + width as usize);
    for (i, byte) in buf[start..start + nbytes].iter_mut().enumerate() {
        let m = (mask >> (8 * i)) as u8;
        *byte = (*byte & !m) | (val >> (8 * i)) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_matches_naive() {
        for i in 0..=255u8 {
            let mut naive = 0;
            for b in 0..8 {
                naive |= ((i >> b) & 1) << (7 - b);
            }
            assert_eq!(reverse8(i), naive);
        }
        assert_eq!(reverse16(0x0001), 0x8000);
        assert_eq!(reverse16(0x1234), 0x2c48);
        assert_eq!(reverse32(0x0000_0001), 0x8000_0000);
        assert_eq!(reverse32(0x1234_5678), 0x1e6a_2c48);
    }

    #[test]
    fn extract_fields() {
        let buf = [0b1011_0000, 0b0000_0011, 0xff];
        // bits 4..10
        assert_eq!(extract(&buf, 4, 6), 0b11_1011);
        assert_eq!(extract(&buf, 0, 4), 0);
        assert_eq!(extract(&buf, 10, 14), 0x3fc0);
        // field ending at the last byte
        assert_eq!(extract(&buf, 16, 8), 0xff);
    }

    #[test]
    fn insert_preserves_neighbours() {
        let mut buf = [0xff; 4];
        insert(&mut buf, 5, 15, 0);
        assert_eq!(buf, [0x1f, 0x00, 0xf0, 0xff]);
        insert(&mut buf, 5, 15, 0x7fff);
        assert_eq!(buf, [0xff; 4]);

        let mut buf = [0; 3];
        insert(&mut buf, 7, 10, 0x2a5);
        assert_eq!(extract(&buf, 7, 10), 0x2a5);
        assert_eq!(get_bit(&buf, 7), 1);
        set_bit(&mut buf, 7, 0);
        assert_eq!(extract(&buf, 7, 10), 0x2a4);
    }
}
