//! Bit-level codecs of the BR baseband.
//!
//! Everything here operates on air-order buffers (see [`bits`]) and is free of state except for
//! the explicit accumulators passed in by the caller:
//!
//! * the 16-bit payload CRC and 8-bit header error check (HEC), both keyed by the UAP,
//! * FEC 1/3 (bit repetition) used for the packet header,
//! * FEC 2/3, a (15,10) shortened Hamming code used for DM and FHS payloads,
//! * data whitening with the 7-bit LFSR `D^7 + D^4 + 1`.
//!
//! [`bits`]: ../bits/index.html

use crate::bits::{self, extract, get_bit, insert, reverse8, set_bit};

/// Reflected CRC-CCITT polynomial (`D^16 + D^12 + D^5 + 1`).
const CRC_POLY: u16 = 0x8408;

/// Reflected HEC polynomial (`D^8 + D^7 + D^5 + D^2 + D + 1`).
const HEC_POLY: u8 = 0xe5;

const fn crc_table() -> [u16; 256] {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut b = 0;
        while b < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC_POLY
            } else {
                crc >> 1
            };
            b += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// The HEC register after clocking in 5 zero bits, indexed by the low 5 register bits.
const fn hec_table() -> [u8; 32] {
    let mut table = [0; 32];
    let mut i = 0;
    while i < 32 {
        let mut hec = i as u8;
        let mut b = 0;
        while b < 5 {
            let fb = hec & 1;
            hec >>= 1;
            if fb != 0 {
                hec ^= HEC_POLY;
            }
            b += 1;
        }
        table[i] = hec;
        i += 1;
    }
    table
}

static CRC_TBL: [u16; 256] = crc_table();
static HEC_TBL: [u8; 32] = hec_table();

/// Returns the initial CRC register for a device with the given UAP.
pub fn crc_init(uap: u8) -> u16 {
    u16::from(reverse8(uap)) << 8
}

/// Runs `data` through the payload CRC, starting from `crc`.
///
/// The result can be passed back in as `crc` to continue over the next chunk. Start from
/// [`crc_init`]; the final value is transmitted in Little Endian order.
///
/// [`crc_init`]: fn.crc_init.html
pub fn crc_compute(data: &[u8], crc: u16) -> u16 {
    data.iter().fold(crc, |crc, byte| {
        (crc >> 8) ^ CRC_TBL[usize::from((u16::from(*byte) ^ crc) as u8)]
    })
}

/// Computes the HEC of the 10 header bits in `data` for the given UAP.
pub fn hec_compute(data: u16, uap: u8) -> u8 {
    let mut hec = reverse8(uap);
    hec = (hec >> 5) ^ HEC_TBL[usize::from((data as u8 ^ hec) & 0x1f)];
    hec = (hec >> 5) ^ HEC_TBL[usize::from(((data >> 5) as u8 ^ hec) & 0x1f)];
    hec
}

/// Bit-serial HEC, one LFSR step per header bit.
pub fn hec_compute_slow(mut data: u16, uap: u8) -> u8 {
    let mut hec = reverse8(uap);
    for _ in 0..10 {
        let fb = (data as u8 ^ hec) & 1;
        data >>= 1;
        hec >>= 1;
        if fb != 0 {
            hec ^= HEC_POLY;
        }
    }
    hec
}

/// Repeats each of the first `nbits` bits of `input` three times, writing them to `out` starting
/// at bit `out_off`.
pub fn fec13(out: &mut [u8], input: &[u8], out_off: usize, nbits: usize) {
    for i in 0..nbits {
        let b = get_bit(input, i);
        let pos = out_off + 3 * i;
        set_bit(out, pos, b);
        set_bit(out, pos + 1, b);
        set_bit(out, pos + 2, b);
    }
}

/// Majority-decodes `nbits` bits from the FEC 1/3 stream starting at bit `in_off` of `input`.
///
/// Returns the number of bit triplets that were not unanimous.
pub fn unfec13(out: &mut [u8], input: &[u8], in_off: usize, nbits: usize) -> u32 {
    let mut errors = 0;
    for i in 0..nbits {
        let v = extract(input, in_off + 3 * i, 3);
        let ones = v.count_ones();
        if ones != 0 && ones != 3 {
            errors += 1;
        }
        set_bit(out, i, (ones >= 2) as u8);
    }
    errors
}

/// Decoding of two FEC 1/3 triplets: 2 data bits, and the number of disagreeing triplets in bits
/// 14 and up.
const fn unfec13_table() -> [u16; 64] {
    let mut table = [0; 64];
    let mut i = 0usize;
    while i < 64 {
        let mut val = 0u16;
        let mut errs = 0u16;
        let mut t = 0;
        while t < 2 {
            let ones = ((i >> (3 * t)) & 7).count_ones();
            if ones >= 2 {
                val |= 1 << t;
            }
            if ones != 0 && ones != 3 {
                errs += 1;
            }
            t += 1;
        }
        table[i] = val | (errs << 14);
        i += 1;
    }
    table
}

static UNFEC13_TBL: [u16; 64] = unfec13_table();

/// Offset of the packet header in the buffer following the sync word (after the 4 trailer bits).
pub const HEADER_OFFSET: usize = 4;

/// Decodes the 18-bit packet header from the 54 bits following the trailer in `pkt`.
///
/// This is the table-driven equivalent of `unfec13(out, pkt, 4, 18)`: each of the 9 lookups
/// consumes 6 coded bits. Returns the number of disagreeing triplets.
pub fn unfec13_hdr(out: &mut [u8; 3], pkt: &[u8]) -> u32 {
    let mut hdr = 0u32;
    let mut errors = 0u32;
    for k in 0..9 {
        let v = u32::from(UNFEC13_TBL[extract(pkt, HEADER_OFFSET + 6 * k, 6) as usize]);
        hdr |= (v & 3) << (2 * k);
        errors += v >> 14;
    }
    out[0] = hdr as u8;
    out[1] = (hdr >> 8) as u8;
    out[2] = (hdr >> 16) as u8;
    errors
}

/// Parity bits of the (15,10) code for each single data bit.
///
/// The generator polynomial `(D + 1)(D^4 + D + 1)` is applied in air bit order, so the rows are
/// obtained by running the reflected polynomial through a 5-bit shift register.
const fn fec23_parity_rows() -> [u16; 10] {
    let mut rows = [0; 10];
    let mut p: u16 = 0b01011;
    let mut i = 0;
    while i < 10 {
        rows[i] = p;
        p <<= 1;
        if p & 0x20 != 0 {
            p ^= 0x20 | 0b01011;
        }
        i += 1;
    }
    rows
}

const FEC23_ROWS: [u16; 10] = fec23_parity_rows();

/// Generator matrix of the (15,10) code: data bit `i` maps to codeword `GEN[i]`.
pub const FEC23_GEN: [u16; 10] = {
    let mut gen = [0; 10];
    let mut i = 0;
    while i < 10 {
        gen[i] = (1 << i) | (FEC23_ROWS[i] << 10);
        i += 1;
    }
    gen
};

const fn fec23_parity(data: u16) -> u16 {
    let mut parity = 0;
    let mut i = 0;
    while i < 10 {
        if data & (1 << i) != 0 {
            parity ^= FEC23_ROWS[i];
        }
        i += 1;
    }
    parity
}

/// Maps a syndrome to the data bit it corrects, `0` for syndromes pointing at a parity bit or
/// none at all, and `0xffff` for uncorrectable syndromes.
const fn fec23_syndrome_table() -> [u16; 32] {
    let mut table = [0xffff; 32];
    table[0] = 0;
    let mut j = 0;
    while j < 5 {
        table[1 << j] = 0;
        j += 1;
    }
    let mut i = 0;
    while i < 10 {
        table[FEC23_ROWS[i] as usize] = 1 << i;
        i += 1;
    }
    table
}

static FEC23_SYNDROME: [u16; 32] = fec23_syndrome_table();

/// Number of air bits needed to FEC 2/3 encode `nbits` data bits.
///
/// Data is padded with zeros to a multiple of 10 bits.
pub const fn fec23_bits(nbits: usize) -> usize {
    (nbits + 9) / 10 * 15
}

/// FEC 2/3 encodes the first `nbits` bits of `input`, writing the codewords to `out` starting at
/// bit `out_off`. Returns the number of bits written.
pub fn fec23(out: &mut [u8], input: &[u8], out_off: usize, nbits: usize) -> usize {
    let mut in_pos = 0;
    let mut out_pos = out_off;
    while in_pos < nbits {
        let width = (nbits - in_pos).min(10) as u32;
        let data = extract(input, in_pos, width) as u16;
        let parity = fec23_parity(data);
        insert(out, out_pos, 10, u32::from(data));
        insert(out, out_pos + 10, 5, u32::from(parity));
        in_pos += 10;
        out_pos += 15;
    }
    out_pos - out_off
}

/// Decodes `nbits` data bits from the FEC 2/3 stream starting at bit `in_off` of `input`.
///
/// Single bit errors are corrected. Returns the number of codewords that contained errors.
pub fn unfec23(out: &mut [u8], input: &[u8], in_off: usize, nbits: usize) -> u32 {
    let mut errors = 0;
    let mut out_pos = 0;
    let mut in_pos = in_off;
    while out_pos < nbits {
        let mut data = extract(input, in_pos, 10) as u16;
        let parity = extract(input, in_pos + 10, 5) as u16;
        let syndrome = fec23_parity(data) ^ parity;
        if syndrome != 0 {
            errors += 1;
            let fix = FEC23_SYNDROME[usize::from(syndrome)];
            if fix != 0xffff {
                data ^= fix;
            }
        }
        let width = (nbits - out_pos).min(10) as u32;
        insert(out, out_pos, width, u32::from(data));
        out_pos += 10;
        in_pos += 15;
    }
    errors
}

/// Decodes one 10-byte receive chunk (8 codewords).
pub fn unfec23_10bytes(out: &mut [u8; 10], input: &[u8], in_off: usize) -> u32 {
    unfec23(out, input, in_off, 80)
}

/// Copies `byte_count` bytes from `input` into `out` starting at bit `out_off`.
pub fn null_encode(out: &mut [u8], input: &[u8], out_off: usize, byte_count: usize) {
    for (i, byte) in input[..byte_count].iter().enumerate() {
        insert(out, out_off + 8 * i, 8, u32::from(*byte));
    }
}

/// Copies `byte_count` bytes starting at bit `in_off` of `input` into `out`.
pub fn null_decode(out: &mut [u8], input: &[u8], in_off: usize, byte_count: usize) {
    for (i, byte) in out[..byte_count].iter_mut().enumerate() {
        *byte = extract(input, in_off + 8 * i, 8) as u8;
    }
}

/// Whitens (or dewhitens) the first `nbits` bits of `buf` in place.
///
/// `state` is the 7-bit whitening LFSR. Bit `i` holds register position `i`; it is seeded with
/// the clock (or the inquiry/page X input) and advanced by one step per bit, so a packet can be
/// processed in several calls.
pub fn whiten(buf: &mut [u8], nbits: usize, state: &mut u8) {
    let mut s = *state & 0x7f;
    for (i, byte) in buf[..bits::byte_align(nbits)].iter_mut().enumerate() {
        let count = (nbits - 8 * i).min(8);
        let mut mask = 0u8;
        for b in 0..count {
            let out = (s >> 6) & 1;
            s = ((s << 1) & 0x7f) | out;
            if out != 0 {
                s ^= 0x10;
            }
            mask |= out << b;
        }
        *byte ^= mask;
    }
    *state = s;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_sample_data() {
        // Sample payload: UAP 0x47, data 4e 01 02 .. 09, transmitted CRC 6d d2.
        let data = [0x4e, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09];
        assert_eq!(crc_compute(&data, crc_init(0x47)), 0xd26d);
    }

    #[test]
    fn crc_chains_over_chunks() {
        let data: Vec<u8> = (0..100u8).collect();
        let whole = crc_compute(&data, crc_init(0x6b));
        let split = crc_compute(&data[37..], crc_compute(&data[..37], crc_init(0x6b)));
        assert_eq!(whole, split);
    }

    #[test]
    fn hec_known_values() {
        // Cross-checked against a bit-serial LFSR in natural bit order.
        assert_eq!(hec_compute(0x123, 0x47), 0x06);
        assert_eq!(hec_compute(0x3ff, 0x00), 0x27);
        assert_eq!(hec_compute(0x021, 0x6b), 0x83);
        assert_eq!(hec_compute(0x1a3, 0xe4), 0x52);
    }

    #[test]
    fn hec_table_matches_slow() {
        for uap in [0x00, 0x47, 0x6b, 0xff, 0xa5].iter() {
            for data in 0..0x400 {
                assert_eq!(hec_compute(data, *uap), hec_compute_slow(data, *uap));
            }
        }
    }

    #[test]
    fn fec13_recovers_single_errors() {
        let input = [0b1011_0110, 0b0101_1100, 0b11];
        let mut coded = [0; 8];
        fec13(&mut coded, &input, 4, 18);

        let mut out = [0; 3];
        assert_eq!(unfec13(&mut out, &coded, 4, 18), 0);
        assert_eq!(out, input);

        // Flip one bit in 5 different triplets.
        for t in [0usize, 3, 7, 12, 17].iter() {
            let pos = 4 + 3 * t + (t % 3);
            coded[pos >> 3] ^= 1 << (pos & 7);
        }
        let mut out = [0; 3];
        assert_eq!(unfec13(&mut out, &coded, 4, 18), 5);
        assert_eq!(out, input);
    }

    #[test]
    fn unfec13_hdr_matches_generic() {
        let mut coded = [0u8; 8];
        for seed in 0..200u32 {
            for (i, b) in coded.iter_mut().enumerate() {
                *b = (seed.wrapping_mul(2654435761).rotate_left(i as u32 * 5) >> 7) as u8;
            }
            let mut fast = [0; 3];
            let mut slow = [0; 3];
            let fast_err = unfec13_hdr(&mut fast, &coded);
            let slow_err = unfec13(&mut slow, &coded, 4, 18);
            slow[2] &= 0x3;
            assert_eq!(fast, slow);
            assert_eq!(fast_err, slow_err);
        }
    }

    #[test]
    fn fec23_generator() {
        assert_eq!(
            FEC23_GEN,
            [0x2c01, 0x5802, 0x1c04, 0x3808, 0x7010, 0x4c20, 0x3440, 0x6880, 0x7d00, 0x5600]
        );
    }

    #[test]
    fn fec23_corrects_any_single_error() {
        let input = [0x5a, 0xc3, 0x01, 0xfe, 0x77, 0x10, 0x00, 0xff, 0x81, 0x3c];
        let mut coded = [0; 16];
        assert_eq!(fec23(&mut coded, &input, 2, 80), 120);

        let mut out = [0; 10];
        assert_eq!(unfec23_10bytes(&mut out, &coded, 2), 0);
        assert_eq!(out, input);

        for pos in 0..15 {
            let mut damaged = coded;
            let bit = 2 + 15 * 3 + pos;
            damaged[bit >> 3] ^= 1 << (bit & 7);
            let mut out = [0; 10];
            assert_eq!(unfec23_10bytes(&mut out, &damaged, 2), 1);
            assert_eq!(out, input, "error at codeword bit {}", pos);
        }
    }

    #[test]
    fn fec23_pads_last_codeword() {
        let input = [0xab, 0xcd, 0xef];
        let mut coded = [0; 6];
        assert_eq!(fec23(&mut coded, &input, 0, 24), fec23_bits(24));
        assert_eq!(fec23_bits(24), 45);
        let mut out = [0; 3];
        assert_eq!(unfec23(&mut out, &coded, 0, 24), 0);
        assert_eq!(out, input);
    }

    #[test]
    fn null_coding_at_bit_offset() {
        let input = [0x12, 0x34, 0x56];
        let mut air = [0; 4];
        null_encode(&mut air, &input, 2, 3);
        assert_eq!(air, [0x48, 0xd0, 0x58, 0x01]);
        let mut out = [0; 3];
        null_decode(&mut out, &air, 2, 3);
        assert_eq!(out, input);
    }

    #[test]
    fn whitening_is_self_inverse() {
        let data: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(37)).collect();
        for seed in 0x40..0x80u8 {
            for nbits in [1usize, 7, 18, 80, 511].iter() {
                let mut buf = data.clone();
                let mut state = seed;
                whiten(&mut buf, *nbits, &mut state);
                let mut state = seed;
                whiten(&mut buf, *nbits, &mut state);
                assert_eq!(buf, data);
            }
        }
    }

    #[test]
    fn whitening_leaves_trailing_bits() {
        let mut buf = [0u8; 3];
        let mut state = 0x7f;
        whiten(&mut buf, 18, &mut state);
        assert_eq!(buf[2] & !0x3, 0);
    }

    #[test]
    fn whitening_split_matches_whole() {
        let mut whole = [0u8; 20];
        let mut state = 0x55;
        whiten(&mut whole, 160, &mut state);

        let mut split = [0u8; 20];
        let mut state = 0x55;
        whiten(&mut split[..10], 80, &mut state);
        whiten(&mut split[10..], 80, &mut state);
        assert_eq!(whole, split);
    }

    #[test]
    fn whitening_sequence_has_period_127() {
        let start = 0x7f;
        let mut state = start;
        let mut buf = [0u8; 1];
        for step in 1..=127 {
            whiten(&mut buf, 1, &mut state);
            if step < 127 {
                assert_ne!(state, start);
            }
        }
        assert_eq!(state, start);
    }
}
