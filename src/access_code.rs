//! Access codes and sync words.
//!
//! Every BR/EDR packet starts with a 72-bit access code: a 4-bit preamble, the 64-bit sync word
//! derived from a LAP, and a 4-bit trailer. The radio correlates against the sync word, so only
//! the sync word and the trailer are ever computed here.
//!
//! The sync word is a BCH(64,30) codeword of the LAP and 6 appended Barker bits, XORed with a
//! fixed PN sequence. Since the code is linear, the codeword is the XOR of one precomputed row
//! per set LAP bit, on top of the codeword for LAP 0.

/// LAP of the General Inquiry Access Code.
pub const GIAC: u32 = 0x9e8b33;

/// Sync word of LAP 0 (PN overlay included).
const SW_BASE: u64 = 0xb000_0002_c782_0e7e;

/// Contribution of each LAP bit, starting with bit 23.
static SW_MATRIX: [u64; 24] = [
    0xfe00_0002_a0d1_c014,
    0x0100_0003_f0b9_201f,
    0x0080_0003_3ae4_0edb,
    0x0040_0003_5fca_99b9,
    0x0020_0003_6d5d_d208,
    0x0010_0001_b6ae_e904,
    0x0008_0000_db57_7482,
    0x0004_0000_6dab_ba41,
    0x0002_0002_f46d_43f4,
    0x0001_0001_7a36_a1fa,
    0x0000_8000_bd1b_50fd,
    0x0000_4002_9c35_36aa,
    0x0000_2001_4e1a_9b55,
    0x0000_1002_65b5_d37e,
    0x0000_0801_32da_e9bf,
    0x0000_0402_5bd5_ea0b,
    0x0000_0203_ef52_6bd1,
    0x0000_0103_3511_ab3c,
    0x0000_0081_9a88_d59e,
    0x0000_0040_cd44_6acf,
    0x0000_0022_a41a_abb3,
    0x0000_0013_90b5_cb0d,
    0x0000_000b_0ae2_7b52,
    0x0000_0005_8571_3da9,
];

/// Computes the 64-bit sync word for `lap`.
///
/// The result is in air order: bit 0 is transmitted first. Bits 0 to 33 hold the parity bits,
/// bits 34 to 57 the LAP and bits 58 to 63 the Barker sequence. Only the low 24 bits of `lap` are
/// used.
pub fn sync_word(lap: u32) -> u64 {
    SW_MATRIX
        .iter()
        .enumerate()
        .filter(|(i, _)| lap & (0x80_0000 >> i) != 0)
        .fold(SW_BASE, |sw, (_, row)| sw ^ row)
}

/// Returns the 4-bit trailer following sync word `sw`.
///
/// The trailer continues the alternating pattern of the last sync word bit on air (bit 63).
pub fn trailer(sw: u64) -> u8 {
    if sw & (1 << 63) != 0 {
        0x0a
    } else {
        0x05
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn giac_sync_word() {
        let sw = sync_word(GIAC);
        assert_eq!(sw, 0x4e7a_2cce_331a_3ae2);
        // Same word, first bit on air in the MSB.
        assert_eq!(sw.reverse_bits(), 0x475c_58cc_7334_5e72);
        assert_eq!(trailer(sw), 0x05);
    }

    #[test]
    fn other_laps() {
        assert_eq!(sync_word(0), SW_BASE);
        assert_eq!(sync_word(0xb2c866), 0x4ecb_2198_2ca5_9a2c);
        // Bits above the LAP are ignored.
        assert_eq!(sync_word(0xff9e_8b33), sync_word(GIAC));
    }

    #[test]
    fn lap_in_sync_word() {
        let sw = sync_word(GIAC);
        assert_eq!((sw >> 34) & 0xff_ffff, u64::from(GIAC));
        // Barker sequence for a LAP with bit 23 set.
        assert_eq!(sw >> 58, 0b01_0011);
    }

    #[test]
    fn sync_word_is_linear() {
        let a = 0x12_3456;
        let b = 0x65_4321;
        assert_eq!(
            sync_word(a) ^ sync_word(b) ^ SW_BASE,
            sync_word(a ^ b)
        );
    }

    #[test]
    fn trailer_follows_msb() {
        assert_eq!(trailer(1 << 63), 0x0a);
        assert_eq!(trailer(!(1 << 63)), 0x05);
    }
}
