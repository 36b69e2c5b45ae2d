//! FHS (frequency hop synchronization) payloads.
//!
//! An FHS payload carries everything needed to join a piconet: the sender's address and clock,
//! its class of device and the logical transport address assigned to the receiver. The 144
//! information bits are laid out as follows (LSB first):
//!
//! ```notrust
//! | 34     | 24  | 1   | 1   | 2  | 2  | 8   | 16  | 24    | 3       | 26      | 3      |
//! | Parity | LAP | EIR | Res | SR | SP | UAP | NAP | Class | LT_ADDR | CLK27-2 | PSMode |
//! ```
//!
//! The static fields are written once with [`prepare_payload`]; the clock is filled in by
//! [`finalize_payload`] right before the packet is encoded.
//!
//! [`prepare_payload`]: fn.prepare_payload.html
//! [`finalize_payload`]: fn.finalize_payload.html

use crate::bdaddr::BdAddr;
use crate::bytes::ByteReader;
use crate::Error;
use byteorder::{ByteOrder, LittleEndian};

/// Size of the FHS information bits in bytes.
pub const FHS_SIZE: usize = 18;

/// Size of an FHS payload buffer, CRC included.
pub const FHS_BUF_SIZE: usize = FHS_SIZE + 2;

/// Static contents of an FHS payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FhsFields {
    /// The 34 parity bits of the sender's sync word.
    pub parity: u64,
    pub bdaddr: BdAddr,
    /// Class of device (24 bits).
    pub class: u32,
    pub lt_addr: u8,
    /// Whether an extended inquiry response packet follows.
    pub eir: bool,
}

/// Information decoded from a received FHS payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FhsInfo {
    pub parity: u64,
    pub bdaddr: BdAddr,
    pub class: u32,
    pub lt_addr: u8,
    pub eir: bool,
    /// Bits 27 to 2 of the sender's native clock when the packet was transmitted.
    pub clk27_2: u32,
}

/// Writes the static fields into `data`.
///
/// The page scan repetition mode is set to R1 and the reserved `SP` field to 2.
pub fn prepare_payload(data: &mut [u8; FHS_BUF_SIZE], fields: &FhsFields) {
    let lap = fields.bdaddr.lap();
    LittleEndian::write_u32(&mut data[0..4], fields.parity as u32);
    data[4] = ((fields.parity >> 32) & 0x3) as u8 | ((lap << 2) & 0xfc) as u8;
    data[5] = (lap >> 6) as u8;
    data[6] = (lap >> 14) as u8;
    data[7] = ((lap >> 22) & 0x3) as u8
        | u8::from(fields.eir) << 2
        // SR = 1
        | 1 << 4
        // SP = 2
        | 2 << 6;
    data[8] = fields.bdaddr.uap();
    LittleEndian::write_u16(&mut data[9..11], fields.bdaddr.nap());
    LittleEndian::write_u24(&mut data[11..14], fields.class & 0xff_ffff);
    data[14] = fields.lt_addr & 7;
}

/// Writes CLK27-2 into a prepared payload. The page scan mode is left at 0.
pub fn finalize_payload(data: &mut [u8; FHS_BUF_SIZE], clk27_2: u32) {
    data[14] = (data[14] & 7) | ((clk27_2 << 3) & 0xf8) as u8;
    data[15] = (clk27_2 >> 5) as u8;
    data[16] = (clk27_2 >> 13) as u8;
    data[17] = ((clk27_2 >> 21) & 0x1f) as u8;
}

/// Decodes the information bits of an FHS payload.
pub fn decode(data: &[u8]) -> Result<FhsInfo, Error> {
    let mut bytes = ByteReader::new(data);
    let raw: [u8; FHS_SIZE] = bytes.read_array()?;

    let parity = u64::from(LittleEndian::read_u32(&raw[0..4])) | u64::from(raw[4] & 3) << 32;
    let lap = u32::from(raw[4]) >> 2
        | u32::from(raw[5]) << 6
        | u32::from(raw[6]) << 14
        | u32::from(raw[7] & 3) << 22;
    let uap = raw[8];
    let nap = LittleEndian::read_u16(&raw[9..11]);
    let clk27_2 = u32::from(raw[14]) >> 3
        | u32::from(raw[15]) << 5
        | u32::from(raw[16]) << 13
        | u32::from(raw[17] & 0x1f) << 21;

    Ok(FhsInfo {
        parity,
        bdaddr: BdAddr::from_parts(lap, uap, nap),
        class: LittleEndian::read_u24(&raw[11..14]),
        lt_addr: raw[14] & 7,
        eir: raw[7] & 4 != 0,
        clk27_2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_code::sync_word;

    #[test]
    fn round_trip() {
        let bdaddr = BdAddr::new(0x1122_3344_5566);
        let fields = FhsFields {
            parity: sync_word(bdaddr.lap()) & 0x3_ffff_ffff,
            bdaddr,
            class: 0x5a020c,
            lt_addr: 5,
            eir: true,
        };
        let mut data = [0; FHS_BUF_SIZE];
        prepare_payload(&mut data, &fields);
        finalize_payload(&mut data, 0x3ab_cdef);

        let info = decode(&data).unwrap();
        assert_eq!(info.bdaddr, bdaddr);
        assert_eq!(info.parity, fields.parity);
        assert_eq!(info.class, 0x5a020c);
        assert_eq!(info.lt_addr, 5);
        assert!(info.eir);
        assert_eq!(info.clk27_2, 0x3ab_cdef);
        assert_eq!(data[7] >> 4, 0b1001);
    }

    #[test]
    fn clock_refresh_keeps_lt_addr() {
        let fields = FhsFields {
            parity: 0,
            bdaddr: BdAddr::new(0xffff_ffff_ffff),
            class: 0,
            lt_addr: 7,
            eir: false,
        };
        let mut data = [0; FHS_BUF_SIZE];
        prepare_payload(&mut data, &fields);
        finalize_payload(&mut data, 0x3ff_ffff);
        finalize_payload(&mut data, 1);
        let info = decode(&data).unwrap();
        assert_eq!(info.clk27_2, 1);
        assert_eq!(info.lt_addr, 7);
        assert_eq!(info.bdaddr.raw(), 0xffff_ffff_ffff);
        assert!(!info.eir);
    }

    #[test]
    fn short_buffer() {
        assert_eq!(decode(&[0; 17]), Err(Error::Eof));
    }
}
