//! Incremental packet encoder and decoder.
//!
//! A [`Codec`] is created per packet. On transmit, [`encode_header`] writes the trailer and the
//! coded header, and [`encode_chunk`] is then called repeatedly (usually from the radio FIFO
//! interrupt) to append up to [`TX_CHUNK`] payload bytes at a time. On receive, [`decode_header`]
//! is fed the bytes following the sync word, and [`decode_chunk`] decodes [`RX_CHUNK`] payload
//! bytes whenever enough air bits have arrived. [`decode_finalize`] checks the CRC.
//!
//! Air buffers start with the 4 trailer bits; the header follows at bit 4 and the payload at bit
//! 58.
//!
//! [`Codec`]: struct.Codec.html
//! [`encode_header`]: struct.Codec.html#method.encode_header
//! [`encode_chunk`]: struct.Codec.html#method.encode_chunk
//! [`decode_header`]: struct.Codec.html#method.decode_header
//! [`decode_chunk`]: struct.Codec.html#method.decode_chunk
//! [`decode_finalize`]: struct.Codec.html#method.decode_finalize
//! [`TX_CHUNK`]: constant.TX_CHUNK.html
//! [`RX_CHUNK`]: constant.RX_CHUNK.html

use super::{BbHdr, Layout, PacketType, PktFlags, HEADER_AIR_BITS};
use crate::bits::byte_align;
use crate::coding::{self, HEADER_OFFSET};
use crate::Error;
use byteorder::{ByteOrder, LittleEndian};

/// Payload bytes decoded per `decode_chunk` call.
pub const RX_CHUNK: usize = 10;

/// Payload bytes encoded per `encode_chunk` call.
pub const TX_CHUNK: usize = 80;

/// Maximum number of disagreeing FEC 1/3 triplets tolerated in a header.
const MAX_HEADER_ERRORS: u32 = 3;

/// Outcome of a `decode_chunk` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    /// A chunk was decoded, more payload follows.
    More,
    /// Not enough air bits are available yet.
    Short,
    /// The payload has been decoded completely.
    Done,
}

/// Per-packet codec state.
pub struct Codec {
    uap: u8,
    use_whiten: bool,
    /// Raw mode: ignore the payload header and CRC, decode the maximum payload size.
    rx_raw: bool,
    whiten_state: u8,
    crc_state: u16,
    crc_pos: usize,
    layout: &'static Layout,

    payload_length: usize,
    /// Total bytes on air after the sync word, header included.
    air_bytes: usize,
    /// Payload header, payload data and CRC.
    coded_total: usize,

    /// Bit position in the air buffer (input when decoding, output when encoding).
    air_off_b: usize,
    /// Byte position in the plain payload.
    coded_pos: usize,

    bit_errors: u32,
}

impl Codec {
    /// Creates a codec for one packet.
    ///
    /// `whiten_seed` is the initial whitening register, `uap` keys the HEC and CRC.
    pub fn new(whiten_seed: u8, uap: u8, use_whiten: bool, rx_raw: bool) -> Self {
        Self {
            uap,
            use_whiten,
            rx_raw,
            whiten_state: whiten_seed & 0x7f,
            crc_state: coding::crc_init(uap),
            crc_pos: 0,
            layout: PacketType::Null.codec_layout(),
            payload_length: 0,
            air_bytes: 0,
            coded_total: 0,
            air_off_b: 0,
            coded_pos: 0,
            bit_errors: 0,
        }
    }

    /// Returns the payload layout of the current packet.
    pub fn layout(&self) -> &'static Layout {
        self.layout
    }

    /// Returns the payload length (without payload header and CRC).
    pub fn payload_length(&self) -> usize {
        self.payload_length
    }

    /// Returns the size of payload header, payload and CRC.
    pub fn coded_total(&self) -> usize {
        self.coded_total
    }

    /// Returns the number of bytes following the sync word on air, trailer and header included.
    ///
    /// Only known after the header has been encoded, or the first chunk decoded.
    pub fn air_bytes(&self) -> usize {
        self.air_bytes
    }

    /// Returns the current bit offset in the air buffer.
    pub fn air_offset(&self) -> usize {
        self.air_off_b
    }

    /// Returns the number of corrected or detected bit errors seen so far.
    pub fn bit_errors(&self) -> u32 {
        self.bit_errors
    }

    fn set_packet_type(&mut self, ty: PacketType) {
        self.layout = ty.codec_layout();
    }

    /// Determines the payload length from the first (plain) payload bytes.
    fn calc_payload_length(&mut self, payload: &[u8]) {
        let t = self.layout;
        let hdr_len = t.payload_header_bytes;
        let byte = |i: usize| usize::from(payload.get(i).copied().unwrap_or(0));

        if self.rx_raw {
            self.payload_length = t.payload_bytes;
        } else {
            self.payload_length = match hdr_len {
                1 => byte(0) >> 3,
                2 => 0x3ff & ((byte(0) | byte(1) << 8) >> 3),
                _ => t.payload_bytes,
            };
            if self.payload_length > t.payload_bytes {
                warn!(
                    "(bad size {} for max {})",
                    self.payload_length, t.payload_bytes
                );
                self.payload_length = 0;
            }
        }

        self.coded_total = hdr_len + self.payload_length;
        if t.crc {
            self.coded_total += 2;
        }
        let payload_bits = if t.fec23 {
            coding::fec23_bits(self.coded_total * 8)
        } else {
            self.coded_total * 8
        };
        self.air_bytes = byte_align(HEADER_AIR_BITS + payload_bits);
    }

    /// Decodes the packet header from `air`, the bytes following the sync word.
    ///
    /// Fails with `Error::HeaderErrors` when more than 3 triplets disagree, and with
    /// `Error::HecMismatch` when the HEC does not match.
    pub fn decode_header(&mut self, air: &[u8]) -> Result<BbHdr, Error> {
        let mut hdr_bytes = [0; 3];
        let errors = coding::unfec13_hdr(&mut hdr_bytes, air);
        if errors > MAX_HEADER_ERRORS {
            debug!("(hdr be: {})", errors);
            return Err(Error::HeaderErrors);
        }
        self.bit_errors += errors;

        if self.use_whiten {
            coding::whiten(&mut hdr_bytes, 18, &mut self.whiten_state);
        }

        let h = u32::from(hdr_bytes[0]) | u32::from(hdr_bytes[1]) << 8 | u32::from(hdr_bytes[2]) << 16;
        let data = (h & 0x3ff) as u16;
        let hdr = BbHdr {
            lt_addr: (data & 7) as u8,
            ty: ((data >> 3) & 0xf) as u8,
            flags: ((data >> 7) & 7) as u8,
            hec: (h >> 10) as u8,
        };

        // The MSB of the received HEC is unreliable with some devices.
        let hec = coding::hec_compute(data, self.uap);
        if hec & 0x7f != hdr.hec & 0x7f {
            debug!("(heccal {:x}, pkt {:x})", hec, hdr.hec);
            return Err(Error::HecMismatch);
        }

        self.air_off_b = HEADER_AIR_BITS;
        self.set_packet_type(hdr.packet_type());
        Ok(hdr)
    }

    /// Writes `trailer` and the coded header into `air`, and sets up the payload geometry.
    ///
    /// `data` is the plain payload (payload header first) with room for the CRC; it is only
    /// inspected for the payload length here.
    pub fn encode_header(&mut self, air: &mut [u8], hdr: &BbHdr, trailer: u8, data: &[u8]) {
        let bits = hdr.to_bits();
        let h = u32::from(bits) | u32::from(coding::hec_compute(bits, self.uap)) << 10;
        let mut hdr_bytes = [h as u8, (h >> 8) as u8, (h >> 16) as u8];

        if self.use_whiten {
            coding::whiten(&mut hdr_bytes, 18, &mut self.whiten_state);
        }

        air[0] = trailer & 0x0f;
        coding::fec13(air, &hdr_bytes, HEADER_OFFSET, 18);
        self.air_off_b = HEADER_AIR_BITS;

        self.set_packet_type(hdr.packet_type());
        self.calc_payload_length(data);
    }

    /// Encodes the next chunk of `data` into `air`.
    ///
    /// The CRC is computed on the fly and stored in the last 2 bytes of the coded payload in `data`
    /// before they are encoded, so `data` must hold `coded_total()` bytes. Does nothing once the
    /// whole payload has been encoded.
    pub fn encode_chunk(&mut self, air: &mut [u8], data: &mut [u8]) {
        let t = self.layout;
        let byte_left = self.coded_total - self.coded_pos;
        if byte_left == 0 {
            return;
        }

        if !self.rx_raw && t.crc && byte_left > 2 {
            let crc_num = (byte_left - 2).min(TX_CHUNK);
            let start = self.coded_pos;
            self.crc_state = coding::crc_compute(&data[start..start + crc_num], self.crc_state);
            if start + crc_num == self.coded_total - 2 {
                LittleEndian::write_u16(&mut data[self.coded_total - 2..], self.crc_state);
            }
        }

        let byte_num = byte_left.min(TX_CHUNK);
        let mut tmp = [0; TX_CHUNK];
        tmp[..byte_num].copy_from_slice(&data[self.coded_pos..self.coded_pos + byte_num]);
        if self.use_whiten {
            coding::whiten(&mut tmp, byte_num * 8, &mut self.whiten_state);
        }

        let out_bits = if t.fec23 {
            coding::fec23(air, &tmp, self.air_off_b, byte_num * 8)
        } else {
            coding::null_encode(air, &tmp, self.air_off_b, byte_num);
            byte_num * 8
        };

        self.coded_pos += byte_num;
        self.air_off_b += out_bits;
    }

    /// Returns whether `encode_chunk` has encoded the whole payload.
    pub fn encode_done(&self) -> bool {
        self.coded_pos >= self.coded_total
    }

    /// Decodes the next payload chunk from `air` into `out`.
    ///
    /// `air` holds the bytes received after the sync word so far. The first call decodes a full
    /// chunk and parses the payload header, so `out` must have room for at least [`RX_CHUNK`]
    /// bytes beyond the coded payload.
    ///
    /// [`RX_CHUNK`]: constant.RX_CHUNK.html
    pub fn decode_chunk(&mut self, out: &mut [u8], air: &[u8]) -> DecodeStatus {
        let t = self.layout;
        if t.payload_bytes == 0 {
            return DecodeStatus::Done;
        }

        let first_chunk = self.coded_pos == 0;
        let byte_num = if first_chunk {
            RX_CHUNK
        } else {
            RX_CHUNK.min(self.coded_total.saturating_sub(self.coded_pos))
        };
        if byte_num == 0 {
            return DecodeStatus::Done;
        }

        let bit_av = (air.len() * 8).saturating_sub(self.air_off_b);
        let outp = &mut out[self.coded_pos..self.coded_pos + byte_num];
        let in_bits = if t.fec23 {
            let in_bits = coding::fec23_bits(8 * byte_num);
            if bit_av < in_bits {
                return DecodeStatus::Short;
            }
            // Errors only feed the statistics; the CRC decides whether the payload is valid.
            self.bit_errors += coding::unfec23(outp, air, self.air_off_b, 8 * byte_num);
            in_bits
        } else {
            let in_bits = 8 * byte_num;
            if bit_av < in_bits {
                return DecodeStatus::Short;
            }
            coding::null_decode(outp, air, self.air_off_b, byte_num);
            in_bits
        };
        if self.use_whiten {
            coding::whiten(outp, byte_num * 8, &mut self.whiten_state);
        }

        self.air_off_b += in_bits;
        self.coded_pos += byte_num;

        if first_chunk {
            self.calc_payload_length(out);
        }
        if !self.rx_raw && t.crc {
            self.update_crc(out);
        }

        if self.coded_pos >= self.coded_total {
            DecodeStatus::Done
        } else {
            DecodeStatus::More
        }
    }

    fn update_crc(&mut self, data: &[u8]) {
        let end = (self.coded_total - 2).min(self.coded_pos);
        if end > self.crc_pos {
            self.crc_state = coding::crc_compute(&data[self.crc_pos..end], self.crc_state);
            self.crc_pos = end;
        }
    }

    /// Checks the CRC of a fully decoded payload in `out`.
    ///
    /// Returns `PktFlags::GOOD_CRC` if the CRC matched, and the size of the payload (payload header
    /// and data) in `out`. Fails with `Error::Eof` if the payload was not decoded completely.
    pub fn decode_finalize(&self, out: &[u8]) -> Result<(PktFlags, usize), Error> {
        if self.coded_pos < self.coded_total {
            return fatal!(
                Error::Eof,
                "pkt not decoded? {}:{}",
                self.coded_pos,
                self.coded_total
            );
        }

        if !self.rx_raw && self.layout.crc {
            let end = self.coded_total;
            let crc = LittleEndian::read_u16(&out[end - 2..end]);
            if crc == self.crc_state {
                Ok((PktFlags::GOOD_CRC, end - 2))
            } else {
                debug!("(bad crc: cal={:x}, crc={:x})", self.crc_state, crc);
                Ok((PktFlags::empty(), end - 2))
            }
        } else {
            Ok((PktFlags::empty(), self.coded_total))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_code::{self, GIAC};
    use crate::packet::{HdrFlags, MAX_ACL_SIZE};

    const UAP: u8 = 0x47;
    const SEED: u8 = 0x55;

    /// Encodes a whole packet, returning the air buffer (padded like a receive buffer would be).
    fn encode(hdr: &BbHdr, data: &mut [u8]) -> (Vec<u8>, usize) {
        let mut air = vec![0u8; 600];
        let mut codec = Codec::new(SEED, UAP, true, false);
        let trailer = access_code::trailer(access_code::sync_word(GIAC));
        codec.encode_header(&mut air, hdr, trailer, data);
        while !codec.encode_done() {
            codec.encode_chunk(&mut air, data);
        }
        assert!(codec.air_offset() <= codec.air_bytes() * 8);
        (air, codec.air_bytes())
    }

    fn decode(air: &[u8], out: &mut [u8]) -> (BbHdr, PktFlags, usize) {
        let mut codec = Codec::new(SEED, UAP, true, false);
        let hdr = codec.decode_header(air).unwrap();
        loop {
            match codec.decode_chunk(out, air) {
                DecodeStatus::More => {}
                DecodeStatus::Done => break,
                DecodeStatus::Short => panic!("short"),
            }
        }
        let (flags, size) = codec.decode_finalize(out).unwrap();
        (hdr, flags, size)
    }

    #[test]
    fn dh1_round_trip() {
        let payload = *b"0123456789";
        let mut data = [0u8; 13];
        data[0] = (10 << 3) | 2;
        data[1..11].copy_from_slice(&payload);

        let hdr = BbHdr::new(1, PacketType::Dh1, HdrFlags::SEQN);
        let (air, air_bytes) = encode(&hdr, &mut data);
        assert_eq!(air_bytes, byte_align(58 + 13 * 8));
        assert_eq!(air[0] & 0x0f, 0x05);

        let mut out = [0u8; MAX_ACL_SIZE];
        let (rx_hdr, flags, size) = decode(&air, &mut out);
        assert_eq!(rx_hdr.lt_addr, 1);
        assert_eq!(rx_hdr.packet_type(), PacketType::Dh1);
        assert_eq!(rx_hdr.flags(), HdrFlags::SEQN);
        assert_eq!(flags, PktFlags::GOOD_CRC);
        assert_eq!(size, 11);
        assert_eq!(out[0], data[0]);
        assert_eq!(&out[1..11], &payload);
    }

    #[test]
    fn dm3_round_trip_with_bit_errors() {
        let mut data = [0u8; 2 + 100 + 2];
        data[0] = ((100 << 3) | 2) as u8;
        data[1] = (100 >> 5) as u8;
        for (i, b) in data[2..102].iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(7);
        }

        let hdr = BbHdr::new(3, PacketType::Dm3, HdrFlags::ARQN);
        let (mut air, air_bytes) = encode(&hdr, &mut data);
        assert_eq!(air_bytes, byte_align(58 + coding::fec23_bits(104 * 8)));

        // One flipped bit in a header triplet and one in a payload codeword.
        air[1] ^= 0x10;
        air[40] ^= 0x04;

        let mut out = [0u8; MAX_ACL_SIZE];
        let (rx_hdr, flags, size) = decode(&air, &mut out);
        assert_eq!(rx_hdr.packet_type(), PacketType::Dm3);
        assert_eq!(flags, PktFlags::GOOD_CRC);
        assert_eq!(size, 102);
        assert_eq!(&out[..102], &data[..102]);
    }

    #[test]
    fn dh5_spans_several_tx_chunks() {
        let len = 339;
        let mut data = [0u8; MAX_ACL_SIZE];
        data[0] = ((len << 3) | 1) as u8;
        data[1] = (len >> 5) as u8;
        for (i, b) in data[2..2 + len].iter_mut().enumerate() {
            *b = i as u8;
        }

        let hdr = BbHdr::new(2, PacketType::Dh5, HdrFlags::empty());
        let (air, _) = encode(&hdr, &mut data[..2 + len + 2]);
        let mut out = [0u8; MAX_ACL_SIZE + RX_CHUNK];
        let (_, flags, size) = decode(&air, &mut out);
        assert_eq!(flags, PktFlags::GOOD_CRC);
        assert_eq!(size, 2 + len);
        assert_eq!(&out[..size], &data[..size]);
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let mut data = [0u8; 13];
        data[0] = (10 << 3) | 2;
        let hdr = BbHdr::new(1, PacketType::Dh1, HdrFlags::empty());
        let (mut air, _) = encode(&hdr, &mut data);
        air[10] ^= 0x01;

        let mut out = [0u8; MAX_ACL_SIZE];
        let (_, flags, size) = decode(&air, &mut out);
        assert_eq!(flags, PktFlags::empty());
        assert_eq!(size, 11);
    }

    #[test]
    fn header_errors() {
        let hdr = BbHdr::new(7, PacketType::Poll, HdrFlags::FLOW);
        let (mut air, air_bytes) = encode(&hdr, &mut []);
        assert_eq!(air_bytes, byte_align(58));

        let mut codec = Codec::new(SEED, UAP, true, false);
        assert_eq!(codec.decode_header(&air).unwrap().packet_type(), PacketType::Poll);
        assert_eq!(codec.decode_chunk(&mut [0; RX_CHUNK], &air), DecodeStatus::Done);

        // Wrong UAP.
        let mut codec = Codec::new(SEED, UAP ^ 0x10, true, false);
        assert_eq!(codec.decode_header(&air), Err(Error::HecMismatch));

        // 4 damaged triplets.
        for t in 0..4 {
            let bit = 4 + 3 * (4 * t);
            air[bit / 8] ^= 1 << (bit % 8);
        }
        let mut codec = Codec::new(SEED, UAP, true, false);
        assert_eq!(codec.decode_header(&air), Err(Error::HeaderErrors));
    }

    #[test]
    fn oversized_length_is_clamped() {
        // DH1 with a payload header announcing 31 bytes (max 27).
        let mut data = [0u8; 30];
        data[0] = (31 << 3) | 2;
        let hdr = BbHdr::new(1, PacketType::Dh1, HdrFlags::empty());
        let mut air = [0u8; 64];
        let mut codec = Codec::new(SEED, UAP, true, false);
        codec.encode_header(&mut air, &hdr, 0x05, &data);
        assert_eq!(codec.payload_length(), 0);
        assert_eq!(codec.coded_total(), 3);
    }

    #[test]
    fn short_input() {
        let mut data = [0u8; 13];
        data[0] = (10 << 3) | 2;
        let hdr = BbHdr::new(1, PacketType::Dh1, HdrFlags::empty());
        let (air, _) = encode(&hdr, &mut data);

        let mut codec = Codec::new(SEED, UAP, true, false);
        codec.decode_header(&air).unwrap();
        let mut out = [0u8; MAX_ACL_SIZE];
        // 58 header bits + 80 payload bits need 18 bytes.
        assert_eq!(codec.decode_chunk(&mut out, &air[..17]), DecodeStatus::Short);
        assert_eq!(codec.decode_chunk(&mut out, &air[..18]), DecodeStatus::More);
    }

    #[test]
    fn raw_mode_uses_maximum_length() {
        let mut data = [0u8; 13];
        data[0] = (10 << 3) | 2;
        let hdr = BbHdr::new(1, PacketType::Dh1, HdrFlags::empty());
        let (air, _) = encode(&hdr, &mut data);

        let mut codec = Codec::new(SEED, UAP, true, true);
        codec.decode_header(&air).unwrap();
        let mut out = [0u8; MAX_ACL_SIZE];
        while codec.decode_chunk(&mut out, &air) == DecodeStatus::More {}
        let (flags, size) = codec.decode_finalize(&out).unwrap();
        assert_eq!(flags, PktFlags::empty());
        assert_eq!(size, 1 + 27 + 2);
        assert_eq!(&out[..11], &data[..11]);
    }
}
