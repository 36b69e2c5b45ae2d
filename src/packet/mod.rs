//! Baseband packets.
//!
//! A BR/EDR packet on air consists of the access code, an 18-bit header protected by FEC 1/3 and
//! an optional payload. The header carries the logical transport address (`LT_ADDR`), the packet
//! type, and the `FLOW`, `ARQN` and `SEQN` flags followed by the 8-bit HEC.
//!
//! The payload of ACL packets starts with a 1- or 2-byte payload header giving its length, and
//! ends with a 16-bit CRC. DM packets additionally use FEC 2/3.
//!
//! The [`Codec`] turns headers and payloads into air bits and back, in chunks small enough to
//! keep up with the radio FIFO.
//!
//! [`Codec`]: codec/struct.Codec.html

pub mod codec;
pub mod fhs;

pub use self::codec::{Codec, DecodeStatus};

use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::Error;
use bitflags::bitflags;

/// Size of the largest payload (DH5 payload header, data and CRC), plus margin for a full decode
/// chunk.
pub const MAX_ACL_SIZE: usize = 344;

/// Bits on air between the end of the sync word and the payload (trailer and coded header).
pub const HEADER_AIR_BITS: usize = 4 + 54;

enum_with_unknown! {
    /// The 4-bit baseband packet type (ACL logical transport).
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum PacketType(u8) {
        Null = 0,
        Poll = 1,
        Fhs = 2,
        Dm1 = 3,
        Dh1 = 4,
        Hv1 = 5,
        Hv2 = 6,
        Hv3 = 7,
        Dv = 8,
        Aux1 = 9,
        Dm3 = 10,
        Dh3 = 11,
        Ev4 = 12,
        Ev5 = 13,
        Dm5 = 14,
        Dh5 = 15,
    }
}

/// Payload geometry of a packet type.
#[derive(Debug, PartialEq, Eq)]
pub struct Layout {
    /// Number of slots the packet occupies.
    pub nslots: u8,
    /// Size of the payload header (0, 1 or 2 bytes).
    pub payload_header_bytes: usize,
    /// Maximum payload size, excluding payload header and CRC.
    pub payload_bytes: usize,
    /// Whether the payload is FEC 2/3 encoded.
    pub fec23: bool,
    /// Whether the payload ends with a CRC.
    pub crc: bool,
}

const fn layout(nslots: u8, hdr: usize, payload: usize, fec23: bool, crc: bool) -> Layout {
    Layout {
        nslots,
        payload_header_bytes: hdr,
        payload_bytes: payload,
        fec23,
        crc,
    }
}

static NULL_LAYOUT: Layout = layout(1, 0, 0, false, false);
static FHS_LAYOUT: Layout = layout(1, 0, 18, true, true);
static DM1_LAYOUT: Layout = layout(1, 1, 17, true, true);
static DH1_LAYOUT: Layout = layout(1, 1, 27, false, true);
static DM3_LAYOUT: Layout = layout(3, 2, 121, true, true);
static DH3_LAYOUT: Layout = layout(3, 2, 183, false, true);
static DM5_LAYOUT: Layout = layout(5, 2, 224, true, true);
static DH5_LAYOUT: Layout = layout(5, 2, 339, false, true);

impl PacketType {
    /// Returns the payload layout of this packet type, or `None` for the types not supported by
    /// the codec (SCO, EDR and `AUX1`).
    pub fn layout(&self) -> Option<&'static Layout> {
        Some(match self {
            PacketType::Null | PacketType::Poll => &NULL_LAYOUT,
            PacketType::Fhs => &FHS_LAYOUT,
            PacketType::Dm1 => &DM1_LAYOUT,
            PacketType::Dh1 => &DH1_LAYOUT,
            PacketType::Dm3 => &DM3_LAYOUT,
            PacketType::Dh3 => &DH3_LAYOUT,
            PacketType::Dm5 => &DM5_LAYOUT,
            PacketType::Dh5 => &DH5_LAYOUT,
            _ => return None,
        })
    }

    /// Returns the layout used by the codec: unsupported types are handled as `NULL`.
    pub fn codec_layout(&self) -> &'static Layout {
        match self.layout() {
            Some(layout) => layout,
            None => {
                info!("(Nyi plt {:?})", self);
                &NULL_LAYOUT
            }
        }
    }

    /// Returns the number of slots a packet of this type occupies.
    pub fn nslots(&self) -> u8 {
        self.codec_layout().nslots
    }
}

bitflags! {
    /// Flags of the baseband packet header.
    pub struct HdrFlags: u8 {
        const FLOW = 1 << 0;
        const ARQN = 1 << 1;
        const SEQN = 1 << 2;
    }
}

bitflags! {
    /// Flags of a received packet report.
    pub struct PktFlags: u8 {
        /// A sync word was detected.
        const HAS_PKT = 1 << 0;
        /// The header was decoded and its HEC matched.
        const HAS_HDR = 1 << 1;
        /// The packet type carries a CRC.
        const HAS_CRC = 1 << 2;
        /// The payload CRC matched.
        const GOOD_CRC = 1 << 3;
    }
}

/// A decoded baseband packet header.
///
/// This is also the layout of the header inside host messages (4 bytes).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[derive(zerocopy::FromBytes, zerocopy::AsBytes, zerocopy::Unaligned)]
#[repr(C)]
pub struct BbHdr {
    /// Logical transport address (3 bits).
    pub lt_addr: u8,
    /// Raw packet type (4 bits).
    pub ty: u8,
    /// Raw `HdrFlags`.
    pub flags: u8,
    /// Received HEC. Ignored when encoding.
    pub hec: u8,
}

impl BbHdr {
    /// Creates a header to be transmitted.
    pub fn new(lt_addr: u8, ty: PacketType, flags: HdrFlags) -> Self {
        Self {
            lt_addr: lt_addr & 7,
            ty: u8::from(ty) & 0xf,
            flags: flags.bits(),
            hec: 0,
        }
    }

    /// Returns the packet type.
    pub fn packet_type(&self) -> PacketType {
        PacketType::from(self.ty & 0xf)
    }

    /// Returns the header flags.
    pub fn flags(&self) -> HdrFlags {
        HdrFlags::from_bits_truncate(self.flags)
    }

    /// Packs the 10 header bits covered by the HEC.
    pub fn to_bits(&self) -> u16 {
        u16::from(self.lt_addr & 7) | u16::from(self.ty & 0xf) << 3 | u16::from(self.flags & 7) << 7
    }
}

impl ToBytes for BbHdr {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_obj(self)
    }
}

impl<'a> FromBytes<'a> for BbHdr {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(*bytes.read_obj::<BbHdr>()?)
    }
}

enum_with_unknown! {
    /// Logical link identifier in the ACL payload header.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum Llid(u8) {
        /// Continuation fragment of an L2CAP message.
        Continuation = 1,
        /// Start of an L2CAP message.
        Start = 2,
        /// LMP message.
        Lmp = 3,
    }
}

/// The ACL payload header: logical link, flow bit and payload length.
///
/// Single-slot packets use a 1-byte header (5-bit length), multi-slot packets a 2-byte header
/// (10-bit length).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    pub llid: Llid,
    pub flow: bool,
    pub len: u16,
}

impl PayloadHeader {
    /// Encodes the header in `nbytes` (1 or 2) bytes.
    pub fn write(&self, writer: &mut ByteWriter<'_>, nbytes: usize) -> Result<(), Error> {
        let raw = (self.len << 3) | (u16::from(self.flow) << 2) | u16::from(u8::from(self.llid) & 3);
        match nbytes {
            1 if self.len < 32 => writer.write_u8(raw as u8),
            2 if self.len < 1024 => writer.write_u16_le(raw),
            _ => Err(Error::InvalidLength),
        }
    }

    /// Decodes a header of `nbytes` (1 or 2) bytes.
    pub fn read(bytes: &mut ByteReader<'_>, nbytes: usize) -> Result<Self, Error> {
        let raw = match nbytes {
            1 => u16::from(bytes.read_u8()?),
            2 => bytes.read_u16_le()? & 0x1fff,
            _ => return Err(Error::InvalidLength),
        };
        Ok(Self {
            llid: Llid::from((raw & 3) as u8),
            flow: raw & 4 != 0,
            len: raw >> 3,
        })
    }
}
