//! Host control messages.
//!
//! Every message exchanged with the host starts with a 4-byte header holding the message type as
//! a little-endian `u32`. The payload depends on the type:
//!
//! * Requests from the host carry their arguments (`SET_BDADDR`/`PAGING`/`MONITOR`: a `u64`
//!   address, `SET_FREQ_OFF`/`SET_MAX_AC_ERRORS`: a `u8`, `SET_AFH`: `u32` instant, `u8` mode and
//!   the 10-byte channel map). `TX_ACL` and `SET_EIR` carry a baseband header followed by the
//!   payload to transmit (payload header included).
//! * `RX_PKT` reports a received packet: an [`RxPktHeader`] followed by the decoded payload.
//! * `STATE_RESP` reports a controller state change: `u8` state and `u8` reason.
//!
//! [`RxPktHeader`]: struct.RxPktHeader.html

use crate::bdaddr::BdAddr;
use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::msg::{Msg, MsgPool};
use crate::packet::{BbHdr, PktFlags};
use crate::time::Clkn;
use crate::Error;
use byteorder::{ByteOrder, LittleEndian};
use core::fmt;

/// Size of the message header.
pub const HEADER_SIZE: usize = 4;

/// Size of the report preceding the payload of an `RX_PKT` message.
pub const RX_PKT_HEADER_SIZE: usize = 12;

/// Offset of the payload in an `RX_PKT` message.
pub const RX_DATA_OFFSET: usize = HEADER_SIZE + RX_PKT_HEADER_SIZE;

enum_with_unknown! {
    /// Host control message types.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum MsgType(u32) {
        Debug = 0,
        ResetReq = 20,
        IdleReq = 21,
        SetFreqOffReq = 22,
        SetBdaddrReq = 23,
        InquiryReq = 24,
        PagingReq = 25,
        TxTestReq = 26,
        TxAclReq = 27,
        InquiryScanReq = 28,
        PageScanReq = 29,
        SetEirReq = 30,
        SetAfhReq = 31,
        MonitorReq = 32,
        SetMaxAcErrorsReq = 33,
        RxPkt = 40,
        StateResp = 41,
    }
}

/// Top-level state of the controller, as reported to the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Standby = 0,
    Inquiry = 1,
    Page = 2,
    Connected = 3,
    Test = 4,
    InquiryScan = 5,
    PageScan = 6,
}

impl State {
    /// Returns whether `next` may be entered from `self`.
    ///
    /// Any state may go back to `Standby`. `Connected` is entered from `Page`, `PageScan` or
    /// `Connected`. All other states must be entered from `Standby`.
    pub fn can_enter(self, next: State) -> bool {
        match next {
            State::Standby => true,
            State::Connected => match self {
                State::Page | State::PageScan | State::Connected => true,
                _ => false,
            },
            _ => self == State::Standby,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            State::Standby => "STANDBY",
            State::Inquiry => "INQUIRY",
            State::Page => "PAGE",
            State::Connected => "CONNECTED",
            State::Test => "TEST",
            State::InquiryScan => "INQUIRY_SCAN",
            State::PageScan => "PAGE_SCAN",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reason code of a state change.
///
/// The low 5 bits hold the reason proper. When a connection is established, the upper 3 bits carry
/// the logical transport address in use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Reason(pub u8);

impl Reason {
    pub const SUCCESS: Self = Reason(0);
    pub const TIMEOUT: Self = Reason(1);
    /// `CONNECTED` was entered as master, but the slave has not answered yet.
    pub const PAGED: Self = Reason(2);
    /// A slot task failed (no free buffer, full queue) and the state machine was stopped.
    pub const ABORTED: Self = Reason(3);

    /// Reason reported when the first packet of a connection was received.
    pub fn connected(lt_addr: u8) -> Self {
        Reason(Self::SUCCESS.0 | (lt_addr & 7) << 5)
    }
}

/// Allocates a message of type `ty`, with its header written.
pub fn alloc(pool: &mut MsgPool, ty: MsgType) -> Result<Msg, Error> {
    let mut msg = pool.alloc()?;
    msg.put_with(|w| w.write_u32_le(ty.into()))?;
    Ok(msg)
}

/// Returns the type of `msg`.
pub fn msg_type(msg: &Msg) -> Result<MsgType, Error> {
    Ok(MsgType::from(msg.reader().read_u32_le()?))
}

/// Builds a `STATE_RESP` message.
pub fn state_resp(pool: &mut MsgPool, state: State, reason: Reason) -> Result<Msg, Error> {
    let mut msg = alloc(pool, MsgType::StateResp)?;
    let r = msg.put_with(|w| {
        w.write_u8(state as u8)?;
        w.write_u8(reason.0)
    });
    match r {
        Ok(()) => Ok(msg),
        Err(e) => {
            pool.free(msg);
            Err(e)
        }
    }
}

/// Report of a received packet, at the start of `RX_PKT` messages.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
#[derive(zerocopy::FromBytes, zerocopy::AsBytes, zerocopy::Unaligned)]
#[repr(C)]
pub struct RxPktHeader {
    clkn: [u8; 4],
    chan: u8,
    flags: u8,
    data_size: [u8; 2],
    bb_hdr: BbHdr,
}

impl RxPktHeader {
    pub fn new(clkn: Clkn, chan: u8, flags: PktFlags, data_size: u16, bb_hdr: BbHdr) -> Self {
        let mut this = Self {
            clkn: [0; 4],
            chan,
            flags: flags.bits(),
            data_size: [0; 2],
            bb_hdr,
        };
        LittleEndian::write_u32(&mut this.clkn, clkn.raw());
        LittleEndian::write_u16(&mut this.data_size, data_size);
        this
    }

    /// Reads the report of an `RX_PKT` message.
    pub fn read(msg: &Msg) -> Result<Self, Error> {
        let data = msg.data();
        if data.len() < RX_DATA_OFFSET {
            return Err(Error::Eof);
        }
        Self::from_bytes(&mut ByteReader::new(&data[HEADER_SIZE..]))
    }

    /// Clock value at the start of the receive slot.
    pub fn clkn(&self) -> Clkn {
        Clkn::new(LittleEndian::read_u32(&self.clkn))
    }

    pub fn chan(&self) -> u8 {
        self.chan
    }

    pub fn flags(&self) -> PktFlags {
        PktFlags::from_bits_truncate(self.flags)
    }

    /// Size of the decoded payload following the report.
    pub fn data_size(&self) -> u16 {
        LittleEndian::read_u16(&self.data_size)
    }

    pub fn bb_hdr(&self) -> BbHdr {
        self.bb_hdr
    }
}

impl fmt::Debug for RxPktHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxPktHeader")
            .field("clkn", &self.clkn())
            .field("chan", &self.chan)
            .field("flags", &self.flags())
            .field("data_size", &self.data_size())
            .field("bb_hdr", &self.bb_hdr)
            .finish()
    }
}

impl ToBytes for RxPktHeader {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_obj(self)
    }
}

impl<'a> FromBytes<'a> for RxPktHeader {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(*bytes.read_obj::<RxPktHeader>()?)
    }
}

/// Returns the payload of an `RX_PKT` message.
pub fn rx_data(msg: &Msg) -> &[u8] {
    msg.data().get(RX_DATA_OFFSET..).unwrap_or(&[])
}

/// Splits a `TX_ACL` or `SET_EIR` message into the baseband header and the payload.
pub fn tx_pkt(msg: &Msg) -> Result<(BbHdr, &[u8]), Error> {
    let mut bytes = ByteReader::new(msg.data());
    bytes.skip(HEADER_SIZE)?;
    let hdr = BbHdr::from_bytes(&mut bytes)?;
    Ok((hdr, bytes.read_rest()))
}

/// A request from the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    Debug(&'a [u8]),
    Reset,
    Idle,
    SetFreqOff(u8),
    SetMaxAcErrors(u8),
    SetBdaddr(BdAddr),
    Inquiry,
    Paging(BdAddr),
    TxTest,
    /// ACL data to transmit; the message itself is queued.
    TxAcl,
    InquiryScan,
    PageScan,
    /// New EIR packet; the message itself is kept.
    SetEir,
    SetAfh {
        instant: Clkn,
        /// AFH configuration: enable flag followed by the channel map.
        cfg: [u8; 11],
    },
    Monitor(BdAddr),
    /// A message the host is not supposed to send.
    Invalid(MsgType),
}

impl<'a> FromBytes<'a> for Request<'a> {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let ty = MsgType::from(bytes.read_u32_le()?);
        Ok(match ty {
            MsgType::Debug => {
                let text = bytes.read_rest();
                // C string: stop at the first NUL
                let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
                Request::Debug(&text[..end])
            }
            MsgType::ResetReq => Request::Reset,
            MsgType::IdleReq => Request::Idle,
            MsgType::SetFreqOffReq => Request::SetFreqOff(bytes.read_u8()?),
            MsgType::SetMaxAcErrorsReq => Request::SetMaxAcErrors(bytes.read_u8()?),
            MsgType::SetBdaddrReq => Request::SetBdaddr(BdAddr::new(bytes.read_u64_le()?)),
            MsgType::InquiryReq => Request::Inquiry,
            MsgType::PagingReq => Request::Paging(BdAddr::new(bytes.read_u64_le()?)),
            MsgType::TxTestReq => Request::TxTest,
            MsgType::TxAclReq => Request::TxAcl,
            MsgType::InquiryScanReq => Request::InquiryScan,
            MsgType::PageScanReq => Request::PageScan,
            MsgType::SetEirReq => Request::SetEir,
            MsgType::SetAfhReq => {
                let instant = Clkn::new(bytes.read_u32_le()?);
                let mut cfg = [0; 11];
                cfg[0] = bytes.read_u8()?;
                cfg[1..].copy_from_slice(bytes.read_slice(10)?);
                Request::SetAfh { instant, cfg }
            }
            MsgType::MonitorReq => Request::Monitor(BdAddr::new(bytes.read_u64_le()?)),
            other => Request::Invalid(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{HdrFlags, PacketType};

    fn request(pool: &mut MsgPool, bytes: &[u8]) -> Msg {
        let mut msg = pool.alloc().unwrap();
        msg.put(bytes.len()).unwrap().copy_from_slice(bytes);
        msg
    }

    #[test]
    fn transitions() {
        use State::*;
        assert!(Inquiry.can_enter(Standby));
        assert!(Standby.can_enter(PageScan));
        assert!(Page.can_enter(Connected));
        assert!(PageScan.can_enter(Connected));
        assert!(Connected.can_enter(Connected));
        assert!(!Inquiry.can_enter(Connected));
        assert!(!Standby.can_enter(Connected));
        assert!(!Inquiry.can_enter(Page));
        assert!(!Connected.can_enter(InquiryScan));
    }

    #[test]
    fn parse_requests() {
        let mut pool = MsgPool::new();

        let msg = request(&mut pool, &[25, 0, 0, 0, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0, 0]);
        assert_eq!(
            Request::from_bytes(&mut msg.reader()),
            Ok(Request::Paging(BdAddr::new(0x1122_3344_5566)))
        );
        pool.free(msg);

        let msg = request(&mut pool, &[0, 0, 0, 0, b'h', b'i', 0, b'x']);
        assert_eq!(
            Request::from_bytes(&mut msg.reader()),
            Ok(Request::Debug(b"hi"))
        );
        pool.free(msg);

        let mut afh = std::vec![31, 0, 0, 0, 0x10, 0x20, 0, 0, 1];
        afh.extend_from_slice(&[0xff; 10]);
        let msg = request(&mut pool, &afh);
        let mut cfg = [0xff; 11];
        cfg[0] = 1;
        assert_eq!(
            Request::from_bytes(&mut msg.reader()),
            Ok(Request::SetAfh {
                instant: Clkn::new(0x2010),
                cfg
            })
        );
        pool.free(msg);

        let msg = request(&mut pool, &[40, 0, 0, 0]);
        assert_eq!(
            Request::from_bytes(&mut msg.reader()),
            Ok(Request::Invalid(MsgType::RxPkt))
        );
        pool.free(msg);

        let msg = request(&mut pool, &[22, 0, 0, 0]);
        assert_eq!(Request::from_bytes(&mut msg.reader()), Err(Error::Eof));
        pool.free(msg);
    }

    #[test]
    fn rx_report_layout() {
        let mut pool = MsgPool::new();
        let mut msg = alloc(&mut pool, MsgType::RxPkt).unwrap();
        let hdr = BbHdr::new(1, PacketType::Dh1, HdrFlags::SEQN);
        let report = RxPktHeader::new(
            Clkn::new(0x0123_4567),
            42,
            PktFlags::HAS_PKT | PktFlags::HAS_HDR,
            3,
            hdr,
        );
        msg.put_with(|w| report.to_bytes(w)).unwrap();
        msg.put(3).unwrap().copy_from_slice(&[7, 8, 9]);

        assert_eq!(
            &msg.data()[..RX_DATA_OFFSET],
            &[40, 0, 0, 0, 0x67, 0x45, 0x23, 0x01, 42, 3, 3, 0, 1, 4, 4, 0]
        );
        assert_eq!(msg_type(&msg), Ok(MsgType::RxPkt));
        assert_eq!(RxPktHeader::read(&msg), Ok(report));
        assert_eq!(rx_data(&msg), &[7, 8, 9]);
    }

    #[test]
    fn state_response() {
        let mut pool = MsgPool::new();
        let msg = state_resp(&mut pool, State::Connected, Reason::connected(1)).unwrap();
        assert_eq!(msg.data(), &[41, 0, 0, 0, 3, 0x20]);
    }

    #[test]
    fn tx_packet() {
        let mut pool = MsgPool::new();
        let msg = request(&mut pool, &[27, 0, 0, 0, 1, 4, 0, 0, 0x52, 1, 2]);
        let (hdr, data) = tx_pkt(&msg).unwrap();
        assert_eq!(hdr.packet_type(), PacketType::Dh1);
        assert_eq!(hdr.lt_addr, 1);
        assert_eq!(data, &[0x52, 1, 2]);
    }
}
