//! Link layer of an ACL connection: stop-and-wait ARQ and supervision.
//!
//! Every packet of a connection carries three flag bits in its header:
//!
//! ```notrust
//! LSB                               MSB
//! +----------+----------+----------+
//! |   FLOW   |   ARQN   |   SEQN   |
//! | (1 bit)  | (1 bit)  | (1 bit)  |
//! +----------+----------+----------+
//! ```
//!
//! * `ARQN` acknowledges the last packet received with a good CRC (or a duplicate of it).
//! * `SEQN` toggles with every new payload, so that the receiver can tell a retransmission (whose
//!   acknowledgement got lost) from a new packet.
//! * `FLOW` asks the remote side to stop sending (0) or resume (1).
//!
//! A [`Link`] holds at most one outbound ACL message at a time. It is retransmitted with the same
//! `SEQN` until an `ARQN` comes back, and only then is the next message taken from the ACL queue.
//!
//! A connection is supervised: if nothing is received for [`SUPERVISION_TO`], it is dropped.
//!
//! [`Link`]: struct.Link.html
//! [`SUPERVISION_TO`]: constant.SUPERVISION_TO.html

mod seq_num;

pub use self::seq_num::SeqNum;

use crate::ctl::message::{self, MsgType, RxPktHeader};
use crate::msg::{Msg, MsgPool, MsgQueue};
use crate::packet::{BbHdr, HdrFlags, PacketType, PktFlags};
use crate::time::{Clkn, Ticks};
use crate::utils::HexSlice;
use crate::Error;

/// Time without any received header after which a connection is considered lost.
pub const SUPERVISION_TO: Ticks = Ticks::from_secs(1);

/// What the link wants to do after a reception.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing to send in the next slot (slave only).
    Wait,
    /// A packet (data, acknowledgement or keep-alive) must be sent in the next slot.
    Transmit,
    /// The supervision timeout expired.
    Timeout,
}

/// Result of `Link::process_rx`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RxOutcome {
    pub action: Action,
    /// Set on the first packet received on this link.
    pub connected: bool,
}

/// ARQ state of one ACL connection.
pub struct Link {
    master: bool,
    connected: bool,
    lt_addr: u8,

    /// `SEQN` expected from the remote side.
    rmt_seqn: SeqNum,
    /// `SEQN` of the packet in flight.
    loc_seqn: SeqNum,
    /// Whether the next packet acknowledges a reception.
    loc_arqn: bool,
    /// `TX_ACL` message waiting for its acknowledgement.
    cur_tx: Option<Msg>,

    rx_count: u32,
    clkn_start: Clkn,
    clkn_last_rx: Clkn,
}

impl Link {
    /// Creates the link of a new connection, established at `now`.
    pub fn new(master: bool, lt_addr: u8, now: Clkn) -> Self {
        Self {
            master,
            connected: false,
            lt_addr: lt_addr & 7,
            rmt_seqn: SeqNum::ONE,
            loc_seqn: SeqNum::ONE,
            loc_arqn: false,
            cur_tx: None,
            rx_count: 0,
            clkn_start: now,
            clkn_last_rx: now,
        }
    }

    pub fn is_master(&self) -> bool {
        self.master
    }

    /// Returns whether a packet has been received from the remote device.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn lt_addr(&self) -> u8 {
        self.lt_addr
    }

    /// Number of packet headers received.
    pub fn rx_count(&self) -> u32 {
        self.rx_count
    }

    /// Consumes a `RX_PKT` message received at `now`.
    ///
    /// New payloads with a good CRC are forwarded to `host_q`, everything else goes back to `pool`.
    pub fn process_rx(
        &mut self,
        now: Clkn,
        msg: Msg,
        pool: &mut MsgPool,
        host_q: &mut MsgQueue,
    ) -> Result<RxOutcome, Error> {
        let report = match message::msg_type(&msg).and_then(|ty| match ty {
            MsgType::RxPkt => RxPktHeader::read(&msg),
            _ => Err(Error::InvalidValue),
        }) {
            Ok(report) => report,
            Err(e) => {
                pool.free(msg);
                return fatal!(e, "rx: expect rx pkt");
            }
        };

        let mut outcome = RxOutcome {
            action: if self.master {
                Action::Transmit
            } else {
                Action::Wait
            },
            connected: false,
        };

        let flags = report.flags();
        if !flags.contains(PktFlags::HAS_HDR) {
            let silence = now.ticks_since(self.clkn_last_rx);
            if silence > SUPERVISION_TO {
                info!(
                    "LS To (con for {}, {} pkt rx)",
                    now.ticks_since(self.clkn_start),
                    self.rx_count
                );
                outcome.action = Action::Timeout;
            }
            pool.free(msg);
            return Ok(outcome);
        }

        if !self.connected {
            self.connected = true;
            outcome.connected = true;
        }
        self.clkn_last_rx = now;
        self.rx_count += 1;

        let hdr = report.bb_hdr();
        if !self.master && hdr.lt_addr != self.lt_addr {
            trace!("ll: lt_addr {}", hdr.lt_addr);
            pool.free(msg);
            return Ok(outcome);
        }

        let hdr_flags = hdr.flags();
        if hdr_flags.contains(HdrFlags::ARQN) {
            if let Some(acked) = self.cur_tx.take() {
                pool.free(acked);
                self.loc_seqn += SeqNum::ONE;
            }
        }
        if !hdr_flags.contains(HdrFlags::FLOW) {
            trace!("ll: stop");
        }

        let mut deliver = false;
        if flags.contains(PktFlags::HAS_CRC) {
            if SeqNum::of(hdr_flags) != self.rmt_seqn {
                // Retransmission of a payload we already have: acknowledge it again.
                trace!("ll: dup seqn {}", SeqNum::of(hdr_flags));
                self.loc_arqn = true;
            } else if flags.contains(PktFlags::GOOD_CRC) {
                self.rmt_seqn += SeqNum::ONE;
                self.loc_arqn = true;
                deliver = true;
            }
        }

        if self.master || hdr.packet_type() == PacketType::Poll || self.loc_arqn {
            outcome.action = Action::Transmit;
        }

        if deliver {
            if let Err(msg) = host_q.enqueue(msg) {
                pool.free(msg);
                return fatal!(Error::QueueFull, "txq full in link");
            }
        } else {
            pool.free(msg);
        }
        Ok(outcome)
    }

    /// Selects the next packet to send, copying its payload into `data`.
    ///
    /// This is the packet in flight if there is one, otherwise the next message of `acl_q`, or a
    /// `POLL` (master) or `NULL` (slave) when there is nothing to send. Returns the header, with
    /// the ARQ flags set, and the payload length.
    pub fn prepare_tx(
        &mut self,
        acl_q: &mut MsgQueue,
        pool: &mut MsgPool,
        data: &mut [u8],
    ) -> (BbHdr, usize) {
        if self.cur_tx.is_none() {
            self.cur_tx = acl_q.dequeue();
        }

        let mut packet = None;
        if let Some(msg) = &self.cur_tx {
            match message::tx_pkt(msg) {
                // The codec appends the CRC behind the payload.
                Ok((hdr, payload)) if payload.len() + 2 <= data.len() => {
                    data[..payload.len()].copy_from_slice(payload);
                    packet = Some((hdr, payload.len()));
                }
                _ => warn!("ll: dropping bad acl msg {:?}", HexSlice(msg.data())),
            }
            if packet.is_none() {
                if let Some(msg) = self.cur_tx.take() {
                    pool.free(msg);
                }
            }
        }

        let (mut hdr, len) = packet.unwrap_or_else(|| {
            let ty = if self.master {
                PacketType::Poll
            } else {
                PacketType::Null
            };
            (BbHdr::new(self.lt_addr, ty, HdrFlags::empty()), 0)
        });

        let mut flags = HdrFlags::FLOW | self.loc_seqn.to_flag();
        if self.loc_arqn {
            flags |= HdrFlags::ARQN;
        }
        hdr.flags = flags.bits();
        self.loc_arqn = false;
        (hdr, len)
    }

    /// Drops the packet in flight.
    pub fn reset(&mut self, pool: &mut MsgPool) {
        if let Some(msg) = self.cur_tx.take() {
            pool.free(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::ToBytes;
    use crate::ctl::message::rx_data;
    use crate::packet::MAX_ACL_SIZE;

    fn rx_pkt(pool: &mut MsgPool, flags: PktFlags, hdr: BbHdr, data: &[u8]) -> Msg {
        let mut msg = message::alloc(pool, MsgType::RxPkt).unwrap();
        let report = RxPktHeader::new(Clkn::new(0), 0, flags, data.len() as u16, hdr);
        msg.put_with(|w| report.to_bytes(w)).unwrap();
        msg.put(data.len()).unwrap().copy_from_slice(data);
        msg
    }

    fn acl(pool: &mut MsgPool, payload: &[u8]) -> Msg {
        let mut msg = message::alloc(pool, MsgType::TxAclReq).unwrap();
        let hdr = BbHdr::new(1, PacketType::Dh1, HdrFlags::empty());
        msg.put_with(|w| hdr.to_bytes(w)).unwrap();
        msg.put(payload.len()).unwrap().copy_from_slice(payload);
        msg
    }

    fn good() -> PktFlags {
        PktFlags::HAS_PKT | PktFlags::HAS_HDR | PktFlags::HAS_CRC | PktFlags::GOOD_CRC
    }

    fn hdr_only() -> PktFlags {
        PktFlags::HAS_PKT | PktFlags::HAS_HDR
    }

    #[test]
    fn retransmits_until_acked() {
        let mut pool = MsgPool::new();
        let mut acl_q = MsgQueue::new();
        let mut host_q = MsgQueue::new();
        let mut data = [0; MAX_ACL_SIZE];
        let mut link = Link::new(true, 1, Clkn::new(0));

        let payload = [(3 << 3) | 2, 0xaa, 0xbb, 0xcc];
        acl_q.enqueue(acl(&mut pool, &payload)).unwrap();

        let (hdr, len) = link.prepare_tx(&mut acl_q, &mut pool, &mut data);
        assert_eq!(hdr.packet_type(), PacketType::Dh1);
        assert_eq!(hdr.flags(), HdrFlags::FLOW | HdrFlags::SEQN);
        assert_eq!(&data[..len], &payload);
        assert!(acl_q.is_empty());

        // The slave answers without ARQN: its acknowledgement got lost.
        let null = BbHdr::new(1, PacketType::Null, HdrFlags::FLOW);
        let msg = rx_pkt(&mut pool, hdr_only(), null, &[]);
        let out = link
            .process_rx(Clkn::new(4), msg, &mut pool, &mut host_q)
            .unwrap();
        assert_eq!(
            out,
            RxOutcome {
                action: Action::Transmit,
                connected: true
            }
        );

        let (hdr, len) = link.prepare_tx(&mut acl_q, &mut pool, &mut data);
        assert_eq!(hdr.packet_type(), PacketType::Dh1);
        assert_eq!(hdr.flags(), HdrFlags::FLOW | HdrFlags::SEQN);
        assert_eq!(&data[..len], &payload);

        let ack = BbHdr::new(1, PacketType::Null, HdrFlags::FLOW | HdrFlags::ARQN);
        let msg = rx_pkt(&mut pool, hdr_only(), ack, &[]);
        let out = link
            .process_rx(Clkn::new(8), msg, &mut pool, &mut host_q)
            .unwrap();
        assert!(!out.connected);

        let (hdr, len) = link.prepare_tx(&mut acl_q, &mut pool, &mut data);
        assert_eq!(hdr.packet_type(), PacketType::Poll);
        assert_eq!(hdr.flags(), HdrFlags::FLOW);
        assert_eq!(len, 0);
        assert_eq!(pool.available(), crate::msg::POOL_SIZE);
        assert!(host_q.is_empty());
    }

    #[test]
    fn duplicates_are_not_delivered() {
        let mut pool = MsgPool::new();
        let mut acl_q = MsgQueue::new();
        let mut host_q = MsgQueue::new();
        let mut data = [0; MAX_ACL_SIZE];
        let mut link = Link::new(false, 1, Clkn::new(0));

        let payload = [(2 << 3) | 2, 0x11, 0x22];
        let dh1 = |seqn: HdrFlags| BbHdr::new(1, PacketType::Dh1, HdrFlags::FLOW | seqn);

        let msg = rx_pkt(&mut pool, good(), dh1(HdrFlags::SEQN), &payload);
        let out = link
            .process_rx(Clkn::new(2), msg, &mut pool, &mut host_q)
            .unwrap();
        assert_eq!(out.action, Action::Transmit);
        assert!(out.connected);
        assert_eq!(host_q.len(), 1);

        let (hdr, _) = link.prepare_tx(&mut acl_q, &mut pool, &mut data);
        assert_eq!(hdr.packet_type(), PacketType::Null);
        assert!(hdr.flags().contains(HdrFlags::ARQN));

        // Our ARQN was lost, the master sends the same payload again.
        let msg = rx_pkt(&mut pool, good(), dh1(HdrFlags::SEQN), &payload);
        let out = link
            .process_rx(Clkn::new(6), msg, &mut pool, &mut host_q)
            .unwrap();
        assert_eq!(out.action, Action::Transmit);
        assert_eq!(host_q.len(), 1);
        let (hdr, _) = link.prepare_tx(&mut acl_q, &mut pool, &mut data);
        assert!(hdr.flags().contains(HdrFlags::ARQN));

        // A packet for another slave is ignored.
        let other = BbHdr::new(2, PacketType::Dh1, HdrFlags::empty());
        let msg = rx_pkt(&mut pool, good(), other, &payload);
        let out = link
            .process_rx(Clkn::new(10), msg, &mut pool, &mut host_q)
            .unwrap();
        assert_eq!(out.action, Action::Wait);
        assert_eq!(host_q.len(), 1);

        // A bad CRC is neither delivered nor acknowledged.
        let msg = rx_pkt(&mut pool, hdr_only() | PktFlags::HAS_CRC, dh1(HdrFlags::empty()), &payload);
        let out = link
            .process_rx(Clkn::new(14), msg, &mut pool, &mut host_q)
            .unwrap();
        assert_eq!(out.action, Action::Wait);

        let msg = rx_pkt(&mut pool, good(), dh1(HdrFlags::empty()), &payload);
        link.process_rx(Clkn::new(18), msg, &mut pool, &mut host_q)
            .unwrap();
        assert_eq!(host_q.len(), 2);

        let first = host_q.dequeue().unwrap();
        assert_eq!(rx_data(&first), &payload);
        pool.free(first);
        host_q.flush(&mut pool);
        assert_eq!(pool.available(), crate::msg::POOL_SIZE);
    }

    #[test]
    fn supervision_timeout() {
        let mut pool = MsgPool::new();
        let mut host_q = MsgQueue::new();
        let mut link = Link::new(false, 1, Clkn::new(100));
        let none = BbHdr::default();

        let msg = rx_pkt(&mut pool, PktFlags::empty(), none, &[]);
        let out = link
            .process_rx(Clkn::new(3300), msg, &mut pool, &mut host_q)
            .unwrap();
        assert_eq!(out.action, Action::Wait);

        let msg = rx_pkt(&mut pool, PktFlags::empty(), none, &[]);
        let out = link
            .process_rx(Clkn::new(3301), msg, &mut pool, &mut host_q)
            .unwrap();
        assert_eq!(out.action, Action::Timeout);
        assert!(!link.is_connected());
        assert_eq!(pool.available(), crate::msg::POOL_SIZE);
    }

    #[test]
    fn rejects_other_messages() {
        let mut pool = MsgPool::new();
        let mut host_q = MsgQueue::new();
        let mut link = Link::new(true, 1, Clkn::new(0));
        let msg = message::alloc(&mut pool, MsgType::StateResp).unwrap();
        assert_eq!(
            link.process_rx(Clkn::new(0), msg, &mut pool, &mut host_q),
            Err(Error::InvalidValue)
        );
        assert_eq!(pool.available(), crate::msg::POOL_SIZE);
    }
}
