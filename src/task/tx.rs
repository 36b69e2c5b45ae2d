//! Packet transmission.
//!
//! Like a reception, a transmission is scheduled as `prepare` (one tick ahead: tune, push the
//! upper sync word bits and the start of the packet into the FIFO) and `execute` (start of the
//! slot: start the transmitter). The rest of the packet is fed from the FIFO interrupt, which
//! also encodes the payload ahead of the radio. A `finalize` item in the last tick of the packet
//! waits for the end of the transmission and calls the callback.
//!
//! Without a header, only the access code is sent (an ID packet).

use super::WAIT_RX_MAX;
use crate::bits::byte_align;
use crate::config::Config;
use crate::ctl::Controller;
use crate::packet::{BbHdr, Codec, HEADER_AIR_BITS, MAX_ACL_SIZE};
use crate::phy::{Mode, Radio};
use crate::tdma::SetItem;
use crate::time::Timer;
use crate::Error;

/// Air bytes pushed into the FIFO during `prepare` (the FIFO holds 32 bytes, 4 are taken by the
/// sync word).
const FIFO_FIRST: usize = 32 - 4;

/// Air bytes pushed per FIFO interrupt (128 µs of transmission).
const FIFO_THRESHOLD: usize = 16;

/// Size of the air buffer: trailer, header and the largest FEC 2/3 payload.
pub const TX_BUF_SIZE: usize = byte_align(HEADER_AIR_BITS + MAX_ACL_SIZE * 12);

/// Called when the transmission is over (or was dropped).
pub type TxCallback<C> = fn(&mut Controller<C>) -> Result<(), Error>;

pub struct TxTask<C: Config> {
    cb: Option<TxCallback<C>>,
    pending: bool,
    hdr: Option<BbHdr>,
    /// Payload (payload header first), with room for the CRC.
    data: [u8; MAX_ACL_SIZE],
    codec: Codec,
    air: [u8; TX_BUF_SIZE],
    /// Air bytes already pushed into the FIFO.
    pos: usize,
    air_bytes: usize,
}

impl<C: Config> TxTask<C> {
    pub fn new() -> Self {
        Self {
            cb: None,
            pending: false,
            hdr: None,
            data: [0; MAX_ACL_SIZE],
            codec: Codec::new(0, 0, false, false),
            air: [0; TX_BUF_SIZE],
            pos: 0,
            air_bytes: 0,
        }
    }

    /// Returns whether a transmission is scheduled or in progress.
    pub fn is_busy(&self) -> bool {
        self.pending
    }

    fn remaining(&self) -> usize {
        self.air_bytes - self.pos
    }

    /// Pushes up to `max` encoded bytes into the FIFO and returns how many are left.
    fn push(&mut self, radio: &mut C::Radio, max: usize) -> usize {
        let n = max.min(self.remaining());
        radio.fifo_write(&self.air[self.pos..self.pos + n]);
        self.pos += n;
        self.remaining()
    }

    fn clear_pos(&mut self) {
        self.pos = 0;
        self.air_bytes = 0;
    }

    /// Drops the packet, keeping the callback.
    fn clear(&mut self) {
        self.hdr = None;
        self.clear_pos();
    }
}

/// Schedules the transmission of a packet in the slot starting `delay + 1` ticks from now.
///
/// `data` is copied, so the caller may reuse its buffer right away. Returns `Error::Busy` if a
/// transmission is already pending.
pub fn schedule<C: Config>(
    ctl: &mut Controller<C>,
    delay: u8,
    cb: Option<TxCallback<C>>,
    hdr: Option<BbHdr>,
    data: &[u8],
) -> Result<(), Error> {
    let task = &mut ctl.tx_task;
    if task.pending {
        return fatal!(Error::Busy, "txs: already got pkt");
    }
    // The CRC is appended behind the payload.
    if data.len() + 2 > MAX_ACL_SIZE {
        return Err(Error::InvalidLength);
    }

    task.data[..data.len()].copy_from_slice(data);
    for b in &mut task.data[data.len()..] {
        *b = 0;
    }
    task.cb = cb;
    task.hdr = hdr;
    task.clear_pos();
    task.pending = true;

    let set = [
        SetItem::Call(prepare::<C>, 0),
        SetItem::EndFrame,
        SetItem::Call(execute::<C>, -3),
        SetItem::EndFrame,
    ];
    if let Err(e) = ctl.sched.schedule_set(delay, &set, 0) {
        reset(ctl);
        return Err(e);
    }
    Ok(())
}

/// Drops the transmission in progress, if any.
pub fn reset<C: Config>(ctl: &mut Controller<C>) {
    ctl.phy.radio.disable_fifo_irq();
    let task = &mut ctl.tx_task;
    task.clear();
    task.cb = None;
    task.pending = false;
}

/// FIFO interrupt: refills the FIFO and encodes the next payload chunk.
pub fn fifo_irq<C: Config>(ctl: &mut Controller<C>) {
    let task = &mut ctl.tx_task;
    let radio = &mut ctl.phy.radio;
    if task.remaining() == 0 {
        radio.disable_fifo_irq();
        return;
    }
    if task.push(radio, FIFO_THRESHOLD) == 0 {
        radio.disable_fifo_irq();
    } else {
        task.codec.encode_chunk(&mut task.air, &mut task.data);
    }
}

fn prepare<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    if !ctl.tx_task.pending {
        return Ok(());
    }

    let phy = &mut ctl.phy;
    let clkn = phy.cur_clkn() + 1;
    // The inquiry/page hop sequence advances before each master transmission.
    if phy.mode() == Mode::Inquiry || phy.mode() == Mode::Paging {
        phy.hop.increment();
    }
    let chan = phy.channel(clkn);
    phy.prepare_tx(chan);
    let sw_hi = phy.sw_hi();
    phy.radio.fifo_write(&sw_hi);

    let task = &mut ctl.tx_task;
    task.clear_pos();
    let mut nslots = 1;
    if let Some(hdr) = task.hdr {
        task.codec = Codec::new(ctl.phy.whiten_seed(clkn), ctl.phy.chan_uap(), true, false);
        for b in task.air.iter_mut() {
            *b = 0;
        }
        task.codec
            .encode_header(&mut task.air, &hdr, ctl.phy.trailer(), &task.data);
        task.air_bytes = task.codec.air_bytes();
        nslots = hdr.packet_type().nslots();

        task.codec.encode_chunk(&mut task.air, &mut task.data);
        task.push(&mut ctl.phy.radio, FIFO_FIRST);
    }

    ctl.sched.schedule(2 * nslots, finalize::<C>, 0, -3)
}

fn execute<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    if !ctl.tx_task.pending {
        return Ok(());
    }

    let radio = &mut ctl.phy.radio;
    if !radio.fs_locked() {
        warn!("TX: RF not FS_ON");
        ctl.tx_task.clear();
        radio.disable_fifo_irq();
        radio.idle();
        return Ok(());
    }

    radio.start_tx();
    if ctl.tx_task.remaining() != 0 {
        radio.enable_fifo_irq();
    }
    if ctl.phy.cur_clkn().raw() & 1 != 0 {
        warn!("txe: odd clkn {:?}", ctl.phy.cur_clkn());
    }
    Ok(())
}

fn finalize<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    if !ctl.tx_task.pending {
        return Ok(());
    }

    let phy = &mut ctl.phy;
    while phy.timer.offset() < WAIT_RX_MAX && !phy.radio.tx_done() {}
    phy.radio.idle();
    phy.radio.disable_fifo_irq();

    let task = &mut ctl.tx_task;
    if task.remaining() != 0 {
        debug!("tx: {} bytes not sent", task.remaining());
    }
    task.clear();
    task.pending = false;
    match task.cb.take() {
        Some(cb) => cb(ctl),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctl::message::{rx_data, RxPktHeader};
    use crate::msg::Msg;
    use crate::packet::{HdrFlags, PacketType, PktFlags};
    use crate::phy::mock::{self, MockConfig, RadioState};
    use crate::task::{rx, RxFlags};
    use std::cell::{Cell, RefCell};
    use std::vec::Vec;

    std::thread_local! {
        static SENT: Cell<u32> = Cell::new(0);
        static RECEIVED: RefCell<Vec<(RxPktHeader, Vec<u8>)>> = RefCell::new(Vec::new());
    }

    fn sent(_: &mut Controller<MockConfig>) -> Result<(), Error> {
        SENT.with(|s| s.set(s.get() + 1));
        Ok(())
    }

    fn record(ctl: &mut Controller<MockConfig>, msg: Msg, _time: i32) -> Result<(), Error> {
        let report = RxPktHeader::read(&msg)?;
        RECEIVED.with(|r| r.borrow_mut().push((report, rx_data(&msg).to_vec())));
        ctl.pool.free(msg);
        Ok(())
    }

    #[test]
    fn id_packet() {
        let mut ctl = mock::controller();
        ctl.phy.set_mode(Mode::Inquiry, crate::access_code::GIAC, 0);
        let x = ctl.phy.hop.x();
        schedule(&mut ctl, 0, Some(sent), None, &[]).unwrap();
        assert_eq!(schedule(&mut ctl, 2, Some(sent), None, &[]), Err(Error::Busy));

        mock::run_ticks(&mut ctl, 3);
        assert_eq!(ctl.phy.hop.x(), x + 1);
        assert_eq!(ctl.phy.radio.fifo, ctl.phy.sw_hi().to_vec());
        assert_eq!(ctl.phy.radio.tx_count, 1);
        assert_eq!(ctl.phy.radio.state, RadioState::Idle);
        assert_eq!(SENT.with(|s| s.get()), 1);
        assert!(!ctl.tx_task.is_busy());
    }

    #[test]
    fn synthesizer_not_locked() {
        let mut ctl = mock::controller();
        ctl.phy.set_mode(Mode::Master, 0x123456, 0x47);
        ctl.phy.radio.locks = false;
        let hdr = BbHdr::new(1, PacketType::Poll, HdrFlags::empty());
        schedule(&mut ctl, 0, Some(sent), Some(hdr), &[]).unwrap();

        mock::run_ticks(&mut ctl, 3);
        assert_eq!(ctl.phy.radio.tx_count, 0);
        // The callback still runs, so the state machine keeps going.
        assert_eq!(SENT.with(|s| s.get()), 1);
        assert!(!ctl.tx_task.is_busy());
    }

    #[test]
    fn dh3_loopback() {
        let mut data = [0u8; 2 + 100];
        data[0] = ((100 << 3) | 2) as u8;
        data[1] = (100 >> 5) as u8;
        for (i, b) in data[2..].iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(3);
        }
        let hdr = BbHdr::new(1, PacketType::Dh3, HdrFlags::SEQN | HdrFlags::FLOW);

        let mut tx = mock::controller();
        tx.phy.set_mode(Mode::Master, 0x123456, 0x47);
        schedule(&mut tx, 0, Some(sent), Some(hdr), &data).unwrap();
        mock::run_ticks(&mut tx, 8);
        assert_eq!(SENT.with(|s| s.get()), 1);
        assert!(!tx.phy.radio.fifo_irq);
        let air_bytes = byte_align(HEADER_AIR_BITS + (2 + 100 + 2) * 8);
        assert_eq!(tx.phy.radio.fifo.len(), 4 + air_bytes);

        // Same clock, same channel access code: the receiver decodes what was sent.
        let mut rx = mock::controller();
        rx.phy.set_mode(Mode::Master, 0x123456, 0x47);
        let air = tx.phy.radio.fifo.clone();
        rx.phy.radio.receive_next(&air);
        rx::schedule(&mut rx, 0, record, RxFlags::PAYLOAD).unwrap();
        mock::run_ticks(&mut rx, 8);

        let received = RECEIVED.with(|r| r.borrow_mut().drain(..).collect::<Vec<_>>());
        assert_eq!(received.len(), 1);
        let (report, payload) = &received[0];
        assert_eq!(
            report.flags(),
            PktFlags::HAS_PKT | PktFlags::HAS_HDR | PktFlags::HAS_CRC | PktFlags::GOOD_CRC
        );
        assert_eq!(report.bb_hdr().packet_type(), PacketType::Dh3);
        assert_eq!(report.bb_hdr().flags(), HdrFlags::SEQN | HdrFlags::FLOW);
        assert_eq!(report.data_size(), 102);
        assert_eq!(&payload[..], &data[..]);
    }
}
