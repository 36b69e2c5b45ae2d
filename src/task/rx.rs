//! Packet reception.
//!
//! A reception is scheduled as two items: `prepare` tunes the radio one tick before the receive
//! slot, and `execute` runs at the start of the slot. `execute` busy-waits for the sync word,
//! then decodes the header and the first payload chunk as soon as their bits are in. Longer
//! payloads are decoded by one `decode` item per following tick, until the packet is complete.
//!
//! The received packet is reported in a `RX_PKT` message, which is passed to the callback along
//! with the arrival time of the sync word relative to its expected time (in timer units). The
//! callback owns the message.

use super::WAIT_RX_MAX;
use crate::bits::{byte_align, reverse8};
use crate::bytes::{ByteWriter, ToBytes};
use crate::config::Config;
use crate::ctl::message::{self, MsgType, RxPktHeader, HEADER_SIZE, RX_DATA_OFFSET};
use crate::ctl::Controller;
use crate::msg::Msg;
use crate::packet::codec::RX_CHUNK;
use crate::packet::{BbHdr, Codec, DecodeStatus, PktFlags, HEADER_AIR_BITS, MAX_ACL_SIZE};
use crate::phy::{Mode, Phy, Radio, EXPECTED_RX_OFFSET};
use crate::tdma::SetItem;
use crate::time::{Clkn, Timer};
use crate::Error;
use bitflags::bitflags;

/// Deadline for sync word detection, in timer units since the start of the receive tick.
///
/// The expected detection time is 61 µs, with a tolerance of 10 µs.
pub const WAIT_SYNCWORD: u32 = EXPECTED_RX_OFFSET as u32 + 100;

/// Bytes that may still arrive in the last slot of a packet before the end-of-packet deadline.
const MAX_WAIT_BYTES: usize = 150 / 8 - 2;

/// Bytes of the 32 upper sync word bits at the start of the receive buffer.
const SW_HI_BYTES: usize = 4;

/// Bytes after the sync word needed to decode the header.
const NUM_PKT_HDR_BYTES: usize = byte_align(HEADER_AIR_BITS);

/// Bytes after the sync word needed to decode the first payload chunk (FEC 2/3 worst case).
const NUM_DATA_HDR_BYTES: usize = byte_align(HEADER_AIR_BITS + 12 * RX_CHUNK);

/// Size of the receive buffer: sync word, trailer, header and the largest FEC 2/3 payload.
pub const RX_BUF_SIZE: usize = byte_align(32 + HEADER_AIR_BITS + MAX_ACL_SIZE * 12);

/// Receives the packet report. The `i32` is the sync word timing error.
pub type RxCallback<C> = fn(&mut Controller<C>, Msg, i32) -> Result<(), Error>;

bitflags! {
    /// Options of a reception.
    pub struct RxFlags: u8 {
        /// Decode the header and payload. Without it, only the sync word is detected (ID packets).
        const PAYLOAD = 1 << 0;
        /// Decode the maximum payload size without checking the payload header and CRC.
        const RAW = 1 << 1;
    }
}

pub struct RxTask<C: Config> {
    cb: Option<RxCallback<C>>,
    flags: RxFlags,
    msg: Option<Msg>,
    codec: Codec,
    buf: [u8; RX_BUF_SIZE],
    /// Bytes received into `buf` so far.
    len: usize,

    clkn: Clkn,
    chan: u8,
    pkt_flags: PktFlags,
    hdr: BbHdr,
    /// Sync word detection time.
    pkt_time: u32,
    /// Decode items left before the packet must be complete.
    slot_num: u8,
}

impl<C: Config> RxTask<C> {
    pub fn new() -> Self {
        Self {
            cb: None,
            flags: RxFlags::empty(),
            msg: None,
            codec: Codec::new(0, 0, false, false),
            buf: [0; RX_BUF_SIZE],
            len: 0,
            clkn: Clkn::new(0),
            chan: 0,
            pkt_flags: PktFlags::empty(),
            hdr: BbHdr::default(),
            pkt_time: 0,
            slot_num: 0,
        }
    }

    /// Returns whether a reception is scheduled or in progress.
    pub fn is_busy(&self) -> bool {
        self.cb.is_some()
    }

    /// Copies newly received bytes into the buffer, returning the number of bytes after the sync
    /// word.
    fn update(&mut self, radio: &mut C::Radio) -> usize {
        let start = self.len;
        let n = radio.rx_dma_read(&mut self.buf[start..]);
        for b in &mut self.buf[start..start + n] {
            *b = reverse8(*b);
        }
        self.len += n;
        self.len.saturating_sub(SW_HI_BYTES)
    }

    /// Waits until `bytes` bytes after the sync word are in, or `deadline` passes.
    fn wait_for(&mut self, phy: &mut Phy<C>, bytes: usize, deadline: u32) -> bool {
        loop {
            if self.update(&mut phy.radio) >= bytes {
                return true;
            }
            if phy.timer.offset() >= deadline {
                return false;
            }
        }
    }

    fn air(&self) -> &[u8] {
        &self.buf[SW_HI_BYTES..self.len.max(SW_HI_BYTES)]
    }

    /// Decodes the packet header, setting up the codec for the payload.
    fn receive_header(&mut self, phy: &mut Phy<C>) -> bool {
        if !self.wait_for(phy, NUM_PKT_HDR_BYTES, WAIT_RX_MAX) {
            debug!("rx: header late");
            return false;
        }

        let air = &self.buf[SW_HI_BYTES..self.len];
        match self.codec.decode_header(air) {
            Ok(hdr) => {
                self.hdr = hdr;
                if self.codec.layout().crc {
                    self.pkt_flags |= PktFlags::HAS_CRC;
                }
                self.pkt_flags |= PktFlags::HAS_HDR;
                true
            }
            Err(_) => false,
        }
    }

    /// Decodes the next payload chunk into the message.
    fn decode_chunk(&mut self) -> DecodeStatus {
        let air = &self.buf[SW_HI_BYTES..self.len.max(SW_HI_BYTES)];
        match self.msg.as_mut() {
            Some(msg) => self
                .codec
                .decode_chunk(&mut msg.storage_mut()[RX_DATA_OFFSET..], air),
            None => DecodeStatus::Done,
        }
    }
}

/// Schedules the reception of a packet in the slot starting `delay + 1` ticks from now.
///
/// Returns `Error::Busy` if a reception is already pending.
pub fn schedule<C: Config>(
    ctl: &mut Controller<C>,
    delay: u8,
    cb: RxCallback<C>,
    flags: RxFlags,
) -> Result<(), Error> {
    let task = &mut ctl.rx_task;
    if task.is_busy() {
        return fatal!(Error::Busy, "rx_schedule: rx pending");
    }
    task.cb = Some(cb);
    task.flags = flags;

    let set = [
        SetItem::Call(prepare::<C>, 0),
        SetItem::EndFrame,
        SetItem::Call(execute::<C>, -3),
        SetItem::EndFrame,
    ];
    if let Err(e) = ctl.sched.schedule_set(delay, &set, 0) {
        ctl.rx_task.cb = None;
        return Err(e);
    }
    Ok(())
}

/// Drops the reception in progress, if any.
pub fn reset<C: Config>(ctl: &mut Controller<C>) {
    let task = &mut ctl.rx_task;
    task.cb = None;
    if let Some(msg) = task.msg.take() {
        ctl.pool.free(msg);
    }
}

fn prepare<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    if !ctl.rx_task.is_busy() {
        return Ok(());
    }

    let phy = &mut ctl.phy;
    let clkn = phy.cur_clkn() + 1;
    // The page scan hop sequence advances before each slave receive.
    if phy.mode() == Mode::PageScan {
        phy.hop.increment();
    }
    let chan = phy.channel(clkn);
    phy.prepare_rx(chan);

    let msg = match message::alloc(&mut ctl.pool, MsgType::RxPkt) {
        Ok(msg) => msg,
        Err(e) => {
            ctl.phy.radio.idle();
            ctl.rx_task.cb = None;
            return Err(e);
        }
    };

    let task = &mut ctl.rx_task;
    task.msg = Some(msg);
    task.clkn = clkn;
    task.chan = chan.index();
    task.pkt_flags = PktFlags::empty();
    task.hdr = BbHdr::default();
    task.codec = Codec::new(
        ctl.phy.whiten_seed(clkn),
        ctl.phy.chan_uap(),
        true,
        task.flags.contains(RxFlags::RAW),
    );
    task.pkt_time = 0;
    task.len = 0;
    ctl.phy.radio.rx_dma_start();
    Ok(())
}

fn execute<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    if ctl.rx_task.msg.is_none() {
        return Ok(());
    }
    if !ctl.phy.radio.is_receiving() {
        warn!("rxne: RF not rdy");
        return finalize(ctl);
    }

    while ctl.phy.timer.offset() < WAIT_SYNCWORD {
        if ctl.phy.radio.sync_detected() {
            ctl.rx_task.pkt_time = ctl.phy.timer.offset();
            ctl.rx_task.pkt_flags |= PktFlags::HAS_PKT;
            break;
        }
    }

    let task = &mut ctl.rx_task;
    let phy = &mut ctl.phy;
    if task.pkt_flags.contains(PktFlags::HAS_PKT)
        && task.flags.contains(RxFlags::PAYLOAD)
        && task.receive_header(phy)
        && task.codec.layout().payload_bytes != 0
    {
        let status = if task.wait_for(phy, NUM_DATA_HDR_BYTES, WAIT_RX_MAX) {
            task.decode_chunk()
        } else {
            DecodeStatus::Short
        };
        match status {
            DecodeStatus::Done => {}
            DecodeStatus::More => {
                task.slot_num = task.codec.layout().nslots * 2 - 1;
                return ctl.sched.schedule(1, decode::<C>, 0, 0);
            }
            DecodeStatus::Short => warn!("rx: payload header late ({})", task.air().len()),
        }
    }

    finalize(ctl)
}

/// Decodes what has been received of a multi-chunk payload.
fn decode<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    let task = &mut ctl.rx_task;
    let phy = &mut ctl.phy;
    if task.msg.is_none() {
        return Ok(());
    }

    task.slot_num = task.slot_num.saturating_sub(1);
    let mut last = task.slot_num == 0;

    let mut size = task.update(&mut phy.radio);
    let air_bytes = task.codec.air_bytes();
    last |= air_bytes.saturating_sub(size) < MAX_WAIT_BYTES;

    if last {
        while phy.timer.offset() < WAIT_RX_MAX && size < air_bytes {
            size = task.update(&mut phy.radio);
        }
    }

    let status = loop {
        match task.decode_chunk() {
            DecodeStatus::More => {}
            status => break status,
        }
    };

    if status == DecodeStatus::Done || last {
        finalize(ctl)
    } else {
        ctl.sched.schedule(1, decode::<C>, 0, 0)
    }
}

/// Stops the radio, completes the packet report and calls the user callback.
fn finalize<C: Config>(ctl: &mut Controller<C>) -> Result<(), Error> {
    ctl.phy.radio.idle();
    ctl.phy.radio.rx_dma_stop();

    let task = &mut ctl.rx_task;
    let mut msg = match task.msg.take() {
        Some(msg) => msg,
        None => return Ok(()),
    };
    // Cleared before the callback, which may schedule the next reception.
    let cb = task.cb.take();

    let mut data_size = 0;
    if task.pkt_flags.contains(PktFlags::HAS_HDR) {
        task.update(&mut ctl.phy.radio);
        match task
            .codec
            .decode_finalize(&msg.storage_mut()[RX_DATA_OFFSET..])
        {
            Ok((flags, size)) => {
                task.pkt_flags |= flags;
                data_size = size;
            }
            Err(_) => {
                debug!("rx: truncated {:?}", task.hdr.packet_type());
            }
        }
    }

    let report = RxPktHeader::new(
        task.clkn,
        task.chan,
        task.pkt_flags,
        data_size as u16,
        task.hdr,
    );
    let time = task.pkt_time as i32 - EXPECTED_RX_OFFSET;

    let mut written =
        report.to_bytes(&mut ByteWriter::new(&mut msg.storage_mut()[HEADER_SIZE..RX_DATA_OFFSET]));
    if written.is_ok() {
        written = msg.set_write(RX_DATA_OFFSET + data_size);
    }
    if let Err(e) = written {
        ctl.pool.free(msg);
        return Err(e);
    }

    match cb {
        Some(cb) => cb(ctl, msg, time),
        None => {
            ctl.pool.free(msg);
            Ok(())
        }
    }
}
