//! Scanning for a master's ID packet.
//!
//! The scan states listen on a single inquiry/page channel for up to 8 ticks. The first sync
//! word heard synchronizes the slave clock: its arrival marks the start of a master transmit
//! slot, so the slave clock is reset to 0 there.

use crate::config::Config;
use crate::ctl::Controller;
use crate::phy::{Radio, EXPECTED_RX_OFFSET};
use crate::time::{Clkn, Timer};
use crate::Error;

/// Ticks listened before giving up.
const SCAN_MAX_SLOTS: u8 = 8;

/// Deadline for sync word detection in each tick, in timer units.
const SCAN_WAIT_SYNCWORD: u32 = 250;

/// Called at the end of the scan, with whether an ID packet was received.
pub type ScanCallback<C> = fn(&mut Controller<C>, bool) -> Result<(), Error>;

pub struct ScanTask<C: Config> {
    cb: Option<ScanCallback<C>>,
    received: bool,
    pkt_time: u32,
    num_slots: u8,
}

impl<C: Config> ScanTask<C> {
    pub fn new() -> Self {
        Self {
            cb: None,
            received: false,
            pkt_time: 0,
            num_slots: 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.cb.is_some()
    }
}

/// Starts a scan `delay` ticks from now (at least 1).
pub fn schedule<C: Config>(ctl: &mut Controller<C>, delay: u8, cb: ScanCallback<C>) -> Result<(), Error> {
    if ctl.scan_task.is_busy() {
        return fatal!(Error::Busy, "scan: already scanning");
    }
    ctl.scan_task.cb = Some(cb);
    // The hop sequence advances before each master transmission.
    ctl.phy.hop.increment();

    if let Err(e) = ctl.sched.schedule(delay.max(1), start::<C>, 0, -3) {
        ctl.scan_task.cb = None;
        return Err(e);
    }
    Ok(())
}

/// Drops the scan in progress, if any.
pub fn reset<C: Config>(ctl: &mut Controller<C>) {
    ctl.scan_task.cb = None;
}

fn start<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    if !ctl.scan_task.is_busy() {
        return Ok(());
    }

    // The master transmits in slots with CLK1 = 0.
    let chan = ctl.phy.channel(Clkn::new(0));
    ctl.phy.prepare_rx(chan);

    let task = &mut ctl.scan_task;
    task.received = false;
    task.pkt_time = 0;
    task.num_slots = 0;
    wait(ctl, 0)
}

fn wait<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    if !ctl.scan_task.is_busy() {
        return Ok(());
    }

    let phy = &mut ctl.phy;
    let task = &mut ctl.scan_task;
    while phy.timer.offset() < SCAN_WAIT_SYNCWORD {
        if phy.radio.sync_detected() {
            task.pkt_time = phy.timer.offset();
            task.received = true;
            break;
        }
    }
    task.num_slots += 1;

    if task.received {
        phy.set_slave_clkn(Clkn::new(0));
        phy.adj_clkn_delay(task.pkt_time as i32 - EXPECTED_RX_OFFSET);
        finalize(ctl)
    } else if task.num_slots == SCAN_MAX_SLOTS {
        finalize(ctl)
    } else {
        ctl.sched.schedule(1, wait::<C>, 0, -3)
    }
}

fn finalize<C: Config>(ctl: &mut Controller<C>) -> Result<(), Error> {
    ctl.phy.radio.idle();
    let received = ctl.scan_task.received;
    match ctl.scan_task.cb.take() {
        Some(cb) => cb(ctl, received),
        None => Ok(()),
    }
}
