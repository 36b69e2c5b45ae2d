//! Monitoring a connection being established to a given device.
//!
//! 1. Impersonate the target: page scan with its address, waiting for ID(1).
//! 2. Answer with ID(2) and receive the master's FHS, but do not acknowledge it.
//! 3. Follow the master's hopping sequence and clock, listening in every slot.
//!
//! Since the real target answers the page as well, the connection gets established and we get to
//! see the packets of both sides. All packets with a CRC are forwarded to the host, undecoded
//! beyond the header.

use super::{expired, page_scan, read_report, slot_delay, Proto};
use crate::bdaddr::BdAddr;
use crate::config::Config;
use crate::ctl::{Controller, Reason, State};
use crate::msg::Msg;
use crate::packet::PktFlags;
use crate::phy::Mode;
use crate::task::{rx, scan, tx, RxFlags};
use crate::time::Clkn;
use crate::Error;

pub struct Monitor {
    clkn_start: Clkn,
    /// Master of the connection, once its FHS was received.
    master: Option<BdAddr>,
}

fn canceled<C: Config>(ctl: &Controller<C>) -> bool {
    match ctl.proto {
        Proto::Monitor(_) => ctl.state() != State::PageScan,
        _ => true,
    }
}

/// Starts waiting for a master paging `target`.
///
/// This takes over `target` as our own address.
pub fn setup<C: Config>(ctl: &mut Controller<C>, target: BdAddr) -> Result<(), Error> {
    ctl.set_state(State::PageScan, Reason::SUCCESS)?;
    ctl.phy.set_bdaddr(target);
    ctl.phy.set_mode(Mode::PageScan, target.lap(), target.uap());
    ctl.proto = Proto::Monitor(Monitor {
        clkn_start: ctl.phy.master_clkn() + 1,
        master: None,
    });
    schedule(ctl, 1)
}

fn schedule<C: Config>(ctl: &mut Controller<C>, delay: u8) -> Result<(), Error> {
    let start = match &ctl.proto {
        Proto::Monitor(mon) => mon.clkn_start,
        _ => return Ok(()),
    };
    if expired(ctl.phy.master_clkn(), start, page_scan::PAGE_SCAN_DURATION) {
        info!("monitor timeout");
        return ctl.set_state(State::Standby, Reason::TIMEOUT);
    }
    scan::schedule(ctl, delay, scan_cb::<C>)
}

fn scan_cb<C: Config>(ctl: &mut Controller<C>, received: bool) -> Result<(), Error> {
    if canceled(ctl) {
        return Ok(());
    }
    if !received {
        return schedule(ctl, 0);
    }

    let delay = slot_delay(ctl.phy.slave_clkn().slot_idx(), page_scan::TX_PREPARE_IDX);
    tx::schedule(ctl, delay, None, None, &[])?;
    rx::schedule(ctl, delay + 2, rx_fhs_cb::<C>, RxFlags::PAYLOAD)
}

fn rx_fhs_cb<C: Config>(ctl: &mut Controller<C>, msg: Msg, _: i32) -> Result<(), Error> {
    if canceled(ctl) {
        ctl.free(msg);
        return Ok(());
    }
    let info = match page_scan::receive_fhs(ctl, &msg) {
        Some(info) => info,
        None => {
            ctl.free(msg);
            return schedule(ctl, 0);
        }
    };
    info!(
        "fhs: ba={:?} clk27_2={:#x} lta={}",
        info.bdaddr, info.clk27_2, info.lt_addr
    );
    if let Proto::Monitor(mon) = &mut ctl.proto {
        mon.master = Some(info.bdaddr);
    }

    // No ID(3): the target answers for us. Start hopping in the next slot.
    ctl.sched.schedule(1, start_connection::<C>, 0, -3)?;
    ctl.send_to_host(msg)
}

fn start_connection<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    if canceled(ctl) {
        return Ok(());
    }
    let master = match &ctl.proto {
        Proto::Monitor(Monitor {
            master: Some(master),
            ..
        }) => *master,
        _ => return Ok(()),
    };

    ctl.set_state(State::Connected, Reason::PAGED)?;
    info!("monitoring piconet of {:?}", master);
    ctl.phy.set_mode(Mode::Slave, master.lap(), master.uap());
    ctl.proto = Proto::MonitorConnection;
    schedule_rx(ctl, 1)
}

fn connection_canceled<C: Config>(ctl: &Controller<C>) -> bool {
    match ctl.proto {
        Proto::MonitorConnection => ctl.state() != State::Connected,
        _ => true,
    }
}

/// Listens in the next slot, master or slave, `skip` slots later.
fn schedule_rx<C: Config>(ctl: &mut Controller<C>, skip: u8) -> Result<(), Error> {
    let odd = (ctl.phy.slave_clkn().raw() & 1) as u8;
    let delay = 2 * skip + (1 & 1u8.wrapping_sub(odd));
    rx::schedule(ctl, delay, rx_cb::<C>, RxFlags::PAYLOAD | RxFlags::RAW)
}

fn rx_cb<C: Config>(ctl: &mut Controller<C>, msg: Msg, time: i32) -> Result<(), Error> {
    if connection_canceled(ctl) {
        ctl.free(msg);
        return Ok(());
    }
    let (msg, report) = read_report(ctl, msg)?;

    let flags = report.flags();
    if flags.contains(PktFlags::HAS_PKT) && report.clkn().raw() & 2 == 0 {
        // Packets from the master resynchronize us.
        ctl.phy.adj_clkn_delay(time);
    }
    if flags.contains(PktFlags::HAS_HDR) && flags.contains(PktFlags::HAS_CRC) {
        trace!("mon: {:?} @{}", report.bb_hdr().packet_type(), report.clkn());
        ctl.send_to_host(msg)?;
    } else {
        ctl.free(msg);
    }
    schedule_rx(ctl, 0)
}
