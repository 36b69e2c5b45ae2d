//! Paging: establishing a connection as master.
//!
//! ```notrust
//! clk     -1        0        1    2          3           4         5    6
//! master: prep tx | tx id  | .. |          | rx/prep tx | tx fhs  | .. |
//! slave:          |        | .. | tx id(2) |            |         | .. | tx id(3)
//! ```
//!
//! The master sends ID packets with the paged device's access code until the device answers
//! with its own ID. The master then sends an FHS packet carrying its address and clock, and the
//! connection starts when the device acknowledges it with a third ID.

use super::{expired, master, read_report, slot_delay, Proto};
use crate::config::Config;
use crate::ctl::{Controller, Reason, State};
use crate::msg::Msg;
use crate::packet::fhs::{self, FhsFields, FHS_BUF_SIZE, FHS_SIZE};
use crate::packet::{BbHdr, HdrFlags, PacketType, PktFlags};
use crate::phy::Mode;
use crate::task::{rx, tx, RxFlags};
use crate::time::{Clkn, Ticks};
use crate::Error;

/// Paging gives up after this long.
pub const PAGING_DURATION: Ticks = Ticks::from_secs(45);

/// We transmit at CLK1-0 = 0.
const TX_PREPARE_IDX: u8 = 3;

pub struct Paging {
    clkn_start: Clkn,
    fhs_hdr: BbHdr,
    fhs: [u8; FHS_BUF_SIZE],
}

fn canceled<C: Config>(ctl: &Controller<C>) -> bool {
    ctl.state() != State::Page
}

/// Starts paging the device with the given LAP and UAP.
pub fn setup<C: Config>(ctl: &mut Controller<C>, lap: u32, uap: u8) -> Result<(), Error> {
    ctl.set_state(State::Page, Reason::SUCCESS)?;
    ctl.phy.set_mode(Mode::Paging, lap, uap);

    let mut paging = Paging {
        clkn_start: ctl.phy.master_clkn(),
        fhs_hdr: BbHdr::new(0, PacketType::Fhs, HdrFlags::empty()),
        fhs: [0; FHS_BUF_SIZE],
    };
    fhs::prepare_payload(
        &mut paging.fhs,
        &FhsFields {
            parity: ctl.phy.my_sw() & 0x3_ffff_ffff,
            bdaddr: ctl.phy.my_bdaddr(),
            class: C::DEVICE_CLASS,
            lt_addr: master::LT_ADDR,
            eir: false,
        },
    );
    ctl.proto = Proto::Paging(paging);
    ctl.sched.schedule(2, start_sync::<C>, 0, -3)
}

fn start_sync<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    if canceled(ctl) {
        return Ok(());
    }
    ctl.phy.cancel_clkn_delay();
    let delay = 4 + slot_delay(ctl.phy.master_clkn().slot_idx(), TX_PREPARE_IDX);
    let start = ctl.phy.master_clkn() + u32::from(delay);
    if let Proto::Paging(paging) = &mut ctl.proto {
        paging.clkn_start = start;
    }
    schedule(ctl, delay)
}

/// Sends ID(1) and listens for ID(2).
fn schedule<C: Config>(ctl: &mut Controller<C>, delay: u8) -> Result<(), Error> {
    let start = match &ctl.proto {
        Proto::Paging(paging) => paging.clkn_start,
        _ => return Ok(()),
    };
    if expired(ctl.phy.master_clkn(), start, PAGING_DURATION) {
        info!("paging timeout");
        return ctl.set_state(State::Standby, Reason::TIMEOUT);
    }

    tx::schedule(ctl, delay, None, None, &[])?;
    rx::schedule(ctl, delay + 2, rx_cb::<C>, RxFlags::empty())
}

/// ID(2) slot: answers with the FHS.
fn rx_cb<C: Config>(ctl: &mut Controller<C>, msg: Msg, _: i32) -> Result<(), Error> {
    if canceled(ctl) {
        ctl.free(msg);
        return Ok(());
    }
    let (msg, report) = read_report(ctl, msg)?;
    ctl.free(msg);

    let delay = slot_delay(ctl.phy.master_clkn().slot_idx(), TX_PREPARE_IDX);
    if !report.flags().contains(PktFlags::HAS_PKT) {
        return schedule(ctl, delay);
    }

    debug!("paging: ID(2)");
    // CLK27-2 at the start of the FHS transmission.
    let clk = ctl.phy.master_clkn() + u32::from(delay) + 1;
    let (hdr, data) = match &mut ctl.proto {
        Proto::Paging(paging) => {
            fhs::finalize_payload(&mut paging.fhs, clk.clk27_2());
            (paging.fhs_hdr, paging.fhs)
        }
        _ => return Ok(()),
    };
    tx::schedule(ctl, delay, None, Some(hdr), &data[..FHS_SIZE])?;
    rx::schedule(ctl, delay + 2, rx_ack_cb::<C>, RxFlags::empty())
}

/// ID(3) slot: the connection starts if the device acknowledged the FHS.
fn rx_ack_cb<C: Config>(ctl: &mut Controller<C>, msg: Msg, _: i32) -> Result<(), Error> {
    if canceled(ctl) {
        ctl.free(msg);
        return Ok(());
    }
    let (msg, report) = read_report(ctl, msg)?;
    ctl.free(msg);

    if report.flags().contains(PktFlags::HAS_PKT) {
        debug!("paging: ID(3)");
        master::init(ctl)
    } else {
        debug!("paging: no ID(3)");
        let delay = slot_delay(ctl.phy.master_clkn().slot_idx(), TX_PREPARE_IDX);
        schedule(ctl, delay)
    }
}
