//! Connection as slave.
//!
//! The slave runs on its estimate of the master's clock (the slave clock), listens at
//! CLK1-0 = 0 and answers at CLK1-0 = 2 when the master polled it or a payload needs to be
//! acknowledged. Every packet from the master realigns the slave clock on its arrival time.

use super::{link_rx, read_report, slot_delay, Proto};
use crate::bdaddr::BdAddr;
use crate::config::Config;
use crate::ctl::{Controller, Reason, State};
use crate::link::{Action, Link};
use crate::msg::Msg;
use crate::packet::{PktFlags, MAX_ACL_SIZE};
use crate::phy::Mode;
use crate::task::{rx, tx, RxFlags};
use crate::Error;

const TX_PREPARE_IDX: u8 = 1;
const RX_PREPARE_IDX: u8 = 3;

fn canceled<C: Config>(ctl: &Controller<C>) -> bool {
    match ctl.proto {
        Proto::Slave(_) => ctl.state() != State::Connected,
        _ => true,
    }
}

/// Joins the piconet of `master` with the logical transport address `lt_addr`, after a
/// successful page scan.
pub fn init<C: Config>(ctl: &mut Controller<C>, master: BdAddr, lt_addr: u8) -> Result<(), Error> {
    ctl.set_state(State::Connected, Reason::PAGED)?;
    info!("slave of {:?}, lt_addr {}", master, lt_addr);
    ctl.phy.set_mode(Mode::Slave, master.lap(), master.uap());
    ctl.proto = Proto::Slave(Link::new(false, lt_addr, ctl.phy.slave_clkn()));
    schedule_rx(ctl, 1)
}

fn schedule_tx<C: Config>(ctl: &mut Controller<C>, skip: u8) -> Result<(), Error> {
    let delay = 4 * skip + slot_delay(ctl.phy.slave_clkn().slot_idx(), TX_PREPARE_IDX);
    let mut data = [0; MAX_ACL_SIZE];
    let (hdr, len) = match &mut ctl.proto {
        Proto::Slave(link) => link.prepare_tx(&mut ctl.acl_q, &mut ctl.pool, &mut data),
        _ => return Ok(()),
    };
    tx::schedule(ctl, delay, Some(tx_cb::<C>), Some(hdr), &data[..len])
}

fn tx_cb<C: Config>(ctl: &mut Controller<C>) -> Result<(), Error> {
    if canceled(ctl) {
        return Ok(());
    }
    schedule_rx(ctl, 0)
}

/// Listens in the next master slot, `skip` frames later.
fn schedule_rx<C: Config>(ctl: &mut Controller<C>, skip: u8) -> Result<(), Error> {
    let delay = 4 * skip + slot_delay(ctl.phy.slave_clkn().slot_idx(), RX_PREPARE_IDX);
    rx::schedule(ctl, delay, rx_cb::<C>, RxFlags::PAYLOAD)
}

fn rx_cb<C: Config>(ctl: &mut Controller<C>, msg: Msg, time: i32) -> Result<(), Error> {
    if canceled(ctl) {
        ctl.free(msg);
        return Ok(());
    }
    let (msg, report) = read_report(ctl, msg)?;
    if report.flags().contains(PktFlags::HAS_PKT) {
        ctl.phy.adj_clkn_delay(time);
    }

    match link_rx(ctl, msg)? {
        Some(Action::Transmit) => schedule_tx(ctl, 0),
        Some(_) => schedule_rx(ctl, 0),
        None => Ok(()),
    }
}
