//! Connection as master.
//!
//! The master transmits at CLK1-0 = 0 and listens at CLK1-0 = 2 of its native clock. It sends a
//! packet in every master slot: queued ACL data, or a `POLL` when there is nothing to send.

use super::{link_rx, slot_delay, Proto};
use crate::config::Config;
use crate::ctl::{Controller, Reason, State};
use crate::link::Link;
use crate::msg::Msg;
use crate::packet::MAX_ACL_SIZE;
use crate::phy::Mode;
use crate::task::{rx, tx, RxFlags};
use crate::Error;

/// Logical transport address given to the slave.
pub const LT_ADDR: u8 = 1;

const TX_PREPARE_IDX: u8 = 3;
const RX_PREPARE_IDX: u8 = 1;

fn canceled<C: Config>(ctl: &Controller<C>) -> bool {
    match ctl.proto {
        Proto::Master(_) => ctl.state() != State::Connected,
        _ => true,
    }
}

/// Starts the connection, after a successful page.
pub fn init<C: Config>(ctl: &mut Controller<C>) -> Result<(), Error> {
    ctl.set_state(State::Connected, Reason::PAGED)?;
    let me = ctl.phy.my_bdaddr();
    ctl.phy.set_mode(Mode::Master, me.lap(), me.uap());
    ctl.proto = Proto::Master(Link::new(true, LT_ADDR, ctl.phy.master_clkn()));
    schedule_tx(ctl, 1)
}

/// Sends the next packet in the master slot, `skip` frames later.
fn schedule_tx<C: Config>(ctl: &mut Controller<C>, skip: u8) -> Result<(), Error> {
    let delay = 4 * skip + slot_delay(ctl.phy.master_clkn().slot_idx(), TX_PREPARE_IDX);
    let mut data = [0; MAX_ACL_SIZE];
    let (hdr, len) = match &mut ctl.proto {
        Proto::Master(link) => link.prepare_tx(&mut ctl.acl_q, &mut ctl.pool, &mut data),
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

fn schedule_rx<C: Config>(ctl: &mut Controller<C>, skip: u8) -> Result<(), Error> {
    let delay = 4 * skip + slot_delay(ctl.phy.master_clkn().slot_idx(), RX_PREPARE_IDX);
    rx::schedule(ctl, delay, rx_cb::<C>, RxFlags::PAYLOAD)
}

fn rx_cb<C: Config>(ctl: &mut Controller<C>, msg: Msg, _: i32) -> Result<(), Error> {
    if canceled(ctl) {
        ctl.free(msg);
        return Ok(());
    }
    match link_rx(ctl, msg)? {
        // The master always sends in the next slot.
        Some(_) => schedule_tx(ctl, 0),
        None => Ok(()),
    }
}
