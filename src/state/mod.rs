//! Baseband state machines.
//!
//! Each state is a chain of scheduler items and task callbacks. A state is entered through its
//! `setup` (or `init`) function, which switches the PHY mode, reports the new state to the host and
//! schedules the first task. Every callback checks first whether its state is still current: the
//! host may have moved the controller to another state in the meantime, in which case the
//! callback only releases what it was handed.
//!
//! The data of the current state machine lives in [`Proto`].
//!
//! [`Proto`]: enum.Proto.html

pub mod inquiry;
pub mod inquiry_scan;
pub mod master;
pub mod monitor;
pub mod page_scan;
pub mod paging;
pub mod slave;

use crate::config::Config;
use crate::ctl::message::RxPktHeader;
use crate::ctl::{Controller, Reason, State};
use crate::link::{Action, Link};
use crate::msg::Msg;
use crate::time::{Clkn, Ticks};
use crate::Error;
use core::mem;

/// Data of the running state machine.
pub enum Proto {
    Idle,
    Inquiry(inquiry::Inquiry),
    Paging(paging::Paging),
    InquiryScan(inquiry_scan::InquiryScan),
    PageScan(page_scan::PageScan),
    Master(Link),
    Slave(Link),
    /// Page scan for a specific master, in order to follow its connection.
    Monitor(monitor::Monitor),
    /// Passively following a connection.
    MonitorConnection,
}

impl Proto {
    /// Takes the state machine data, leaving `Idle` behind.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Proto::Idle)
    }

    /// Returns the link of a connection state.
    pub fn into_link(self) -> Option<Link> {
        match self {
            Proto::Master(link) | Proto::Slave(link) => Some(link),
            _ => None,
        }
    }
}

/// Returns the number of ticks from the slot index `idx` until the slot index `target` (both
/// 0..=3), 0 if they are equal.
///
/// Called from a tick with `idx` as the current index, scheduling an item this many ticks ahead
/// runs it at `target`.
pub(crate) fn slot_delay(idx: u8, target: u8) -> u8 {
    3 & target.wrapping_sub(idx)
}

/// Returns whether `duration` has elapsed between `start` and `now`.
///
/// `start` may lie a few ticks after `now`, which does not count as expired.
pub(crate) fn expired(now: Clkn, start: Clkn, duration: Ticks) -> bool {
    let elapsed = now.ticks_since(start);
    elapsed.raw() < 1 << 27 && elapsed >= duration
}

/// Reads the packet report of a received message, freeing the message if it is malformed.
pub(crate) fn read_report<C: Config>(ctl: &mut Controller<C>, msg: Msg) -> Result<(Msg, RxPktHeader), Error> {
    match RxPktHeader::read(&msg) {
        Ok(report) => Ok((msg, report)),
        Err(e) => {
            ctl.free(msg);
            Err(e)
        }
    }
}

/// Passes a received packet to the link layer of the current connection.
///
/// Reports the first packet and the loss of the connection to the host. Returns the link's
/// decision, or `None` if the connection is gone.
pub(crate) fn link_rx<C: Config>(ctl: &mut Controller<C>, msg: Msg) -> Result<Option<Action>, Error> {
    let now = ctl.phy.cur_clkn();
    let (outcome, lt_addr) = match &mut ctl.proto {
        Proto::Master(link) | Proto::Slave(link) => {
            let outcome = link.process_rx(now, msg, &mut ctl.pool, &mut ctl.tx_q)?;
            (outcome, link.lt_addr())
        }
        _ => {
            ctl.free(msg);
            return Ok(None);
        }
    };

    if outcome.action == Action::Timeout {
        info!("link: supervision timeout");
        ctl.set_state(State::Standby, Reason::TIMEOUT)?;
        return Ok(None);
    }
    if outcome.connected {
        ctl.set_state(State::Connected, Reason::connected(lt_addr))?;
    }
    Ok(Some(outcome.action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays() {
        assert_eq!(slot_delay(0, 3), 3);
        assert_eq!(slot_delay(3, 3), 0);
        assert_eq!(slot_delay(2, 1), 3);
        assert_eq!(slot_delay(3, 1), 2);
    }

    #[test]
    fn expiry() {
        let start = Clkn::new(100);
        assert!(!expired(Clkn::new(99), start, Ticks::new(10)));
        assert!(!expired(Clkn::new(109), start, Ticks::new(10)));
        assert!(expired(Clkn::new(110), start, Ticks::new(10)));
        // Across the 28-bit wrap.
        let start = Clkn::new(Clkn::MASK - 4);
        assert!(!expired(Clkn::new(4), start, Ticks::new(10)));
        assert!(expired(Clkn::new(5), start, Ticks::new(10)));
    }
}
