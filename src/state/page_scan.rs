//! Page scan: waiting to be connected as slave.
//!
//! We listen for ID packets with our own access code. When a master pages us, we answer with an
//! ID, receive its FHS (which gives us the master's address and clock), acknowledge it with a
//! last ID and join the piconet.

use super::{expired, slave, slot_delay, Proto};
use crate::bdaddr::BdAddr;
use crate::config::Config;
use crate::ctl::message::{rx_data, RxPktHeader};
use crate::ctl::{Controller, Reason, State};
use crate::msg::Msg;
use crate::packet::{fhs, PacketType, PktFlags};
use crate::phy::Mode;
use crate::task::{rx, scan, tx, RxFlags};
use crate::time::{Clkn, Ticks};
use crate::Error;

/// Page scan gives up after this long.
pub const PAGE_SCAN_DURATION: Ticks = Ticks::from_secs(60);

/// We transmit at CLK1-0 = 2.
pub(crate) const TX_PREPARE_IDX: u8 = 1;

pub struct PageScan {
    clkn_start: Clkn,
    /// Master that sent us its FHS.
    master: Option<(BdAddr, u8)>,
}

fn canceled<C: Config>(ctl: &Controller<C>) -> bool {
    match ctl.proto {
        Proto::PageScan(_) => ctl.state() != State::PageScan,
        _ => true,
    }
}

/// Starts scanning for pages.
pub fn setup<C: Config>(ctl: &mut Controller<C>) -> Result<(), Error> {
    ctl.set_state(State::PageScan, Reason::SUCCESS)?;
    let me = ctl.phy.my_bdaddr();
    ctl.phy.set_mode(Mode::PageScan, me.lap(), me.uap());
    ctl.proto = Proto::PageScan(PageScan {
        clkn_start: ctl.phy.master_clkn() + 1,
        master: None,
    });
    schedule(ctl, 1)
}

fn schedule<C: Config>(ctl: &mut Controller<C>, delay: u8) -> Result<(), Error> {
    let start = match &ctl.proto {
        Proto::PageScan(scan) => scan.clkn_start,
        _ => return Ok(()),
    };
    if expired(ctl.phy.master_clkn(), start, PAGE_SCAN_DURATION) {
        info!("page scan timeout");
        return ctl.set_state(State::Standby, Reason::TIMEOUT);
    }
    scan::schedule(ctl, delay, scan_cb::<C>)
}

/// ID(1) heard: the slave clock now is 0. Answers with ID(2) and listens for the FHS.
fn scan_cb<C: Config>(ctl: &mut Controller<C>, received: bool) -> Result<(), Error> {
    if canceled(ctl) {
        return Ok(());
    }
    if !received {
        return schedule(ctl, 0);
    }

    let delay = slot_delay(ctl.phy.slave_clkn().slot_idx(), TX_PREPARE_IDX);
    tx::schedule(ctl, delay, None, None, &[])?;
    rx::schedule(ctl, delay + 2, rx_fhs_cb::<C>, RxFlags::PAYLOAD)
}

/// Extracts the master's address, LT_ADDR and clock from a received FHS and synchronizes the
/// slave clock on it.
///
/// Returns `None` if `msg` does not hold a valid FHS.
pub(crate) fn receive_fhs<C: Config>(ctl: &mut Controller<C>, msg: &Msg) -> Option<fhs::FhsInfo> {
    let report = RxPktHeader::read(msg).ok()?;
    if !report.flags().contains(PktFlags::GOOD_CRC) {
        return None;
    }
    if report.bb_hdr().packet_type() != PacketType::Fhs {
        warn!("page scan: bad type {:?}", report.bb_hdr().packet_type());
        return None;
    }
    let info = fhs::decode(rx_data(msg)).ok()?;

    // The FHS was sent at the master's clock `clk27_2 << 2`, we received it at `report.clkn`.
    let elapsed = ctl.phy.slave_clkn().ticks_since(report.clkn());
    ctl.phy.set_slave_clkn(Clkn::new(info.clk27_2 << 2) + elapsed);
    Some(info)
}

fn rx_fhs_cb<C: Config>(ctl: &mut Controller<C>, msg: Msg, _: i32) -> Result<(), Error> {
    if canceled(ctl) {
        ctl.free(msg);
        return Ok(());
    }
    let info = receive_fhs(ctl, &msg);
    ctl.free(msg);
    let info = match info {
        Some(info) => info,
        None => return schedule(ctl, 0),
    };
    info!(
        "fhs: ba={:?} clk27_2={:#x} lta={}",
        info.bdaddr, info.clk27_2, info.lt_addr
    );
    if let Proto::PageScan(scan) = &mut ctl.proto {
        scan.master = Some((info.bdaddr, info.lt_addr));
    }

    // ID(3)
    let delay = slot_delay(ctl.phy.slave_clkn().slot_idx(), TX_PREPARE_IDX);
    tx::schedule(ctl, delay, Some(tx_cb::<C>), None, &[])
}

fn tx_cb<C: Config>(ctl: &mut Controller<C>) -> Result<(), Error> {
    if canceled(ctl) {
        return Ok(());
    }
    match &ctl.proto {
        Proto::PageScan(PageScan {
            master: Some((bdaddr, lt_addr)),
            ..
        }) => {
            let (bdaddr, lt_addr) = (*bdaddr, *lt_addr);
            slave::init(ctl, bdaddr, lt_addr)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::mock::{self, RadioState};

    #[test]
    fn answers_id() {
        let mut ctl = mock::controller();
        setup(&mut ctl).unwrap();
        assert_eq!(ctl.phy.mode(), Mode::PageScan);
        mock::run_ticks(&mut ctl, 2);
        assert_eq!(ctl.phy.radio.state, RadioState::Rx);

        ctl.phy.radio.receive_next(&[0x55; 4]);
        mock::run_ticks(&mut ctl, 1);
        assert_eq!(ctl.phy.slave_clkn(), Clkn::new(0));
        assert!(ctl.rx_task.is_busy());

        // ID(2) in the next slave slot.
        mock::run_ticks(&mut ctl, 2);
        assert_eq!(ctl.phy.radio.tx_count, 1);
        assert_eq!(ctl.phy.slave_clkn().slot_idx(), 2);
        assert_eq!(ctl.phy.radio.fifo, ctl.phy.sw_hi().to_vec());

        // No FHS: back to scanning.
        mock::run_ticks(&mut ctl, 4);
        assert!(ctl.scan_task.is_busy());
        assert_eq!(ctl.state(), State::PageScan);
    }

    #[test]
    fn idle_cancels() {
        let mut ctl = mock::controller();
        setup(&mut ctl).unwrap();
        mock::run_ticks(&mut ctl, 3);
        ctl.set_state(State::Standby, Reason::SUCCESS).unwrap();
        assert!(!ctl.scan_task.is_busy());
        mock::run_ticks(&mut ctl, 16);
        assert_eq!(ctl.phy.radio.state, RadioState::Idle);
    }
}
