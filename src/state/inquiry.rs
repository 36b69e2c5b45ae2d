//! Inquiry: discovering devices in inquiry scan.
//!
//! ID packets with the GIAC are sent in every master slot. Devices answer with an FHS packet
//! in the following slave slot, possibly followed by an extended inquiry response two slots
//! later. Every response with a good CRC is forwarded to the host.

use super::{expired, read_report, slot_delay, Proto};
use crate::access_code::GIAC;
use crate::config::Config;
use crate::ctl::{Controller, Reason, State};
use crate::msg::Msg;
use crate::packet::{PacketType, PktFlags};
use crate::phy::Mode;
use crate::task::{rx, tx, RxFlags};
use crate::time::{Clkn, Ticks};
use crate::Error;

/// Inquiry gives up after this long.
pub const INQUIRY_DURATION: Ticks = Ticks::from_secs(60);

/// We transmit at CLK1-0 = 0.
const TX_PREPARE_IDX: u8 = 3;

pub struct Inquiry {
    clkn_start: Clkn,
}

fn canceled<C: Config>(ctl: &Controller<C>) -> bool {
    ctl.state() != State::Inquiry
}

/// Starts an inquiry.
pub fn setup<C: Config>(ctl: &mut Controller<C>) -> Result<(), Error> {
    ctl.set_state(State::Inquiry, Reason::SUCCESS)?;
    ctl.phy.set_mode(Mode::Inquiry, GIAC, 0);
    ctl.proto = Proto::Inquiry(Inquiry {
        clkn_start: ctl.phy.master_clkn(),
    });
    ctl.sched.schedule(2, start_sync::<C>, 0, -3)
}

/// Aligns on the master clock and starts the first exchange.
fn start_sync<C: Config>(ctl: &mut Controller<C>, _: u16) -> Result<(), Error> {
    if canceled(ctl) {
        return Ok(());
    }
    // A previous connection as slave may have shifted the timebase.
    ctl.phy.cancel_clkn_delay();
    let delay = 4 + slot_delay(ctl.phy.master_clkn().slot_idx(), TX_PREPARE_IDX);
    let start = ctl.phy.master_clkn() + u32::from(delay);
    if let Proto::Inquiry(inq) = &mut ctl.proto {
        inq.clkn_start = start;
    }
    schedule(ctl, delay)
}

/// Sends an ID packet and listens for the response.
fn schedule<C: Config>(ctl: &mut Controller<C>, delay: u8) -> Result<(), Error> {
    let start = match &ctl.proto {
        Proto::Inquiry(inq) => inq.clkn_start,
        _ => return Ok(()),
    };
    if expired(ctl.phy.master_clkn(), start, INQUIRY_DURATION) {
        info!("inquiry timeout");
        return ctl.set_state(State::Standby, Reason::TIMEOUT);
    }

    tx::schedule(ctl, delay, None, None, &[])?;
    rx::schedule(ctl, delay + 2, rx_cb::<C>, RxFlags::PAYLOAD)
}

fn rx_cb<C: Config>(ctl: &mut Controller<C>, msg: Msg, _: i32) -> Result<(), Error> {
    if canceled(ctl) {
        ctl.free(msg);
        return Ok(());
    }
    let (msg, report) = read_report(ctl, msg)?;
    let next = slot_delay(ctl.phy.master_clkn().slot_idx(), TX_PREPARE_IDX);

    if !report.flags().contains(PktFlags::GOOD_CRC) {
        ctl.free(msg);
        return schedule(ctl, next);
    }

    if report.bb_hdr().packet_type() == PacketType::Fhs {
        debug!("inquiry: FHS");
        // An EIR packet may follow in the next slave slot.
        rx::schedule(ctl, 2, rx_cb::<C>, RxFlags::PAYLOAD)?;
    } else {
        schedule(ctl, next)?;
    }
    ctl.send_to_host(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctl::message::{msg_type, MsgType};
    use crate::msg::POOL_SIZE;
    use crate::phy::mock;

    #[test]
    fn sends_ids_until_timeout() {
        let mut ctl = mock::controller();
        setup(&mut ctl).unwrap();
        let resp = ctl.host_dequeue().unwrap();
        assert_eq!(msg_type(&resp).unwrap(), MsgType::StateResp);
        ctl.free(resp);

        mock::run_ticks(&mut ctl, 40);
        // One ID per frame, after 2 ticks of sync and 4 of delay.
        let sent = ctl.phy.radio.tx_count;
        assert!(sent >= 7 && sent <= 9, "{} IDs", sent);
        assert!(ctl.phy.radio.fifo == ctl.phy.sw_hi().to_vec());
        assert_eq!(ctl.state(), State::Inquiry);

        mock::run_ticks(&mut ctl, INQUIRY_DURATION.raw() as usize);
        assert_eq!(ctl.state(), State::Standby);
        let resp = ctl.host_dequeue().unwrap();
        assert_eq!(&resp.data()[4..6], &[State::Standby as u8, Reason::TIMEOUT.0]);
        ctl.free(resp);
        assert_eq!(ctl.pool.available(), POOL_SIZE);
    }
}
