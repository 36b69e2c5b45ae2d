//! Inquiry scan: answering inquiries.
//!
//! We listen for ID packets with the GIAC, answer each one with an FHS describing us, followed by
//! the extended inquiry response if the host configured one.

use super::{expired, page_scan::TX_PREPARE_IDX, slot_delay, Proto};
use crate::access_code::GIAC;
use crate::config::Config;
use crate::ctl::message;
use crate::ctl::{Controller, Reason, State};
use crate::packet::fhs::{self, FhsFields, FHS_BUF_SIZE, FHS_SIZE};
use crate::packet::{BbHdr, HdrFlags, PacketType, MAX_ACL_SIZE};
use crate::phy::Mode;
use crate::task::{scan, tx};
use crate::time::{Clkn, Ticks};
use crate::Error;

/// Inquiry scan gives up after this long.
pub const INQUIRY_SCAN_DURATION: Ticks = Ticks::from_secs(60);

pub struct InquiryScan {
    clkn_start: Clkn,
    fhs_hdr: BbHdr,
    fhs: [u8; FHS_BUF_SIZE],
}

fn canceled<C: Config>(ctl: &Controller<C>) -> bool {
    match ctl.proto {
        Proto::InquiryScan(_) => ctl.state() != State::InquiryScan,
        _ => true,
    }
}

/// Starts answering inquiries.
pub fn setup<C: Config>(ctl: &mut Controller<C>) -> Result<(), Error> {
    ctl.set_state(State::InquiryScan, Reason::SUCCESS)?;
    // The DCI (0) stands in for the UAP.
    ctl.phy.set_mode(Mode::InquiryScan, GIAC, 0);

    let mut scan = InquiryScan {
        clkn_start: ctl.phy.master_clkn() + 1,
        fhs_hdr: BbHdr::new(0, PacketType::Fhs, HdrFlags::empty()),
        fhs: [0; FHS_BUF_SIZE],
    };
    fhs::prepare_payload(
        &mut scan.fhs,
        &FhsFields {
            parity: ctl.phy.my_sw() & 0x3_ffff_ffff,
            bdaddr: ctl.phy.my_bdaddr(),
            class: C::DEVICE_CLASS,
            lt_addr: 0,
            eir: ctl.eir.is_some(),
        },
    );
    ctl.proto = Proto::InquiryScan(scan);
    schedule(ctl, 1)
}

fn schedule<C: Config>(ctl: &mut Controller<C>, delay: u8) -> Result<(), Error> {
    let start = match &ctl.proto {
        Proto::InquiryScan(scan) => scan.clkn_start,
        _ => return Ok(()),
    };
    if expired(ctl.phy.master_clkn(), start, INQUIRY_SCAN_DURATION) {
        info!("inquiry scan timeout");
        return ctl.set_state(State::Standby, Reason::TIMEOUT);
    }
    scan::schedule(ctl, delay, scan_cb::<C>)
}

/// ID heard: answers with the FHS in the next slave slot.
fn scan_cb<C: Config>(ctl: &mut Controller<C>, received: bool) -> Result<(), Error> {
    if canceled(ctl) {
        return Ok(());
    }
    if !received {
        return schedule(ctl, 0);
    }

    // Transmission starts at the next tick but one.
    let clk = ctl.phy.master_clkn() + 2;
    let (hdr, data) = match &mut ctl.proto {
        Proto::InquiryScan(scan) => {
            fhs::finalize_payload(&mut scan.fhs, clk.clk27_2());
            (scan.fhs_hdr, scan.fhs)
        }
        _ => return Ok(()),
    };
    let delay = slot_delay(ctl.phy.slave_clkn().slot_idx(), TX_PREPARE_IDX);
    tx::schedule(ctl, delay, Some(tx_fhs_cb::<C>), Some(hdr), &data[..FHS_SIZE])
}

fn tx_fhs_cb<C: Config>(ctl: &mut Controller<C>) -> Result<(), Error> {
    if canceled(ctl) {
        return Ok(());
    }

    let mut data = [0; MAX_ACL_SIZE];
    let eir = match &ctl.eir {
        Some(msg) => match message::tx_pkt(msg) {
            Ok((hdr, payload)) if payload.len() + 2 <= data.len() => {
                data[..payload.len()].copy_from_slice(payload);
                Some((hdr, payload.len()))
            }
            _ => {
                warn!("bad eir");
                None
            }
        },
        None => None,
    };

    match eir {
        Some((hdr, len)) => {
            let delay = slot_delay(ctl.phy.slave_clkn().slot_idx(), TX_PREPARE_IDX);
            tx::schedule(ctl, delay, Some(tx_eir_cb::<C>), Some(hdr), &data[..len])
        }
        None => schedule(ctl, 1),
    }
}

fn tx_eir_cb<C: Config>(ctl: &mut Controller<C>) -> Result<(), Error> {
    if canceled(ctl) {
        return Ok(());
    }
    schedule(ctl, 1)
}
