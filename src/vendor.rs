//! USB vendor requests on the control endpoint.
//!
//! These cover the board housekeeping shared with the other Ubertooth firmwares (LEDs, power
//! amplifier, identification, bootloader entry). The baseband itself is only driven through
//! [`transport`]; the one vendor request reaching it is a reset.
//!
//! [`transport`]: ../transport/index.html

use crate::bytes::ByteWriter;
use crate::config::Config;
use crate::ctl::message::{self, MsgType};
use crate::ctl::Controller;
use crate::Error;

/// Size of the response buffer the USB stack provides.
pub const RESPONSE_SIZE: usize = 258;

/// Firmware revision reported by `GET_REV_NUM`.
pub const REVISION: &str = env!("CARGO_PKG_VERSION");

enum_with_unknown! {
    /// Vendor request ids handled by this firmware.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum VendorRequest(u8) {
        Ping = 0,
        GetUsrLed = 3,
        SetUsrLed = 4,
        GetRxLed = 5,
        SetRxLed = 6,
        GetTxLed = 7,
        SetTxLed = 8,
        Get1v8 = 9,
        Set1v8 = 10,
        Reset = 13,
        GetSerial = 14,
        GetPartNum = 15,
        GetPaEn = 16,
        SetPaEn = 17,
        GetHgm = 18,
        SetHgm = 19,
        SetIsp = 24,
        Flash = 25,
        GetPaLevel = 28,
        SetPaLevel = 29,
        GetRevNum = 33,
        GetBoardId = 35,
    }
}

/// The board LEDs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Led {
    User,
    Rx,
    Tx,
}

/// Board support for the vendor requests.
///
/// Getters return the current state of an output pin, setters drive it.
pub trait Board {
    fn led(&self, led: Led) -> bool;
    fn set_led(&mut self, led: Led, on: bool);

    /// Radio 1.8 V supply.
    fn cc1v8(&self) -> bool;
    fn set_cc1v8(&mut self, on: bool);

    /// Power amplifier enable.
    fn pa_en(&self) -> bool;
    fn set_pa_en(&mut self, on: bool);

    /// LNA high gain mode.
    fn hgm(&self) -> bool;
    fn set_hgm(&mut self, on: bool);

    /// Output power level of the radio front end, 0 to 7.
    fn pa_level(&self) -> u8;
    fn set_pa_level(&mut self, level: u8);

    /// Reads the MCU part number through the ROM's in-application programming interface.
    ///
    /// Returns the IAP status code and the part number.
    fn part_num(&mut self) -> (u8, u32);

    /// Reads the 128-bit device serial number. Returns the IAP status code and the serial.
    fn serial(&mut self) -> (u8, [u32; 4]);

    /// Reboots into the ISP bootloader. Usually does not return.
    fn enter_isp(&mut self);

    /// Makes the next reset enter the DFU bootloader.
    fn request_dfu(&mut self);

    fn board_id(&self) -> u8;
}

/// Parameters of a vendor request (the setup packet's `wValue`, `wIndex` and `wLength`).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

/// Handles a vendor request, writing the response into `data`.
///
/// Returns the response length, or `None` if the request is not handled (the USB stack stalls
/// the endpoint then).
pub fn handle<C: Config, B: Board>(
    ctl: &mut Controller<C>,
    board: &mut B,
    request: u8,
    params: Params,
    data: &mut [u8],
) -> Option<usize> {
    let on = params.value != 0;
    let mut resp = ByteWriter::new(data);
    let space = resp.space_left();

    let written = match VendorRequest::from(request) {
        VendorRequest::Ping => Ok(()),
        VendorRequest::GetUsrLed => resp.write_u8(board.led(Led::User).into()),
        VendorRequest::SetUsrLed => {
            board.set_led(Led::User, on);
            Ok(())
        }
        VendorRequest::GetRxLed => resp.write_u8(board.led(Led::Rx).into()),
        VendorRequest::SetRxLed => {
            board.set_led(Led::Rx, on);
            Ok(())
        }
        VendorRequest::GetTxLed => resp.write_u8(board.led(Led::Tx).into()),
        VendorRequest::SetTxLed => {
            board.set_led(Led::Tx, on);
            Ok(())
        }
        VendorRequest::Get1v8 => resp.write_u8(board.cc1v8().into()),
        VendorRequest::Set1v8 => {
            board.set_cc1v8(on);
            Ok(())
        }
        VendorRequest::GetPartNum => {
            let (status, part) = board.part_num();
            resp.write_u8(status).and_then(|_| resp.write_u32_le(part))
        }
        VendorRequest::GetSerial => {
            let (status, serial) = board.serial();
            let mut r = resp.write_u8(status);
            for word in &serial {
                r = r.and_then(|_| resp.write_u32_le(*word));
            }
            r
        }
        VendorRequest::Reset => {
            request_reset(ctl);
            Ok(())
        }
        VendorRequest::GetPaEn => resp.write_u8(board.pa_en().into()),
        VendorRequest::SetPaEn => {
            board.set_pa_en(on);
            Ok(())
        }
        VendorRequest::GetHgm => resp.write_u8(board.hgm().into()),
        VendorRequest::SetHgm => {
            board.set_hgm(on);
            Ok(())
        }
        VendorRequest::GetPaLevel => resp.write_u8(board.pa_level() & 0x7),
        VendorRequest::SetPaLevel => {
            if params.value >= 8 {
                return None;
            }
            board.set_pa_level(params.value as u8);
            Ok(())
        }
        VendorRequest::SetIsp => {
            board.enter_isp();
            Ok(())
        }
        VendorRequest::Flash => {
            board.request_dfu();
            request_reset(ctl);
            Ok(())
        }
        VendorRequest::GetRevNum => {
            let rev = REVISION.as_bytes();
            let rev = &rev[..rev.len().min(usize::from(u8::max_value()))];
            resp.write_u16_le(0)
                .and_then(|_| resp.write_u8(rev.len() as u8))
                .and_then(|_| resp.write_slice(rev))
        }
        VendorRequest::GetBoardId => resp.write_u8(board.board_id()),
        VendorRequest::Unknown(id) => {
            debug!("unhandled vendor request {}", id);
            return None;
        }
    };

    match written {
        Ok(()) => Some(space - resp.space_left()),
        Err(_) => {
            warn!("vendor request {}: response too long", request);
            None
        }
    }
}

/// Has the controller reset itself the next time it does its work.
fn request_reset<C: Config>(ctl: &mut Controller<C>) {
    let result: Result<(), Error> = message::alloc(&mut ctl.pool, MsgType::ResetReq)
        .and_then(|msg| ctl.host_enqueue(msg));
    if let Err(e) = result {
        warn!("reset request dropped: {}", e);
    }
}
