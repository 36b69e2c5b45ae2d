//! Baseband configuration trait.

use crate::phy::Radio;
use crate::time::Timer;

/// Trait for baseband configurations.
///
/// This trait defines the hardware interface types used by the [`Controller`], and the tunables
/// that differ between boards.
///
/// Every application must define a type implementing this trait and supply it to the controller.
///
/// [`Controller`]: ../ctl/struct.Controller.html
pub trait Config {
    /// The tick timer: measures time within a CLKN tick and stretches ticks.
    type Timer: Timer;

    /// The 2.4 GHz transceiver.
    type Radio: Radio;

    /// Device address used until the host sets one.
    const DEFAULT_BDADDR: u64 = 0x1122_3344_5566;

    /// Class of device announced in FHS packets.
    const DEVICE_CLASS: u32 = 0x5a_020c;

    /// Number of sync word bit errors the radio tolerates by default.
    const MAX_AC_ERRORS: u8 = 1;
}
