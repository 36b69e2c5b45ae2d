//! Radio slot tasks.
//!
//! A task turns one radio operation into a chain of TDMA items:
//!
//! * [`rx`] receives one packet (or just an ID) and hands a `RX_PKT` message to its callback.
//! * [`tx`] transmits one packet, feeding the radio FIFO from its interrupt.
//! * [`scan`] listens for a sync word over several slots, for the scan states.
//!
//! Each task runs at most once at a time. Protocol states chain operations by scheduling the next
//! task from the callback of the previous one.
//!
//! [`rx`]: rx/index.html
//! [`tx`]: tx/index.html
//! [`scan`]: scan/index.html

pub mod rx;
pub mod scan;
pub mod tx;

pub use self::rx::{RxCallback, RxFlags, RxTask};
pub use self::scan::{ScanCallback, ScanTask};
pub use self::tx::{TxCallback, TxTask};

/// Deadline for the end of a reception or transmission, in timer units since the tick start.
pub const WAIT_RX_MAX: u32 = 1500;
