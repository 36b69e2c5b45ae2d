//! A Bluetooth BR/EDR baseband for the Ubertooth.
//!
//! Implements enough of the *Bluetooth Core Specification* baseband to discover devices, page and
//! be paged, and hold an ACL connection as master or slave. It also has a monitor mode that
//! follows the connection being established to another device.
//!
//! # Using the baseband
//!
//! The baseband is hardware-agnostic: the [`Radio`] and [`Timer`] traits abstract the CC2400
//! transceiver and the tick timer, and are selected through a [`Config`] implementation. The
//! application owns a [`Controller`] and drives it from three places:
//!
//! * The CLKN tick interrupt (every 312.5 µs) calls [`Controller::tick`], which runs the slot
//!   tasks scheduled for the tick.
//! * The radio FIFO interrupt calls [`Controller::fifo_irq`] while a packet is being sent.
//! * The main loop calls [`Controller::work`] to process host requests, and moves messages from
//!   and to the host over USB with a [`Transport`].
//!
//! [`Radio`]: phy/trait.Radio.html
//! [`Timer`]: time/trait.Timer.html
//! [`Config`]: config/trait.Config.html
//! [`Controller`]: ctl/struct.Controller.html
//! [`Controller::tick`]: ctl/struct.Controller.html#method.tick
//! [`Controller::fifo_irq`]: ctl/struct.Controller.html#method.fifo_irq
//! [`Controller::work`]: ctl/struct.Controller.html#method.work
//! [`Transport`]: transport/struct.Transport.html

// We're `#[no_std]`, except when we're testing
#![cfg_attr(not(test), no_std)]
// Deny a few warnings in doctests, since rustdoc `allow`s many warnings by default
#![doc(test(attr(deny(unused_imports, unused_must_use))))]
#![warn(rust_2018_idioms)]
// The claims of this lint are dubious, disable it
#![allow(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
mod log;
#[macro_use]
mod utils;
pub mod access_code;
pub mod bdaddr;
pub mod bits;
pub mod bytes;
pub mod coding;
pub mod config;
pub mod ctl;
mod error;
pub mod hop;
pub mod link;
pub mod msg;
pub mod packet;
pub mod phy;
pub mod state;
pub mod task;
pub mod tdma;
pub mod time;
pub mod transport;
pub mod vendor;

pub use self::error::Error;
