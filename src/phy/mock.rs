//! Radio and timer stand-ins for tests.

use super::Radio;
use crate::bits::reverse8;
use crate::config::Config;
use crate::ctl::Controller;
use crate::time::{Timer, TICK_LENGTH};
use core::cell::Cell;
use std::vec::Vec;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RadioState {
    Idle,
    FsOn,
    Rx,
    Tx,
}

/// A radio that records what is transmitted and replays canned air bytes on receive.
pub struct MockRadio {
    pub state: RadioState,
    pub freq: u16,
    pub tx_tuned: bool,
    pub sync: u32,
    pub freq_offset: u8,
    pub max_ac_errors: u8,
    /// Whether the synthesizer reports lock after `fs_on`.
    pub locks: bool,
    /// Everything pushed into the TX FIFO, in air order.
    pub fifo: Vec<u8>,
    pub fifo_irq: bool,
    pub tx_count: usize,
    /// Bytes following the 32 low sync word bits on air, delivered by the next reception.
    ///
    /// An empty buffer means no sync word is detected.
    pub air: Vec<u8>,
    air_pos: usize,
    dma: bool,
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            state: RadioState::Idle,
            freq: 0,
            tx_tuned: false,
            sync: 0,
            freq_offset: 0,
            max_ac_errors: 0,
            locks: true,
            fifo: Vec::new(),
            fifo_irq: false,
            tx_count: 0,
            air: Vec::new(),
            air_pos: 0,
            dma: false,
        }
    }

    /// Queues a transmission captured from another controller for reception.
    ///
    /// The radio keeps demodulating noise after the end of a packet, which is modelled as zero
    /// padding.
    pub fn receive_next(&mut self, air: &[u8]) {
        self.air = air.to_vec();
        self.air.extend_from_slice(&[0; 32]);
        self.air_pos = 0;
    }
}

impl Radio for MockRadio {
    fn tune(&mut self, mhz: u16, tx: bool) {
        self.freq = mhz;
        self.tx_tuned = tx;
    }

    fn fs_on(&mut self) {
        self.state = RadioState::FsOn;
    }

    fn configure_rx(&mut self, max_ac_errors: u8) {
        self.max_ac_errors = max_ac_errors;
    }

    fn configure_tx(&mut self) {
        self.fifo.clear();
    }

    fn start_rx(&mut self) {
        self.state = RadioState::Rx;
    }

    fn start_tx(&mut self) {
        self.state = RadioState::Tx;
        self.tx_count += 1;
    }

    fn idle(&mut self) {
        if self.state == RadioState::Rx {
            // Whatever was on air is gone once the receiver stops.
            self.air.clear();
        }
        self.state = RadioState::Idle;
    }

    fn is_receiving(&self) -> bool {
        self.state == RadioState::Rx
    }

    fn fs_locked(&self) -> bool {
        self.locks && self.state == RadioState::FsOn
    }

    fn tx_done(&self) -> bool {
        true
    }

    fn sync_detected(&self) -> bool {
        self.state == RadioState::Rx && !self.air.is_empty()
    }

    fn set_sync(&mut self, sync: u32) {
        self.sync = sync;
    }

    fn set_freq_offset(&mut self, offset: u8) {
        self.freq_offset = offset;
    }

    fn fifo_write(&mut self, data: &[u8]) {
        self.fifo.extend_from_slice(data);
    }

    fn enable_fifo_irq(&mut self) {
        self.fifo_irq = true;
    }

    fn disable_fifo_irq(&mut self) {
        self.fifo_irq = false;
    }

    fn rx_dma_start(&mut self) {
        self.dma = true;
        self.air_pos = 0;
    }

    fn rx_dma_read(&mut self, dst: &mut [u8]) -> usize {
        if !self.dma || self.air.is_empty() {
            return 0;
        }
        let n = dst.len().min(self.air.len() - self.air_pos);
        for (d, s) in dst.iter_mut().zip(&self.air[self.air_pos..self.air_pos + n]) {
            *d = reverse8(*s);
        }
        self.air_pos += n;
        n
    }

    fn rx_dma_stop(&mut self) {
        if self.dma {
            // A reception consumes the canned packet.
            self.air.clear();
        }
        self.dma = false;
    }
}

/// A tick timer advancing by a fixed step whenever it is read.
pub struct MockTimer {
    now: Cell<u32>,
    pub step: u32,
    pub tick_lengths: Vec<u32>,
}

impl MockTimer {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0),
            step: 10,
            tick_lengths: Vec::new(),
        }
    }

    /// Start of a new tick.
    pub fn restart(&self) {
        self.now.set(0);
    }
}

impl Timer for MockTimer {
    fn offset(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }

    fn set_tick_length(&mut self, units: u32) {
        debug_assert!(units > 0 && units < 3 * TICK_LENGTH);
        self.tick_lengths.push(units);
    }
}

pub struct MockConfig;

impl Config for MockConfig {
    type Timer = MockTimer;
    type Radio = MockRadio;
}

/// Creates a controller on a mock radio and timer.
pub fn controller() -> Controller<MockConfig> {
    Controller::new(MockRadio::new(), MockTimer::new())
}

/// Runs `n` ticks, servicing the FIFO interrupt after each one.
pub fn run_ticks(ctl: &mut Controller<MockConfig>, n: usize) {
    for _ in 0..n {
        ctl.phy.timer.restart();
        ctl.tick().unwrap();
        for _ in 0..64 {
            if !ctl.phy.radio.fifo_irq {
                break;
            }
            ctl.fifo_irq();
        }
    }
}
