//! Physical layer context: mode, clocks, hopping and the radio.
//!
//! The [`Phy`] owns the radio and the tick timer, and tracks everything the slot tasks need to
//! put a packet on the right channel at the right time:
//!
//! * The two native clocks. `master_clkn` is the device's own clock. `slave_clkn` is the estimate
//!   of a remote master's clock, realigned on every received packet by stretching or shrinking
//!   the current tick (see [`adj_clkn_delay`]).
//! * The channel access code (sync word and trailer) of the piconet or procedure in progress.
//! * The hop sequence selector, keyed on the channel's LAP and UAP.
//! * One-shot timers on the native clock, used to switch AFH maps at an agreed instant.
//!
//! [`Phy`]: struct.Phy.html
//! [`adj_clkn_delay`]: struct.Phy.html#method.adj_clkn_delay

pub mod radio;
pub mod timers;

#[cfg(test)]
pub(crate) mod mock;

pub use self::radio::{Radio, BASE_FREQ_MHZ, EXPECTED_RX_OFFSET};

use self::timers::Timers;
use crate::access_code;
use crate::bdaddr::BdAddr;
use crate::bits::reverse32;
use crate::config::Config;
use crate::hop::{Channel, HopState};
use crate::time::{Clkn, Timer, TICK_LENGTH};
use crate::utils::Hex;
use crate::Error;

/// Default number of sync word bit errors tolerated by the receiver.
pub const MAX_AC_ERRORS_DEFAULT: u8 = 1;

/// Operating mode of the baseband, selecting the hop sequence, the clock and the whitening seed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    Inquiry,
    Paging,
    InquiryScan,
    PageScan,
    Master,
    Slave,
}

impl Mode {
    /// Whether this mode follows the inquiry/page hopping sequence.
    pub fn is_inquiry_hopping(&self) -> bool {
        match self {
            Mode::Inquiry | Mode::Paging | Mode::InquiryScan | Mode::PageScan => true,
            Mode::Master | Mode::Slave => false,
        }
    }

    /// Whether this mode runs on the slave clock.
    pub fn uses_slave_clock(&self) -> bool {
        match self {
            Mode::InquiryScan | Mode::PageScan | Mode::Slave => true,
            Mode::Inquiry | Mode::Paging | Mode::Master => false,
        }
    }
}

/// Deferred PHY reconfigurations, performed by one-shot timers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimerAction {
    /// Apply an AFH configuration (enable flag followed by the 10-byte channel map).
    ConfigureAfh([u8; 11]),
}

pub struct Phy<C: Config> {
    pub radio: C::Radio,
    pub timer: C::Timer,
    pub hop: HopState,

    mode: Mode,
    master_clkn: Clkn,
    slave_clkn: Clkn,
    /// Accumulated slave clock correction, in timer units.
    slave_clkn_delay: i32,
    /// Set when the current tick has a non-nominal length.
    clkn_delayed: bool,

    chan_uap: u8,
    chan_sw: u64,
    chan_trailer: u8,

    my_bdaddr: BdAddr,
    my_sw: u64,

    max_ac_errors: u8,
    timers: Timers<TimerAction>,
}

impl<C: Config> Phy<C> {
    /// Creates the PHY context with both clocks at 0 and the configured default address.
    pub fn new(radio: C::Radio, timer: C::Timer) -> Self {
        let my_bdaddr = BdAddr::new(C::DEFAULT_BDADDR);
        Self {
            radio,
            timer,
            hop: HopState::new(0),
            mode: Mode::Inquiry,
            master_clkn: Clkn::new(0),
            slave_clkn: Clkn::new(0),
            slave_clkn_delay: 0,
            clkn_delayed: false,
            chan_uap: 0,
            chan_sw: 0,
            chan_trailer: 0,
            my_bdaddr,
            my_sw: access_code::sync_word(my_bdaddr.lap()),
            max_ac_errors: C::MAX_AC_ERRORS & 3,
            timers: Timers::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches to `mode`, on the channel access code and hop sequence of `lap` and `uap`.
    ///
    /// This programs the receiver's sync word and resets the hop sequence (dropping any AFH
    /// configuration).
    pub fn set_mode(&mut self, mode: Mode, lap: u32, uap: u8) {
        let sw = access_code::sync_word(lap);
        self.chan_uap = uap;
        self.chan_sw = sw;
        self.chan_trailer = access_code::trailer(sw);
        self.radio.set_sync(reverse32(sw as u32));
        self.hop.init((lap & 0xff_ffff) | u32::from(uap) << 24);
        self.mode = mode;
        debug!("{:?}: lap {:?} uap {:#04x}", mode, Hex(lap), uap);
    }

    /// Sets the device's own address.
    pub fn set_bdaddr(&mut self, bdaddr: BdAddr) {
        self.my_bdaddr = bdaddr;
        self.my_sw = access_code::sync_word(bdaddr.lap());
        info!("Set bdaddr {:?} -> sw {:?}", bdaddr, Hex(self.my_sw));
    }

    pub fn my_bdaddr(&self) -> BdAddr {
        self.my_bdaddr
    }

    /// Returns the sync word of the device's own LAP.
    pub fn my_sw(&self) -> u64 {
        self.my_sw
    }

    /// Returns the UAP of the current channel, keying HEC and CRC.
    pub fn chan_uap(&self) -> u8 {
        self.chan_uap
    }

    /// Returns the upper 32 bits of the channel sync word, as the first bytes put on air by
    /// software.
    pub fn sw_hi(&self) -> [u8; 4] {
        let hi = (self.chan_sw >> 32) as u32;
        hi.to_le_bytes()
    }

    pub fn trailer(&self) -> u8 {
        self.chan_trailer
    }

    pub fn master_clkn(&self) -> Clkn {
        self.master_clkn
    }

    pub fn slave_clkn(&self) -> Clkn {
        self.slave_clkn
    }

    /// Sets the slave clock, eg. from the clock received in an FHS packet.
    pub fn set_slave_clkn(&mut self, clkn: Clkn) {
        self.slave_clkn = clkn;
    }

    /// Returns the clock the current mode runs on.
    pub fn cur_clkn(&self) -> Clkn {
        if self.mode.uses_slave_clock() {
            self.slave_clkn
        } else {
            self.master_clkn
        }
    }

    /// Returns the hop channel for `clk` in the current mode.
    pub fn channel(&self, clk: Clkn) -> Channel {
        if self.mode.is_inquiry_hopping() {
            self.hop.inquiry(clk)
        } else {
            self.hop.basic(clk)
        }
    }

    /// Returns the whitening seed for a packet sent at `clk`.
    ///
    /// During inquiry and paging, the X input of the hop sequence replaces the clock. The 5 (or
    /// 6) bit value is extended with two MSBs of value 1.
    pub fn whiten_seed(&self, clk: Clkn) -> u8 {
        if self.mode.is_inquiry_hopping() {
            self.hop.x() | 0x60
        } else {
            ((clk.raw() >> 1) & 0x3f) as u8 | 0x40
        }
    }

    /// Shifts the tick timebase by `delay` timer units, by changing the length of the current
    /// tick.
    ///
    /// Used to align the slave clock on the arrival time of a packet from the master.
    pub fn adj_clkn_delay(&mut self, delay: i32) {
        let len = (TICK_LENGTH as i32 + delay).max(1) as u32;
        self.timer.set_tick_length(len);
        self.slave_clkn_delay += delay;
        self.clkn_delayed = true;
    }

    /// Folds the accumulated slave clock correction into the master clock.
    ///
    /// Whole ticks are added to `master_clkn`; the remainder is applied as a tick stretch.
    pub fn cancel_clkn_delay(&mut self) {
        let delay = self.slave_clkn_delay;
        let whole = delay.div_euclid(TICK_LENGTH as i32);
        let rest = delay.rem_euclid(TICK_LENGTH as i32);
        self.master_clkn += whole as u32;
        self.slave_clkn_delay = 0;
        self.adj_clkn_delay(rest);
    }

    /// Schedules `action` at `instant` of the current clock.
    pub fn add_timer(&mut self, instant: Clkn, action: TimerAction, anyway: bool) -> Result<(), Error> {
        self.timers.add(instant, action, anyway)
    }

    /// Trims the crystal frequency offset (6 bits).
    pub fn set_freq_offset(&mut self, offset: u8) {
        self.radio.set_freq_offset(offset & 0x3f);
    }

    pub fn set_max_ac_errors(&mut self, max_ac_errors: u8) {
        self.max_ac_errors = max_ac_errors & 3;
    }

    pub fn max_ac_errors(&self) -> u8 {
        self.max_ac_errors
    }

    /// Tunes the synthesizer to `chan` and configures the radio to receive.
    pub fn prepare_rx(&mut self, chan: Channel) {
        self.radio.tune(chan.freq(), false);
        self.radio.fs_on();
        self.radio.configure_rx(self.max_ac_errors);
        self.radio.start_rx();
    }

    /// Tunes the synthesizer to `chan` and configures the radio to transmit.
    pub fn prepare_tx(&mut self, chan: Channel) {
        self.radio.tune(chan.freq(), true);
        self.radio.fs_on();
        self.radio.configure_tx();
    }

    /// Start of a tick: advances both clocks and restores the nominal tick length.
    pub(crate) fn advance_clocks(&mut self) {
        self.master_clkn += 1;
        self.slave_clkn += 1;
        if self.clkn_delayed {
            self.timer.set_tick_length(TICK_LENGTH);
            self.clkn_delayed = false;
        }
    }

    /// Performs the timer actions due at the current clock.
    pub(crate) fn run_timers(&mut self) {
        let now = self.cur_clkn();
        let hop = &mut self.hop;
        self.timers.run(now, |action| match action {
            TimerAction::ConfigureAfh(cfg) => {
                if let Err(e) = hop.configure_afh(&cfg) {
                    warn!("AFH config rejected: {:?}", e);
                }
            }
        });
    }

    /// Idles the radio and drops pending timers.
    pub(crate) fn reset(&mut self) {
        self.radio.idle();
        self.radio.rx_dma_stop();
        self.radio.disable_fifo_irq();
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockConfig, MockRadio, MockTimer};
    use super::*;
    use crate::access_code::GIAC;

    fn phy() -> Phy<MockConfig> {
        Phy::new(MockRadio::new(), MockTimer::new())
    }

    #[test]
    fn mode_selects_clock_and_seed() {
        let mut phy = phy();
        for _ in 0..6 {
            phy.advance_clocks();
        }
        phy.set_slave_clkn(Clkn::new(0x100));

        phy.set_mode(Mode::Master, 0x123456, 0x47);
        assert_eq!(phy.cur_clkn(), Clkn::new(6));
        assert_eq!(phy.whiten_seed(Clkn::new(0x86)), 0x43);
        assert_eq!(phy.channel(Clkn::new(6)), phy.hop.basic(Clkn::new(6)));

        phy.set_mode(Mode::PageScan, 0x123456, 0x47);
        assert_eq!(phy.cur_clkn(), Clkn::new(0x100));
        phy.hop.increment();
        assert_eq!(phy.whiten_seed(Clkn::new(0)), 0x61);
        assert_eq!(phy.channel(Clkn::new(4)), phy.hop.inquiry(Clkn::new(4)));
    }

    #[test]
    fn set_mode_programs_sync_word() {
        let mut phy = phy();
        phy.set_mode(Mode::Inquiry, GIAC, 0);
        let sw = access_code::sync_word(GIAC);
        assert_eq!(phy.radio.sync, reverse32(sw as u32));
        assert_eq!(phy.sw_hi(), ((sw >> 32) as u32).to_le_bytes());
        assert_eq!(phy.trailer(), access_code::trailer(sw));
        assert_eq!(phy.chan_uap(), 0);
    }

    #[test]
    fn clock_delay() {
        let mut phy = phy();
        phy.adj_clkn_delay(-40);
        assert_eq!(phy.timer.tick_lengths.last(), Some(&(TICK_LENGTH - 40)));
        phy.advance_clocks();
        assert_eq!(phy.timer.tick_lengths.last(), Some(&TICK_LENGTH));

        phy.adj_clkn_delay(3125 * 2 + 10);
        phy.advance_clocks();
        let master = phy.master_clkn();
        phy.cancel_clkn_delay();
        // 6220 = 3125 + 3095
        assert_eq!(phy.master_clkn(), master + 1);
        assert_eq!(phy.timer.tick_lengths.last(), Some(&(TICK_LENGTH + 3095)));
    }

    #[test]
    fn afh_timer() {
        let mut phy = phy();
        phy.set_mode(Mode::Master, 0x123456, 0x47);
        let mut cfg = [0; 11];
        cfg[0] = 1;
        cfg[1] = 0xff;
        cfg[2] = 0xff;
        cfg[3] = 0x0f;
        phy.add_timer(Clkn::new(2), TimerAction::ConfigureAfh(cfg), false)
            .unwrap();

        phy.advance_clocks();
        phy.run_timers();
        assert!(!phy.hop.afh_enabled());
        phy.advance_clocks();
        phy.run_timers();
        assert!(phy.hop.afh_enabled());
        assert_eq!(phy.hop.chan_count(), 20);
    }

    #[test]
    fn radio_settings() {
        let mut phy = phy();
        assert_eq!(phy.max_ac_errors(), MAX_AC_ERRORS_DEFAULT);
        phy.set_max_ac_errors(7);
        assert_eq!(phy.max_ac_errors(), 3);
        phy.set_freq_offset(0xff);
        assert_eq!(phy.radio.freq_offset, 0x3f);

        phy.prepare_rx(Channel::new(10));
        assert_eq!(phy.radio.freq, 2412);
        assert_eq!(phy.radio.max_ac_errors, 3);
        assert!(phy.radio.is_receiving());
    }
}
