//! The baseband controller: ties the PHY, the tasks and the state machines together and talks to
//! the host.
//!
//! All baseband work happens in [`Controller::tick`], which must be called from the CLKN tick
//! interrupt (every 312.5 µs). Host messages are processed in the foreground by
//! [`Controller::work`], and the radio FIFO interrupt must call [`Controller::fifo_irq`].
//!
//! The host sends requests through the `rx` queue and receives packets and state changes through
//! the `tx` queue (see the [`transport`] module for the framing on the wire).
//!
//! [`Controller::tick`]: struct.Controller.html#method.tick
//! [`Controller::work`]: struct.Controller.html#method.work
//! [`Controller::fifo_irq`]: struct.Controller.html#method.fifo_irq
//! [`transport`]: ../transport/index.html

pub mod message;

pub use self::message::{Reason, State};

use self::message::Request;
use crate::bdaddr::BdAddr;
use crate::bytes::{ByteReader, FromBytes};
use crate::config::Config;
use crate::msg::{Msg, MsgPool, MsgQueue};
use crate::phy::{Phy, Radio, TimerAction};
use crate::state::{self, Proto};
use crate::task::{rx, scan, tx, RxTask, ScanTask, TxTask};
use crate::tdma::{Scheduled, TdmaScheduler};
use crate::utils::HexSlice;
use crate::Error;

/// Baseband controller state.
pub struct Controller<C: Config> {
    pub phy: Phy<C>,
    pub(crate) sched: TdmaScheduler<Self>,
    pub(crate) rx_task: RxTask<C>,
    pub(crate) tx_task: TxTask<C>,
    pub(crate) scan_task: ScanTask<C>,

    pub(crate) pool: MsgPool,
    /// Requests from the host.
    rx_q: MsgQueue,
    /// Messages to the host.
    pub(crate) tx_q: MsgQueue,
    /// `TX_ACL` requests waiting to be sent on the connection.
    pub(crate) acl_q: MsgQueue,
    /// `SET_EIR` message answering inquiries, if any.
    pub(crate) eir: Option<Msg>,

    pub(crate) proto: Proto,
    state: State,
    /// The `STATE_RESP` of an abort could not be queued yet.
    abort_pending: bool,
}

impl<C: Config> Scheduled for Controller<C> {
    fn scheduler(&mut self) -> &mut TdmaScheduler<Self> {
        &mut self.sched
    }
}

impl<C: Config> Controller<C> {
    /// Creates a controller in `STANDBY`.
    pub fn new(radio: C::Radio, timer: C::Timer) -> Self {
        Self {
            phy: Phy::new(radio, timer),
            sched: TdmaScheduler::new(),
            rx_task: RxTask::new(),
            tx_task: TxTask::new(),
            scan_task: ScanTask::new(),
            pool: MsgPool::new(),
            rx_q: MsgQueue::new(),
            tx_q: MsgQueue::new(),
            acl_q: MsgQueue::new(),
            eir: None,
            proto: Proto::Idle,
            state: State::Standby,
            abort_pending: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Enters `state` and reports it to the host.
    ///
    /// Entering `STANDBY` cancels everything in progress. Staying in `STANDBY` is not reported.
    pub fn set_state(&mut self, state: State, reason: Reason) -> Result<(), Error> {
        let old = self.state;
        info!("State {} -> {}", old, state);
        if !old.can_enter(state) {
            return fatal!(
                Error::InvalidTransition,
                "Invalid state transition {} -> {}",
                old,
                state
            );
        }
        self.state = state;
        if state == State::Standby {
            self.cancel();
        }

        if old == State::Standby && state == State::Standby {
            return Ok(());
        }
        let msg = message::state_resp(&mut self.pool, state, reason)?;
        self.send_to_host(msg)
    }

    /// CLKN tick: advances the clocks, fires due timers and runs the scheduled items.
    ///
    /// If a scheduled item fails, the rest of the state machine's work is lost, so the controller
    /// falls back to `STANDBY` with reason `ABORTED` and the error is returned.
    pub fn tick(&mut self) -> Result<(), Error> {
        self.phy.advance_clocks();
        self.phy.run_timers();
        let result = TdmaScheduler::execute(self).map(|_| ());
        if let Err(e) = &result {
            // Before `advance`: `cancel` spares the current bucket, which is already drained.
            self.abort(e);
        }
        self.sched.advance();
        result
    }

    fn abort(&mut self, e: &Error) {
        if self.state == State::Standby {
            return;
        }
        warn!("{} aborted: {}", self.state, e);
        // The state is left even if the report fails.
        if self.set_state(State::Standby, Reason::ABORTED).is_err() {
            self.abort_pending = true;
        }
    }

    /// Queues the `STATE_RESP` of an earlier abort once a buffer is available.
    fn report_abort(&mut self) {
        if !self.abort_pending {
            return;
        }
        if let Ok(msg) = message::state_resp(&mut self.pool, State::Standby, Reason::ABORTED) {
            self.abort_pending = false;
            if let Err(e) = self.send_to_host(msg) {
                warn!("abort report dropped: {}", e);
            }
        }
    }

    /// Radio FIFO interrupt, raised while a packet is being transmitted.
    pub fn fifo_irq(&mut self) {
        tx::fifo_irq(self);
    }

    /// Processes one request from the host.
    ///
    /// Returns `false` if the host queue was empty.
    pub fn work(&mut self) -> Result<bool, Error> {
        self.report_abort();
        match self.rx_q.dequeue() {
            Some(msg) => {
                self.handle_msg(msg)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Allocates an empty message from the pool.
    pub fn alloc(&mut self) -> Result<Msg, Error> {
        self.pool.alloc()
    }

    /// Returns a message to the pool.
    pub fn free(&mut self, msg: Msg) {
        self.pool.free(msg);
    }

    /// Queues a request from the host for [`work`](#method.work).
    pub fn host_enqueue(&mut self, msg: Msg) -> Result<(), Error> {
        if let Err(msg) = self.rx_q.enqueue(msg) {
            self.pool.free(msg);
            return fatal!(Error::QueueFull, "host rx queue full");
        }
        Ok(())
    }

    /// Takes the next message for the host.
    pub fn host_dequeue(&mut self) -> Option<Msg> {
        self.tx_q.dequeue()
    }

    /// Returns whether messages for the host are waiting.
    pub fn host_pending(&self) -> bool {
        !self.tx_q.is_empty()
    }

    /// Queues `msg` for the host, dropping it if the queue is full.
    pub(crate) fn send_to_host(&mut self, msg: Msg) -> Result<(), Error> {
        if let Err(msg) = self.tx_q.enqueue(msg) {
            self.pool.free(msg);
            return fatal!(Error::QueueFull, "host tx queue full");
        }
        Ok(())
    }

    /// Brings the controller back to its power-on state.
    pub fn reset(&mut self) {
        info!("reset");
        self.state = State::Standby;
        self.abort_pending = false;
        self.cancel();
        self.sched.reset();
        self.phy.reset();
        self.phy.set_bdaddr(BdAddr::new(C::DEFAULT_BDADDR));
        self.phy.set_max_ac_errors(C::MAX_AC_ERRORS);
        self.phy.set_freq_offset(0);
        self.rx_q.flush(&mut self.pool);
        self.tx_q.flush(&mut self.pool);
        self.acl_q.flush(&mut self.pool);
        if let Some(msg) = self.eir.take() {
            self.pool.free(msg);
        }
    }

    /// Drops all scheduled work and the state machine data.
    fn cancel(&mut self) {
        self.sched.reset();
        rx::reset(self);
        tx::reset(self);
        scan::reset(self);
        if let Some(mut link) = self.proto.take().into_link() {
            link.reset(&mut self.pool);
        }
        self.phy.radio.idle();
        self.phy.radio.rx_dma_stop();
    }

    fn handle_msg(&mut self, msg: Msg) -> Result<(), Error> {
        let req = match Request::from_bytes(&mut ByteReader::new(msg.data())) {
            Ok(req) => req,
            Err(e) => {
                warn!("bad host msg {:?}", HexSlice(msg.data()));
                self.pool.free(msg);
                return Err(e);
            }
        };

        // These keep the message.
        match req {
            Request::TxAcl => return self.acl_enqueue(msg),
            Request::SetEir => return self.set_eir(msg),
            _ => {}
        }

        let result = self.handle_request(req);
        self.pool.free(msg);
        result
    }

    fn handle_request(&mut self, req: Request<'_>) -> Result<(), Error> {
        match req {
            Request::Debug(text) => {
                info!("host: {}", core::str::from_utf8(text).unwrap_or("<invalid>"));
                Ok(())
            }
            Request::Reset => {
                self.reset();
                Ok(())
            }
            Request::Idle => self.set_state(State::Standby, Reason::SUCCESS),
            Request::SetFreqOff(offset) => {
                self.phy.set_freq_offset(offset & 0x3f);
                Ok(())
            }
            Request::SetMaxAcErrors(n) => {
                self.phy.set_max_ac_errors(n & 3);
                Ok(())
            }
            Request::SetBdaddr(bdaddr) => {
                info!("bdaddr {:?}", bdaddr);
                self.phy.set_bdaddr(bdaddr);
                Ok(())
            }
            Request::Inquiry => state::inquiry::setup(self),
            Request::Paging(target) => {
                self.acl_q.flush(&mut self.pool);
                state::paging::setup(self, target.lap(), target.uap())
            }
            Request::TxTest => {
                warn!("TX test mode not supported");
                Ok(())
            }
            Request::InquiryScan => state::inquiry_scan::setup(self),
            Request::PageScan => {
                self.acl_q.flush(&mut self.pool);
                state::page_scan::setup(self)
            }
            Request::SetAfh { instant, cfg } => {
                self.phy
                    .add_timer(instant, TimerAction::ConfigureAfh(cfg), false)
            }
            Request::Monitor(target) => state::monitor::setup(self, target),
            Request::TxAcl | Request::SetEir => Ok(()),
            Request::Invalid(ty) => {
                warn!("Invalid message type {:?}", ty);
                Ok(())
            }
        }
    }

    fn acl_enqueue(&mut self, msg: Msg) -> Result<(), Error> {
        if let Err(msg) = self.acl_q.enqueue(msg) {
            self.pool.free(msg);
            return fatal!(Error::QueueFull, "acl queue full");
        }
        Ok(())
    }

    fn set_eir(&mut self, msg: Msg) -> Result<(), Error> {
        if self.state != State::Standby {
            warn!("Cannot change eir in state {}", self.state);
            self.pool.free(msg);
            return Ok(());
        }
        if let Some(old) = self.eir.replace(msg) {
            self.pool.free(old);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::message::{msg_type, MsgType};
    use super::*;
    use crate::msg::POOL_SIZE;
    use crate::packet::PacketType;
    use crate::phy::mock::{self, MockConfig};
    use crate::time::Clkn;
    use byteorder::{ByteOrder, LittleEndian};

    fn request(ctl: &mut Controller<MockConfig>, ty: MsgType, payload: &[u8]) {
        let mut msg = ctl.alloc().unwrap();
        msg.put_with(|w| w.write_u32_le(ty.into())).unwrap();
        msg.put(payload.len()).unwrap().copy_from_slice(payload);
        ctl.host_enqueue(msg).unwrap();
    }

    /// Pops the next `STATE_RESP` as `(state, reason)`.
    fn state_resp(ctl: &mut Controller<MockConfig>) -> Option<(u8, u8)> {
        let msg = ctl.host_dequeue()?;
        assert_eq!(msg_type(&msg).unwrap(), MsgType::StateResp);
        let resp = (msg.data()[4], msg.data()[5]);
        ctl.free(msg);
        Some(resp)
    }

    #[test]
    fn inquiry_then_idle() {
        let mut ctl = mock::controller();
        request(&mut ctl, MsgType::InquiryReq, &[]);
        assert_eq!(ctl.work(), Ok(true));
        assert_eq!(ctl.work(), Ok(false));
        assert_eq!(ctl.state(), State::Inquiry);
        assert_eq!(state_resp(&mut ctl), Some((State::Inquiry as u8, 0)));

        mock::run_ticks(&mut ctl, 20);
        request(&mut ctl, MsgType::IdleReq, &[]);
        ctl.work().unwrap();
        assert_eq!(ctl.state(), State::Standby);
        assert_eq!(state_resp(&mut ctl), Some((State::Standby as u8, 0)));
        assert!(!ctl.rx_task.is_busy());
        assert!(!ctl.tx_task.is_busy());

        // Idle while idle is not reported.
        request(&mut ctl, MsgType::IdleReq, &[]);
        ctl.work().unwrap();
        assert_eq!(state_resp(&mut ctl), None);

        mock::run_ticks(&mut ctl, 20);
        assert_eq!(ctl.pool.available(), POOL_SIZE);
    }

    #[test]
    fn failed_tick_aborts_state() {
        let mut ctl = mock::controller();
        request(&mut ctl, MsgType::InquiryReq, &[]);
        ctl.work().unwrap();
        assert_eq!(state_resp(&mut ctl), Some((State::Inquiry as u8, 0)));
        mock::run_ticks(&mut ctl, 10);

        let mut held = Vec::new();
        while let Ok(msg) = ctl.alloc() {
            held.push(msg);
        }
        let mut errors = 0;
        for _ in 0..8 {
            ctl.phy.timer.restart();
            if ctl.tick().is_err() {
                errors += 1;
            }
        }
        assert_eq!(errors, 1);
        assert_eq!(ctl.state(), State::Standby);
        assert!(!ctl.rx_task.is_busy());
        // No buffer for the report yet.
        assert_eq!(state_resp(&mut ctl), None);

        for msg in held {
            ctl.free(msg);
        }
        assert_eq!(ctl.work(), Ok(false));
        assert_eq!(
            state_resp(&mut ctl),
            Some((State::Standby as u8, Reason::ABORTED.0))
        );

        // Nothing is left running, and a new inquiry can start.
        let sent = ctl.phy.radio.tx_count;
        mock::run_ticks(&mut ctl, 40);
        assert_eq!(ctl.phy.radio.tx_count, sent);
        assert_eq!(ctl.pool.available(), POOL_SIZE);
        request(&mut ctl, MsgType::InquiryReq, &[]);
        ctl.work().unwrap();
        assert_eq!(state_resp(&mut ctl), Some((State::Inquiry as u8, 0)));
        mock::run_ticks(&mut ctl, 40);
        assert!(ctl.phy.radio.tx_count > sent);
    }

    #[test]
    fn invalid_transition() {
        let mut ctl = mock::controller();
        request(&mut ctl, MsgType::InquiryScanReq, &[]);
        request(&mut ctl, MsgType::PageScanReq, &[]);
        ctl.work().unwrap();
        assert_eq!(ctl.work(), Err(Error::InvalidTransition));
        assert_eq!(ctl.state(), State::InquiryScan);
    }

    #[test]
    fn settings() {
        let mut ctl = mock::controller();
        request(&mut ctl, MsgType::SetFreqOffReq, &[0xff]);
        request(&mut ctl, MsgType::SetMaxAcErrorsReq, &[7]);
        request(&mut ctl, MsgType::SetBdaddrReq, &[6, 5, 4, 3, 2, 1, 0, 0]);
        request(&mut ctl, MsgType::RxPkt, &[]);
        while ctl.work().unwrap() {}

        assert_eq!(ctl.phy.radio.freq_offset, 0x3f);
        assert_eq!(ctl.phy.max_ac_errors(), 3);
        assert_eq!(ctl.phy.my_bdaddr(), BdAddr::new(0x0102_0304_0506));
        assert!(!ctl.host_pending());
        assert_eq!(ctl.pool.available(), POOL_SIZE);

        request(&mut ctl, MsgType::ResetReq, &[]);
        ctl.work().unwrap();
        assert_eq!(ctl.phy.my_bdaddr(), BdAddr::new(MockConfig::DEFAULT_BDADDR));
        assert_eq!(ctl.phy.max_ac_errors(), MockConfig::MAX_AC_ERRORS);
    }

    #[test]
    fn eir_only_in_standby() {
        let mut ctl = mock::controller();
        let hdr = [0, u8::from(PacketType::Dh1), 0, 0];
        request(&mut ctl, MsgType::SetEirReq, &hdr);
        ctl.work().unwrap();
        assert!(ctl.eir.is_some());
        assert_eq!(ctl.pool.available(), POOL_SIZE - 1);

        // A new EIR replaces the old one.
        request(&mut ctl, MsgType::SetEirReq, &hdr);
        ctl.work().unwrap();
        assert_eq!(ctl.pool.available(), POOL_SIZE - 1);

        request(&mut ctl, MsgType::InquiryScanReq, &[]);
        ctl.work().unwrap();
        state_resp(&mut ctl);
        request(&mut ctl, MsgType::SetEirReq, &hdr);
        ctl.work().unwrap();
        assert_eq!(ctl.pool.available(), POOL_SIZE - 1);
    }

    #[test]
    fn acl_is_queued() {
        let mut ctl = mock::controller();
        // lt_addr 1, DM1, 1-byte payload header
        let payload = [1, u8::from(PacketType::Dm1), 0, 0, 0x0a];
        request(&mut ctl, MsgType::TxAclReq, &payload);
        ctl.work().unwrap();
        assert_eq!(ctl.acl_q.len(), 1);

        // Paging starts from an empty queue.
        request(&mut ctl, MsgType::PagingReq, &[0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0, 0]);
        ctl.work().unwrap();
        assert!(ctl.acl_q.is_empty());
        assert_eq!(ctl.state(), State::Page);
        assert_eq!(ctl.pool.available(), POOL_SIZE - 1);
    }

    #[test]
    fn afh_timer() {
        let mut ctl = mock::controller();
        let mut payload = [0; 15];
        LittleEndian::write_u32(&mut payload[..4], 5);
        payload[4] = 1;
        for b in &mut payload[5..] {
            *b = 0x55;
        }
        payload[14] = 0x15;
        request(&mut ctl, MsgType::SetAfhReq, &payload);
        ctl.work().unwrap();

        mock::run_ticks(&mut ctl, 4);
        assert_eq!(ctl.phy.cur_clkn(), Clkn::new(4));
        assert!(!ctl.phy.hop.afh_enabled());
        mock::run_ticks(&mut ctl, 1);
        assert!(ctl.phy.hop.afh_enabled());
    }
}
