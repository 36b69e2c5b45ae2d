//! One-shot timers on the native clock.

use crate::time::Clkn;
use crate::Error;
use heapless::consts::U10;
use heapless::Vec;

/// Maximum number of pending timers.
pub const NUM_TIMERS: usize = 10;

#[derive(Copy, Clone)]
struct OneShot<A> {
    instant: Clkn,
    action: A,
    /// Fire even if the instant has already passed.
    anyway: bool,
}

/// A set of actions to perform at given clock instants.
pub struct Timers<A> {
    pending: Vec<OneShot<A>, U10>,
}

impl<A: Copy> Timers<A> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Registers `action` to be performed at `instant`.
    ///
    /// If `anyway` is set and `instant` is already in the past when the timers are next checked,
    /// the action is performed late instead of being dropped.
    pub fn add(&mut self, instant: Clkn, action: A, anyway: bool) -> Result<(), Error> {
        let timer = OneShot {
            instant,
            action,
            anyway,
        };
        if self.pending.push(timer).is_err() {
            return fatal!(Error::TimersFull, "too many timers");
        }
        Ok(())
    }

    /// Performs the actions due at `now` by passing them to `f`.
    ///
    /// Timers whose instant lies in the past are removed as well; their action is only performed
    /// if they were added with `anyway`.
    pub fn run(&mut self, now: Clkn, mut f: impl FnMut(A)) {
        let mut i = 0;
        while i < self.pending.len() {
            let timer = self.pending[i];
            let late = now.ticks_since(timer.instant).raw();
            if late >= 1 << 27 {
                // Still in the future.
                i += 1;
                continue;
            }

            if let Some(last) = self.pending.pop() {
                if i < self.pending.len() {
                    self.pending[i] = last;
                }
            }

            if late == 0 {
                f(timer.action);
            } else if timer.anyway {
                debug!("(X)");
                f(timer.action);
            } else {
                warn!("(missed timer {})", timer.instant);
            }
        }
    }

    /// Drops all pending timers.
    pub fn clear(&mut self) {
        while self.pending.pop().is_some() {}
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
