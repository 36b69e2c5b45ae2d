//! TDMA scheduler.
//!
//! The scheduler is a ring of buckets, one per future tick of the slot clock. Each bucket holds a
//! few callbacks which run when the cursor reaches it. Radio tasks are built from chains of such
//! callbacks, each one scheduling the next step a number of ticks in the future.
//!
//! Callbacks get mutable access to the context that owns the scheduler (see [`Scheduled`]), so a
//! callback can schedule further items, including items for the bucket that is currently being
//! executed. Those run during the same [`execute`] call, after the items that were already due.
//!
//! [`Scheduled`]: trait.Scheduled.html
//! [`execute`]: struct.TdmaScheduler.html#method.execute

use crate::Error;
use heapless::consts::U4;
use heapless::Vec;

/// Number of buckets (ticks) the scheduler can look ahead.
pub const NUM_FRAMES: usize = 16;

/// Number of items per bucket.
pub const NUM_CB: usize = 4;

/// Callback run when a scheduled item becomes due.
///
/// The `u16` is the item's argument, shared by all items of a set.
pub type Callback<T> = fn(&mut T, u16) -> Result<(), Error>;

/// Implemented by the context owning a `TdmaScheduler`.
pub trait Scheduled: Sized {
    fn scheduler(&mut self) -> &mut TdmaScheduler<Self>;
}

/// A callback waiting in a bucket.
pub struct Item<T> {
    cb: Callback<T>,
    arg: u16,
    prio: i16,
}

impl<T> Clone for Item<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Item<T> {}

/// An element of a static item set passed to `schedule_set`.
pub enum SetItem<T> {
    /// Run `cb` with priority `prio` in the current frame of the set.
    Call(Callback<T>, i16),
    /// Move on to the next frame.
    EndFrame,
}

pub struct TdmaScheduler<T> {
    buckets: [Vec<Item<T>, U4>; NUM_FRAMES],
    cur: usize,
}

impl<T: Scheduled> TdmaScheduler<T> {
    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            cur: 0,
        }
    }

    fn bucket_idx(&self, offset: u8) -> usize {
        (self.cur + usize::from(offset)) % NUM_FRAMES
    }

    /// Schedules `cb` to run `offset` ticks from now.
    ///
    /// An `offset` of 0 targets the bucket being executed right now. Lower `prio` runs first.
    ///
    /// Overflowing a bucket means the real-time budget of that tick is exceeded, and is reported
    /// as `Error::SchedulerFull`.
    pub fn schedule(&mut self, offset: u8, cb: Callback<T>, arg: u16, prio: i16) -> Result<(), Error> {
        let idx = self.bucket_idx(offset);
        if self.buckets[idx].push(Item { cb, arg, prio }).is_err() {
            return fatal!(Error::SchedulerFull, "tdma_schedule bucket overflow");
        }
        Ok(())
    }

    /// Schedules a set of items, starting `offset` ticks from now.
    ///
    /// Every `SetItem::EndFrame` moves on to the following bucket. All items get `arg`. Returns
    /// the number of frames that were ended, which is the offset of the last frame relative to
    /// the first.
    pub fn schedule_set(&mut self, offset: u8, set: &[SetItem<T>], arg: u16) -> Result<u8, Error> {
        let mut frame = offset;
        let mut frames = 0;
        for item in set {
            match *item {
                SetItem::Call(cb, prio) => self.schedule(frame, cb, arg, prio)?,
                SetItem::EndFrame => {
                    frame = frame.wrapping_add(1);
                    frames += 1;
                }
            }
        }
        Ok(frames)
    }

    /// Runs the items of the current bucket in priority order and clears it.
    ///
    /// Items with equal priority run in the order they were scheduled. Items scheduled into the
    /// current bucket while it executes run afterwards, in the order they were added.
    ///
    /// If a callback fails, the remaining items of the bucket are dropped and the error returned.
    /// Returns the number of callbacks run.
    pub fn execute(ctx: &mut T) -> Result<usize, Error> {
        let (cur, seq, initial) = {
            let sched = ctx.scheduler();
            let bucket = &sched.buckets[sched.cur];
            (sched.cur, sort_by_prio(bucket), bucket.len())
        };

        let mut i = 0;
        let result = loop {
            let item = {
                let bucket = &ctx.scheduler().buckets[cur];
                if i >= bucket.len() {
                    break Ok(i);
                }
                bucket[if i < initial { seq[i] } else { i }]
            };
            i += 1;

            if let Err(e) = (item.cb)(ctx, item.arg) {
                warn!("tdma: item {} of bucket {} failed: {:?}", i - 1, cur, e);
                break Err(e);
            }
        };

        let bucket = &mut ctx.scheduler().buckets[cur];
        while bucket.pop().is_some() {}
        result
    }

    /// Moves the cursor to the next bucket. Called once per tick, after `execute`.
    pub fn advance(&mut self) {
        self.cur = self.bucket_idx(1);
    }

    /// Drops everything scheduled, except the items of the current bucket.
    ///
    /// The current bucket may be executing, it will be cleared at the end of `execute`.
    pub fn reset(&mut self) {
        let cur = self.cur;
        for (i, bucket) in self.buckets.iter_mut().enumerate() {
            if i != cur {
                while bucket.pop().is_some() {}
            }
        }
    }

    /// Returns the index of the current bucket.
    pub fn cursor(&self) -> usize {
        self.cur
    }

    /// Returns the number of items waiting `offset` ticks from now.
    pub fn pending(&self, offset: u8) -> usize {
        self.buckets[self.bucket_idx(offset)].len()
    }
}

/// Returns the execution order of `bucket`: indices sorted by priority, ties in insertion order.
fn sort_by_prio<T>(bucket: &[Item<T>]) -> [usize; NUM_CB] {
    let mut seq = [0, 1, 2, 3];
    for i in 1..bucket.len() {
        let mut j = i;
        while j > 0 && bucket[seq[j - 1]].prio > bucket[seq[j]].prio {
            seq.swap(j - 1, j);
            j -= 1;
        }
    }
    seq
}
