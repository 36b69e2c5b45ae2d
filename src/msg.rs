//! Messages exchanged between the host interface and the baseband.
//!
//! A [`Msg`] is a fixed-size buffer with a read and a write cursor. Messages come from a
//! [`MsgPool`] with a fixed number of slots, are passed around by value through [`MsgQueue`]s, and
//! go back to the pool with [`MsgPool::free`] once the last stage is done with them.
//!
//! [`Msg`]: struct.Msg.html
//! [`MsgPool`]: struct.MsgPool.html
//! [`MsgQueue`]: struct.MsgQueue.html
//! [`MsgPool::free`]: struct.MsgPool.html#method.free

use crate::bytes::{ByteReader, ByteWriter};
use crate::packet::MAX_ACL_SIZE;
use crate::utils::HexSlice;
use crate::Error;
use core::fmt;
use heapless::consts::{U16, U8};
use heapless::spsc;

/// Number of messages that can be allocated at the same time.
pub const POOL_SIZE: usize = 16;

/// Capacity of a message queue.
pub const QUEUE_SIZE: usize = 8;

/// Size of a message buffer: host message header, RX packet report and the largest ACL payload.
pub const MSG_SIZE: usize = 4 + 12 + MAX_ACL_SIZE;

/// A message buffer allocated from a `MsgPool`.
///
/// `Msg` is deliberately not `Clone`: each message has a single owner, which must eventually return
/// it to the pool it came from.
pub struct Msg {
    slot: u8,
    read: usize,
    write: usize,
    buf: [u8; MSG_SIZE],
}

impl Msg {
    /// Reserves `len` bytes at the write cursor and returns them.
    pub fn put(&mut self, len: usize) -> Result<&mut [u8], Error> {
        if self.write_avail() < len {
            return Err(Error::Eof);
        }
        let start = self.write;
        self.write += len;
        Ok(&mut self.buf[start..self.write])
    }

    /// Appends data using a `ByteWriter`, advancing the write cursor by what `f` wrote.
    ///
    /// If `f` fails, the write cursor is left unchanged.
    pub fn put_with<R>(
        &mut self,
        f: impl FnOnce(&mut ByteWriter<'_>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let avail = self.write_avail();
        let mut writer = ByteWriter::new(&mut self.buf[self.write..]);
        let r = f(&mut writer)?;
        let used = avail - writer.space_left();
        self.write += used;
        Ok(r)
    }

    /// Consumes `len` bytes at the read cursor and returns them.
    pub fn pull(&mut self, len: usize) -> Result<&[u8], Error> {
        if self.read_avail() < len {
            return Err(Error::Eof);
        }
        let start = self.read;
        self.read += len;
        Ok(&self.buf[start..self.read])
    }

    /// Returns a reader over the bytes between the read and write cursors.
    pub fn reader(&self) -> ByteReader<'_> {
        ByteReader::new(&self.buf[self.read..self.write])
    }

    /// Number of bytes written so far.
    pub fn write_len(&self) -> usize {
        self.write
    }

    /// Number of written bytes not yet pulled.
    pub fn read_avail(&self) -> usize {
        self.write - self.read
    }

    /// Number of bytes that can still be put.
    pub fn write_avail(&self) -> usize {
        MSG_SIZE - self.write
    }

    /// Moves the write cursor to `pos`, to trim the message to the data actually written through
    /// `storage_mut`.
    pub fn set_write(&mut self, pos: usize) -> Result<(), Error> {
        if pos > MSG_SIZE || pos < self.read {
            return Err(Error::InvalidLength);
        }
        self.write = pos;
        Ok(())
    }

    /// Returns all written bytes, from the start of the buffer.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.write]
    }

    /// Returns the written bytes for in-place modification.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.write]
    }

    /// Returns the whole buffer, regardless of the cursors.
    ///
    /// Used to fill a message in place (eg. while decoding a packet into it) before setting the
    /// final size with `set_write`.
    pub fn storage_mut(&mut self) -> &mut [u8; MSG_SIZE] {
        &mut self.buf
    }
}

impl fmt::Debug for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Msg")
            .field("slot", &self.slot)
            .field("read", &self.read)
            .field("data", &HexSlice(self.data()))
            .finish()
    }
}

/// A fixed-capacity allocator of `Msg` buffers.
pub struct MsgPool {
    free: heapless::Vec<u8, U16>,
}

impl MsgPool {
    /// Creates a pool with all `POOL_SIZE` slots free.
    pub fn new() -> Self {
        let mut free = heapless::Vec::new();
        for slot in (0..POOL_SIZE as u8).rev() {
            free.push(slot).ok();
        }
        Self { free }
    }

    /// Allocates an empty message.
    pub fn alloc(&mut self) -> Result<Msg, Error> {
        match self.free.pop() {
            Some(slot) => Ok(Msg {
                slot,
                read: 0,
                write: 0,
                buf: [0; MSG_SIZE],
            }),
            None => fatal!(Error::PoolExhausted, "No more buffers"),
        }
    }

    /// Returns a message to the pool.
    pub fn free(&mut self, msg: Msg) {
        if self.free.contains(&msg.slot) {
            error!("msg slot {} freed twice", msg.slot);
            return;
        }
        // Cannot overflow: a slot is only in the list once.
        self.free.push(msg.slot).ok();
    }

    /// Number of messages that can still be allocated.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

/// A bounded FIFO of messages.
pub struct MsgQueue {
    inner: spsc::Queue<Msg, U8>,
}

impl MsgQueue {
    pub fn new() -> Self {
        Self {
            inner: spsc::Queue::new(),
        }
    }

    /// Appends `msg`. If the queue is full, the message is handed back.
    pub fn enqueue(&mut self, msg: Msg) -> Result<(), Msg> {
        if self.inner.len() >= QUEUE_SIZE {
            return Err(msg);
        }
        self.inner.enqueue(msg)
    }

    /// Removes the oldest message.
    pub fn dequeue(&mut self) -> Option<Msg> {
        self.inner.dequeue()
    }

    /// Returns the oldest message without removing it.
    pub fn peek(&self) -> Option<&Msg> {
        self.inner.iter().next()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Moves all queued messages back into `pool`.
    pub fn flush(&mut self, pool: &mut MsgPool) {
        while let Some(msg) = self.inner.dequeue() {
            pool.free(msg);
        }
    }
}
