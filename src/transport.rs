//! Message framing over the USB bulk endpoints.
//!
//! Messages are longer than a bulk packet, so they are split into chunks of at most [`MTU`] bytes.
//! The first chunk of a message starts with a 4-byte header:
//!
//! ```notrust
//! +-----+---+-------------+---------------+
//! | 'S' | 0 | length (LE) | up to 60 data |
//! +-----+---+-------------+---------------+
//! ```
//!
//! All following chunks start with a single `'C'` byte and carry up to 63 more bytes of data.
//! The same framing is used in both directions.
//!
//! [`MTU`]: constant.MTU.html

use crate::bytes::{ByteReader, ByteWriter};
use crate::config::Config;
use crate::ctl::Controller;
use crate::msg::{Msg, MSG_SIZE};
use crate::Error;

/// Size of a USB bulk packet.
pub const MTU: usize = 64;

/// Marker of the first chunk of a message.
pub const MSG_START: u8 = b'S';

/// Marker of the continuation chunks.
pub const MSG_CONT: u8 = b'C';

/// Reassembles host messages from bulk OUT transfers, and splits controller messages into bulk IN
/// transfers.
pub struct Transport {
    /// Message being received, and the number of bytes still missing.
    rx: Option<(Msg, usize)>,
    /// Message being sent, its read cursor marking what is already out.
    tx: Option<Msg>,
}

impl Transport {
    pub fn new() -> Self {
        Self { rx: None, tx: None }
    }

    /// Processes a bulk packet received from the host.
    ///
    /// Complete messages are handed to the controller with [`Controller::host_enqueue`]. A chunk
    /// with an unexpected marker drops the partially received message and returns
    /// `Error::Framing`.
    ///
    /// [`Controller::host_enqueue`]: ../ctl/struct.Controller.html#method.host_enqueue
    pub fn receive<C: Config>(
        &mut self,
        ctl: &mut Controller<C>,
        chunk: &[u8],
    ) -> Result<(), Error> {
        let mut bytes = ByteReader::new(chunk);
        let marker = bytes.read_u8()?;

        let (mut msg, missing) = match self.rx.take() {
            None => {
                if marker != MSG_START {
                    return fatal!(Error::Framing, "usb: unexpected {:#04x} at msg start", marker);
                }
                bytes.skip(1)?;
                let len = usize::from(bytes.read_u16_le()?);
                if len == 0 || len > MSG_SIZE {
                    warn!("usb: bad msg length {}", len);
                    return Err(Error::InvalidLength);
                }
                (ctl.alloc()?, len)
            }
            Some((msg, missing)) => {
                if marker != MSG_CONT {
                    ctl.free(msg);
                    return fatal!(Error::Framing, "usb: unexpected {:#04x} in msg", marker);
                }
                (msg, missing)
            }
        };

        let data = bytes.read_rest();
        let len = data.len().min(missing);
        match msg.put(len) {
            Ok(dst) => dst.copy_from_slice(&data[..len]),
            Err(e) => {
                ctl.free(msg);
                return Err(e);
            }
        }

        if missing == len {
            ctl.host_enqueue(msg)
        } else {
            self.rx = Some((msg, missing - len));
            Ok(())
        }
    }

    /// Writes the next bulk packet for the host into `buf`.
    ///
    /// Returns the size of the packet, or `None` if the controller has nothing to send.
    pub fn next_chunk<C: Config>(
        &mut self,
        ctl: &mut Controller<C>,
        buf: &mut [u8; MTU],
    ) -> Result<Option<usize>, Error> {
        let mut writer = ByteWriter::new(buf);
        let mut msg = match self.tx.take() {
            Some(msg) => {
                writer.write_u8(MSG_CONT)?;
                msg
            }
            None => match ctl.host_dequeue() {
                Some(msg) => {
                    writer.write_u8(MSG_START)?;
                    writer.write_u8(0)?;
                    writer.write_u16_le(msg.read_avail() as u16)?;
                    msg
                }
                None => return Ok(None),
            },
        };

        let len = msg.read_avail().min(writer.space_left());
        let result = msg.pull(len).and_then(|data| writer.write_slice(data));
        let size = MTU - writer.space_left();

        if result.is_err() || msg.read_avail() == 0 {
            ctl.free(msg);
        } else {
            self.tx = Some(msg);
        }
        result.map(|_| Some(size))
    }

    /// Returns whether a message is partially sent.
    pub fn is_sending(&self) -> bool {
        self.tx.is_some()
    }

    /// Drops the messages in transit in both directions.
    pub fn reset<C: Config>(&mut self, ctl: &mut Controller<C>) {
        if let Some((msg, _)) = self.rx.take() {
            ctl.free(msg);
        }
        if let Some(msg) = self.tx.take() {
            ctl.free(msg);
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
