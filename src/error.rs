use core::fmt;

/// Errors returned by the baseband.
///
/// Several of these correspond to conditions that leave the controller in an inconsistent state
/// (eg. [`SchedulerFull`] means a real-time deadline could not be honored). They are returned
/// instead of halting so that the caller can apply backpressure or reset the controller.
///
/// [`SchedulerFull`]: #variant.SchedulerFull
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Packet or message specified an invalid length value or was too short.
    InvalidLength,

    /// Invalid value supplied for field.
    InvalidValue,

    /// Unexpectedly reached EOF while reading or writing data.
    ///
    /// This is returned when trying to fit too much data into a message or other fixed-size
    /// buffer, and also when reaching EOF prematurely while reading data from a buffer.
    Eof,

    /// Parsing didn't consume the entire buffer.
    IncompleteParse,

    /// A TDMA bucket has no room left for another entry.
    SchedulerFull,

    /// All one-shot PHY timers are in use.
    TimersFull,

    /// The message pool has no free buffer left.
    PoolExhausted,

    /// A message queue is full.
    QueueFull,

    /// The requested controller state cannot be entered from the current one.
    InvalidTransition,

    /// An AFH channel map marks no channel as used.
    EmptyChannelMap,

    /// The FEC 1/3 protected packet header contained too many bit errors.
    HeaderErrors,

    /// The header error check did not match.
    HecMismatch,

    /// A task was scheduled while a previous run was still pending.
    Busy,

    /// A host transfer did not start with the expected framing marker.
    Framing,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidLength => "invalid length value specified",
            Error::InvalidValue => "invalid value for field",
            Error::Eof => "end of buffer",
            Error::IncompleteParse => "excess data in buffer",
            Error::SchedulerFull => "TDMA bucket full",
            Error::TimersFull => "too many PHY timers",
            Error::PoolExhausted => "message pool exhausted",
            Error::QueueFull => "message queue full",
            Error::InvalidTransition => "invalid controller state transition",
            Error::EmptyChannelMap => "AFH channel map is empty",
            Error::HeaderErrors => "too many bit errors in packet header",
            Error::HecMismatch => "header error check mismatch",
            Error::Busy => "task already scheduled",
            Error::Framing => "bad transfer framing",
        })
    }
}
