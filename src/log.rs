//! Logging macros used throughout the baseband.
//!
//! With the `log` feature enabled, these forward to the `log` crate. Without it, the arguments are
//! still type-checked by `format_args!`, but nothing is emitted. Most of the baseband runs from the
//! tick interrupt, so log lines on the RX/TX paths should stay short.

#[cfg(feature = "log")]
macro_rules! error {
    ($($t:tt)*) => {{ log::error!($($t)*); }};
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($t:tt)*) => {{ log::warn!($($t)*); }};
}

#[cfg(feature = "log")]
macro_rules! info {
    ($($t:tt)*) => {{ log::info!($($t)*); }};
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($t:tt)*) => {{ log::debug!($($t)*); }};
}

#[cfg(feature = "log")]
macro_rules! trace {
    ($($t:tt)*) => {{ log::trace!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($t:tt)*) => {{ format_args!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($t:tt)*) => {{ format_args!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($t:tt)*) => {{ format_args!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($t:tt)*) => {{ format_args!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($t:tt)*) => {{ format_args!($($t)*); }};
}

/// Logs an error and evaluates to `Err($err)`.
///
/// Used for conditions a dedicated firmware image would halt on (pool exhaustion, scheduler
/// overflow, invalid state transitions). They are reported and handed back to the caller instead.
macro_rules! fatal {
    ($err:expr, $($t:tt)*) => {{
        error!($($t)*);
        Err($err)
    }};
}
