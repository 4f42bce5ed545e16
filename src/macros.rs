// src/macros.rs

//
// Logging macros
//
// logging feature enabled  → tracing events under the `mom_pubsub` target
// logging feature disabled → log_error prints to stderr, the rest compile to
//                            a type-checked no-op so captured values never
//                            trigger unused-variable warnings
//

#![allow(unused_macros)]

macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            tracing::error!(target: "mom_pubsub", $($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            eprintln!($($arg)*);
        }
    }};
}

macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            tracing::warn!(target: "mom_pubsub", $($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            tracing::info!(target: "mom_pubsub", $($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            tracing::debug!(target: "mom_pubsub", $($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

macro_rules! log_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            tracing::trace!(target: "mom_pubsub", $($arg)*);
        }
        #[cfg(not(feature = "logging"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_trace;
pub(crate) use log_warn;
