//! Logging macros for uCOS-III
//!
//! Forwards to `defmt` or `tracing` depending on the enabled feature, and
//! compiles to nothing when neither is enabled. Arguments should stick to
//! strings and integers so both backends accept them.

#[cfg(feature = "defmt")]
#[doc(hidden)]
pub use defmt as __defmt;
#[cfg(all(feature = "tracing", not(feature = "defmt")))]
#[doc(hidden)]
pub use tracing as __tracing;

/// Debug message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::log::__defmt::debug!($($arg)*) };
}

/// Info message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::log::__defmt::info!($($arg)*) };
}

/// Error message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::log::__defmt::error!($($arg)*) };
}

/// Trace message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::log::__defmt::trace!($($arg)*) };
}

/// Warning message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::log::__defmt::warn!($($arg)*) };
}

#[cfg(all(feature = "tracing", not(feature = "defmt")))]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::log::__tracing::debug!($($arg)*) };
}
#[cfg(all(feature = "tracing", not(feature = "defmt")))]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::log::__tracing::info!($($arg)*) };
}
#[cfg(all(feature = "tracing", not(feature = "defmt")))]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::log::__tracing::error!($($arg)*) };
}
#[cfg(all(feature = "tracing", not(feature = "defmt")))]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::log::__tracing::trace!($($arg)*) };
}
#[cfg(all(feature = "tracing", not(feature = "defmt")))]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::log::__tracing::warn!($($arg)*) };
}

// No-op versions when no backend is enabled
#[cfg(not(any(feature = "defmt", feature = "tracing")))]
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => {}; }
#[cfg(not(any(feature = "defmt", feature = "tracing")))]
#[macro_export]
macro_rules! info { ($($arg:tt)*) => {}; }
#[cfg(not(any(feature = "defmt", feature = "tracing")))]
#[macro_export]
macro_rules! error { ($($arg:tt)*) => {}; }
#[cfg(not(any(feature = "defmt", feature = "tracing")))]
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => {}; }
#[cfg(not(any(feature = "defmt", feature = "tracing")))]
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => {}; }
