//! Core RTOS modules
//!
//! Contains kernel state, task and time management, pend bookkeeping,
//! timers and the CPU usage statistic.

pub mod config;
pub mod critical;
pub mod cs_cell;
pub mod error;
pub mod kernel;
pub(crate) mod pend;
pub mod types;
pub mod task;
pub mod time;

#[cfg(feature = "tmr")]
pub mod tmr;

#[cfg(feature = "stat")]
pub mod stat;
