//! μC/OS-III API layer over an RT-Thread style kernel
//!
//! Applications written against the μC/OS-III API run unchanged on top of a
//! kernel that owns threads, IPC objects, the tick and soft timers:
//! - Tasks, with suspend nesting, task registers and built-in semaphore/queue
//! - Semaphores, mutexes, message queues and event flag groups
//! - Time delays, software timers and a CPU usage statistic
//! - Error and timeout translation between the two APIs

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// ============ Modules ============

pub mod log;

pub mod core;
pub mod sync;
pub mod port;
pub mod shell;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::OsError;
pub use crate::core::kernel;
pub use crate::core::kernel::{os_init, os_start};
pub(crate) use crate::core::pend;
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::task;
pub use crate::core::task::os_task_create;
pub use crate::core::time;

#[cfg(feature = "tmr")]
pub use crate::core::tmr;
#[cfg(feature = "stat")]
pub use crate::core::stat;

pub use sync::{q, sem};
#[cfg(feature = "flag")]
pub use sync::flag;
#[cfg(feature = "mutex")]
pub use sync::mutex;
