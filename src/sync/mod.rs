//! Synchronization primitives
//!
//! Contains semaphores, message queues, mutexes and event flag groups.

pub mod sem;
pub mod q;

#[cfg(feature = "mutex")]
pub mod mutex;

#[cfg(feature = "flag")]
pub mod flag;
