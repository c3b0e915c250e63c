//! Port layer - the kernel this crate is layered on
//!
//! Everything below this module speaks the RT-Thread object model: thread,
//! semaphore, mutex, message queue, event and timer objects, a tick counter,
//! interrupt nesting and the critical section. The μC/OS-III layer only ever
//! calls the entry points re-exported here.

#[cfg(feature = "std")]
pub mod host;

#[cfg(feature = "std")]
pub use host::*;

#[cfg(not(feature = "std"))]
compile_error!("no kernel port selected: enable the `std` host port");
