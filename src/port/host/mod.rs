//! Host port: the RT-Thread primitive set on top of std threads
//!
//! Threads are std threads and the host OS decides who runs; priorities are
//! recorded and order wait lists but do not preempt anything. The tick is
//! virtual and only moves in [`rt_tick_increase`], which is also where thread
//! timeouts and timers expire. Suspending or deleting another thread takes
//! effect at that thread's next kernel entry. A suspend is a hold kept apart
//! from any wait: a thread suspended while waiting finishes the wait and then
//! stays stopped until resumed.

mod event;
mod ipc;
mod irq;
mod mq;
mod thread;
mod timer;

pub use event::*;
pub use ipc::*;
pub use irq::*;
pub use mq::*;
pub use thread::*;
pub use timer::*;

/// Kernel result code: `RT_EOK` or a negated error constant
pub type RtErr = i32;
/// Kernel tick
pub type RtTick = u32;

pub const RT_EOK: RtErr = 0;
pub const RT_ERROR: RtErr = 1;
pub const RT_ETIMEOUT: RtErr = 2;
pub const RT_EFULL: RtErr = 3;
pub const RT_EEMPTY: RtErr = 4;
pub const RT_ENOMEM: RtErr = 5;
pub const RT_ENOSYS: RtErr = 6;
pub const RT_EBUSY: RtErr = 7;
pub const RT_EIO: RtErr = 8;
pub const RT_EINTR: RtErr = 9;
pub const RT_EINVAL: RtErr = 10;

/// Block until the object is signalled
pub const RT_WAITING_FOREVER: i32 = -1;
/// Do not block at all
pub const RT_WAITING_NO: i32 = 0;

pub const RT_TICK_PER_SECOND: u32 = 1000;
pub const RT_NAME_MAX: usize = 8;
pub const RT_THREAD_PRIORITY_MAX: u8 = 32;
pub const RT_SEM_VALUE_MAX: u16 = u16::MAX;
pub const RT_MUTEX_HOLD_MAX: u8 = u8::MAX;
pub const RT_ALIGN_SIZE: usize = core::mem::size_of::<usize>();

/// IPC wait lists ordered by thread priority
pub const RT_IPC_FLAG_PRIO: u8 = 0x01;

/// Kernel object class, doubles as the "created" tag of every object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RtObjectClass {
    Null = 0,
    Thread = 1,
    Semaphore = 2,
    Mutex = 3,
    Event = 4,
    MessageQueue = 6,
    Timer = 10,
}

/// Round `size` up to the kernel alignment
#[inline]
pub const fn rt_align(size: usize) -> usize {
    (size + RT_ALIGN_SIZE - 1) & !(RT_ALIGN_SIZE - 1)
}

/// `true` once `now` has reached `deadline`, tolerating tick wrap-around
#[inline]
pub(crate) fn tick_reached(now: RtTick, deadline: RtTick) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

/// Clip an object name the way the kernel stores it
#[inline]
pub(crate) fn clip_name(name: &'static str) -> &'static str {
    match name.char_indices().nth(RT_NAME_MAX) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_up_to_word() {
        assert_eq!(rt_align(0), 0);
        assert_eq!(rt_align(1), RT_ALIGN_SIZE);
        assert_eq!(rt_align(RT_ALIGN_SIZE), RT_ALIGN_SIZE);
        assert_eq!(rt_align(RT_ALIGN_SIZE + 1), 2 * RT_ALIGN_SIZE);
    }

    #[test]
    fn tick_compare_wraps() {
        assert!(tick_reached(10, 10));
        assert!(tick_reached(11, 10));
        assert!(!tick_reached(9, 10));
        assert!(tick_reached(2, u32::MAX - 1));
    }

    #[test]
    fn names_are_clipped() {
        assert_eq!(clip_name("short"), "short");
        assert_eq!(clip_name("a_rather_long_name"), "a_rather");
    }
}
