//! Interrupt nesting, critical section and scheduler lock

use core::cell::Cell;
use std::thread_local;

use portable_atomic::{AtomicU16, Ordering};

use super::thread::rt_thread_self;

/// Saved state returned by [`rt_hw_interrupt_disable`]
pub type RtLevel = critical_section::RestoreState;

thread_local! {
    static IRQ_NEST: Cell<u8> = const { Cell::new(0) };
}

/// Scheduler lock nesting, global like the kernel's
static CRITICAL_NEST: AtomicU16 = AtomicU16::new(0);

/// Enter the kernel critical section
#[inline]
pub fn rt_hw_interrupt_disable() -> RtLevel {
    // SAFETY: paired with `rt_hw_interrupt_enable` by every caller.
    unsafe { critical_section::acquire() }
}

/// Leave the kernel critical section
#[inline]
pub fn rt_hw_interrupt_enable(level: RtLevel) {
    // SAFETY: `level` comes from the matching `rt_hw_interrupt_disable`.
    unsafe { critical_section::release(level) }
}

/// Mark entry into an interrupt handler on the calling thread
pub fn rt_interrupt_enter() {
    IRQ_NEST.with(|nest| nest.set(nest.get().saturating_add(1)));
}

/// Mark exit from an interrupt handler on the calling thread
pub fn rt_interrupt_leave() {
    IRQ_NEST.with(|nest| nest.set(nest.get().saturating_sub(1)));
}

/// Interrupt nesting of the calling thread
#[inline]
pub fn rt_interrupt_get_nest() -> u8 {
    IRQ_NEST.with(|nest| nest.get())
}

/// Lock the scheduler
pub fn rt_enter_critical() {
    CRITICAL_NEST.fetch_add(1, Ordering::AcqRel);
}

/// Unlock the scheduler, rescheduling when the last lock is released
pub fn rt_exit_critical() {
    let prev = CRITICAL_NEST
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
        .unwrap_or(0);
    if prev <= 1 {
        rt_schedule();
    }
}

/// Scheduler lock nesting
#[inline]
pub fn rt_critical_level() -> u16 {
    CRITICAL_NEST.load(Ordering::Acquire)
}

/// Scheduling point
///
/// Host threads are scheduled by the host, so this only gives a pending
/// suspend or delete of the calling thread a chance to take effect.
pub fn rt_schedule() {
    if rt_critical_level() > 0 || rt_interrupt_get_nest() > 0 {
        return;
    }
    if let Some(thread) = rt_thread_self() {
        thread.checkpoint();
    }
    std::thread::yield_now();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_is_per_thread() {
        rt_interrupt_enter();
        rt_interrupt_enter();
        assert_eq!(rt_interrupt_get_nest(), 2);
        let other = std::thread::spawn(rt_interrupt_get_nest).join().unwrap();
        assert_eq!(other, 0);
        rt_interrupt_leave();
        rt_interrupt_leave();
        rt_interrupt_leave();
        assert_eq!(rt_interrupt_get_nest(), 0);
    }
}
