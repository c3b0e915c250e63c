//! Critical section handling
//!
//! The wrapper never disables interrupts itself: entering a critical section
//! is forwarded to the kernel's `rt_hw_interrupt_disable`/`enable` pair.

use crate::port::{self, RtLevel};

/// RAII guard for critical sections
///
/// When this guard is created the kernel critical section is entered.
/// When it is dropped, the previous state is restored.
pub struct CriticalSection {
    level: RtLevel,
}

impl CriticalSection {
    /// Enter a critical section.
    #[inline(always)]
    pub fn enter() -> Self {
        CriticalSection {
            level: port::rt_hw_interrupt_disable(),
        }
    }

    /// Token proving the critical section is held, for [`CsCell`](crate::core::cs_cell::CsCell)
    #[inline(always)]
    pub(crate) fn token(&self) -> critical_section::CriticalSection<'_> {
        // SAFETY: the guard holds the critical section until it is dropped,
        // and the token cannot outlive the guard.
        unsafe { critical_section::CriticalSection::new() }
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        port::rt_hw_interrupt_enable(self.level);
    }
}

/// Execute a closure inside the kernel critical section
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    port::rt_interrupt_get_nest() > 0
}
