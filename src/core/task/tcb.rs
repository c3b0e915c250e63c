//! Task Control Block (TCB) definition
//!
//! The TCB embeds the kernel thread and adds what μC/OS-III keeps per task
//! on top of it. A TCB is registered as its thread's user data, which is how
//! the calling task is found again from inside the kernel.

use core::cell::RefMut;

use crate::config::CFG_TASK_REG_TBL_SIZE;
use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;
use crate::kernel::DbgKey;
use crate::port::{rt_thread_self, RtObjectClass, RtThread};
use crate::sync::q::OsQ;
use crate::sync::sem::OsSem;
use crate::types::{
    OsFlags, OsNestingCtr, OsOpt, OsPendOn, OsPendStatus, OsPrio, OsReg, OsTick,
};

/// Per-task bookkeeping, guarded by the critical section
pub(crate) struct TcbState {
    /// Task name
    pub name: &'static str,
    /// Base priority
    pub prio: OsPrio,
    /// Task options
    pub opt: OsOpt,
    /// What the task is pending on
    pub pend_on: OsPendOn,
    /// Result of the last pend, set by abort and delete
    pub pend_status: OsPendStatus,
    /// Suspend nesting counter
    pub suspend_ctr: OsNestingCtr,
    /// Flags being waited for
    pub flags_pend: OsFlags,
    /// Flags that made the task ready
    pub flags_rdy: OsFlags,
    /// Flag options
    pub flags_opt: OsOpt,
    /// Task registers
    pub reg_tbl: [OsReg; CFG_TASK_REG_TBL_SIZE],
    /// Release tick of the last periodic delay
    pub tick_prev: OsTick,
    /// Task is inside `os_time_dly`
    pub delayed: bool,
    /// Time quanta for this task
    pub time_quanta: OsTick,
    /// Built-in semaphore was created
    pub sem_created: bool,
    /// Built-in queue was created
    pub q_created: bool,
    pub dbg: Option<DbgKey>,
}

impl TcbState {
    pub(crate) const fn new() -> Self {
        Self {
            name: "",
            prio: 0,
            opt: 0,
            pend_on: OsPendOn::Nothing,
            pend_status: OsPendStatus::Ok,
            suspend_ctr: 0,
            flags_pend: 0,
            flags_rdy: 0,
            flags_opt: 0,
            reg_tbl: [0; CFG_TASK_REG_TBL_SIZE],
            tick_prev: 0,
            delayed: false,
            time_quanta: 0,
            sem_created: false,
            q_created: false,
            dbg: None,
        }
    }
}

/// Task Control Block
pub struct OsTcb {
    pub(crate) thread: RtThread,
    /// Built-in semaphore
    pub(crate) sem: OsSem,
    /// Built-in message queue
    pub(crate) msg_q: OsQ,
    st: CsCell<TcbState>,
}

impl OsTcb {
    /// Create a new, uninitialized TCB
    pub const fn new() -> Self {
        OsTcb {
            thread: RtThread::new(),
            sem: OsSem::new(),
            msg_q: OsQ::new(),
            st: CsCell::new(TcbState::new()),
        }
    }

    #[inline]
    pub(crate) fn state<'cs>(&'cs self, cs: &'cs CriticalSection) -> RefMut<'cs, TcbState> {
        self.st.get(cs)
    }

    #[inline]
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut TcbState) -> R) -> R {
        self.st.with(f)
    }

    /// TCB registered on a kernel thread
    pub fn from_thread(thread: &RtThread) -> Option<&'static OsTcb> {
        thread.user_data()?.downcast_ref::<OsTcb>()
    }

    /// TCB of the calling task
    #[inline]
    pub fn current() -> Option<&'static OsTcb> {
        rt_thread_self().and_then(OsTcb::from_thread)
    }

    /// Check the task exists
    #[inline]
    pub fn is_created(&self) -> bool {
        self.thread.class() == RtObjectClass::Thread
    }

    pub fn name(&self) -> &'static str {
        self.with(|s| s.name)
    }

    /// Base priority
    pub fn prio(&self) -> OsPrio {
        self.with(|s| s.prio)
    }

    /// Priority the kernel currently runs the task at, including inheritance
    pub fn current_prio(&self) -> OsPrio {
        self.thread.current_priority()
    }

    /// Options the task was created with
    pub fn opt(&self) -> OsOpt {
        self.with(|s| s.opt)
    }

    pub fn pend_on(&self) -> OsPendOn {
        self.with(|s| s.pend_on)
    }

    pub fn pend_status(&self) -> OsPendStatus {
        self.with(|s| s.pend_status)
    }

    pub fn suspend_ctr(&self) -> OsNestingCtr {
        self.with(|s| s.suspend_ctr)
    }

    /// Check if task is suspended
    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspend_ctr() > 0
    }

    /// Check if task is pending
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pend_on() != OsPendOn::Nothing
    }

    /// Check if task is delayed
    #[inline]
    pub fn is_delayed(&self) -> bool {
        self.with(|s| s.delayed)
    }

    pub fn time_quanta(&self) -> OsTick {
        self.with(|s| s.time_quanta)
    }

    /// Count held by the built-in semaphore
    pub fn sem_ctr(&self) -> u32 {
        self.sem.count()
    }

    /// Messages waiting in the built-in queue
    pub fn msg_q_entries(&self) -> usize {
        self.msg_q.entries()
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tcb_is_idle() {
        let tcb = OsTcb::new();
        assert!(!tcb.is_created());
        assert!(!tcb.is_pending());
        assert!(!tcb.is_suspended());
        assert_eq!(tcb.pend_status(), OsPendStatus::Ok);
        assert!(OsTcb::current().is_none());
    }
}
