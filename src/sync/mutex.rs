//! Mutex implementation with priority inheritance
//!
//! Mutexes provide mutual exclusion with automatic priority boosting
//! to prevent priority inversion. Boosting and ownership both live in the
//! kernel mutex; the accessors below read them back on demand.

use crate::critical::{is_isr_context, CriticalSection};
use crate::error::{rt_result, OsError, OsResult};
use crate::kernel::{os_sched, sched_locked, ObjHeader};
use crate::pend::{pend_abort, pend_begin, pend_del_all, pend_end};
use crate::port::{
    rt_ipc_suspended_count, rt_mutex_detach, rt_mutex_init, rt_mutex_release, rt_mutex_take,
    rt_thread_self, RtMutex, RtObjectClass, RT_EFULL, RT_EOK, RT_ERROR, RT_IPC_FLAG_PRIO,
};
use crate::task::OsTcb;
use crate::types::{opt, OsNestingCtr, OsObjQty, OsObjType, OsOpt, OsPendOn, OsPrio, OsTick, PendTimeout};

/// Mutex with priority inheritance
pub struct OsMutex {
    mutex: RtMutex,
    hdr: ObjHeader,
}

impl OsMutex {
    /// Create a new mutex
    pub const fn new() -> Self {
        OsMutex {
            mutex: RtMutex::new(),
            hdr: ObjHeader::new(),
        }
    }

    /// Initialize the mutex
    pub fn create(&self, name: &'static str) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        let cs = CriticalSection::enter();
        if self.mutex.parent.class() == RtObjectClass::Mutex {
            return Err(OsError::ObjCreated);
        }
        rt_result(rt_mutex_init(&self.mutex, name, RT_IPC_FLAG_PRIO))?;
        self.hdr.link(&cs, name, Some(OsObjType::Mutex));
        crate::debug!("mutex {} created", name);
        Ok(())
    }

    #[inline]
    fn check(&self) -> OsResult<()> {
        if self.mutex.parent.class() != RtObjectClass::Mutex {
            return Err(OsError::ObjType);
        }
        Ok(())
    }

    /// Delete the mutex
    ///
    /// A boosted owner gets its original priority back.
    pub fn del(&self, del_opt: OsOpt) -> OsResult<OsObjQty> {
        if is_isr_context() {
            return Err(OsError::DelIsr);
        }
        self.check()?;
        let waiting = rt_ipc_suspended_count(&self.mutex.parent);
        match del_opt {
            opt::DEL_NO_PEND if waiting > 0 => return Err(OsError::TaskWaiting),
            opt::DEL_NO_PEND => {}
            opt::DEL_ALWAYS => {
                pend_del_all(&self.mutex.parent);
            }
            _ => return Err(OsError::OptInvalid),
        }
        {
            let cs = CriticalSection::enter();
            self.hdr.unlink(&cs);
        }
        rt_result(rt_mutex_detach(&self.mutex))?;
        os_sched();
        Ok(waiting.min(OsObjQty::MAX as usize) as OsObjQty)
    }

    /// Acquire the mutex
    ///
    /// If the mutex is owned by a lower-priority task, the owner's priority
    /// is temporarily boosted to prevent priority inversion.
    ///
    /// When the caller already owns the mutex the nesting counter goes up and
    /// `Err(OsError::MutexOwner)` reports it; the mutex must then be posted
    /// once more.
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait, 0 waits forever
    /// * `pend_opt` - Pend options
    pub fn pend(&self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        self.check()?;

        let me = rt_thread_self().ok_or(OsError::TcbInvalid)?;
        if self.mutex.owner().is_some_and(|owner| core::ptr::eq(owner, me)) {
            return match rt_mutex_take(&self.mutex, 0) {
                RT_EOK => Err(OsError::MutexOwner),
                rc if rc == -RT_EFULL => Err(OsError::MutexOvf),
                rc => Err(OsError::from_rt(rc)),
            };
        }

        let timeout = PendTimeout::from_ucos(timeout, pend_opt);
        if !timeout.is_non_blocking() && sched_locked() {
            return Err(OsError::SchedLocked);
        }
        let tcb = pend_begin(OsPendOn::Mutex);
        let rc = rt_mutex_take(&self.mutex, timeout.to_rt());
        pend_end(tcb, rc, timeout)
    }

    /// Abort the pend of one or every waiting task
    pub fn pend_abort(&self, abort_opt: OsOpt) -> OsResult<OsObjQty> {
        if is_isr_context() {
            return Err(OsError::PendAbortIsr);
        }
        self.check()?;
        pend_abort(&self.mutex.parent, abort_opt)
    }

    /// Release the mutex
    ///
    /// If the current task's priority was boosted due to priority inheritance,
    /// it is restored to its base priority once the last nesting level is
    /// released. Releasing an outer level only gives `Err(OsError::MutexNesting)`.
    pub fn post(&self, post_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PostIsr);
        }
        self.check()?;

        let me = rt_thread_self().ok_or(OsError::TcbInvalid)?;
        match rt_mutex_release(&self.mutex) {
            RT_EOK => {}
            rc if rc == -RT_ERROR => return Err(OsError::MutexNotOwner),
            rc => return Err(OsError::from_rt(rc)),
        }
        if self.mutex.owner().is_some_and(|owner| core::ptr::eq(owner, me)) {
            return Err(OsError::MutexNesting);
        }
        if post_opt & opt::POST_NO_SCHED == 0 {
            os_sched();
        }
        Ok(())
    }

    /// Check if mutex is owned
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.mutex.owner().is_some()
    }

    /// Task that holds the mutex
    pub fn owner(&self) -> Option<&'static OsTcb> {
        self.mutex.owner().and_then(OsTcb::from_thread)
    }

    /// How many times the owner has taken the mutex
    pub fn owner_nesting_ctr(&self) -> OsNestingCtr {
        self.mutex.hold()
    }

    /// Priority the owner had before inheritance, `None` when unowned
    pub fn owner_original_prio(&self) -> Option<OsPrio> {
        self.mutex.owner().map(|_| self.mutex.original_priority())
    }

    /// Get owner's priority, boost included
    pub fn owner_prio(&self) -> Option<OsPrio> {
        self.mutex.owner().map(|owner| owner.current_priority())
    }

    /// Tasks waiting on the mutex
    pub fn waiting(&self) -> usize {
        rt_ipc_suspended_count(&self.mutex.parent)
    }

    pub fn is_created(&self) -> bool {
        self.check().is_ok()
    }

    pub fn name(&self) -> &'static str {
        self.hdr.name()
    }
}

impl Default for OsMutex {
    fn default() -> Self {
        Self::new()
    }
}
