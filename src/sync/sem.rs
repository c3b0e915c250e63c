//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting,
//! backed by a kernel semaphore.

use crate::critical::{is_isr_context, CriticalSection};
use crate::error::{rt_result, OsError, OsResult};
use crate::kernel::{os_sched, sched_locked, ObjHeader};
use crate::pend::{pend_abort, pend_begin, pend_del_all, pend_end, sem_release_all};
use crate::port::{
    rt_ipc_suspended_count, rt_sem_control, rt_sem_detach, rt_sem_init, rt_sem_release,
    rt_sem_take, RtObjectClass, RtSemaphore, RT_EFULL, RT_IPC_CMD_RESET, RT_IPC_FLAG_PRIO,
    RT_SEM_VALUE_MAX,
};
use crate::types::{opt, OsObjQty, OsObjType, OsOpt, OsPendOn, OsSemCtr, OsTick, PendTimeout};

/// Counting semaphore
pub struct OsSem {
    sem: RtSemaphore,
    hdr: ObjHeader,
}

impl OsSem {
    /// Create a new semaphore object; it must be created before use
    pub const fn new() -> Self {
        OsSem {
            sem: RtSemaphore::new(),
            hdr: ObjHeader::new(),
        }
    }

    /// Initialize/create the semaphore
    ///
    /// # Arguments
    /// * `name` - Semaphore name
    /// * `cnt` - Initial count value
    pub fn create(&self, name: &'static str, cnt: OsSemCtr) -> OsResult<()> {
        self.create_as(name, cnt, Some(OsObjType::Sem))
    }

    pub(crate) fn create_as(&self, name: &'static str, cnt: OsSemCtr, kind: Option<OsObjType>) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }
        if cnt > RT_SEM_VALUE_MAX as OsSemCtr {
            return Err(OsError::SemOvf);
        }
        let cs = CriticalSection::enter();
        if self.sem.parent.class() == RtObjectClass::Semaphore {
            return Err(OsError::ObjCreated);
        }
        rt_result(rt_sem_init(&self.sem, name, cnt, RT_IPC_FLAG_PRIO))?;
        self.hdr.link(&cs, name, kind);
        crate::debug!("sem {} created", name);
        Ok(())
    }

    #[inline]
    fn check(&self) -> OsResult<()> {
        if self.sem.parent.class() != RtObjectClass::Semaphore {
            return Err(OsError::ObjType);
        }
        Ok(())
    }

    /// Delete the semaphore
    ///
    /// Returns the number of tasks that were waiting. With `DEL_NO_PEND` the
    /// delete is refused while tasks wait; with `DEL_ALWAYS` they are woken
    /// with `ObjDel`.
    pub fn del(&self, del_opt: OsOpt) -> OsResult<OsObjQty> {
        if is_isr_context() {
            return Err(OsError::DelIsr);
        }
        self.check()?;
        let waiting = rt_ipc_suspended_count(&self.sem.parent);
        match del_opt {
            opt::DEL_NO_PEND if waiting > 0 => return Err(OsError::TaskWaiting),
            opt::DEL_NO_PEND => {}
            opt::DEL_ALWAYS => {
                pend_del_all(&self.sem.parent);
            }
            _ => return Err(OsError::OptInvalid),
        }
        {
            let cs = CriticalSection::enter();
            self.hdr.unlink(&cs);
        }
        rt_result(rt_sem_detach(&self.sem))?;
        os_sched();
        Ok(waiting.min(OsObjQty::MAX as usize) as OsObjQty)
    }

    /// Wait on the semaphore
    ///
    /// # Arguments
    /// * `timeout` - Timeout in ticks, 0 waits forever
    /// * `pend_opt` - `PEND_BLOCKING` or `PEND_NON_BLOCKING`
    ///
    /// # Returns
    /// The count left after taking a unit
    pub fn pend(&self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsSemCtr> {
        self.pend_as(timeout, pend_opt, OsPendOn::Semaphore)
    }

    pub(crate) fn pend_as(&self, timeout: OsTick, pend_opt: OsOpt, on: OsPendOn) -> OsResult<OsSemCtr> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        self.check()?;
        let timeout = PendTimeout::from_ucos(timeout, pend_opt);
        if !timeout.is_non_blocking() && sched_locked() {
            return Err(OsError::SchedLocked);
        }
        let tcb = pend_begin(on);
        let rc = rt_sem_take(&self.sem, timeout.to_rt());
        pend_end(tcb, rc, timeout)?;
        Ok(self.count())
    }

    /// Abort the pend of one (`PEND_ABORT_1`) or every (`PEND_ABORT_ALL`) waiter
    pub fn pend_abort(&self, abort_opt: OsOpt) -> OsResult<OsObjQty> {
        if is_isr_context() {
            return Err(OsError::PendAbortIsr);
        }
        self.check()?;
        pend_abort(&self.sem.parent, abort_opt)
    }

    /// Signal the semaphore
    ///
    /// `POST_ALL` hands a unit to every waiting task.
    pub fn post(&self, post_opt: OsOpt) -> OsResult<OsSemCtr> {
        self.check()?;
        let rc = if post_opt & opt::POST_ALL != 0 {
            sem_release_all(&self.sem)
        } else {
            rt_sem_release(&self.sem)
        };
        if rc == -RT_EFULL {
            return Err(OsError::SemOvf);
        }
        rt_result(rc)?;
        Ok(self.count())
    }

    /// Force the count, refused while tasks wait
    pub fn set(&self, cnt: OsSemCtr) -> OsResult<OsSemCtr> {
        if is_isr_context() {
            return Err(OsError::SetIsr);
        }
        self.check()?;
        if cnt > RT_SEM_VALUE_MAX as OsSemCtr {
            return Err(OsError::SemOvf);
        }
        if rt_ipc_suspended_count(&self.sem.parent) > 0 {
            return Err(OsError::TaskWaiting);
        }
        let prev = self.count();
        rt_result(rt_sem_control(&self.sem, RT_IPC_CMD_RESET, cnt as u16))?;
        Ok(prev)
    }

    /// Current count
    #[inline]
    pub fn count(&self) -> OsSemCtr {
        self.sem.value() as OsSemCtr
    }

    /// Tasks waiting on the semaphore
    pub fn waiting(&self) -> usize {
        rt_ipc_suspended_count(&self.sem.parent)
    }

    pub fn is_created(&self) -> bool {
        self.check().is_ok()
    }

    pub fn name(&self) -> &'static str {
        self.hdr.name()
    }
}

impl Default for OsSem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_sem_rejects_operations() {
        let sem = OsSem::new();
        assert_eq!(sem.post(opt::POST_FIFO), Err(OsError::ObjType));
        assert_eq!(sem.pend(0, opt::PEND_NON_BLOCKING), Err(OsError::ObjType));
        assert_eq!(sem.del(opt::DEL_ALWAYS), Err(OsError::ObjType));
    }

    #[test]
    fn count_follows_posts() {
        let sem = OsSem::new();
        sem.create("count", 0).unwrap();
        assert_eq!(sem.create("again", 0), Err(OsError::ObjCreated));
        assert_eq!(sem.post(opt::POST_FIFO), Ok(1));
        assert_eq!(sem.post(opt::POST_ALL), Ok(2));
        assert_eq!(sem.pend(0, opt::PEND_NON_BLOCKING), Ok(1));
        assert_eq!(sem.set(10), Ok(1));
        assert_eq!(sem.count(), 10);
        assert_eq!(sem.pend_abort(opt::PEND_ABORT_ALL), Err(OsError::PendAbortNone));
        assert_eq!(sem.del(opt::DEL_NO_PEND), Ok(0));
        assert!(!sem.is_created());
    }

    #[test]
    fn non_blocking_pend_would_block() {
        let sem = OsSem::new();
        sem.create("empty", 0).unwrap();
        assert_eq!(sem.pend(100, opt::PEND_NON_BLOCKING), Err(OsError::PendWouldBlock));
        sem.del(opt::DEL_ALWAYS).unwrap();
    }
}
