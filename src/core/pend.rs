//! Pend bookkeeping, pend-abort and broadcast primitives
//!
//! The kernel owns the wait lists. The helpers here drive them from the
//! outside: waking the head or every waiter with a marked status, or handing
//! a semaphore unit or a message copy to every waiter at once.

use crate::critical::CriticalSection;
use crate::error::{OsError, OsResult};
use crate::kernel::os_sched;
use crate::port::{
    rt_schedule, rt_sem_release, RtErr, RtIpcObject, RtMessageQueue, RtObjectClass, RtSemaphore,
    RT_EOK, RT_ERROR, RT_ETIMEOUT,
};
use crate::task::OsTcb;
use crate::types::{opt, OsObjQty, OsOpt, OsPendOn, OsPendStatus, PendTimeout};

/// Record what the calling task is about to pend on
///
/// Also a scheduling point, so a suspend or delete issued by another task
/// lands before the wait starts. A deleted task has no TCB any more and
/// never gets past it.
pub(crate) fn pend_begin(on: OsPendOn) -> Option<&'static OsTcb> {
    rt_schedule();
    let tcb = OsTcb::current()?;
    tcb.with(|s| {
        s.pend_on = on;
        s.pend_status = OsPendStatus::Ok;
    });
    Some(tcb)
}

/// Turn the kernel result of a pend into the μC/OS-III one
///
/// An abort or delete recorded on the TCB wins over whatever the kernel
/// returned, a timeout included.
pub(crate) fn pend_end(tcb: Option<&'static OsTcb>, rc: RtErr, timeout: PendTimeout) -> OsResult<()> {
    let status = tcb.map_or(OsPendStatus::Ok, |tcb| {
        tcb.with(|s| {
            let status = s.pend_status;
            s.pend_on = OsPendOn::Nothing;
            s.pend_status = OsPendStatus::Ok;
            status
        })
    });
    match status {
        OsPendStatus::Abort => return Err(OsError::PendAbort),
        OsPendStatus::Del => return Err(OsError::ObjDel),
        _ => {}
    }
    match rc {
        RT_EOK => Ok(()),
        rc if rc == -RT_ETIMEOUT && timeout.is_non_blocking() => Err(OsError::PendWouldBlock),
        rc => Err(OsError::from_rt(rc)),
    }
}

/// Wake the head waiter with `status`; `false` when nobody waits
fn wake_head(ipc: &RtIpcObject, status: OsPendStatus) -> bool {
    let cs = CriticalSection::enter();
    let head = ipc.state(&cs).suspend_thread.pop(&cs);
    let Some(thread) = head else {
        return false;
    };
    if let Some(tcb) = OsTcb::from_thread(thread) {
        tcb.state(&cs).pend_status = status;
    }
    thread.wake(&cs, -RT_ERROR);
    true
}

/// Abort the pend of the head waiter, without scheduling
pub(crate) fn pend_abort_one(ipc: &RtIpcObject) -> bool {
    wake_head(ipc, OsPendStatus::Abort)
}

/// Abort every pend on `ipc`, without scheduling; returns how many
pub(crate) fn pend_abort_all(ipc: &RtIpcObject) -> usize {
    let mut count = 0;
    while pend_abort_one(ipc) {
        count += 1;
    }
    count
}

/// Wake every waiter with a deleted status, ahead of detaching the object
pub(crate) fn pend_del_all(ipc: &RtIpcObject) -> usize {
    let mut count = 0;
    while wake_head(ipc, OsPendStatus::Del) {
        count += 1;
    }
    count
}

/// Pend-abort as the object APIs expose it
pub(crate) fn pend_abort(ipc: &RtIpcObject, abort_opt: OsOpt) -> OsResult<OsObjQty> {
    let count = if abort_opt & opt::PEND_ABORT_ALL != 0 {
        pend_abort_all(ipc)
    } else {
        pend_abort_one(ipc) as usize
    };
    if count == 0 {
        return Err(OsError::PendAbortNone);
    }
    if abort_opt & opt::POST_NO_SCHED == 0 {
        os_sched();
    }
    Ok(count.min(OsObjQty::MAX as usize) as OsObjQty)
}

/// Release `sem` to every waiter at once
///
/// Without waiters this is a plain release.
pub(crate) fn sem_release_all(sem: &RtSemaphore) -> RtErr {
    let woken = {
        let cs = CriticalSection::enter();
        let mut st = sem.parent.state(&cs);
        if st.class != RtObjectClass::Semaphore {
            return -RT_ERROR;
        }
        st.suspend_thread.wake_all(&cs, RT_EOK)
    };
    if woken == 0 {
        return rt_sem_release(sem);
    }
    rt_schedule();
    RT_EOK
}

/// Queue one copy of `buf` per waiter, then wake them
///
/// Without waiters one copy is queued. When the pool runs out part-way the
/// copies already queued stay, the waiters that got one are woken, and
/// `-RT_EFULL` is returned.
pub(crate) fn mq_send_all(mq: &RtMessageQueue, buf: &[u8]) -> RtErr {
    let rc = {
        let cs = CriticalSection::enter();
        let mut st = mq.parent.state(&cs);
        if st.class != RtObjectClass::MessageQueue {
            return -RT_ERROR;
        }
        let waiters = st.suspend_thread.snapshot(&cs);
        drop(st);
        if waiters.is_empty() {
            return mq.push_locked(&cs, buf, false);
        }
        let mut rc = RT_EOK;
        let mut delivered = 0;
        for _ in &waiters {
            rc = mq.push_locked(&cs, buf, false);
            if rc != RT_EOK {
                break;
            }
            delivered += 1;
        }
        for thread in waiters.iter().take(delivered) {
            thread.wake(&cs, RT_EOK);
        }
        if rc != RT_EOK {
            crate::warn!("mq send-all stopped after {} of {} copies", delivered, waiters.len());
        }
        rc
    };
    rt_schedule();
    rc
}
