//! Task management module
//!
//! Provides task creation, deletion, and control functions. A task is a
//! kernel thread plus its [`OsTcb`]; the kernel schedules it, this module
//! only keeps the μC/OS-III bookkeeping (suspend nesting, registers, the
//! built-in semaphore and queue) in step with it.

mod tcb;

pub use tcb::OsTcb;

use alloc::boxed::Box;
use core::mem::size_of;

use portable_atomic::{AtomicU8, Ordering};

use crate::config::{CFG_PRIO_IDLE, CFG_STK_SIZE_MIN, CFG_TASK_REG_TBL_SIZE, CFG_TIME_QUANTA_DEFAULT};
use crate::critical::{is_isr_context, CriticalSection};
use crate::error::{rt_result, OsError, OsResult};
use crate::kernel::{os_sched, sched_locked, DBG, KERNEL};
use crate::port::{
    rt_schedule, rt_thread_control, rt_thread_detach, rt_thread_exit, rt_thread_init,
    rt_thread_resume, rt_thread_startup, rt_thread_suspend, rt_tick_get, RtThreadCtrl, RtThreadEntry,
    RtUserData,
};
use crate::sync::q::OsMsg;
use crate::types::{
    opt, OsMsgSize, OsNestingCtr, OsObjQty, OsObjType, OsOpt, OsPendOn, OsPrio, OsReg, OsRegId,
    OsSemCtr, OsStkElement, OsTick,
};

use tcb::TcbState;

/// Task entry point function type
///
/// Returning from the entry deletes the task.
pub type OsTaskFn = fn(*mut ());

/// Task argument carried into the task's thread
struct TaskArg(*mut ());

// SAFETY: the pointer is handed to the task untouched; what it points to is
// the creator's responsibility, as with any μC/OS-III task argument.
unsafe impl Send for TaskArg {}

impl TaskArg {
    fn get(self) -> *mut () {
        self.0
    }
}

/// Next free task register id
static REG_ID_NEXT: AtomicU8 = AtomicU8::new(0);

/// Forget every handed out register id, on `os_init`
pub(crate) fn reset_reg_ids() {
    REG_ID_NEXT.store(0, Ordering::SeqCst);
}

#[inline]
fn resolve(tcb: Option<&'static OsTcb>) -> OsResult<&'static OsTcb> {
    match tcb {
        Some(tcb) => Ok(tcb),
        None => OsTcb::current().ok_or(OsError::TcbInvalid),
    }
}

#[inline]
fn is_self(tcb: &OsTcb) -> bool {
    OsTcb::current().is_some_and(|cur| core::ptr::eq(cur, tcb))
}

#[inline]
fn check_exists(tcb: &OsTcb) -> OsResult<()> {
    if !tcb.is_created() {
        return Err(OsError::TaskNotExist);
    }
    Ok(())
}

/// Tear down what the task owns besides its thread
fn task_cleanup(tcb: &'static OsTcb) {
    let (sem_created, q_created) = tcb.with(|s| {
        let built_in = (s.sem_created, s.q_created);
        s.sem_created = false;
        s.q_created = false;
        built_in
    });
    if sem_created && tcb.sem.del(opt::DEL_ALWAYS).is_err() {
        crate::warn!("task {}: built-in semaphore already gone", tcb.name());
    }
    if q_created && tcb.msg_q.del(opt::DEL_ALWAYS).is_err() {
        crate::warn!("task {}: built-in queue already gone", tcb.name());
    }
    let cs = CriticalSection::enter();
    let key = tcb.state(&cs).dbg.take();
    if let Some(key) = key {
        DBG.get(&cs).remove(key);
    }
}

/// Create a new task
///
/// The task's thread starts right away; the kernel decides when it runs.
///
/// # Arguments
/// * `tcb` - Static Task Control Block
/// * `name` - Task name for debugging
/// * `task_fn` - Task entry point function
/// * `arg` - Argument to pass to task function
/// * `prio` - Task priority (0 = highest)
/// * `stk_size` - Stack size in [`OsStkElement`]s
/// * `q_size` - Depth of the built-in message queue, 0 for none
/// * `time_quanta` - Round-robin time slice, 0 for the default
/// * `task_opt` - Task options
///
/// # Example
/// ```ignore
/// static TASK_TCB: OsTcb = OsTcb::new();
///
/// fn my_task(_: *mut ()) {
///     loop { /* ... */ }
/// }
///
/// // In main:
/// os_task_create(
///     &TASK_TCB,
///     "MyTask",
///     my_task,
///     core::ptr::null_mut(),
///     5,
///     256,
///     0,
///     0,
///     opt::TASK_NONE,
/// )?;
/// ```
#[allow(clippy::too_many_arguments)]
pub fn os_task_create(
    tcb: &'static OsTcb,
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_size: usize,
    q_size: OsObjQty,
    time_quanta: OsTick,
    task_opt: OsOpt,
) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::TaskCreateIsr);
    }

    if !KERNEL.is_initialized() {
        return Err(OsError::OsNotInit);
    }

    if prio >= CFG_PRIO_IDLE {
        return Err(OsError::PrioInvalid);
    }

    if stk_size < CFG_STK_SIZE_MIN {
        return Err(OsError::StkSizeInvalid);
    }

    if tcb.is_created() {
        return Err(OsError::ObjCreated);
    }

    let time_quanta = if time_quanta == 0 {
        CFG_TIME_QUANTA_DEFAULT
    } else {
        time_quanta
    };

    tcb.with(|s| {
        *s = TcbState {
            name,
            prio,
            opt: task_opt,
            time_quanta,
            tick_prev: rt_tick_get(),
            ..TcbState::new()
        }
    });

    let sem_created = match tcb.sem.create_as(name, 0, None) {
        Ok(()) => true,
        Err(err) => {
            crate::warn!("task {}: built-in semaphore not created ({})", name, err.code());
            false
        }
    };
    let q_created = q_size > 0
        && match tcb.msg_q.create_as(name, q_size, None) {
            Ok(()) => true,
            Err(err) => {
                crate::warn!("task {}: built-in queue not created ({})", name, err.code());
                false
            }
        };
    tcb.with(|s| {
        s.sem_created = sem_created;
        s.q_created = q_created;
    });

    let arg = TaskArg(arg);
    let entry: RtThreadEntry = Box::new(move || {
        task_fn(arg.get());
        task_cleanup(tcb);
    });
    let rc = rt_thread_init(
        &tcb.thread,
        name,
        entry,
        stk_size * size_of::<OsStkElement>(),
        prio,
        time_quanta,
    );
    if let Err(err) = rt_result(rc) {
        task_cleanup(tcb);
        return Err(err);
    }
    tcb.thread.set_user_data(Some(tcb as RtUserData));

    {
        let cs = CriticalSection::enter();
        let key = DBG.get(&cs).insert(OsObjType::Task, name);
        tcb.state(&cs).dbg = Some(key);
    }

    if let Err(err) = rt_result(rt_thread_startup(&tcb.thread)) {
        let _ = rt_thread_detach(&tcb.thread);
        task_cleanup(tcb);
        return Err(err);
    }
    crate::debug!("task {} created at prio {}", name, prio);

    if KERNEL.is_running() {
        os_sched();
    }
    Ok(())
}

/// Delete a task, `None` for the calling task
///
/// Deleting the calling task does not return.
pub fn os_task_del(tcb: Option<&'static OsTcb>) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::TaskDelIsr);
    }

    let tcb = resolve(tcb)?;
    check_exists(tcb)?;

    if is_self(tcb) {
        crate::debug!("task {} deletes itself", tcb.name());
        task_cleanup(tcb);
        rt_thread_exit();
    }

    rt_result(rt_thread_detach(&tcb.thread))?;
    task_cleanup(tcb);
    crate::debug!("task {} deleted", tcb.name());
    os_sched();
    Ok(())
}

/// Suspend a task, `None` for the calling task
///
/// Suspends nest: the task runs again once every suspend has been matched
/// by a resume.
pub fn os_task_suspend(tcb: Option<&'static OsTcb>) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::TaskSuspendIsr);
    }

    let tcb = resolve(tcb)?;
    check_exists(tcb)?;

    let me = is_self(tcb);
    if me && sched_locked() {
        return Err(OsError::SchedLocked);
    }

    let first = {
        let cs = CriticalSection::enter();
        let mut s = tcb.state(&cs);
        if s.suspend_ctr == OsNestingCtr::MAX {
            return Err(OsError::TaskSuspendCtrOvf);
        }
        s.suspend_ctr += 1;
        s.suspend_ctr == 1
    };

    if first {
        if let Err(err) = rt_result(rt_thread_suspend(&tcb.thread)) {
            tcb.with(|s| s.suspend_ctr -= 1);
            return Err(err);
        }
    }

    if me {
        rt_schedule();
    }
    Ok(())
}

/// Resume a suspended task
pub fn os_task_resume(tcb: Option<&'static OsTcb>) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::TaskResumeIsr);
    }

    let tcb = match tcb {
        Some(tcb) if !is_self(tcb) => tcb,
        _ => return Err(OsError::TaskResumeSelf),
    };
    check_exists(tcb)?;

    let last = {
        let cs = CriticalSection::enter();
        let mut s = tcb.state(&cs);
        if s.suspend_ctr == 0 {
            return Err(OsError::TaskNotSuspended);
        }
        s.suspend_ctr -= 1;
        s.suspend_ctr == 0
    };

    if last {
        rt_result(rt_thread_resume(&tcb.thread))?;
        os_sched();
    }
    Ok(())
}

/// Change the base priority of a task, `None` for the calling task
pub fn os_task_change_prio(tcb: Option<&'static OsTcb>, prio_new: OsPrio) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::TaskChangePrioIsr);
    }

    if prio_new >= CFG_PRIO_IDLE {
        return Err(OsError::PrioInvalid);
    }

    let tcb = resolve(tcb)?;
    check_exists(tcb)?;

    rt_result(rt_thread_control(&tcb.thread, RtThreadCtrl::ChangePriority(prio_new)))?;
    tcb.with(|s| s.prio = prio_new);
    os_sched();
    Ok(())
}

/// Set the round-robin time slice of a task, 0 for the default
pub fn os_task_time_quanta_set(tcb: Option<&'static OsTcb>, time_quanta: OsTick) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::SetIsr);
    }

    let tcb = resolve(tcb)?;
    check_exists(tcb)?;

    let time_quanta = if time_quanta == 0 {
        CFG_TIME_QUANTA_DEFAULT
    } else {
        time_quanta
    };
    tcb.thread.set_init_tick(time_quanta);
    tcb.with(|s| s.time_quanta = time_quanta);
    Ok(())
}

/// The calling task's TCB
#[inline]
pub fn os_tcb_cur() -> Option<&'static OsTcb> {
    OsTcb::current()
}

// ============ Task registers ============

/// Hand out the next free task register id
pub fn os_task_reg_get_id() -> OsResult<OsRegId> {
    REG_ID_NEXT
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| {
            ((id as usize) < CFG_TASK_REG_TBL_SIZE).then_some(id + 1)
        })
        .map_err(|_| OsError::TaskRegIdInvalid)
}

/// Read a task register
pub fn os_task_reg_get(tcb: Option<&'static OsTcb>, id: OsRegId) -> OsResult<OsReg> {
    if id as usize >= CFG_TASK_REG_TBL_SIZE {
        return Err(OsError::TaskRegIdInvalid);
    }
    let tcb = resolve(tcb)?;
    Ok(tcb.with(|s| s.reg_tbl[id as usize]))
}

/// Write a task register
pub fn os_task_reg_set(tcb: Option<&'static OsTcb>, id: OsRegId, value: OsReg) -> OsResult<()> {
    if id as usize >= CFG_TASK_REG_TBL_SIZE {
        return Err(OsError::TaskRegIdInvalid);
    }
    let tcb = resolve(tcb)?;
    tcb.with(|s| s.reg_tbl[id as usize] = value);
    Ok(())
}

// ============ Built-in semaphore ============

fn task_sem(tcb: &OsTcb) -> OsResult<()> {
    if !tcb.with(|s| s.sem_created) {
        return Err(OsError::TaskObjNotCreated);
    }
    Ok(())
}

fn task_q(tcb: &OsTcb) -> OsResult<()> {
    if !tcb.with(|s| s.q_created) {
        return Err(OsError::TaskObjNotCreated);
    }
    Ok(())
}

/// Wait on the calling task's built-in semaphore
pub fn os_task_sem_pend(timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsSemCtr> {
    if is_isr_context() {
        return Err(OsError::PendIsr);
    }
    let tcb = OsTcb::current().ok_or(OsError::TcbInvalid)?;
    task_sem(tcb)?;
    tcb.sem.pend_as(timeout, pend_opt, OsPendOn::TaskSem)
}

/// Signal a task's built-in semaphore, `None` for the calling task
pub fn os_task_sem_post(tcb: Option<&'static OsTcb>, post_opt: OsOpt) -> OsResult<OsSemCtr> {
    let tcb = resolve(tcb)?;
    task_sem(tcb)?;
    tcb.sem.post(post_opt & opt::POST_NO_SCHED)
}

/// Force the count of a task's built-in semaphore, returning the old count
pub fn os_task_sem_set(tcb: Option<&'static OsTcb>, cnt: OsSemCtr) -> OsResult<OsSemCtr> {
    let tcb = resolve(tcb)?;
    task_sem(tcb)?;
    tcb.sem.set(cnt)
}

/// Abort the wait of a task on its built-in semaphore
pub fn os_task_sem_pend_abort(tcb: &'static OsTcb, abort_opt: OsOpt) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::PendAbortIsr);
    }
    if is_self(tcb) {
        return Err(OsError::PendAbortSelf);
    }
    task_sem(tcb)?;
    tcb.sem
        .pend_abort(opt::PEND_ABORT_1 | (abort_opt & opt::POST_NO_SCHED))
        .map(|_| ())
}

// ============ Built-in message queue ============

/// Wait for a message on the calling task's built-in queue
pub fn os_task_q_pend(timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsMsg> {
    if is_isr_context() {
        return Err(OsError::PendIsr);
    }
    let tcb = OsTcb::current().ok_or(OsError::TcbInvalid)?;
    task_q(tcb)?;
    tcb.msg_q.pend_as(timeout, pend_opt, OsPendOn::TaskQueue)
}

/// Post a message to a task's built-in queue, `None` for the calling task
pub fn os_task_q_post(
    tcb: Option<&'static OsTcb>,
    msg: *const (),
    size: OsMsgSize,
    post_opt: OsOpt,
) -> OsResult<()> {
    let tcb = resolve(tcb)?;
    task_q(tcb)?;
    tcb.msg_q.post(msg, size, post_opt & !opt::POST_ALL)
}

/// Drop every message in a task's built-in queue
pub fn os_task_q_flush(tcb: Option<&'static OsTcb>) -> OsResult<OsObjQty> {
    let tcb = resolve(tcb)?;
    task_q(tcb)?;
    tcb.msg_q.flush()
}

/// Abort the wait of a task on its built-in queue
pub fn os_task_q_pend_abort(tcb: &'static OsTcb, abort_opt: OsOpt) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::PendAbortIsr);
    }
    if is_self(tcb) {
        return Err(OsError::PendAbortSelf);
    }
    task_q(tcb)?;
    tcb.msg_q
        .pend_abort(opt::PEND_ABORT_1 | (abort_opt & opt::POST_NO_SCHED))
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_ids_run_out() {
        reset_reg_ids();
        for expected in 0..CFG_TASK_REG_TBL_SIZE as OsRegId {
            assert_eq!(os_task_reg_get_id(), Ok(expected));
        }
        assert_eq!(os_task_reg_get_id(), Err(OsError::TaskRegIdInvalid));
        reset_reg_ids();
    }

    #[test]
    fn calls_outside_a_task() {
        assert_eq!(os_task_sem_pend(0, opt::PEND_BLOCKING), Err(OsError::TcbInvalid));
        assert_eq!(os_task_del(None), Err(OsError::TcbInvalid));
        assert_eq!(os_task_resume(None), Err(OsError::TaskResumeSelf));
        assert_eq!(os_task_reg_get(None, 0), Err(OsError::TcbInvalid));
        assert_eq!(
            os_task_reg_set(None, CFG_TASK_REG_TBL_SIZE as OsRegId, 1),
            Err(OsError::TaskRegIdInvalid)
        );
    }

    #[test]
    fn unstarted_task_does_not_exist() {
        static TCB: OsTcb = OsTcb::new();
        assert_eq!(os_task_suspend(Some(&TCB)), Err(OsError::TaskNotExist));
        assert_eq!(os_task_resume(Some(&TCB)), Err(OsError::TaskNotExist));
        assert_eq!(os_task_sem_post(Some(&TCB), opt::POST_FIFO), Err(OsError::TaskObjNotCreated));
    }
}
