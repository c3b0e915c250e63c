//! IPC objects: wait lists, semaphores and mutexes

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::cell::RefMut;

use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;

use super::{
    clip_name, rt_schedule, rt_thread_self, RtErr, RtObjectClass, RtThread, RT_EFULL, RT_EINVAL,
    RT_EOK, RT_ERROR, RT_ETIMEOUT, RT_IPC_FLAG_PRIO, RT_MUTEX_HOLD_MAX, RT_SEM_VALUE_MAX,
};

/// Reset an IPC object
pub const RT_IPC_CMD_RESET: u8 = 0x01;

#[derive(Clone, Copy)]
struct Waiter {
    thread: &'static RtThread,
    seq: u32,
}

/// Threads suspended on an IPC object
///
/// An entry stays in the list after its wait ended by timeout or resume;
/// such entries are dropped the next time the list is looked at.
pub(crate) struct WaitList {
    entries: VecDeque<Waiter>,
}

impl WaitList {
    pub(crate) const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    fn prune(&mut self, cs: &CriticalSection) {
        self.entries.retain(|w| w.thread.is_waiting(cs, w.seq));
    }

    pub(crate) fn push(&mut self, cs: &CriticalSection, thread: &'static RtThread, seq: u32, flag: u8) {
        self.prune(cs);
        let waiter = Waiter { thread, seq };
        if flag & RT_IPC_FLAG_PRIO != 0 {
            let prio = thread.ctl(cs).current_priority();
            let pos = self
                .entries
                .iter()
                .position(|w| w.thread.ctl(cs).current_priority() > prio)
                .unwrap_or(self.entries.len());
            self.entries.insert(pos, waiter);
        } else {
            self.entries.push_back(waiter);
        }
    }

    pub(crate) fn first(&mut self, cs: &CriticalSection) -> Option<&'static RtThread> {
        self.prune(cs);
        self.entries.front().map(|w| w.thread)
    }

    pub(crate) fn pop(&mut self, cs: &CriticalSection) -> Option<&'static RtThread> {
        self.prune(cs);
        self.entries.pop_front().map(|w| w.thread)
    }

    pub(crate) fn len(&mut self, cs: &CriticalSection) -> usize {
        self.prune(cs);
        self.entries.len()
    }

    /// Live waiters, head first
    pub(crate) fn snapshot(&mut self, cs: &CriticalSection) -> Vec<&'static RtThread> {
        self.prune(cs);
        self.entries.iter().map(|w| w.thread).collect()
    }

    /// Wake every waiter with `error`, returning how many were woken
    pub(crate) fn wake_all(&mut self, cs: &CriticalSection, error: RtErr) -> usize {
        let mut count = 0;
        while let Some(thread) = self.pop(cs) {
            thread.wake(cs, error);
            count += 1;
        }
        count
    }
}

pub(crate) struct IpcState {
    pub(crate) name: &'static str,
    pub(crate) class: RtObjectClass,
    pub(crate) flag: u8,
    pub(crate) suspend_thread: WaitList,
}

/// Common part of every IPC object
pub struct RtIpcObject {
    st: CsCell<IpcState>,
}

impl RtIpcObject {
    pub const fn new() -> Self {
        Self {
            st: CsCell::new(IpcState {
                name: "",
                class: RtObjectClass::Null,
                flag: 0,
                suspend_thread: WaitList::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.st.with(|s| s.name)
    }

    pub fn class(&self) -> RtObjectClass {
        self.st.with(|s| s.class)
    }

    #[inline]
    pub(crate) fn state<'cs>(&'cs self, cs: &'cs CriticalSection) -> RefMut<'cs, IpcState> {
        self.st.get(cs)
    }

    pub(crate) fn init(&self, cs: &CriticalSection, name: &'static str, class: RtObjectClass, flag: u8) {
        let mut st = self.st.get(cs);
        st.name = clip_name(name);
        st.class = class;
        st.flag = flag;
        st.suspend_thread = WaitList::new();
    }

    /// Wake all waiters with an error and drop the class
    pub(crate) fn detach(&self, cs: &CriticalSection) {
        let mut st = self.st.get(cs);
        st.suspend_thread.wake_all(cs, -RT_ERROR);
        st.class = RtObjectClass::Null;
    }

    /// Suspend the calling thread on this object
    ///
    /// A thread closed from outside is not queued; blocking it leaves it.
    pub(crate) fn suspend_self(&self, cs: &CriticalSection, timeout: i32) -> Result<&'static RtThread, RtErr> {
        let thread = rt_thread_self().ok_or(-RT_ERROR)?;
        let Some(seq) = thread.prepare_wait(cs, timeout) else {
            return Ok(thread);
        };
        let mut st = self.st.get(cs);
        let flag = st.flag;
        st.suspend_thread.push(cs, thread, seq, flag);
        Ok(thread)
    }
}

impl Default for RtIpcObject {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of threads waiting on `ipc`
pub fn rt_ipc_suspended_count(ipc: &RtIpcObject) -> usize {
    let cs = CriticalSection::enter();
    let count = ipc.state(&cs).suspend_thread.len(&cs);
    count
}

// ============ Semaphore ============

pub struct RtSemaphore {
    pub parent: RtIpcObject,
    value: CsCell<u16>,
}

impl RtSemaphore {
    pub const fn new() -> Self {
        Self {
            parent: RtIpcObject::new(),
            value: CsCell::new(0),
        }
    }

    pub fn value(&self) -> u16 {
        self.value.with(|v| *v)
    }
}

impl Default for RtSemaphore {
    fn default() -> Self {
        Self::new()
    }
}

pub fn rt_sem_init(sem: &RtSemaphore, name: &'static str, value: u32, flag: u8) -> RtErr {
    if value > RT_SEM_VALUE_MAX as u32 {
        return -RT_EINVAL;
    }
    let cs = CriticalSection::enter();
    sem.parent.init(&cs, name, RtObjectClass::Semaphore, flag);
    *sem.value.get(&cs) = value as u16;
    RT_EOK
}

pub fn rt_sem_detach(sem: &RtSemaphore) -> RtErr {
    {
        let cs = CriticalSection::enter();
        if sem.parent.state(&cs).class != RtObjectClass::Semaphore {
            return -RT_ERROR;
        }
        sem.parent.detach(&cs);
    }
    rt_schedule();
    RT_EOK
}

pub fn rt_sem_take(sem: &RtSemaphore, timeout: i32) -> RtErr {
    let thread = {
        let cs = CriticalSection::enter();
        if sem.parent.state(&cs).class != RtObjectClass::Semaphore {
            return -RT_ERROR;
        }
        let mut value = sem.value.get(&cs);
        if *value > 0 {
            *value -= 1;
            return RT_EOK;
        }
        drop(value);
        if timeout == 0 {
            return -RT_ETIMEOUT;
        }
        match sem.parent.suspend_self(&cs, timeout) {
            Ok(thread) => thread,
            Err(e) => return e,
        }
    };
    thread.block()
}

pub fn rt_sem_release(sem: &RtSemaphore) -> RtErr {
    {
        let cs = CriticalSection::enter();
        let mut st = sem.parent.state(&cs);
        if st.class != RtObjectClass::Semaphore {
            return -RT_ERROR;
        }
        match st.suspend_thread.pop(&cs) {
            Some(thread) => thread.wake(&cs, RT_EOK),
            None => {
                let mut value = sem.value.get(&cs);
                if *value == RT_SEM_VALUE_MAX {
                    return -RT_EFULL;
                }
                *value += 1;
                return RT_EOK;
            }
        }
    }
    rt_schedule();
    RT_EOK
}

/// `RT_IPC_CMD_RESET` wakes every waiter with an error and sets the value
pub fn rt_sem_control(sem: &RtSemaphore, cmd: u8, arg: u16) -> RtErr {
    if cmd != RT_IPC_CMD_RESET {
        return -RT_ERROR;
    }
    {
        let cs = CriticalSection::enter();
        let mut st = sem.parent.state(&cs);
        if st.class != RtObjectClass::Semaphore {
            return -RT_ERROR;
        }
        st.suspend_thread.wake_all(&cs, -RT_ERROR);
        *sem.value.get(&cs) = arg;
    }
    rt_schedule();
    RT_EOK
}

// ============ Mutex ============

struct MutexCtl {
    owner: Option<&'static RtThread>,
    hold: u8,
    original_priority: u8,
}

pub struct RtMutex {
    pub parent: RtIpcObject,
    ctl: CsCell<MutexCtl>,
}

impl RtMutex {
    pub const fn new() -> Self {
        Self {
            parent: RtIpcObject::new(),
            ctl: CsCell::new(MutexCtl {
                owner: None,
                hold: 0,
                original_priority: 0xFF,
            }),
        }
    }

    pub fn owner(&self) -> Option<&'static RtThread> {
        self.ctl.with(|c| c.owner)
    }

    pub fn hold(&self) -> u8 {
        self.ctl.with(|c| c.hold)
    }

    pub fn original_priority(&self) -> u8 {
        self.ctl.with(|c| c.original_priority)
    }
}

impl Default for RtMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Give the owner the best priority among itself and the waiters
fn mutex_update_owner_prio(mutex: &RtMutex, cs: &CriticalSection) {
    let c = mutex.ctl.get(cs);
    let Some(owner) = c.owner else {
        return;
    };
    let mut prio = c.original_priority;
    drop(c);
    if let Some(head) = mutex.parent.state(cs).suspend_thread.first(cs) {
        prio = prio.min(head.ctl(cs).current_priority());
    }
    owner.ctl(cs).set_current_priority(prio);
}

pub fn rt_mutex_init(mutex: &RtMutex, name: &'static str, flag: u8) -> RtErr {
    let cs = CriticalSection::enter();
    mutex.parent.init(&cs, name, RtObjectClass::Mutex, flag);
    *mutex.ctl.get(&cs) = MutexCtl {
        owner: None,
        hold: 0,
        original_priority: 0xFF,
    };
    RT_EOK
}

pub fn rt_mutex_detach(mutex: &RtMutex) -> RtErr {
    {
        let cs = CriticalSection::enter();
        if mutex.parent.state(&cs).class != RtObjectClass::Mutex {
            return -RT_ERROR;
        }
        let mut c = mutex.ctl.get(&cs);
        if let Some(owner) = c.owner.take() {
            owner.ctl(&cs).set_current_priority(c.original_priority);
        }
        c.hold = 0;
        drop(c);
        mutex.parent.detach(&cs);
    }
    rt_schedule();
    RT_EOK
}

pub fn rt_mutex_take(mutex: &RtMutex, timeout: i32) -> RtErr {
    let Some(me) = rt_thread_self() else {
        return -RT_ERROR;
    };
    {
        let cs = CriticalSection::enter();
        if mutex.parent.state(&cs).class != RtObjectClass::Mutex {
            return -RT_ERROR;
        }
        let mut c = mutex.ctl.get(&cs);
        match c.owner {
            None => {
                c.owner = Some(me);
                c.hold = 1;
                c.original_priority = me.ctl(&cs).current_priority();
                return RT_EOK;
            }
            Some(owner) if core::ptr::eq(owner, me) => {
                if c.hold >= RT_MUTEX_HOLD_MAX {
                    return -RT_EFULL;
                }
                c.hold += 1;
                return RT_EOK;
            }
            Some(_) => {}
        }
        drop(c);
        if timeout == 0 {
            return -RT_ETIMEOUT;
        }
        if let Err(e) = mutex.parent.suspend_self(&cs, timeout) {
            return e;
        }
        mutex_update_owner_prio(mutex, &cs);
    }
    let err = me.block();
    if err != RT_EOK {
        let cs = CriticalSection::enter();
        mutex_update_owner_prio(mutex, &cs);
    }
    err
}

pub fn rt_mutex_release(mutex: &RtMutex) -> RtErr {
    let Some(me) = rt_thread_self() else {
        return -RT_ERROR;
    };
    {
        let cs = CriticalSection::enter();
        if mutex.parent.state(&cs).class != RtObjectClass::Mutex {
            return -RT_ERROR;
        }
        let mut c = mutex.ctl.get(&cs);
        match c.owner {
            Some(owner) if core::ptr::eq(owner, me) => {}
            _ => return -RT_ERROR,
        }
        c.hold -= 1;
        if c.hold > 0 {
            return RT_EOK;
        }
        me.ctl(&cs).set_current_priority(c.original_priority);
        let next = mutex.parent.state(&cs).suspend_thread.pop(&cs);
        match next {
            Some(thread) => {
                c.owner = Some(thread);
                c.hold = 1;
                c.original_priority = thread.ctl(&cs).current_priority();
                drop(c);
                thread.wake(&cs, RT_EOK);
                mutex_update_owner_prio(mutex, &cs);
            }
            None => {
                c.owner = None;
                c.original_priority = 0xFF;
            }
        }
    }
    rt_schedule();
    RT_EOK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sem_counts_without_waiters() {
        static SEM: RtSemaphore = RtSemaphore::new();
        assert_eq!(rt_sem_init(&SEM, "s", 1, RT_IPC_FLAG_PRIO), RT_EOK);
        assert_eq!(rt_sem_take(&SEM, 0), RT_EOK);
        assert_eq!(rt_sem_take(&SEM, 0), -RT_ETIMEOUT);
        assert_eq!(rt_sem_release(&SEM), RT_EOK);
        assert_eq!(SEM.value(), 1);
        assert_eq!(rt_sem_control(&SEM, RT_IPC_CMD_RESET, 7), RT_EOK);
        assert_eq!(SEM.value(), 7);
        assert_eq!(rt_sem_detach(&SEM), RT_EOK);
        assert_eq!(rt_sem_take(&SEM, 0), -RT_ERROR);
    }

    #[test]
    fn sem_release_saturates() {
        static SEM: RtSemaphore = RtSemaphore::new();
        assert_eq!(rt_sem_init(&SEM, "full", RT_SEM_VALUE_MAX as u32, 0), RT_EOK);
        assert_eq!(rt_sem_release(&SEM), -RT_EFULL);
        assert_eq!(rt_sem_init(&SEM, "over", RT_SEM_VALUE_MAX as u32 + 1, 0), -RT_EINVAL);
    }

    #[test]
    fn mutex_needs_a_thread() {
        static MTX: RtMutex = RtMutex::new();
        assert_eq!(rt_mutex_init(&MTX, "m", RT_IPC_FLAG_PRIO), RT_EOK);
        assert_eq!(rt_mutex_take(&MTX, 0), -RT_ERROR);
        assert!(MTX.owner().is_none());
    }
}
