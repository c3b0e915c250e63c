//! Kernel threads on std threads
//!
//! Every kernel thread is backed by one host thread. Blocking is done on a
//! per-thread parker outside the critical section; wake-ups change the
//! thread's state under the critical section and then unpark it.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::{Cell, RefMut};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread_local;

use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;

use super::{
    clip_name, rt_schedule, rt_tick_get, tick_reached, RtErr, RtObjectClass, RtTick, RT_EFULL,
    RT_EINVAL, RT_ENOMEM, RT_EOK, RT_ERROR, RT_ETIMEOUT, RT_THREAD_PRIORITY_MAX,
};

/// Smallest stack handed to a host thread
const HOST_STACK_MIN: usize = 64 * 1024;
/// Idle hook slots
pub const RT_IDLE_HOOK_LIST_SIZE: usize = 4;

/// Thread entry
pub type RtThreadEntry = Box<dyn FnOnce() + Send + 'static>;
/// Thread user data
pub type RtUserData = &'static (dyn Any + Send + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtThreadStat {
    Init,
    Ready,
    Suspend,
    Close,
}

/// Thread control commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtThreadCtrl {
    ChangePriority(u8),
}

pub(crate) struct ThreadCtl {
    name: &'static str,
    class: RtObjectClass,
    stat: RtThreadStat,
    error: RtErr,
    init_priority: u8,
    current_priority: u8,
    init_tick: RtTick,
    stack_size: usize,
    generation: u32,
    wait_seq: u32,
    timeout_at: Option<RtTick>,
    /// Held by `rt_thread_suspend`, independent of any wait
    held: bool,
    /// Event bits wanted, then bits received
    pub(crate) event_set: u32,
    pub(crate) event_info: u8,
    entry: Option<RtThreadEntry>,
    user_data: Option<RtUserData>,
}

impl ThreadCtl {
    const fn new() -> Self {
        Self {
            name: "",
            class: RtObjectClass::Null,
            stat: RtThreadStat::Init,
            error: RT_EOK,
            init_priority: 0,
            current_priority: 0,
            init_tick: 0,
            stack_size: 0,
            generation: 0,
            wait_seq: 0,
            timeout_at: None,
            held: false,
            event_set: 0,
            event_info: 0,
            entry: None,
            user_data: None,
        }
    }

    #[inline]
    pub(crate) fn current_priority(&self) -> u8 {
        self.current_priority
    }

    #[inline]
    pub(crate) fn set_current_priority(&mut self, prio: u8) {
        self.current_priority = prio;
    }
}

struct Parker {
    woken: Mutex<bool>,
    cv: Condvar,
}

impl Parker {
    const fn new() -> Self {
        Self {
            woken: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn park(&self) {
        let mut woken = self.woken.lock().unwrap_or_else(PoisonError::into_inner);
        while !*woken {
            woken = self.cv.wait(woken).unwrap_or_else(PoisonError::into_inner);
        }
        *woken = false;
    }

    fn unpark(&self) {
        let mut woken = self.woken.lock().unwrap_or_else(PoisonError::into_inner);
        *woken = true;
        self.cv.notify_one();
    }
}

/// Kernel thread object
pub struct RtThread {
    ctl: CsCell<ThreadCtl>,
    parker: Parker,
}

/// Threads that have been initialised and not yet detached
static THREADS: CsCell<Vec<&'static RtThread>> = CsCell::new(Vec::new());

static IDLE_HOOKS: CsCell<[Option<fn()>; RT_IDLE_HOOK_LIST_SIZE]> =
    CsCell::new([None; RT_IDLE_HOOK_LIST_SIZE]);

thread_local! {
    static CURRENT: Cell<Option<&'static RtThread>> = const { Cell::new(None) };
}

/// Unwind payload used to leave a thread from anywhere in its call stack
struct ThreadExit;

impl RtThread {
    pub const fn new() -> Self {
        Self {
            ctl: CsCell::new(ThreadCtl::new()),
            parker: Parker::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.ctl.with(|c| c.name)
    }

    pub fn class(&self) -> RtObjectClass {
        self.ctl.with(|c| c.class)
    }

    pub fn stat(&self) -> RtThreadStat {
        self.ctl.with(|c| c.stat)
    }

    pub fn error(&self) -> RtErr {
        self.ctl.with(|c| c.error)
    }

    pub fn current_priority(&self) -> u8 {
        self.ctl.with(|c| c.current_priority)
    }

    pub fn init_priority(&self) -> u8 {
        self.ctl.with(|c| c.init_priority)
    }

    pub fn init_tick(&self) -> RtTick {
        self.ctl.with(|c| c.init_tick)
    }

    pub fn set_init_tick(&self, tick: RtTick) {
        self.ctl.with(|c| c.init_tick = tick);
    }

    pub fn stack_size(&self) -> usize {
        self.ctl.with(|c| c.stack_size)
    }

    pub fn user_data(&self) -> Option<RtUserData> {
        self.ctl.with(|c| c.user_data)
    }

    pub fn set_user_data(&self, data: Option<RtUserData>) {
        self.ctl.with(|c| c.user_data = data);
    }

    #[inline]
    pub(crate) fn ctl<'cs>(&'cs self, cs: &'cs CriticalSection) -> RefMut<'cs, ThreadCtl> {
        self.ctl.get(cs)
    }

    /// Bits handed over by the event send that ended the last wait
    pub(crate) fn event_received(&self) -> u32 {
        self.ctl.with(|c| c.event_set)
    }

    /// Mark the thread as waiting and return the wait sequence number
    ///
    /// A closed thread never starts a wait; `None` tells the caller not to
    /// queue it, and its next [`block`](Self::block) leaves the thread.
    pub(crate) fn prepare_wait(&self, cs: &CriticalSection, timeout: i32) -> Option<u32> {
        let mut c = self.ctl.get(cs);
        if c.class != RtObjectClass::Thread || c.stat == RtThreadStat::Close {
            return None;
        }
        c.stat = RtThreadStat::Suspend;
        c.error = RT_EOK;
        c.wait_seq = c.wait_seq.wrapping_add(1);
        c.timeout_at = if timeout > 0 {
            Some(rt_tick_get().wrapping_add(timeout as RtTick))
        } else {
            None
        };
        Some(c.wait_seq)
    }

    /// `true` while the wait identified by `seq` is still in progress
    pub(crate) fn is_waiting(&self, cs: &CriticalSection, seq: u32) -> bool {
        let c = self.ctl.get(cs);
        c.stat == RtThreadStat::Suspend && c.wait_seq == seq
    }

    /// Make a suspended thread ready with `error` as the result of its wait
    pub(crate) fn wake(&self, cs: &CriticalSection, error: RtErr) {
        let mut c = self.ctl.get(cs);
        if c.stat != RtThreadStat::Suspend {
            return;
        }
        c.stat = RtThreadStat::Ready;
        c.error = error;
        c.timeout_at = None;
        drop(c);
        self.parker.unpark();
    }

    /// `true` while held by [`rt_thread_suspend`]
    pub fn is_held(&self) -> bool {
        self.ctl.with(|c| c.held)
    }

    /// Park the calling host thread until this thread is made ready again
    ///
    /// A thread whose wait ended while it was held stays parked, with the
    /// result of the wait kept, until it is resumed.
    pub(crate) fn block(&self) -> RtErr {
        loop {
            let (stat, held, error) = self.ctl.with(|c| (c.stat, c.held, c.error));
            match stat {
                RtThreadStat::Close => rt_thread_exit(),
                RtThreadStat::Suspend => self.parker.park(),
                _ if held => self.parker.park(),
                _ => return error,
            }
        }
    }

    /// Apply a pending suspend or delete of the calling thread
    pub(crate) fn checkpoint(&self) {
        let _ = self.block();
    }
}

impl Default for RtThread {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialise a thread object; it runs once started
pub fn rt_thread_init(
    thread: &'static RtThread,
    name: &'static str,
    entry: RtThreadEntry,
    stack_size: usize,
    priority: u8,
    tick: RtTick,
) -> RtErr {
    if priority >= RT_THREAD_PRIORITY_MAX {
        return -RT_EINVAL;
    }
    let cs = CriticalSection::enter();
    let mut c = thread.ctl.get(&cs);
    if c.class == RtObjectClass::Thread {
        return -RT_ERROR;
    }
    let generation = c.generation.wrapping_add(1);
    *c = ThreadCtl {
        name: clip_name(name),
        class: RtObjectClass::Thread,
        init_priority: priority,
        current_priority: priority,
        init_tick: tick,
        stack_size,
        generation,
        wait_seq: c.wait_seq,
        entry: Some(entry),
        ..ThreadCtl::new()
    };
    drop(c);
    THREADS.get(&cs).push(thread);
    RT_EOK
}

/// Start an initialised thread
pub fn rt_thread_startup(thread: &'static RtThread) -> RtErr {
    let cs = CriticalSection::enter();
    let mut c = thread.ctl.get(&cs);
    if c.class != RtObjectClass::Thread || c.stat != RtThreadStat::Init {
        return -RT_ERROR;
    }
    let Some(entry) = c.entry.take() else {
        return -RT_ERROR;
    };
    c.stat = RtThreadStat::Ready;
    let (name, stack_size, generation) = (c.name, c.stack_size, c.generation);
    drop(c);
    drop(cs);

    let spawned = std::thread::Builder::new()
        .name(name.into())
        .stack_size(stack_size.max(HOST_STACK_MIN))
        .spawn(move || thread_main(thread, generation, entry));
    match spawned {
        Ok(_) => RT_EOK,
        Err(_) => {
            let cs = CriticalSection::enter();
            thread.ctl.get(&cs).stat = RtThreadStat::Close;
            -RT_ENOMEM
        }
    }
}

fn thread_main(thread: &'static RtThread, generation: u32, entry: RtThreadEntry) {
    CURRENT.with(|cur| cur.set(Some(thread)));
    let ret = std::panic::catch_unwind(std::panic::AssertUnwindSafe(entry));
    {
        let cs = CriticalSection::enter();
        if thread.ctl.get(&cs).generation == generation {
            close_locked(thread, &cs);
        }
    }
    CURRENT.with(|cur| cur.set(None));
    if let Err(payload) = ret {
        if !payload.is::<ThreadExit>() {
            std::panic::resume_unwind(payload);
        }
    }
}

fn close_locked(thread: &'static RtThread, cs: &CriticalSection) {
    let mut c = thread.ctl.get(cs);
    c.stat = RtThreadStat::Close;
    c.class = RtObjectClass::Null;
    c.timeout_at = None;
    c.held = false;
    c.user_data = None;
    drop(c);
    THREADS.get(cs).retain(|t| !core::ptr::eq(*t, thread));
    thread.parker.unpark();
}

/// The thread the caller runs on, if it is a kernel thread
#[inline]
pub fn rt_thread_self() -> Option<&'static RtThread> {
    CURRENT.with(|cur| cur.get())
}

/// Remove a thread from the kernel
///
/// A thread detaching another one stops it at its next kernel entry.
pub fn rt_thread_detach(thread: &'static RtThread) -> RtErr {
    let cs = CriticalSection::enter();
    if thread.ctl.get(&cs).class != RtObjectClass::Thread {
        return -RT_ERROR;
    }
    close_locked(thread, &cs);
    RT_EOK
}

/// Leave the calling thread
pub fn rt_thread_exit() -> ! {
    if let Some(thread) = rt_thread_self() {
        let cs = CriticalSection::enter();
        if thread.ctl.get(&cs).class == RtObjectClass::Thread {
            close_locked(thread, &cs);
        }
    }
    std::panic::resume_unwind(Box::new(ThreadExit))
}

/// Hold a thread
///
/// A running thread stops at its next kernel entry. A waiting thread keeps
/// waiting; once the wait ends it stays stopped until resumed.
pub fn rt_thread_suspend(thread: &'static RtThread) -> RtErr {
    let cs = CriticalSection::enter();
    let mut c = thread.ctl.get(&cs);
    if c.class != RtObjectClass::Thread || c.held {
        return -RT_ERROR;
    }
    c.held = true;
    RT_EOK
}

/// Release a thread held by [`rt_thread_suspend`]
///
/// Any wait in progress goes on.
pub fn rt_thread_resume(thread: &'static RtThread) -> RtErr {
    let cs = CriticalSection::enter();
    let mut c = thread.ctl.get(&cs);
    if c.class != RtObjectClass::Thread || !c.held {
        return -RT_ERROR;
    }
    c.held = false;
    drop(c);
    thread.parker.unpark();
    RT_EOK
}

/// End the wait of a thread early, keeping its error code
pub fn rt_thread_wakeup(thread: &'static RtThread) -> RtErr {
    let cs = CriticalSection::enter();
    let c = thread.ctl.get(&cs);
    if c.class != RtObjectClass::Thread || c.stat != RtThreadStat::Suspend {
        return -RT_ERROR;
    }
    let error = c.error;
    drop(c);
    thread.wake(&cs, error);
    RT_EOK
}

/// Set the error code the thread sees when its wait ends
pub fn rt_thread_set_error(thread: &RtThread, error: RtErr) {
    thread.ctl.with(|c| c.error = error);
}

/// Sleep for `ticks`
///
/// A pending hold lands first, so the delay starts once the thread is resumed.
pub fn rt_thread_delay(ticks: RtTick) -> RtErr {
    let Some(thread) = rt_thread_self() else {
        return -RT_ERROR;
    };
    if ticks == 0 {
        return rt_thread_yield();
    }
    thread.checkpoint();
    {
        let cs = CriticalSection::enter();
        thread.prepare_wait(&cs, ticks.min(i32::MAX as RtTick) as i32);
    }
    match thread.block() {
        e if e == -RT_ETIMEOUT => RT_EOK,
        e => e,
    }
}

pub fn rt_thread_yield() -> RtErr {
    rt_schedule();
    RT_EOK
}

pub fn rt_thread_control(thread: &'static RtThread, cmd: RtThreadCtrl) -> RtErr {
    match cmd {
        RtThreadCtrl::ChangePriority(prio) => {
            if prio >= RT_THREAD_PRIORITY_MAX {
                return -RT_EINVAL;
            }
            let cs = CriticalSection::enter();
            let mut c = thread.ctl.get(&cs);
            if c.class != RtObjectClass::Thread {
                return -RT_ERROR;
            }
            c.init_priority = prio;
            c.current_priority = prio;
            RT_EOK
        }
    }
}

/// Expire thread waits whose deadline has passed
pub(crate) fn expire_timeouts(now: RtTick) {
    let cs = CriticalSection::enter();
    let threads = THREADS.get(&cs);
    for thread in threads.iter() {
        let mut c = thread.ctl.get(&cs);
        if c.stat != RtThreadStat::Suspend {
            continue;
        }
        if let Some(at) = c.timeout_at {
            if tick_reached(now, at) {
                c.stat = RtThreadStat::Ready;
                c.error = -RT_ETIMEOUT;
                c.timeout_at = None;
                drop(c);
                thread.parker.unpark();
            }
        }
    }
}

/// Register an idle hook
pub fn rt_thread_idle_sethook(hook: fn()) -> RtErr {
    IDLE_HOOKS.with(|hooks| match hooks.iter_mut().find(|h| h.is_none()) {
        Some(slot) => {
            *slot = Some(hook);
            RT_EOK
        }
        None => -RT_EFULL,
    })
}

/// Remove an idle hook
pub fn rt_thread_idle_delhook(hook: fn()) -> RtErr {
    IDLE_HOOKS.with(|hooks| {
        match hooks.iter_mut().find(|h| h.map_or(false, |f| f as usize == hook as usize)) {
            Some(slot) => {
                *slot = None;
                RT_EOK
            }
            None => -RT_ERROR,
        }
    })
}

/// Run the idle hooks once
///
/// The host has no idle thread; whoever stands in for it calls this.
pub fn rt_thread_idle_execute() {
    let hooks = IDLE_HOOKS.with(|hooks| *hooks);
    for hook in hooks.iter().flatten() {
        hook();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::host::{
        rt_ipc_suspended_count, rt_sem_init, rt_sem_release, rt_sem_take, RtSemaphore,
        RT_IPC_FLAG_PRIO, RT_WAITING_FOREVER,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn thread_runs_and_closes() {
        static T: RtThread = RtThread::new();
        let (tx, rx) = mpsc::channel();
        let entry = Box::new(move || {
            let me = rt_thread_self().map(|t| t.name());
            tx.send(me).unwrap();
        });
        assert_eq!(rt_thread_init(&T, "worker_thread", entry, 0, 5, 10), RT_EOK);
        assert_eq!(T.class(), RtObjectClass::Thread);
        assert_eq!(rt_thread_startup(&T), RT_EOK);
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name, Some("worker_t"));
        for _ in 0..500 {
            if T.stat() == RtThreadStat::Close {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(T.stat(), RtThreadStat::Close);
        assert_eq!(T.class(), RtObjectClass::Null);
    }

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        for _ in 0..5000 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn hold_outlives_a_wait() {
        static T: RtThread = RtThread::new();
        static SEM: RtSemaphore = RtSemaphore::new();
        let (tx, rx) = mpsc::channel();
        assert_eq!(rt_sem_init(&SEM, "hold", 0, RT_IPC_FLAG_PRIO), RT_EOK);
        let entry = Box::new(move || {
            tx.send(rt_sem_take(&SEM, RT_WAITING_FOREVER)).unwrap();
        });
        assert_eq!(rt_thread_init(&T, "holder", entry, 0, 5, 10), RT_EOK);
        assert_eq!(rt_thread_startup(&T), RT_EOK);
        assert!(wait_for(|| rt_ipc_suspended_count(&SEM.parent) == 1));

        // Holding and releasing a waiting thread leaves the wait alone
        assert_eq!(rt_thread_suspend(&T), RT_EOK);
        assert_eq!(rt_thread_suspend(&T), -RT_ERROR);
        assert_eq!(rt_thread_resume(&T), RT_EOK);
        assert_eq!(rt_thread_resume(&T), -RT_ERROR);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(rt_ipc_suspended_count(&SEM.parent), 1);

        // The wait ends while held: the thread gets the unit but stays put
        assert_eq!(rt_thread_suspend(&T), RT_EOK);
        assert_eq!(rt_sem_release(&SEM), RT_EOK);
        assert_eq!(SEM.value(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert!(T.is_held());

        assert_eq!(rt_thread_resume(&T), RT_EOK);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(RT_EOK));
    }

    #[test]
    fn closed_thread_never_waits() {
        static T: RtThread = RtThread::new();
        static SEM: RtSemaphore = RtSemaphore::new();
        static GO: AtomicBool = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel();
        assert_eq!(rt_sem_init(&SEM, "closed", 0, RT_IPC_FLAG_PRIO), RT_EOK);
        let entry = Box::new(move || {
            while !GO.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            tx.send(rt_sem_take(&SEM, RT_WAITING_FOREVER)).unwrap();
        });
        assert_eq!(rt_thread_init(&T, "doomed", entry, 0, 5, 10), RT_EOK);
        assert_eq!(rt_thread_startup(&T), RT_EOK);

        assert_eq!(rt_thread_detach(&T), RT_EOK);
        GO.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(rt_ipc_suspended_count(&SEM.parent), 0);

        assert_eq!(rt_sem_release(&SEM), RT_EOK);
        assert_eq!(SEM.value(), 1);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn bad_priority_is_rejected() {
        static T: RtThread = RtThread::new();
        let rc = rt_thread_init(&T, "bad", Box::new(|| {}), 0, RT_THREAD_PRIORITY_MAX, 1);
        assert_eq!(rc, -RT_EINVAL);
    }
}
