//! Shared setup for the host integration tests
//!
//! Tests in one binary share the kernel tick and the object registry, so
//! each test holds [`serial`] for its whole run.

#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use std::time::{Duration, Instant};

use ucosiii::task::{OsTaskFn, OsTcb};
use ucosiii::time::os_time_tick;
use ucosiii::types::opt;

static SERIAL: Mutex<()> = Mutex::new(());
static BOOT: Once = Once::new();

/// Take the test lock and make sure the OS is initialised and running
pub fn serial() -> MutexGuard<'static, ()> {
    let guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    BOOT.call_once(|| {
        ucosiii::os_init().unwrap();
        ucosiii::os_start().unwrap();
    });
    guard
}

/// Create a task with a small stack and no built-in queue
pub fn spawn(tcb: &'static OsTcb, name: &'static str, task: OsTaskFn, prio: u8) {
    spawn_with_q(tcb, name, task, prio, 0);
}

pub fn spawn_with_q(tcb: &'static OsTcb, name: &'static str, task: OsTaskFn, prio: u8, q_size: u16) {
    ucosiii::os_task_create(
        tcb,
        name,
        task,
        core::ptr::null_mut(),
        prio,
        256,
        q_size,
        0,
        opt::TASK_NONE,
    )
    .unwrap();
}

/// Poll `cond` until it holds or five seconds pass
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Advance the kernel tick `n` times
pub fn tick(n: u32) {
    for _ in 0..n {
        os_time_tick();
    }
}

/// Give host threads a moment to reach their next kernel call
pub fn settle() {
    std::thread::sleep(Duration::from_millis(20));
}
