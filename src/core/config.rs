//! Compile-time configuration for μC/OS-III
//!
//! These constants control the behavior and resource limits of the API layer.

use crate::port::{RT_THREAD_PRIORITY_MAX, RT_TICK_PER_SECOND};

/// Number of priority levels, taken from the kernel
pub const CFG_PRIO_MAX: usize = RT_THREAD_PRIORITY_MAX as usize;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = RT_TICK_PER_SECOND;

/// Rate of the timer task, in Hz; timer periods count in these units
pub const CFG_TMR_TASK_RATE_HZ: u32 = 100;

/// Kernel ticks per timer tick
pub const CFG_TMR_TICK_SCALE: u32 = CFG_TICK_RATE_HZ / CFG_TMR_TASK_RATE_HZ;

/// Rate of the statistic sampler in Hz
pub const CFG_STAT_TASK_RATE_HZ: u32 = 10;

/// Default time quanta for round-robin scheduling
pub const CFG_TIME_QUANTA_DEFAULT: u32 = 10;

/// Minimum task stack size
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Number of task registers
pub const CFG_TASK_REG_TBL_SIZE: usize = 3;

/// Maximum scheduler lock nesting
pub const CFG_SCHED_LOCK_NESTING_MAX: u16 = 250;

/// Idle task priority
pub const CFG_PRIO_IDLE: u8 = (CFG_PRIO_MAX - 1) as u8;

/// μC/OS-III version this API follows (V3.08.03)
pub const OS_VERSION: u16 = 30803;

/// Version of this API layer
pub const WRAPPER_VERSION: &str = env!("CARGO_PKG_VERSION");
