//! CPU usage statistic
//!
//! The idle hook counts how often the kernel idles. A periodic sampler turns
//! the count of each sample window into a usage figure, taking the busiest
//! idle count seen so far as the "fully idle" reference.
//!
//! Usage figures are in hundredths of a percent (0..=10000).

use portable_atomic::{AtomicU16, AtomicU64, Ordering};

use crate::config::{CFG_STAT_TASK_RATE_HZ, CFG_TICK_RATE_HZ};
use crate::critical::is_isr_context;
use crate::error::{rt_result, OsError, OsResult};
use crate::port::{
    rt_thread_idle_delhook, rt_thread_idle_sethook, rt_timer_init, rt_timer_start, RtTimeout,
    RtTimer, RT_TIMER_FLAG_PERIODIC, RT_TIMER_FLAG_SOFT_TIMER,
};

/// Full scale of the usage figures
pub const OS_STAT_USAGE_MAX: u16 = 10000;

static IDLE_CTR: AtomicU64 = AtomicU64::new(0);
static IDLE_CTR_MAX: AtomicU64 = AtomicU64::new(0);
static CPU_USAGE: AtomicU16 = AtomicU16::new(0);
static CPU_USAGE_MAX: AtomicU16 = AtomicU16::new(0);

static STAT_TMR: RtTimer = RtTimer::new();

struct StatSampler;

static SAMPLER: StatSampler = StatSampler;

impl RtTimeout for StatSampler {
    fn timeout(&'static self) {
        stat_sample(IDLE_CTR.swap(0, Ordering::AcqRel));
    }
}

/// Usage for one window given its idle count and the reference count
fn usage_from(idle: u64, idle_max: u64) -> u16 {
    if idle_max == 0 {
        return 0;
    }
    let idle_part = (idle.min(idle_max) * OS_STAT_USAGE_MAX as u64) / idle_max;
    OS_STAT_USAGE_MAX - idle_part as u16
}

fn stat_sample(idle: u64) {
    let idle_max = IDLE_CTR_MAX.fetch_max(idle, Ordering::AcqRel).max(idle);
    let usage = usage_from(idle, idle_max);
    CPU_USAGE.store(usage, Ordering::Release);
    CPU_USAGE_MAX.fetch_max(usage, Ordering::AcqRel);
    crate::trace!("cpu usage {}", usage);
}

/// Idle hook, counts idle passes
pub fn os_idle_hook() {
    IDLE_CTR.fetch_add(1, Ordering::Relaxed);
}

/// Install the idle hook, on `os_init`
pub(crate) fn os_stat_init() -> OsResult<()> {
    let _ = rt_thread_idle_delhook(os_idle_hook);
    rt_result(rt_thread_idle_sethook(os_idle_hook))
}

/// Start sampling CPU usage
///
/// Call once from the first task, before the others are created, so the
/// first windows see a mostly idle system.
pub fn os_stat_task_cpu_usage_init() -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::CreateIsr);
    }
    os_stat_reset();
    IDLE_CTR_MAX.store(0, Ordering::Release);
    rt_timer_init(
        &STAT_TMR,
        "stat",
        &SAMPLER,
        CFG_TICK_RATE_HZ / CFG_STAT_TASK_RATE_HZ,
        RT_TIMER_FLAG_PERIODIC | RT_TIMER_FLAG_SOFT_TIMER,
    );
    rt_result(rt_timer_start(&STAT_TMR))?;
    crate::info!("statistic sampling at {} Hz", CFG_STAT_TASK_RATE_HZ);
    Ok(())
}

/// Clear the peak usage and the current window
pub fn os_stat_reset() {
    IDLE_CTR.store(0, Ordering::Release);
    CPU_USAGE.store(0, Ordering::Release);
    CPU_USAGE_MAX.store(0, Ordering::Release);
}

/// Usage over the last window
#[inline]
pub fn os_stat_cpu_usage() -> u16 {
    CPU_USAGE.load(Ordering::Acquire)
}

/// Highest usage since the last reset
#[inline]
pub fn os_stat_cpu_usage_max() -> u16 {
    CPU_USAGE_MAX.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_scales_against_reference() {
        assert_eq!(usage_from(0, 0), 0);
        assert_eq!(usage_from(100, 100), 0);
        assert_eq!(usage_from(25, 100), 7500);
        assert_eq!(usage_from(0, 100), OS_STAT_USAGE_MAX);
        assert_eq!(usage_from(150, 100), 0);
    }
}
