//! Time management module
//!
//! Provides tick handling and time delays. The tick counter and every
//! timeout belong to the kernel; delays here only choose how many ticks to
//! sleep for.

use crate::config::CFG_TICK_RATE_HZ;
use crate::critical::is_isr_context;
use crate::error::{rt_result, OsError, OsResult};
use crate::kernel::{self, os_sched, sched_locked};
use crate::port::{rt_thread_delay, rt_thread_wakeup, rt_tick_get, rt_tick_increase, rt_tick_set};
use crate::task::OsTcb;
use crate::types::{opt, OsOpt, OsTick, OsTimeMs};

/// Ticks left until `target`, `None` when it is not in the future
#[inline]
fn ticks_until(target: OsTick, now: OsTick) -> Option<OsTick> {
    let left = target.wrapping_sub(now);
    (left != 0 && left <= i32::MAX as OsTick).then_some(left)
}

/// Time delay in ticks
///
/// # Arguments
/// * `dly` - Ticks to delay, or the tick to wake at with `TIME_MATCH`, or
///   the period with `TIME_PERIODIC`
/// * `dly_opt` - `TIME_DLY`, `TIME_TIMEOUT`, `TIME_MATCH` or `TIME_PERIODIC`
///
/// # Returns
/// * `Ok(())` - Delay completed
/// * `Err(OsError::TimeDlyIsr)` - Cannot delay from ISR
/// * `Err(OsError::SchedLocked)` - Scheduler is locked
/// * `Err(OsError::TimeZeroDly)` - Nothing to wait for
pub fn os_time_dly(dly: OsTick, dly_opt: OsOpt) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::TimeDlyIsr);
    }

    if sched_locked() {
        return Err(OsError::SchedLocked);
    }

    let tcb = OsTcb::current().ok_or(OsError::TcbInvalid)?;
    let now = rt_tick_get();

    let ticks = match dly_opt & opt::TIME_OPTS_MASK {
        opt::TIME_DLY | opt::TIME_TIMEOUT => dly,
        opt::TIME_MATCH => ticks_until(dly, now).unwrap_or(0),
        opt::TIME_PERIODIC => {
            if dly == 0 {
                return Err(OsError::TimeZeroDly);
            }
            tcb.with(|s| {
                let next = s.tick_prev.wrapping_add(dly);
                match ticks_until(next, now) {
                    Some(left) if left <= dly => {
                        s.tick_prev = next;
                        left
                    }
                    // A period was missed: restart the cadence from now
                    _ => {
                        s.tick_prev = now.wrapping_add(dly);
                        dly
                    }
                }
            })
        }
        _ => return Err(OsError::OptInvalid),
    };

    if ticks == 0 {
        return Err(OsError::TimeZeroDly);
    }

    tcb.with(|s| s.delayed = true);
    let rc = rt_thread_delay(ticks);
    tcb.with(|s| s.delayed = false);
    rt_result(rc)
}

/// Time delay in hours, minutes, seconds, milliseconds
///
/// With `TIME_HMSM_STRICT` the fields must be a normalised time (hours up
/// to 99, minutes and seconds up to 59, milliseconds up to 999); with
/// `TIME_HMSM_NON_STRICT` they may overflow into each other, hours up to 999.
pub fn os_time_dly_hmsm(
    hours: u16,
    minutes: u16,
    seconds: u16,
    milli: OsTimeMs,
    hmsm_opt: OsOpt,
) -> OsResult<()> {
    if hmsm_opt & opt::TIME_HMSM_NON_STRICT != 0 {
        if hours > 999 {
            return Err(OsError::TimeInvalidHours);
        }
    } else {
        if hours > 99 {
            return Err(OsError::TimeInvalidHours);
        }
        if minutes > 59 {
            return Err(OsError::TimeInvalidMinutes);
        }
        if seconds > 59 {
            return Err(OsError::TimeInvalidSeconds);
        }
        if milli > 999 {
            return Err(OsError::TimeInvalidMilliseconds);
        }
    }

    let secs = hours as u64 * 3600 + minutes as u64 * 60 + seconds as u64;
    let rate = CFG_TICK_RATE_HZ as u64;
    let ticks = secs * rate + (milli as u64 * rate + 500) / 1000;
    let ticks = ticks.min(i32::MAX as u64) as OsTick;

    os_time_dly(ticks, opt::TIME_DLY)
}

/// Resume a delayed task before its delay expires
///
/// A task that is also suspended loses its delay but stays suspended, which
/// `Err(OsError::TaskSuspended)` reports.
pub fn os_time_dly_resume(tcb: &'static OsTcb) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::TimeDlyResumeIsr);
    }

    if OsTcb::current().is_some_and(|cur| core::ptr::eq(cur, tcb)) || !tcb.is_delayed() {
        return Err(OsError::TaskNotDly);
    }

    rt_result(rt_thread_wakeup(&tcb.thread)).map_err(|_| OsError::TaskNotDly)?;
    if tcb.is_suspended() {
        return Err(OsError::TaskSuspended);
    }
    os_sched();
    Ok(())
}

/// Get current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    rt_tick_get()
}

/// Set the tick count
pub fn os_time_set(ticks: OsTick) {
    rt_tick_set(ticks);
}

/// Tick handler
///
/// Advances the kernel tick, which expires delays, pend timeouts and timers.
pub fn os_time_tick() {
    if !kernel::os_is_running() {
        return;
    }
    rt_tick_increase();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_target_must_be_ahead() {
        assert_eq!(ticks_until(110, 100), Some(10));
        assert_eq!(ticks_until(100, 100), None);
        assert_eq!(ticks_until(90, 100), None);
        assert_eq!(ticks_until(5, u32::MAX - 4), Some(10));
    }

    #[test]
    fn hmsm_ranges() {
        assert_eq!(os_time_dly_hmsm(100, 0, 0, 0, opt::TIME_HMSM_STRICT), Err(OsError::TimeInvalidHours));
        assert_eq!(os_time_dly_hmsm(0, 60, 0, 0, opt::TIME_HMSM_STRICT), Err(OsError::TimeInvalidMinutes));
        assert_eq!(os_time_dly_hmsm(0, 0, 60, 0, opt::TIME_HMSM_STRICT), Err(OsError::TimeInvalidSeconds));
        assert_eq!(os_time_dly_hmsm(0, 0, 0, 1000, opt::TIME_HMSM_STRICT), Err(OsError::TimeInvalidMilliseconds));
        assert_eq!(os_time_dly_hmsm(1000, 0, 0, 0, opt::TIME_HMSM_NON_STRICT), Err(OsError::TimeInvalidHours));
        // Valid ranges get as far as needing a task
        assert_eq!(os_time_dly_hmsm(0, 90, 0, 0, opt::TIME_HMSM_NON_STRICT), Err(OsError::TcbInvalid));
    }

    #[test]
    fn delay_needs_a_task() {
        assert_eq!(os_time_dly(10, opt::TIME_DLY), Err(OsError::TcbInvalid));
    }
}
