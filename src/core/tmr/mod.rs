//! Software timers
//!
//! An [`OsTmr`] drives one kernel soft timer. Delays and periods count in
//! timer-task ticks and are scaled to kernel ticks when the timer is armed.
//!
//! A periodic timer with an initial delay is armed one-shot for the delay;
//! its first expiry re-arms it periodic for the period. A `set` on a running
//! timer is staged and applied right after the next callback, or when the
//! timer is stopped.

use core::cell::Cell;

use crate::config::CFG_TMR_TICK_SCALE;
use crate::core::cs_cell::CsCell;
use crate::critical::{is_isr_context, CriticalSection};
use crate::error::{rt_result, OsError, OsResult};
use crate::kernel::ObjHeader;
use crate::port::{
    rt_enter_critical, rt_exit_critical, rt_timer_control, rt_timer_detach, rt_timer_init,
    rt_timer_start, rt_timer_stop, RtObjectClass, RtTick, RtTimeout, RtTimer, RtTimerCtrl,
    RT_TIMER_FLAG_ONE_SHOT, RT_TIMER_FLAG_PERIODIC, RT_TIMER_FLAG_SOFT_TIMER,
};
use crate::types::{opt, OsObjType, OsOpt, OsTick, OsTmrState};

/// Timer callback, given the timer and its argument
pub type OsTmrCallback = fn(&'static OsTmr, *mut ());

/// Timing and callback of a timer
#[derive(Clone, Copy)]
struct TmrConfig {
    dly: OsTick,
    period: OsTick,
    callback: Option<OsTmrCallback>,
    /// Callback argument, stored as an address so the state stays `Send`
    arg: usize,
}

struct TmrState {
    state: OsTmrState,
    opt: OsOpt,
    cfg: TmrConfig,
    /// Armed for the initial delay of a periodic timer
    first_dly_pending: bool,
    /// Reconfiguration waiting for the next callback
    pending: Option<TmrConfig>,
}

/// Software timer
pub struct OsTmr {
    timer: RtTimer,
    st: CsCell<TmrState>,
    hdr: ObjHeader,
}

#[inline]
fn to_kernel_ticks(ticks: OsTick) -> RtTick {
    ticks.saturating_mul(CFG_TMR_TICK_SCALE)
}

/// Check `dly` and `period` make sense for `tmr_opt`
fn validate(tmr_opt: OsOpt, dly: OsTick, period: OsTick) -> OsResult<()> {
    match tmr_opt {
        opt::TMR_ONE_SHOT if dly == 0 => Err(OsError::TmrInvalidDly),
        opt::TMR_PERIODIC if period == 0 => Err(OsError::TmrInvalidPeriod),
        opt::TMR_ONE_SHOT | opt::TMR_PERIODIC => Ok(()),
        _ => Err(OsError::OptInvalid),
    }
}

impl OsTmr {
    pub const fn new() -> Self {
        OsTmr {
            timer: RtTimer::new(),
            st: CsCell::new(TmrState {
                state: OsTmrState::Unused,
                opt: opt::TMR_NONE,
                cfg: TmrConfig {
                    dly: 0,
                    period: 0,
                    callback: None,
                    arg: 0,
                },
                first_dly_pending: false,
                pending: None,
            }),
            hdr: ObjHeader::new(),
        }
    }

    #[inline]
    fn check(&self) -> OsResult<()> {
        if self.timer.class() != RtObjectClass::Timer {
            return Err(OsError::ObjType);
        }
        Ok(())
    }

    /// (Re)initialise the kernel timer for `cfg`, leaving it stopped
    fn arm(&'static self, cs: &CriticalSection, tmr_opt: OsOpt, cfg: TmrConfig) {
        let (ticks, flag, first_dly) = if tmr_opt == opt::TMR_PERIODIC && cfg.dly == 0 {
            (to_kernel_ticks(cfg.period), RT_TIMER_FLAG_PERIODIC, false)
        } else {
            (
                to_kernel_ticks(cfg.dly),
                RT_TIMER_FLAG_ONE_SHOT,
                tmr_opt == opt::TMR_PERIODIC,
            )
        };
        rt_timer_init(
            &self.timer,
            self.hdr.name(),
            self,
            ticks,
            flag | RT_TIMER_FLAG_SOFT_TIMER,
        );
        let mut st = self.st.get(cs);
        st.cfg = cfg;
        st.opt = tmr_opt;
        st.first_dly_pending = first_dly;
    }

    /// Create the timer, stopped
    ///
    /// # Arguments
    /// * `dly` - Initial delay in timer ticks
    /// * `period` - Period in timer ticks, for `TMR_PERIODIC`
    /// * `tmr_opt` - `TMR_ONE_SHOT` or `TMR_PERIODIC`
    /// * `callback` - Called on every expiry
    /// * `arg` - Argument handed to the callback
    pub fn create(
        &'static self,
        name: &'static str,
        dly: OsTick,
        period: OsTick,
        tmr_opt: OsOpt,
        callback: Option<OsTmrCallback>,
        arg: *mut (),
    ) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::TmrIsr);
        }
        validate(tmr_opt, dly, period)?;

        let cs = CriticalSection::enter();
        if self.timer.class() == RtObjectClass::Timer {
            return Err(OsError::ObjCreated);
        }
        self.hdr.link(&cs, name, Some(OsObjType::Timer));
        let cfg = TmrConfig {
            dly,
            period,
            callback,
            arg: arg as usize,
        };
        self.arm(&cs, tmr_opt, cfg);
        let mut st = self.st.get(&cs);
        st.state = OsTmrState::Stopped;
        st.pending = None;
        crate::debug!("timer {} created", name);
        Ok(())
    }

    /// Delete the timer
    pub fn del(&'static self) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::TmrIsr);
        }
        self.check()?;
        rt_result(rt_timer_detach(&self.timer))?;
        let cs = CriticalSection::enter();
        let mut st = self.st.get(&cs);
        st.state = OsTmrState::Unused;
        st.pending = None;
        drop(st);
        self.hdr.unlink(&cs);
        Ok(())
    }

    /// Change delay, period and callback
    ///
    /// A stopped timer takes the new values at once; a running one after its
    /// next callback.
    pub fn set(
        &'static self,
        dly: OsTick,
        period: OsTick,
        callback: Option<OsTmrCallback>,
        arg: *mut (),
    ) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::TmrIsr);
        }
        self.check()?;
        let cs = CriticalSection::enter();
        let (state, tmr_opt) = {
            let st = self.st.get(&cs);
            (st.state, st.opt)
        };
        validate(tmr_opt, dly, period)?;
        let cfg = TmrConfig {
            dly,
            period,
            callback,
            arg: arg as usize,
        };
        if state == OsTmrState::Running {
            self.st.get(&cs).pending = Some(cfg);
        } else {
            self.arm(&cs, tmr_opt, cfg);
        }
        Ok(())
    }

    /// Start the timer, restarting it from its initial delay when running
    pub fn start(&'static self) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::TmrIsr);
        }
        self.check()?;
        let cs = CriticalSection::enter();
        let (tmr_opt, cfg) = {
            let mut st = self.st.get(&cs);
            let cfg = st.pending.take().unwrap_or(st.cfg);
            (st.opt, cfg)
        };
        self.arm(&cs, tmr_opt, cfg);
        rt_result(rt_timer_start(&self.timer))?;
        self.st.get(&cs).state = OsTmrState::Running;
        Ok(())
    }

    /// Stop the timer
    ///
    /// # Arguments
    /// * `stop_opt` - `TMR_NONE`, or `TMR_CALLBACK` to run the callback with
    ///   its own argument, or `TMR_CALLBACK_ARG` to run it with `callback_arg`
    ///
    /// # Returns
    /// * `Err(OsError::TmrStopped)` - The timer was not running
    /// * `Err(OsError::TmrNoCallback)` - A callback was asked for but none is set;
    ///   the timer is stopped anyway
    pub fn stop(&'static self, stop_opt: OsOpt, callback_arg: *mut ()) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::TmrIsr);
        }
        self.check()?;
        if !matches!(stop_opt, opt::TMR_NONE | opt::TMR_CALLBACK | opt::TMR_CALLBACK_ARG) {
            return Err(OsError::OptInvalid);
        }

        let cfg = {
            let cs = CriticalSection::enter();
            let mut st = self.st.get(&cs);
            if st.state != OsTmrState::Running {
                return Err(OsError::TmrStopped);
            }
            st.state = OsTmrState::Stopped;
            let pending = st.pending.take();
            let (tmr_opt, cfg) = (st.opt, st.cfg);
            drop(st);
            // Not armed any more when a one-shot fired in between
            let _ = rt_timer_stop(&self.timer);
            if let Some(next) = pending {
                self.arm(&cs, tmr_opt, next);
            }
            cfg
        };

        let arg = match stop_opt {
            opt::TMR_CALLBACK => cfg.arg as *mut (),
            opt::TMR_CALLBACK_ARG => callback_arg,
            _ => return Ok(()),
        };
        let callback = cfg.callback.ok_or(OsError::TmrNoCallback)?;
        rt_enter_critical();
        callback(self, arg);
        rt_exit_critical();
        Ok(())
    }

    /// Timer ticks until the next expiry
    ///
    /// A stopped timer reports the delay it would start with.
    pub fn remain_get(&'static self) -> OsResult<OsTick> {
        if is_isr_context() {
            return Err(OsError::TmrIsr);
        }
        self.check()?;
        let (state, tmr_opt, cfg) = self.st.with(|st| (st.state, st.opt, st.cfg));
        match state {
            OsTmrState::Running => {
                let left = Cell::new(0);
                rt_result(rt_timer_control(&self.timer, RtTimerCtrl::GetRemainTime(&left)))?;
                Ok(left.get().div_ceil(CFG_TMR_TICK_SCALE))
            }
            OsTmrState::Stopped if tmr_opt == opt::TMR_PERIODIC && cfg.dly == 0 => Ok(cfg.period),
            OsTmrState::Stopped => Ok(cfg.dly),
            OsTmrState::Completed | OsTmrState::Unused => Ok(0),
        }
    }

    /// Current state
    pub fn state_get(&self) -> OsResult<OsTmrState> {
        if is_isr_context() {
            return Err(OsError::TmrIsr);
        }
        Ok(self.st.with(|st| st.state))
    }

    pub fn is_created(&self) -> bool {
        self.check().is_ok()
    }

    pub fn name(&self) -> &'static str {
        self.hdr.name()
    }
}

impl Default for OsTmr {
    fn default() -> Self {
        Self::new()
    }
}

impl RtTimeout for OsTmr {
    fn timeout(&'static self) {
        let cfg = {
            let cs = CriticalSection::enter();
            let mut st = self.st.get(&cs);
            if st.state != OsTmrState::Running {
                return;
            }
            if st.first_dly_pending {
                st.first_dly_pending = false;
                let period = to_kernel_ticks(st.cfg.period);
                drop(st);
                rt_timer_control(&self.timer, RtTimerCtrl::SetPeriodic);
                rt_timer_control(&self.timer, RtTimerCtrl::SetTime(period));
                rt_timer_start(&self.timer);
                st = self.st.get(&cs);
            } else if st.opt == opt::TMR_ONE_SHOT {
                st.state = OsTmrState::Completed;
            }
            st.cfg
        };

        if let Some(callback) = cfg.callback {
            callback(self, cfg.arg as *mut ());
        }

        let cs = CriticalSection::enter();
        let mut st = self.st.get(&cs);
        let Some(next) = st.pending.take() else {
            return;
        };
        let (state, tmr_opt) = (st.state, st.opt);
        drop(st);
        let _ = rt_timer_stop(&self.timer);
        self.arm(&cs, tmr_opt, next);
        if state == OsTmrState::Running && tmr_opt == opt::TMR_PERIODIC {
            rt_timer_start(&self.timer);
        }
    }
}
