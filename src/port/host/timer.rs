//! Tick counter and kernel timers
//!
//! Timers expire in [`rt_timer_check`], which [`rt_tick_increase`] runs after
//! the tick has been accounted. Handlers run on the ticking thread outside
//! the critical section.

use alloc::vec::Vec;

use portable_atomic::{AtomicU32, Ordering};

use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;

use super::thread::expire_timeouts;
use super::{
    clip_name, rt_interrupt_enter, rt_interrupt_leave, tick_reached, RtErr, RtObjectClass, RtTick,
    RT_EINVAL, RT_EOK, RT_ERROR, RT_TICK_PER_SECOND,
};

pub const RT_TIMER_FLAG_ONE_SHOT: u8 = 0x0;
pub const RT_TIMER_FLAG_ACTIVATED: u8 = 0x1;
pub const RT_TIMER_FLAG_PERIODIC: u8 = 0x2;
pub const RT_TIMER_FLAG_HARD_TIMER: u8 = 0x0;
pub const RT_TIMER_FLAG_SOFT_TIMER: u8 = 0x4;

static TICK: AtomicU32 = AtomicU32::new(0);

/// Timers waiting to expire
static ACTIVE: CsCell<Vec<&'static RtTimer>> = CsCell::new(Vec::new());

/// Timeout handler of a timer
pub trait RtTimeout: Sync {
    fn timeout(&'static self);
}

/// Timer control commands
#[derive(Clone, Copy)]
pub enum RtTimerCtrl<'a> {
    SetTime(RtTick),
    GetTime(&'a core::cell::Cell<RtTick>),
    SetOneshot,
    SetPeriodic,
    GetState(&'a core::cell::Cell<bool>),
    GetRemainTime(&'a core::cell::Cell<RtTick>),
}

struct TimerCtl {
    name: &'static str,
    class: RtObjectClass,
    flag: u8,
    init_tick: RtTick,
    timeout_tick: RtTick,
    handler: Option<&'static dyn RtTimeout>,
}

pub struct RtTimer {
    ctl: CsCell<TimerCtl>,
}

impl RtTimer {
    pub const fn new() -> Self {
        Self {
            ctl: CsCell::new(TimerCtl {
                name: "",
                class: RtObjectClass::Null,
                flag: 0,
                init_tick: 0,
                timeout_tick: 0,
                handler: None,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.ctl.with(|c| c.name)
    }

    pub fn class(&self) -> RtObjectClass {
        self.ctl.with(|c| c.class)
    }

    pub fn flag(&self) -> u8 {
        self.ctl.with(|c| c.flag)
    }

    pub fn is_active(&self) -> bool {
        self.flag() & RT_TIMER_FLAG_ACTIVATED != 0
    }
}

impl Default for RtTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Current tick
#[inline]
pub fn rt_tick_get() -> RtTick {
    TICK.load(Ordering::Acquire)
}

pub fn rt_tick_set(tick: RtTick) {
    TICK.store(tick, Ordering::Release);
}

/// Convert milliseconds to ticks, rounding up
pub fn rt_tick_from_millisecond(ms: u32) -> RtTick {
    let ticks = (ms as u64 * RT_TICK_PER_SECOND as u64).div_ceil(1000);
    ticks.min(RtTick::MAX as u64) as RtTick
}

/// Advance the tick by one, expiring thread waits and timers
pub fn rt_tick_increase() {
    rt_interrupt_enter();
    let now = TICK.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
    expire_timeouts(now);
    rt_interrupt_leave();
    rt_timer_check();
}

fn unlink(timer: &'static RtTimer, cs: &CriticalSection) {
    ACTIVE.get(cs).retain(|t| !core::ptr::eq(*t, timer));
}

pub fn rt_timer_init(
    timer: &'static RtTimer,
    name: &'static str,
    handler: &'static dyn RtTimeout,
    time: RtTick,
    flag: u8,
) {
    let cs = CriticalSection::enter();
    unlink(timer, &cs);
    *timer.ctl.get(&cs) = TimerCtl {
        name: clip_name(name),
        class: RtObjectClass::Timer,
        flag: flag & !RT_TIMER_FLAG_ACTIVATED,
        init_tick: time,
        timeout_tick: 0,
        handler: Some(handler),
    };
}

pub fn rt_timer_detach(timer: &'static RtTimer) -> RtErr {
    let cs = CriticalSection::enter();
    let mut c = timer.ctl.get(&cs);
    if c.class != RtObjectClass::Timer {
        return -RT_ERROR;
    }
    c.class = RtObjectClass::Null;
    c.flag &= !RT_TIMER_FLAG_ACTIVATED;
    drop(c);
    unlink(timer, &cs);
    RT_EOK
}

/// Arm the timer `init_tick` ticks from now, restarting it if already armed
pub fn rt_timer_start(timer: &'static RtTimer) -> RtErr {
    let cs = CriticalSection::enter();
    start_locked(timer, &cs)
}

fn start_locked(timer: &'static RtTimer, cs: &CriticalSection) -> RtErr {
    let mut c = timer.ctl.get(cs);
    if c.class != RtObjectClass::Timer {
        return -RT_ERROR;
    }
    if c.init_tick == 0 {
        return -RT_EINVAL;
    }
    c.timeout_tick = rt_tick_get().wrapping_add(c.init_tick);
    c.flag |= RT_TIMER_FLAG_ACTIVATED;
    drop(c);
    unlink(timer, cs);
    ACTIVE.get(cs).push(timer);
    RT_EOK
}

pub fn rt_timer_stop(timer: &'static RtTimer) -> RtErr {
    let cs = CriticalSection::enter();
    let mut c = timer.ctl.get(&cs);
    if c.class != RtObjectClass::Timer || c.flag & RT_TIMER_FLAG_ACTIVATED == 0 {
        return -RT_ERROR;
    }
    c.flag &= !RT_TIMER_FLAG_ACTIVATED;
    drop(c);
    unlink(timer, &cs);
    RT_EOK
}

pub fn rt_timer_control(timer: &'static RtTimer, cmd: RtTimerCtrl<'_>) -> RtErr {
    let cs = CriticalSection::enter();
    let mut c = timer.ctl.get(&cs);
    if c.class != RtObjectClass::Timer {
        return -RT_ERROR;
    }
    match cmd {
        RtTimerCtrl::SetTime(tick) => c.init_tick = tick,
        RtTimerCtrl::GetTime(out) => out.set(c.init_tick),
        RtTimerCtrl::SetOneshot => c.flag &= !RT_TIMER_FLAG_PERIODIC,
        RtTimerCtrl::SetPeriodic => c.flag |= RT_TIMER_FLAG_PERIODIC,
        RtTimerCtrl::GetState(out) => out.set(c.flag & RT_TIMER_FLAG_ACTIVATED != 0),
        RtTimerCtrl::GetRemainTime(out) => {
            let left = if c.flag & RT_TIMER_FLAG_ACTIVATED != 0 {
                let left = c.timeout_tick.wrapping_sub(rt_tick_get()) as i32;
                left.max(0) as RtTick
            } else {
                0
            };
            out.set(left);
        }
    }
    RT_EOK
}

/// Run the handlers of every expired timer
pub fn rt_timer_check() {
    let now = rt_tick_get();
    loop {
        let fired = {
            let cs = CriticalSection::enter();
            let mut active = ACTIVE.get(&cs);
            let pos = active
                .iter()
                .position(|t| tick_reached(now, t.ctl.get(&cs).timeout_tick));
            pos.map(|pos| {
                let timer = active.remove(pos);
                let mut c = timer.ctl.get(&cs);
                if c.flag & RT_TIMER_FLAG_PERIODIC == 0 {
                    c.flag &= !RT_TIMER_FLAG_ACTIVATED;
                }
                (timer, c.handler)
            })
        };
        let Some((timer, handler)) = fired else {
            break;
        };
        if let Some(handler) = handler {
            handler.timeout();
        }
        let cs = CriticalSection::enter();
        let c = timer.ctl.get(&cs);
        let rearm = c.class == RtObjectClass::Timer
            && c.flag & RT_TIMER_FLAG_PERIODIC != 0
            && c.flag & RT_TIMER_FLAG_ACTIVATED != 0;
        drop(c);
        if rearm {
            let _ = start_locked(timer, &cs);
        }
    }
}
