//! Event sets

use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;

use super::{
    rt_schedule, RtErr, RtIpcObject, RtObjectClass, RT_EINVAL, RT_EOK, RT_ERROR, RT_ETIMEOUT,
};

pub const RT_EVENT_FLAG_AND: u8 = 0x01;
pub const RT_EVENT_FLAG_OR: u8 = 0x02;
pub const RT_EVENT_FLAG_CLEAR: u8 = 0x04;

pub struct RtEvent {
    pub parent: RtIpcObject,
    set: CsCell<u32>,
}

impl RtEvent {
    pub const fn new() -> Self {
        Self {
            parent: RtIpcObject::new(),
            set: CsCell::new(0),
        }
    }

    /// Current event bits
    pub fn value(&self) -> u32 {
        self.set.with(|s| *s)
    }

    /// Clear bits without waking anyone
    pub fn clear(&self, bits: u32) {
        self.set.with(|s| *s &= !bits);
    }
}

impl Default for RtEvent {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn satisfied(bits: u32, want: u32, option: u8) -> bool {
    if option & RT_EVENT_FLAG_AND != 0 {
        bits & want == want
    } else {
        bits & want != 0
    }
}

pub fn rt_event_init(event: &RtEvent, name: &'static str, flag: u8) -> RtErr {
    let cs = CriticalSection::enter();
    event.parent.init(&cs, name, RtObjectClass::Event, flag);
    *event.set.get(&cs) = 0;
    RT_EOK
}

pub fn rt_event_detach(event: &RtEvent) -> RtErr {
    {
        let cs = CriticalSection::enter();
        if event.parent.state(&cs).class != RtObjectClass::Event {
            return -RT_ERROR;
        }
        event.parent.detach(&cs);
        *event.set.get(&cs) = 0;
    }
    rt_schedule();
    RT_EOK
}

/// Set bits and wake every waiter whose condition now holds
pub fn rt_event_send(event: &RtEvent, set: u32) -> RtErr {
    if set == 0 {
        return -RT_ERROR;
    }
    let woken = {
        let cs = CriticalSection::enter();
        let mut st = event.parent.state(&cs);
        if st.class != RtObjectClass::Event {
            return -RT_ERROR;
        }
        let mut bits = event.set.get(&cs);
        *bits |= set;
        let mut need_clear = 0;
        let mut woken = 0;
        for thread in st.suspend_thread.snapshot(&cs) {
            let mut c = thread.ctl(&cs);
            if !satisfied(*bits, c.event_set, c.event_info) {
                continue;
            }
            let want = c.event_set;
            c.event_set = *bits & want;
            if c.event_info & RT_EVENT_FLAG_CLEAR != 0 {
                need_clear |= want;
            }
            drop(c);
            thread.wake(&cs, RT_EOK);
            woken += 1;
        }
        *bits &= !need_clear;
        woken
    };
    if woken > 0 {
        rt_schedule();
    }
    RT_EOK
}

/// Wait for `set` under `option`, returning the bits that satisfied the wait
pub fn rt_event_recv(event: &RtEvent, set: u32, option: u8, timeout: i32) -> Result<u32, RtErr> {
    let and = option & RT_EVENT_FLAG_AND != 0;
    let or = option & RT_EVENT_FLAG_OR != 0;
    if set == 0 || and == or {
        return Err(-RT_EINVAL);
    }
    let thread = {
        let cs = CriticalSection::enter();
        if event.parent.state(&cs).class != RtObjectClass::Event {
            return Err(-RT_ERROR);
        }
        let mut bits = event.set.get(&cs);
        if satisfied(*bits, set, option) {
            let recved = *bits & set;
            if option & RT_EVENT_FLAG_CLEAR != 0 {
                *bits &= !set;
            }
            return Ok(recved);
        }
        drop(bits);
        if timeout == 0 {
            return Err(-RT_ETIMEOUT);
        }
        let thread = event.parent.suspend_self(&cs, timeout)?;
        let mut c = thread.ctl(&cs);
        c.event_set = set;
        c.event_info = option;
        drop(c);
        thread
    };
    match thread.block() {
        RT_EOK => Ok(thread.event_received()),
        err => Err(err),
    }
}
