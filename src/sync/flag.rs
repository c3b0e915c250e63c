//! Event flag groups
//!
//! A flag group is a kernel event set. Tasks wait for all or any of a set of
//! bits to become set; waiting for bits to be cleared has no kernel
//! counterpart and is refused with `FlagPendOpt`.

use crate::critical::{is_isr_context, CriticalSection};
use crate::error::{rt_result, OsError, OsResult};
use crate::kernel::{os_sched, sched_locked, ObjHeader};
use crate::pend::{pend_abort, pend_begin, pend_del_all, pend_end};
use crate::port::{
    rt_event_detach, rt_event_init, rt_event_recv, rt_event_send, rt_ipc_suspended_count,
    rt_schedule, RtEvent, RtObjectClass, RT_EOK, RT_EVENT_FLAG_AND, RT_EVENT_FLAG_CLEAR,
    RT_EVENT_FLAG_OR, RT_IPC_FLAG_PRIO,
};
use crate::task::OsTcb;
use crate::types::{opt, OsFlags, OsObjQty, OsObjType, OsOpt, OsPendOn, OsTick, PendTimeout};

/// Event flag group
pub struct OsFlagGrp {
    event: RtEvent,
    hdr: ObjHeader,
}

/// Kernel receive option for a μC/OS-III flag pend option
fn recv_option(pend_opt: OsOpt) -> OsResult<u8> {
    let mut option = match pend_opt & opt::PEND_FLAG_MASK {
        opt::PEND_FLAG_SET_ALL => RT_EVENT_FLAG_AND,
        opt::PEND_FLAG_SET_ANY => RT_EVENT_FLAG_OR,
        opt::PEND_FLAG_CLR_ALL | opt::PEND_FLAG_CLR_ANY => return Err(OsError::FlagPendOpt),
        _ => return Err(OsError::OptInvalid),
    };
    if pend_opt & opt::PEND_FLAG_CONSUME != 0 {
        option |= RT_EVENT_FLAG_CLEAR;
    }
    Ok(option)
}

impl OsFlagGrp {
    pub const fn new() -> Self {
        OsFlagGrp {
            event: RtEvent::new(),
            hdr: ObjHeader::new(),
        }
    }

    /// Create the group with the given initial flags
    pub fn create(&self, name: &'static str, flags: OsFlags) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }
        {
            let cs = CriticalSection::enter();
            if self.event.parent.class() == RtObjectClass::Event {
                return Err(OsError::ObjCreated);
            }
            rt_result(rt_event_init(&self.event, name, RT_IPC_FLAG_PRIO))?;
            self.hdr.link(&cs, name, Some(OsObjType::Flag));
        }
        if flags != 0 {
            rt_result(rt_event_send(&self.event, flags))?;
        }
        crate::debug!("flag group {} created", name);
        Ok(())
    }

    #[inline]
    fn check(&self) -> OsResult<()> {
        if self.event.parent.class() != RtObjectClass::Event {
            return Err(OsError::ObjType);
        }
        Ok(())
    }

    /// Delete the group
    pub fn del(&self, del_opt: OsOpt) -> OsResult<OsObjQty> {
        if is_isr_context() {
            return Err(OsError::DelIsr);
        }
        self.check()?;
        let waiting = rt_ipc_suspended_count(&self.event.parent);
        match del_opt {
            opt::DEL_NO_PEND if waiting > 0 => return Err(OsError::TaskWaiting),
            opt::DEL_NO_PEND => {}
            opt::DEL_ALWAYS => {
                pend_del_all(&self.event.parent);
            }
            _ => return Err(OsError::OptInvalid),
        }
        {
            let cs = CriticalSection::enter();
            self.hdr.unlink(&cs);
        }
        rt_result(rt_event_detach(&self.event))?;
        os_sched();
        Ok(waiting.min(OsObjQty::MAX as usize) as OsObjQty)
    }

    /// Wait for flags
    ///
    /// # Arguments
    /// * `flags` - Bits to wait for
    /// * `timeout` - Timeout in ticks, 0 waits forever
    /// * `pend_opt` - `PEND_FLAG_SET_ALL` or `PEND_FLAG_SET_ANY`, optionally
    ///   with `PEND_FLAG_CONSUME` and `PEND_NON_BLOCKING`
    ///
    /// # Returns
    /// The flags that made the task ready
    pub fn pend(&self, flags: OsFlags, timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsFlags> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        self.check()?;
        let option = recv_option(pend_opt)?;
        let timeout = PendTimeout::from_ucos(timeout, pend_opt);
        if !timeout.is_non_blocking() && sched_locked() {
            return Err(OsError::SchedLocked);
        }

        let tcb = pend_begin(OsPendOn::Flag);
        if let Some(tcb) = tcb {
            tcb.with(|s| {
                s.flags_pend = flags;
                s.flags_opt = pend_opt;
                s.flags_rdy = 0;
            });
        }
        let (rc, rdy) = match rt_event_recv(&self.event, flags, option, timeout.to_rt()) {
            Ok(rdy) => (RT_EOK, rdy),
            Err(rc) => (rc, 0),
        };
        if let Some(tcb) = tcb {
            tcb.with(|s| {
                s.flags_pend = 0;
                s.flags_rdy = rdy;
            });
        }
        pend_end(tcb, rc, timeout)?;
        Ok(rdy)
    }

    /// Abort the pend of one or every waiting task
    pub fn pend_abort(&self, abort_opt: OsOpt) -> OsResult<OsObjQty> {
        if is_isr_context() {
            return Err(OsError::PendAbortIsr);
        }
        self.check()?;
        pend_abort(&self.event.parent, abort_opt)
    }

    /// Set or clear flags
    ///
    /// # Returns
    /// The flags of the group after the post
    pub fn post(&self, flags: OsFlags, post_opt: OsOpt) -> OsResult<OsFlags> {
        self.check()?;
        match post_opt & !opt::POST_NO_SCHED {
            opt::POST_FLAG_SET => {
                if flags != 0 {
                    rt_result(rt_event_send(&self.event, flags))?;
                }
            }
            opt::POST_FLAG_CLR => {
                self.event.clear(flags);
                if post_opt & opt::POST_NO_SCHED == 0 {
                    rt_schedule();
                }
            }
            _ => return Err(OsError::OptInvalid),
        }
        Ok(self.event.value())
    }

    /// Current flags
    pub fn flags(&self) -> OsFlags {
        self.event.value()
    }

    /// Tasks waiting on the group
    pub fn waiting(&self) -> usize {
        rt_ipc_suspended_count(&self.event.parent)
    }

    pub fn is_created(&self) -> bool {
        self.check().is_ok()
    }

    pub fn name(&self) -> &'static str {
        self.hdr.name()
    }
}

impl Default for OsFlagGrp {
    fn default() -> Self {
        Self::new()
    }
}

/// Flags that made the calling task ready on its last flag pend
pub fn os_flag_pend_get_flags_rdy() -> OsResult<OsFlags> {
    if is_isr_context() {
        return Err(OsError::PendIsr);
    }
    let tcb = OsTcb::current().ok_or(OsError::TcbInvalid)?;
    Ok(tcb.with(|s| s.flags_rdy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_waits_are_unsupported() {
        assert_eq!(recv_option(opt::PEND_FLAG_CLR_ALL), Err(OsError::FlagPendOpt));
        assert_eq!(recv_option(opt::PEND_FLAG_CLR_ANY), Err(OsError::FlagPendOpt));
        assert_eq!(recv_option(0), Err(OsError::OptInvalid));
        assert_eq!(
            recv_option(opt::PEND_FLAG_SET_ANY | opt::PEND_FLAG_CONSUME),
            Ok(RT_EVENT_FLAG_OR | RT_EVENT_FLAG_CLEAR)
        );
    }

    #[test]
    fn set_all_and_consume() {
        let grp = OsFlagGrp::new();
        grp.create("grp", 0b0001).unwrap();
        assert_eq!(grp.post(0b0110, opt::POST_FLAG_SET), Ok(0b0111));
        assert_eq!(
            grp.pend(0b0011, 0, opt::PEND_FLAG_SET_ALL | opt::PEND_NON_BLOCKING),
            Ok(0b0011)
        );
        assert_eq!(
            grp.pend(
                0b0110,
                0,
                opt::PEND_FLAG_SET_ANY | opt::PEND_FLAG_CONSUME | opt::PEND_NON_BLOCKING
            ),
            Ok(0b0110)
        );
        assert_eq!(grp.flags(), 0b0001);
        assert_eq!(grp.post(0b0001, opt::POST_FLAG_CLR), Ok(0));
        assert_eq!(
            grp.pend(0b0001, 10, opt::PEND_FLAG_SET_ANY | opt::PEND_NON_BLOCKING),
            Err(OsError::PendWouldBlock)
        );
        grp.del(opt::DEL_ALWAYS).unwrap();
    }
}
