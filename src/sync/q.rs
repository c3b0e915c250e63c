//! Message queue implementation
//!
//! μC/OS-III queues pass a pointer and a size by reference; the kernel queue
//! copies bytes. Each message is therefore a fixed-size descriptor holding the
//! pointer and the size, and the payload itself is never touched.

use alloc::vec::Vec;
use core::mem::size_of;

use crate::critical::{is_isr_context, CriticalSection};
use crate::error::{rt_result, OsError, OsResult};
use crate::kernel::{os_sched, sched_locked, ObjHeader};
use crate::pend::{mq_send_all, pend_abort, pend_begin, pend_del_all, pend_end};
use crate::port::{
    rt_align, rt_ipc_suspended_count, rt_mq_detach, rt_mq_entry, rt_mq_init, rt_mq_recv,
    rt_mq_send, rt_mq_urgent, RtMessageQueue, RtObjectClass, RT_EOK, RT_IPC_FLAG_PRIO,
    RT_MQ_MSG_HEADER_SIZE, RT_WAITING_NO,
};
use crate::types::{opt, OsMsgSize, OsObjQty, OsObjType, OsOpt, OsPendOn, OsTick, PendTimeout};

/// A received message: the pointer and size the poster handed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsMsg {
    pub ptr: *const (),
    pub size: OsMsgSize,
}

/// Descriptor carried through the kernel queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MsgDesc {
    data: usize,
    size: usize,
}

const DESC_LEN: usize = size_of::<MsgDesc>();

impl MsgDesc {
    fn encode(self) -> [u8; DESC_LEN] {
        let mut buf = [0u8; DESC_LEN];
        let (data, size) = buf.split_at_mut(size_of::<usize>());
        data.copy_from_slice(&self.data.to_ne_bytes());
        size.copy_from_slice(&self.size.to_ne_bytes());
        buf
    }

    fn decode(buf: &[u8; DESC_LEN]) -> Self {
        let mut word = [0u8; size_of::<usize>()];
        word.copy_from_slice(&buf[..size_of::<usize>()]);
        let data = usize::from_ne_bytes(word);
        word.copy_from_slice(&buf[size_of::<usize>()..]);
        MsgDesc {
            data,
            size: usize::from_ne_bytes(word),
        }
    }
}

/// Message queue
pub struct OsQ {
    mq: RtMessageQueue,
    hdr: ObjHeader,
}

impl OsQ {
    pub const fn new() -> Self {
        OsQ {
            mq: RtMessageQueue::new(),
            hdr: ObjHeader::new(),
        }
    }

    /// Create the queue with room for `max_qty` messages
    ///
    /// # Returns
    /// * `Err(OsError::QSize)` - `max_qty` is zero
    /// * `Err(OsError::MemFull)` - the message pool could not be allocated
    pub fn create(&self, name: &'static str, max_qty: OsObjQty) -> OsResult<()> {
        self.create_as(name, max_qty, Some(OsObjType::Queue))
    }

    pub(crate) fn create_as(
        &self,
        name: &'static str,
        max_qty: OsObjQty,
        kind: Option<OsObjType>,
    ) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }
        if max_qty == 0 {
            return Err(OsError::QSize);
        }
        if self.mq.parent.class() == RtObjectClass::MessageQueue {
            return Err(OsError::ObjCreated);
        }

        let pool_len = (RT_MQ_MSG_HEADER_SIZE + rt_align(DESC_LEN)) * max_qty as usize;
        let mut pool = Vec::new();
        pool.try_reserve_exact(pool_len).map_err(|_| OsError::MemFull)?;
        pool.resize(pool_len, 0u8);

        let cs = CriticalSection::enter();
        // Another create may have won while the pool was allocated
        if self.mq.parent.class() == RtObjectClass::MessageQueue {
            return Err(OsError::ObjCreated);
        }
        rt_result(rt_mq_init(
            &self.mq,
            name,
            pool.into_boxed_slice(),
            DESC_LEN,
            RT_IPC_FLAG_PRIO,
        ))?;
        self.hdr.link(&cs, name, kind);
        crate::debug!("queue {} created, {} entries", name, max_qty);
        Ok(())
    }

    #[inline]
    fn check(&self) -> OsResult<()> {
        if self.mq.parent.class() != RtObjectClass::MessageQueue {
            return Err(OsError::ObjType);
        }
        Ok(())
    }

    /// Delete the queue; pending messages are dropped
    pub fn del(&self, del_opt: OsOpt) -> OsResult<OsObjQty> {
        if is_isr_context() {
            return Err(OsError::DelIsr);
        }
        self.check()?;
        let waiting = rt_ipc_suspended_count(&self.mq.parent);
        match del_opt {
            opt::DEL_NO_PEND if waiting > 0 => return Err(OsError::TaskWaiting),
            opt::DEL_NO_PEND => {}
            opt::DEL_ALWAYS => {
                pend_del_all(&self.mq.parent);
            }
            _ => return Err(OsError::OptInvalid),
        }
        {
            let cs = CriticalSection::enter();
            self.hdr.unlink(&cs);
        }
        rt_result(rt_mq_detach(&self.mq))?;
        os_sched();
        Ok(waiting.min(OsObjQty::MAX as usize) as OsObjQty)
    }

    /// Drop every queued message, returning how many there were
    ///
    /// The payloads the messages point to are left alone.
    pub fn flush(&self) -> OsResult<OsObjQty> {
        if is_isr_context() {
            return Err(OsError::FlushIsr);
        }
        self.check()?;
        let mut buf = [0u8; DESC_LEN];
        let mut count: OsObjQty = 0;
        while rt_mq_recv(&self.mq, &mut buf, RT_WAITING_NO).is_ok() {
            count = count.saturating_add(1);
        }
        Ok(count)
    }

    /// Wait for a message
    pub fn pend(&self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsMsg> {
        self.pend_as(timeout, pend_opt, OsPendOn::Queue)
    }

    pub(crate) fn pend_as(&self, timeout: OsTick, pend_opt: OsOpt, on: OsPendOn) -> OsResult<OsMsg> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        self.check()?;
        let timeout = PendTimeout::from_ucos(timeout, pend_opt);
        if !timeout.is_non_blocking() && sched_locked() {
            return Err(OsError::SchedLocked);
        }

        let mut buf = [0u8; DESC_LEN];
        let tcb = pend_begin(on);
        let rc = match rt_mq_recv(&self.mq, &mut buf, timeout.to_rt()) {
            Ok(_) => RT_EOK,
            Err(rc) => rc,
        };
        pend_end(tcb, rc, timeout)?;

        let desc = MsgDesc::decode(&buf);
        Ok(OsMsg {
            ptr: desc.data as *const (),
            size: desc.size,
        })
    }

    /// Abort the pend of one or every waiting task
    pub fn pend_abort(&self, abort_opt: OsOpt) -> OsResult<OsObjQty> {
        if is_isr_context() {
            return Err(OsError::PendAbortIsr);
        }
        self.check()?;
        pend_abort(&self.mq.parent, abort_opt)
    }

    /// Post a message
    ///
    /// `POST_LIFO` puts it at the head of the queue, `POST_ALL` gives every
    /// waiting task its own copy. The two can not be combined.
    ///
    /// # Returns
    /// * `Err(OsError::QMax)` - the queue is full
    pub fn post(&self, msg: *const (), size: OsMsgSize, post_opt: OsOpt) -> OsResult<()> {
        self.check()?;
        let desc = MsgDesc {
            data: msg as usize,
            size,
        }
        .encode();

        let all = post_opt & opt::POST_ALL != 0;
        let lifo = post_opt & opt::POST_LIFO != 0;
        let rc = match (all, lifo) {
            (true, true) => return Err(OsError::OptInvalid),
            (true, false) => mq_send_all(&self.mq, &desc),
            (false, true) => rt_mq_urgent(&self.mq, &desc),
            (false, false) => rt_mq_send(&self.mq, &desc),
        };
        rt_result(rc)
    }

    /// Messages waiting in the queue
    pub fn entries(&self) -> usize {
        rt_mq_entry(&self.mq)
    }

    /// Capacity given at creation
    pub fn max_qty(&self) -> usize {
        self.mq.max_msgs()
    }

    /// Tasks waiting on the queue
    pub fn waiting(&self) -> usize {
        rt_ipc_suspended_count(&self.mq.parent)
    }

    pub fn is_created(&self) -> bool {
        self.check().is_ok()
    }

    pub fn name(&self) -> &'static str {
        self.hdr.name()
    }
}

impl Default for OsQ {
    fn default() -> Self {
        Self::new()
    }
}
