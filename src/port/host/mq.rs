//! Fixed-size message queue over a caller supplied pool

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::mem::size_of;

use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;

use super::{
    rt_align, rt_schedule, rt_tick_get, RtErr, RtIpcObject, RtObjectClass, RtTick, RT_EFULL,
    RT_EINVAL, RT_EOK, RT_ERROR, RT_ETIMEOUT,
};

/// Per-message header in the pool; holds the stored length
pub const RT_MQ_MSG_HEADER_SIZE: usize = size_of::<usize>();

struct MqState {
    pool: Vec<u8>,
    msg_size: usize,
    max_msgs: usize,
    queue: VecDeque<usize>,
    free: Vec<usize>,
}

impl MqState {
    const fn new() -> Self {
        Self {
            pool: Vec::new(),
            msg_size: 0,
            max_msgs: 0,
            queue: VecDeque::new(),
            free: Vec::new(),
        }
    }

    #[inline]
    fn slot_offset(&self, slot: usize) -> usize {
        slot * (RT_MQ_MSG_HEADER_SIZE + rt_align(self.msg_size))
    }

    fn push(&mut self, buf: &[u8], urgent: bool) -> RtErr {
        if buf.is_empty() || buf.len() > self.msg_size {
            return -RT_ERROR;
        }
        let Some(slot) = self.free.pop() else {
            return -RT_EFULL;
        };
        let off = self.slot_offset(slot);
        self.pool[off..off + RT_MQ_MSG_HEADER_SIZE].copy_from_slice(&buf.len().to_ne_bytes());
        let body = off + RT_MQ_MSG_HEADER_SIZE;
        self.pool[body..body + buf.len()].copy_from_slice(buf);
        if urgent {
            self.queue.push_front(slot);
        } else {
            self.queue.push_back(slot);
        }
        RT_EOK
    }

    fn pop(&mut self, buf: &mut [u8]) -> Option<usize> {
        let slot = self.queue.pop_front()?;
        let off = self.slot_offset(slot);
        let mut header = [0u8; RT_MQ_MSG_HEADER_SIZE];
        header.copy_from_slice(&self.pool[off..off + RT_MQ_MSG_HEADER_SIZE]);
        let len = usize::from_ne_bytes(header).min(buf.len());
        let body = off + RT_MQ_MSG_HEADER_SIZE;
        buf[..len].copy_from_slice(&self.pool[body..body + len]);
        self.free.push(slot);
        Some(len)
    }
}

pub struct RtMessageQueue {
    pub parent: RtIpcObject,
    st: CsCell<MqState>,
}

impl RtMessageQueue {
    pub const fn new() -> Self {
        Self {
            parent: RtIpcObject::new(),
            st: CsCell::new(MqState::new()),
        }
    }

    pub fn msg_size(&self) -> usize {
        self.st.with(|s| s.msg_size)
    }

    pub fn max_msgs(&self) -> usize {
        self.st.with(|s| s.max_msgs)
    }

    pub(crate) fn push_locked(&self, cs: &CriticalSection, buf: &[u8], urgent: bool) -> RtErr {
        if self.parent.state(cs).class != RtObjectClass::MessageQueue {
            return -RT_ERROR;
        }
        self.st.get(cs).push(buf, urgent)
    }
}

impl Default for RtMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialise a queue over `msgpool`; its length fixes the capacity
pub fn rt_mq_init(
    mq: &RtMessageQueue,
    name: &'static str,
    msgpool: Box<[u8]>,
    msg_size: usize,
    flag: u8,
) -> RtErr {
    if msg_size == 0 {
        return -RT_EINVAL;
    }
    let max_msgs = msgpool.len() / (RT_MQ_MSG_HEADER_SIZE + rt_align(msg_size));
    if max_msgs == 0 {
        return -RT_EINVAL;
    }
    let cs = CriticalSection::enter();
    mq.parent.init(&cs, name, RtObjectClass::MessageQueue, flag);
    *mq.st.get(&cs) = MqState {
        pool: msgpool.into_vec(),
        msg_size,
        max_msgs,
        queue: VecDeque::with_capacity(max_msgs),
        free: (0..max_msgs).rev().collect(),
    };
    RT_EOK
}

pub fn rt_mq_detach(mq: &RtMessageQueue) -> RtErr {
    {
        let cs = CriticalSection::enter();
        if mq.parent.state(&cs).class != RtObjectClass::MessageQueue {
            return -RT_ERROR;
        }
        mq.parent.detach(&cs);
        *mq.st.get(&cs) = MqState::new();
    }
    rt_schedule();
    RT_EOK
}

fn mq_send_inner(mq: &RtMessageQueue, buf: &[u8], urgent: bool) -> RtErr {
    {
        let cs = CriticalSection::enter();
        let err = mq.push_locked(&cs, buf, urgent);
        if err != RT_EOK {
            return err;
        }
        let next = mq.parent.state(&cs).suspend_thread.pop(&cs);
        match next {
            Some(thread) => thread.wake(&cs, RT_EOK),
            None => return RT_EOK,
        }
    }
    rt_schedule();
    RT_EOK
}

/// Append a message
pub fn rt_mq_send(mq: &RtMessageQueue, buf: &[u8]) -> RtErr {
    mq_send_inner(mq, buf, false)
}

/// Put a message at the head of the queue
pub fn rt_mq_urgent(mq: &RtMessageQueue, buf: &[u8]) -> RtErr {
    mq_send_inner(mq, buf, true)
}

/// Receive a message into `buf`, returning the number of bytes copied
pub fn rt_mq_recv(mq: &RtMessageQueue, buf: &mut [u8], timeout: i32) -> Result<usize, RtErr> {
    let deadline = (timeout > 0).then(|| rt_tick_get().wrapping_add(timeout as RtTick));
    loop {
        let thread = {
            let cs = CriticalSection::enter();
            if mq.parent.state(&cs).class != RtObjectClass::MessageQueue {
                return Err(-RT_ERROR);
            }
            if let Some(len) = mq.st.get(&cs).pop(buf) {
                return Ok(len);
            }
            let wait = match deadline {
                _ if timeout == 0 => return Err(-RT_ETIMEOUT),
                None => timeout,
                Some(at) => {
                    let left = at.wrapping_sub(rt_tick_get()) as i32;
                    if left <= 0 {
                        return Err(-RT_ETIMEOUT);
                    }
                    left
                }
            };
            mq.parent.suspend_self(&cs, wait)?
        };
        let err = thread.block();
        if err != RT_EOK {
            return Err(err);
        }
    }
}

/// Number of queued messages
pub fn rt_mq_entry(mq: &RtMessageQueue) -> usize {
    mq.st.with(|s| s.queue.len())
}
