//! Core type definitions for μC/OS-III
//!
//! These types provide strong typing for RTOS primitives.

use crate::port::{RT_WAITING_FOREVER, RT_WAITING_NO};

/// Task priority (0 = highest priority)
pub type OsPrio = u8;

/// Stack element; task stack sizes count in these
pub type OsStkElement = u32;

/// Tick counter type
pub type OsTick = u32;

/// Semaphore counter type
pub type OsSemCtr = u32;

/// Nesting counter
pub type OsNestingCtr = u8;

/// Option flags for API calls
pub type OsOpt = u16;

/// Message size type
pub type OsMsgSize = usize;

/// Object quantity type
pub type OsObjQty = u16;

/// Event flags type
pub type OsFlags = u32;

/// Task register value
pub type OsReg = usize;

/// Task register index
pub type OsRegId = u8;

/// Milliseconds, used by [`os_time_dly_hmsm`](crate::time::os_time_dly_hmsm)
pub type OsTimeMs = u32;

/// What the task is pending on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsPendOn {
    Nothing = 0,
    Flag = 1,
    Mutex = 2,
    Queue = 3,
    Semaphore = 4,
    TaskSem = 5,
    TaskQueue = 6,
}

/// Pend status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsPendStatus {
    /// Pend succeeded
    Ok = 0,
    /// Pend was aborted
    Abort = 1,
    /// Object was deleted while pending
    Del = 2,
    /// Timeout occurred
    Timeout = 3,
}

/// Kernel object type marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OsObjType {
    None = 0,
    Flag = 0x464C4147,  // 'FLAG'
    Mutex = 0x4D555458, // 'MUTX'
    Queue = 0x51554555, // 'QUEU'
    Sem = 0x53454D41,   // 'SEMA'
    Task = 0x5441534B,  // 'TASK'
    Timer = 0x544D5220, // 'TMR '
}

/// Software timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsTmrState {
    Unused = 0,
    Stopped = 1,
    Running = 2,
    Completed = 3,
}

/// How long a pend may block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendTimeout {
    Forever,
    NonBlocking,
    Ticks(OsTick),
}

impl PendTimeout {
    /// Read a μC/OS-III timeout: `0` blocks forever, `PEND_NON_BLOCKING` never blocks
    #[inline]
    pub fn from_ucos(timeout: OsTick, options: OsOpt) -> Self {
        if options & opt::PEND_NON_BLOCKING != 0 {
            PendTimeout::NonBlocking
        } else if timeout == 0 {
            PendTimeout::Forever
        } else {
            PendTimeout::Ticks(timeout)
        }
    }

    /// Timeout argument for the kernel
    #[inline]
    pub fn to_rt(self) -> i32 {
        match self {
            PendTimeout::Forever => RT_WAITING_FOREVER,
            PendTimeout::NonBlocking => RT_WAITING_NO,
            PendTimeout::Ticks(n) => n.min(i32::MAX as OsTick) as i32,
        }
    }

    #[inline]
    pub fn is_non_blocking(self) -> bool {
        self == PendTimeout::NonBlocking
    }
}

// ============ Option flags ============

/// API options
pub mod opt {
    use super::OsOpt;

    pub const NONE: OsOpt = 0x0000;

    // Delete options
    pub const DEL_NO_PEND: OsOpt = 0x0000;
    pub const DEL_ALWAYS: OsOpt = 0x0001;

    // Pend options
    pub const PEND_BLOCKING: OsOpt = 0x0000;
    pub const PEND_NON_BLOCKING: OsOpt = 0x8000;

    // Pend abort options
    pub const PEND_ABORT_1: OsOpt = 0x0000;
    pub const PEND_ABORT_ALL: OsOpt = 0x0100;

    // Post options
    pub const POST_FIFO: OsOpt = 0x0000;
    pub const POST_LIFO: OsOpt = 0x0010;
    pub const POST_1: OsOpt = 0x0000;
    pub const POST_ALL: OsOpt = 0x0200;
    pub const POST_NO_SCHED: OsOpt = 0x8000;

    // Task options
    pub const TASK_NONE: OsOpt = 0x0000;
    pub const TASK_STK_CHK: OsOpt = 0x0001;
    pub const TASK_STK_CLR: OsOpt = 0x0002;
    pub const TASK_SAVE_FP: OsOpt = 0x0004;

    // Flag options
    pub const PEND_FLAG_CLR_ALL: OsOpt = 0x0001;
    pub const PEND_FLAG_CLR_ANY: OsOpt = 0x0002;
    pub const PEND_FLAG_SET_ALL: OsOpt = 0x0004;
    pub const PEND_FLAG_SET_ANY: OsOpt = 0x0008;
    pub const PEND_FLAG_MASK: OsOpt = 0x000F;
    pub const PEND_FLAG_CONSUME: OsOpt = 0x0100;
    pub const POST_FLAG_SET: OsOpt = 0x0000;
    pub const POST_FLAG_CLR: OsOpt = 0x0001;

    // Time options
    pub const TIME_DLY: OsOpt = 0x0000;
    pub const TIME_TIMEOUT: OsOpt = 0x0002;
    pub const TIME_MATCH: OsOpt = 0x0004;
    pub const TIME_PERIODIC: OsOpt = 0x0008;
    pub const TIME_OPTS_MASK: OsOpt = TIME_DLY | TIME_TIMEOUT | TIME_MATCH | TIME_PERIODIC;
    pub const TIME_HMSM_STRICT: OsOpt = 0x0000;
    pub const TIME_HMSM_NON_STRICT: OsOpt = 0x0010;

    // Timer options
    pub const TMR_ONE_SHOT: OsOpt = 0x0001;
    pub const TMR_PERIODIC: OsOpt = 0x0002;
    pub const TMR_NONE: OsOpt = 0x0000;
    pub const TMR_CALLBACK: OsOpt = 0x0003;
    pub const TMR_CALLBACK_ARG: OsOpt = 0x0004;
}
