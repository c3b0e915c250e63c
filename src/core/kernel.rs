//! Global kernel state and initialization
//!
//! This module manages the global OS state: initialization, the running
//! flag, scheduler lock and interrupt nesting (both forwarded to the kernel)
//! and the registry of live objects used by the diagnostic shell.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::{CFG_SCHED_LOCK_NESTING_MAX, OS_VERSION};
use crate::core::cs_cell::CsCell;
use crate::critical::{is_isr_context, CriticalSection};
use crate::error::{OsError, OsResult};
use crate::port;
use crate::types::OsObjType;

// ============ Kernel State Structures ============

/// Atomic kernel flags
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if OS is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }
}

/// Global kernel state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

// ============ Debug registry ============

/// Handle of a registry entry
///
/// Stale handles (removed entries, or anything from before the last
/// [`os_init`]) never resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbgKey {
    index: u16,
    gen: u16,
}

/// A live object as seen by the diagnostic shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbgEntry {
    pub kind: OsObjType,
    pub name: &'static str,
}

struct DbgSlot {
    gen: u16,
    entry: Option<DbgEntry>,
}

/// Generation-checked arena of live objects
pub struct DbgRegistry {
    slots: Vec<DbgSlot>,
    free: Vec<u16>,
}

impl DbgRegistry {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, kind: OsObjType, name: &'static str) -> DbgKey {
        let entry = Some(DbgEntry { kind, name });
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = entry;
            return DbgKey { index, gen: slot.gen };
        }
        let index = self.slots.len() as u16;
        self.slots.push(DbgSlot { gen: 0, entry });
        DbgKey { index, gen: 0 }
    }

    pub fn remove(&mut self, key: DbgKey) -> Option<DbgEntry> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.gen != key.gen {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(key.index);
        Some(entry)
    }

    pub fn get(&self, key: DbgKey) -> Option<DbgEntry> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.gen != key.gen {
            return None;
        }
        slot.entry
    }

    /// Live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = DbgEntry> + '_ {
        self.slots.iter().filter_map(|s| s.entry)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and invalidate all outstanding keys
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            slot.entry = None;
            slot.gen = slot.gen.wrapping_add(1);
            self.free.push(index as u16);
        }
    }
}

impl Default for DbgRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) static DBG: CsCell<DbgRegistry> = CsCell::new(DbgRegistry::new());

/// Names of the live objects of one kind
pub fn os_dbg_names(kind: OsObjType) -> Vec<&'static str> {
    DBG.with(|dbg| dbg.iter().filter(|e| e.kind == kind).map(|e| e.name).collect())
}

struct HeaderState {
    name: &'static str,
    dbg: Option<DbgKey>,
}

/// Name and registry link carried by every μC/OS-III object
pub(crate) struct ObjHeader {
    st: CsCell<HeaderState>,
}

impl ObjHeader {
    pub(crate) const fn new() -> Self {
        Self {
            st: CsCell::new(HeaderState { name: "", dbg: None }),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.st.with(|s| s.name)
    }

    /// Record the name, linking the object into the registry when `kind` is given
    pub(crate) fn link(&self, cs: &CriticalSection, name: &'static str, kind: Option<OsObjType>) {
        let mut st = self.st.get(cs);
        if let Some(old) = st.dbg.take() {
            DBG.get(cs).remove(old);
        }
        st.name = name;
        st.dbg = kind.map(|kind| DBG.get(cs).insert(kind, name));
    }

    pub(crate) fn unlink(&self, cs: &CriticalSection) {
        if let Some(key) = self.st.get(cs).dbg.take() {
            DBG.get(cs).remove(key);
        }
    }
}

// ============ Public API ============

/// Initialize the API layer
///
/// Must be called before any other OS function. Clears the object registry
/// and installs the idle hook used by the CPU usage statistic.
///
/// # Returns
/// * `Ok(())` - Initialization successful
/// * `Err(OsError::OsRunning)` - OS is already running
pub fn os_init() -> OsResult<()> {
    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    DBG.with(|dbg| dbg.clear());
    crate::task::reset_reg_ids();

    #[cfg(feature = "stat")]
    crate::stat::os_stat_init()?;

    KERNEL.set_initialized(true);
    crate::info!("uC/OS-III API {} initialized", OS_VERSION);
    Ok(())
}

/// Start multitasking
///
/// The kernel is already scheduling; this only marks the API as running.
///
/// # Returns
/// * `Err(OsError::OsNotInit)` - OS not initialized
/// * `Err(OsError::OsRunning)` - OS is already running
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::OsNotInit);
    }

    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    KERNEL.set_running(true);
    crate::info!("uC/OS-III API running");
    Ok(())
}

#[inline]
pub fn os_is_running() -> bool {
    KERNEL.is_running()
}

/// Version of the μC/OS-III API provided
#[inline]
pub fn os_version() -> u16 {
    OS_VERSION
}

/// Run the scheduler
pub fn os_sched() {
    if is_isr_context() {
        return;
    }
    port::rt_schedule();
}

/// Enter ISR
pub fn os_int_enter() {
    if KERNEL.is_running() {
        port::rt_interrupt_enter();
    }
}

/// Exit ISR
pub fn os_int_exit() {
    if !KERNEL.is_running() || port::rt_interrupt_get_nest() == 0 {
        return;
    }
    port::rt_interrupt_leave();
    if port::rt_interrupt_get_nest() == 0 {
        port::rt_schedule();
    }
}

/// Lock the scheduler
pub fn os_sched_lock() -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::SchedLockIsr);
    }

    if port::rt_critical_level() >= CFG_SCHED_LOCK_NESTING_MAX {
        return Err(OsError::LockNestingOvf);
    }
    port::rt_enter_critical();
    Ok(())
}

/// Unlock the scheduler
pub fn os_sched_unlock() -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::SchedUnlockIsr);
    }

    if port::rt_critical_level() == 0 {
        return Err(OsError::SchedNotLocked);
    }
    port::rt_exit_critical();
    Ok(())
}

/// `true` when a blocking call must be refused because the scheduler is locked
#[inline]
pub(crate) fn sched_locked() -> bool {
    port::rt_critical_level() > 0
}
