//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task.

use crate::config::CFG_TASK_NOTIFICATION_ARRAY_ENTRIES;
use crate::list::Item;
use crate::types::{
    OsAllocationKind, OsFlags, OsMsgSize, OsNestingCtr, OsNotifyState, OsNotifyValue, OsOpt,
    OsPendOn, OsPendStatus, OsPrio, OsSemCtr, OsStkElement, OsTaskState, OsTick,
};

/// Task Control Block
#[repr(C)]
pub struct OsTcb {
    // ============ Stack pointer ============
    /// Current stack pointer
    pub stk_ptr: *mut OsStkElement,

    // ============ Stack information ============
    /// Base of stack
    pub stk_base: *mut OsStkElement,
    /// Stack limit pointer
    pub stk_limit: *mut OsStkElement,
    /// Stack size in words
    pub stk_size: usize,

    // ============ Task identification ============
    /// Task name, truncated at creation to `CFG_MAX_TASK_NAME_LEN`
    pub name: &'static str,

    // ============ List links ============
    /// Link into whichever "state" list currently owns this task: a
    /// ready list, `delayed_current`, or `delayed_overflow`. A task is a
    /// member of at most one state list at a time.
    pub state_item: Item<OsTcb>,
    /// Link into the wait list of the kernel object this task is
    /// pending on, ordered by effective priority. A task is a member of
    /// at most one event list at a time.
    pub event_item: Item<OsTcb>,

    /// Object this task is pending on
    pub pend_obj_ptr: *const (),
    /// What type of object the task is pending on
    pub pend_on: OsPendOn,
    /// Result of pend operation
    pub pend_status: OsPendStatus,

    // ============ Delay/timeout bookkeeping ============
    /// Remaining ticks for delay/timeout, informational only — the
    /// authoritative wake time is `state_item`'s list value.
    pub tick_remain: OsTick,
    /// Set by `abort_delay`; consumed by the next wake so the woken task
    /// can distinguish "delay elapsed" from "delay aborted early".
    pub delay_aborted: bool,

    // ============ Priority ============
    /// Current (possibly inherited) priority
    pub prio: OsPrio,
    /// Base priority, restored when priority inheritance unwinds
    pub base_prio: OsPrio,

    // ============ State ============
    /// Current task state
    pub task_state: OsTaskState,
    /// Task options
    pub opt: OsOpt,

    // ============ Suspend ============
    /// Suspend nesting counter
    pub suspend_ctr: OsNestingCtr,

    // ============ Time slicing ============
    /// Time quanta for this task
    pub time_quanta: OsTick,
    /// Remaining time quanta
    pub time_quanta_ctr: OsTick,

    // ============ Task semaphore ============
    /// Task-specific semaphore counter
    pub sem_ctr: OsSemCtr,

    // ============ Event flags ============
    /// Flags being waited for
    pub flags_pend: OsFlags,
    /// Flags that made the task ready
    pub flags_rdy: OsFlags,
    /// Flag options
    pub flags_opt: OsOpt,

    // ============ Message ============
    /// Message pointer
    pub msg_ptr: *const (),
    /// Message size
    pub msg_size: OsMsgSize,

    // ============ Direct task notifications ============
    /// Per-channel notification value, written by `notify_give`/
    /// `notify_send` and read/cleared by `notify_take`/`notify_wait`.
    pub notify_value: [OsNotifyValue; CFG_TASK_NOTIFICATION_ARRAY_ENTRIES],
    /// Per-channel notification state, used to decide whether a pending
    /// notification wakes the task immediately or accumulates.
    pub notify_state: [OsNotifyState; CFG_TASK_NOTIFICATION_ARRAY_ENTRIES],

    // ============ Mutex priority inheritance ============
    /// Number of mutexes currently held by this task, used to decide how
    /// far to unwind priority inheritance on release.
    pub mutexes_held: u8,

    // ============ Task entry point ============
    /// Task function address
    pub task_entry_addr: u32,
    /// Task argument
    pub task_entry_arg: *mut (),

    // ============ Allocation bookkeeping ============
    /// How this TCB's storage (and stack) were provided.
    pub allocation_kind: OsAllocationKind,

    // ============ Extension pointer ============
    /// User-defined extension data
    pub ext_ptr: *mut (),
}

impl OsTcb {
    /// Create a new, uninitialized TCB
    pub const fn new() -> Self {
        OsTcb {
            stk_ptr: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_limit: core::ptr::null_mut(),
            stk_size: 0,

            name: "",

            state_item: Item::new(),
            event_item: Item::new(),

            pend_obj_ptr: core::ptr::null(),
            pend_on: OsPendOn::Nothing,
            pend_status: OsPendStatus::Ok,

            tick_remain: 0,
            delay_aborted: false,

            prio: 0,
            base_prio: 0,

            task_state: OsTaskState::Ready,
            opt: 0,

            suspend_ctr: 0,

            time_quanta: 0,
            time_quanta_ctr: 0,

            sem_ctr: 0,

            flags_pend: 0,
            flags_rdy: 0,
            flags_opt: 0,

            msg_ptr: core::ptr::null(),
            msg_size: 0,

            notify_value: [0; CFG_TASK_NOTIFICATION_ARRAY_ENTRIES],
            notify_state: [OsNotifyState::NotWaiting; CFG_TASK_NOTIFICATION_ARRAY_ENTRIES],

            mutexes_held: 0,

            task_entry_addr: 0,
            task_entry_arg: core::ptr::null_mut(),

            allocation_kind: OsAllocationKind::StaticBoth,

            ext_ptr: core::ptr::null_mut(),
        }
    }

    /// Initialize TCB to default values
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Check if task is ready to run
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.task_state == OsTaskState::Ready
    }

    /// Check if task is pending
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(
            self.task_state,
            OsTaskState::Pend
                | OsTaskState::PendTimeout
                | OsTaskState::PendSuspended
                | OsTaskState::PendTimeoutSuspended
        )
    }

    /// Check if task is suspended
    #[inline]
    pub fn is_suspended(&self) -> bool {
        matches!(
            self.task_state,
            OsTaskState::Suspended
                | OsTaskState::DelayedSuspended
                | OsTaskState::PendSuspended
                | OsTaskState::PendTimeoutSuspended
        )
    }

    /// Check if task is delayed
    #[inline]
    pub fn is_delayed(&self) -> bool {
        matches!(
            self.task_state,
            OsTaskState::Delayed | OsTaskState::DelayedSuspended
        )
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}
