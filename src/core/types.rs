//! Core type definitions for μC/OS-III
//!
//! These types provide strong typing for RTOS primitives.

// ============ Tick width selection ============
//
// `TICK_TYPE_WIDTH_BITS` (see `config`) documents the intended width; the
// concrete type is chosen at compile time via mutually exclusive features so
// callers get a real machine integer rather than a generic parameter
// threaded through every kernel structure.

#[cfg(feature = "tick64")]
pub type OsTick = u64;
#[cfg(all(feature = "tick16", not(feature = "tick64")))]
pub type OsTick = u16;
#[cfg(not(any(feature = "tick16", feature = "tick64")))]
pub type OsTick = u32;

/// Task priority. 0 is the idle priority; higher numeric values are more
/// urgent (spec §3).
pub type OsPrio = u8;

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

/// Stack element type
pub type OsStkElement = u32;

/// Event flags type
pub type OsFlags = u32;

/// Count of tick-counter wraparounds; see `spec` §3 "Tick".
pub type OsOverflowCtr = u32;

/// A direct task notification value (spec §6, used by the public notify API
/// and by `StreamBuffer`'s wake protocol).
pub type OsNotifyValue = u32;

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsTaskState {
    /// Task is ready to run
    Ready = 0,
    /// Task is delayed
    Delayed = 1,
    /// Task is pending on a kernel object
    Pend = 2,
    /// Task is pending with timeout
    PendTimeout = 3,
    /// Task is suspended
    Suspended = 4,
    /// Task is delayed and suspended
    DelayedSuspended = 5,
    /// Task is pending and suspended
    PendSuspended = 6,
    /// Task is pending with timeout and suspended
    PendTimeoutSuspended = 7,
    /// Task has been deleted; TCB parked on the terminating list awaiting
    /// reclamation by the idle task.
    Deleted = 8,
}

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
    Cond = 7,
    StreamBuffer = 8,
    /// Blocked inside `notify_wait`/`notify_take`, waiting on a direct
    /// task notification rather than a shared kernel object.
    Notify = 9,
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
    Flag = 0x464C_4147,         // 'FLAG'
    Mem = 0x4D45_4D20,          // 'MEM '
    Mutex = 0x4D55_5458,        // 'MUTX'
    Queue = 0x5155_4555,        // 'QUEU'
    Sem = 0x5345_4D41,          // 'SEMA'
    Task = 0x5441_534B,         // 'TASK'
    Timer = 0x544D_5220,        // 'TMR '
    StreamBuffer = 0x5342_5546, // 'SBUF'
}

/// How a task's control-block and stack storage were provided.
///
/// This crate is static-allocation-only (no `alloc` dependency), so
/// `StaticBoth` is the only variant actually produced by `os_task_create`;
/// the others exist so the public surface matches spec §3's
/// `allocation_kind` attribute and future allocator-backed ports can extend
/// it without an API break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsAllocationKind {
    DynamicTcbAndStack = 0,
    StaticStackOnly = 1,
    StaticBoth = 2,
}

/// State of a single task-notification channel (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsNotifyState {
    NotWaiting = 0,
    Waiting = 1,
    Received = 2,
}

/// Which end of a queue an item is sent to (spec §4.4 `send`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsQueuePosition {
    Back,
    Front,
    Overwrite,
}

// ============ Option flags ============

/// Delete options
pub mod opt {
    use super::OsOpt;

    pub const NONE: OsOpt = 0x0000;

    // Delete options
    pub const DEL_NO_PEND: OsOpt = 0x0000;
    pub const DEL_ALWAYS: OsOpt = 0x0001;

    // Pend options
    pub const PEND_BLOCKING: OsOpt = 0x0000;
    pub const PEND_NON_BLOCKING: OsOpt = 0x8000;

    // Post options
    pub const POST_FIFO: OsOpt = 0x0000;
    pub const POST_LIFO: OsOpt = 0x0010;
    pub const POST_ALL: OsOpt = 0x0200;
    pub const POST_NO_SCHED: OsOpt = 0x8000;

    // Task options
    pub const TASK_NONE: OsOpt = 0x0000;
    pub const TASK_STK_CHK: OsOpt = 0x0001;
    pub const TASK_STK_CLR: OsOpt = 0x0002;
    pub const TASK_SAVE_FP: OsOpt = 0x0004;

    // Flag options
    pub const FLAG_CLR_ALL: OsOpt = 0x0001;
    pub const FLAG_CLR_ANY: OsOpt = 0x0002;
    pub const FLAG_SET_ALL: OsOpt = 0x0004;
    pub const FLAG_SET_ANY: OsOpt = 0x0008;
    pub const FLAG_CONSUME: OsOpt = 0x0100;
}
