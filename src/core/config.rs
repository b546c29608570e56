//! Compile-time configuration for μC/OS-III
//!
//! These constants control the behavior and resource limits of the RTOS.
//! They correspond to spec §6's compile-time configuration record; unlike a
//! C `FreeRTOSConfig.h`, they are plain `pub const` items so downstream
//! crates override them with their own `config.rs` shim + `#[path]`, the way
//! embedded Rust crates usually expose build-time knobs.

/// Maximum number of priority levels. Sizes the ready-list array.
pub const CFG_PRIO_MAX: usize = 64;

/// System tick rate in Hz. Used by the port to program the tick source.
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Default time quanta for round-robin scheduling.
pub const CFG_TIME_QUANTA_DEFAULT: crate::types::OsTick = 10;

/// Minimum task stack size.
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Idle-task stack size, in stack elements (spec §6 `MINIMAL_STACK_SIZE`).
pub const CFG_MINIMAL_STACK_SIZE: usize = 128;

/// Maximum task name length (spec §6 `MAX_TASK_NAME_LEN`). Names longer than
/// this are truncated at task creation.
pub const CFG_MAX_TASK_NAME_LEN: usize = 16;

/// Number of task notification channels per task (spec §6
/// `TASK_NOTIFICATION_ARRAY_ENTRIES`).
pub const CFG_TASK_NOTIFICATION_ARRAY_ENTRIES: usize = 1;

/// Enable round-robin scheduling for same-priority tasks and
/// higher-priority preemption (spec §6 `USE_PREEMPTION`).
pub const CFG_USE_PREEMPTION: bool = true;

/// Enable round-robin scheduling for same-priority tasks
pub const CFG_SCHED_ROUND_ROBIN_EN: bool = true;

/// Idle task priority. Priority 0 is the idle priority (spec §3: "Higher
/// numeric value == higher scheduling priority"); every other task in the
/// system runs at a numerically higher, more urgent priority.
pub const CFG_PRIO_IDLE: u8 = 0;

/// Gates the mutex component (spec §6 `USE_MUTEXES`). Kept in lockstep with
/// the `mutex` Cargo feature; see `lib.rs`.
pub const CFG_USE_MUTEXES: bool = cfg!(feature = "mutex");

/// Gates recursive-mutex operations (spec §6 `USE_RECURSIVE_MUTEXES`).
pub const CFG_USE_RECURSIVE_MUTEXES: bool = cfg!(feature = "mutex");

/// Gates counting semaphores as distinct from binary semaphores
/// (spec §6 `USE_COUNTING_SEMAPHORES`).
pub const CFG_USE_COUNTING_SEMAPHORES: bool = cfg!(feature = "sem");

/// Gates queue-set fan-in (spec §6 `USE_QUEUE_SETS`).
pub const CFG_USE_QUEUE_SETS: bool = cfg!(feature = "queue-sets");

/// Gates the software-timer service (spec §6 `USE_TIMERS`).
pub const CFG_USE_TIMERS: bool = cfg!(feature = "timers");

/// Gates stream/message buffers (spec §6 `USE_STREAM_BUFFERS`).
pub const CFG_USE_STREAM_BUFFERS: bool = cfg!(feature = "stream-buffer");

/// Gates the direct task-notification API (spec §6 `USE_TASK_NOTIFICATIONS`).
pub const CFG_USE_TASK_NOTIFICATIONS: bool = true;

/// Priority of the timer daemon task (spec §6 `TIMER_TASK_PRIORITY`).
/// Kept close to the highest (most urgent) priority so timer callbacks are
/// serviced promptly, one level below the ceiling so an application task
/// can still be placed above it if it genuinely needs to preempt the
/// daemon; the idle task remains at the lowest priority, 0.
pub const CFG_TIMER_TASK_PRIORITY: u8 = (CFG_PRIO_MAX - 2) as u8;

/// Depth of the timer daemon's command queue (spec §6 `TIMER_QUEUE_LENGTH`).
pub const CFG_TIMER_QUEUE_LENGTH: usize = 10;

/// Stack depth of the timer daemon task, in stack elements
/// (spec §6 `TIMER_TASK_STACK_DEPTH`).
pub const CFG_TIMER_TASK_STACK_DEPTH: usize = 256;

/// Width, in bits, of the tick counter type actually compiled in (see
/// `types::OsTick`). Selected via the `tick16`/`tick64` Cargo features;
/// defaults to 32.
#[cfg(feature = "tick64")]
pub const CFG_TICK_TYPE_WIDTH_BITS: u32 = 64;
#[cfg(all(feature = "tick16", not(feature = "tick64")))]
pub const CFG_TICK_TYPE_WIDTH_BITS: u32 = 16;
#[cfg(not(any(feature = "tick16", feature = "tick64")))]
pub const CFG_TICK_TYPE_WIDTH_BITS: u32 = 32;

/// Maximum single message size for message buffers, in bytes
/// (spec §6 `MESSAGE_BUFFER_LENGTH_TYPE` — this crate always uses a 4-byte
/// length prefix, i.e. `u32`, so the practical ceiling is `u32::MAX`).
pub const CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES: usize = 4;

/// Stack-overflow check level (spec §6 `CHECK_FOR_STACK_OVERFLOW`).
/// 0 = disabled, 1 = check stack pointer against limit on each switch,
/// 2 = also check the canary pattern written at task creation.
pub const CFG_CHECK_FOR_STACK_OVERFLOW: u8 = 1;

/// Whether the idle task should yield immediately when another priority-0
/// task is ready (spec §6 `IDLE_SHOULD_YIELD`).
pub const CFG_IDLE_SHOULD_YIELD: bool = true;
