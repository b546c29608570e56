//! Task management module
//!
//! Provides task creation, deletion, and control functions.

mod tcb;

pub use tcb::OsTcb;

use core::ptr::NonNull;

use crate::config::{
    CFG_PRIO_MAX, CFG_STK_SIZE_MIN, CFG_TASK_NOTIFICATION_ARRAY_ENTRIES, CFG_TIME_QUANTA_DEFAULT,
};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::types::{
    OsNotifyState, OsNotifyValue, OsOpt, OsPendOn, OsPendStatus, OsPrio, OsStkElement,
    OsTaskState, OsTick,
};

/// Task entry point function type
pub type OsTaskFn = fn(*mut ()) -> !;

/// Create a new task
///
/// # Arguments
/// * `tcb` - Pointer to the Task Control Block
/// * `name` - Task name for debugging
/// * `task_fn` - Task entry point function
/// * `arg` - Argument to pass to task function
/// * `prio` - Task priority
/// * `stk_base` - Pointer to base of stack array
/// * `stk_size` - Stack size in words
/// * `opt` - Task options
unsafe fn os_task_create_raw(
    tcb: *mut OsTcb,
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_size: usize,
    time_quanta: OsTick,
    opt: OsOpt,
) -> OsResult<()> {
    if tcb.is_null() {
        return Err(OsError::TcbInvalid);
    }

    if stk_base.is_null() {
        return Err(OsError::StkInvalid);
    }

    if stk_size < CFG_STK_SIZE_MIN {
        return Err(OsError::StkSizeInvalid);
    }

    if prio as usize >= CFG_PRIO_MAX {
        return Err(OsError::PrioInvalid);
    }

    if is_isr_context() {
        return Err(OsError::TaskCreateIsr);
    }

    critical_section(|_cs| {
        // Initialize TCB
        let tcb_ref = unsafe { &mut *tcb };
        tcb_ref.init();

        tcb_ref.name = name;
        tcb_ref.prio = prio;
        tcb_ref.base_prio = prio;
        tcb_ref.time_quanta = time_quanta;
        tcb_ref.time_quanta_ctr = time_quanta;
        tcb_ref.opt = opt;
        tcb_ref.task_state = OsTaskState::Ready;

        // Initialize stack
        let stk_ptr =
            unsafe { crate::port::os_task_stk_init(task_fn, arg, stk_base, stk_size, opt) };
        tcb_ref.stk_ptr = stk_ptr;
        tcb_ref.stk_base = stk_base;
        tcb_ref.stk_size = stk_size;
        tcb_ref.stk_limit = unsafe { stk_base.add(stk_size / 10) }; // 10% watermark

        // Store task entry point
        tcb_ref.task_entry_addr = task_fn as u32;
        tcb_ref.task_entry_arg = arg;

        // Add to ready list
        let tcb_nonnull = unsafe { NonNull::new_unchecked(tcb) };
        unsafe {
            let prio_tbl = kernel::prio_table();
            let rdy_list = kernel::rdy_list(prio);

            rdy_list.insert_tail(tcb_nonnull);
            prio_tbl.insert(prio);
        }

        if kernel::KERNEL.is_running() {
            crate::sched::os_sched();
        }

        Ok(())
    })
}

/// Create a new task using static references
///
/// This is the recommended way to create tasks
///
/// # Arguments
/// * `tcb` - Static mutable reference to the Task Control Block
/// * `stack` - Static mutable reference to the stack array
/// * `name` - Task name for debugging
/// * `task_fn` - Task entry point function
/// * `prio` - Task priority (0 = idle/lowest, `CFG_PRIO_MAX - 1` = highest)
///
/// # Example
/// ```ignore
/// static mut TASK_TCB: OsTcb = OsTcb::new();
/// static mut TASK_STK: [OsStkElement; 256] = [0; 256];
///
/// fn my_task(_: *mut ()) -> ! {
///     loop { /* ... */ }
/// }
///
/// // In main:
/// os_task_create(
///     unsafe { &mut TASK_TCB },
///     unsafe { &mut TASK_STK },
///     "MyTask",
///     my_task,
///     5,
/// ).expect("Task creation failed");
/// ```
pub fn os_task_create(
    tcb: &'static mut OsTcb,
    stack: &'static mut [OsStkElement],
    name: &'static str,
    task_fn: OsTaskFn,
    prio: OsPrio,
) -> OsResult<()> {
    unsafe {
        os_task_create_raw(
            tcb as *mut OsTcb,
            name,
            task_fn,
            core::ptr::null_mut(),
            prio,
            stack.as_mut_ptr(),
            stack.len(),
            CFG_TIME_QUANTA_DEFAULT,
            0,
        )
    }
}

/// Internal task creation for kernel use
#[doc(hidden)]
pub unsafe fn os_task_create_internal(
    tcb: *mut OsTcb,
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_size: usize,
    time_quanta: OsTick,
    opt: OsOpt,
) -> OsResult<()> {
    if tcb.is_null() || stk_base.is_null() {
        return Err(OsError::TcbInvalid);
    }

    // Initialize TCB
    let tcb_ref = unsafe { &mut *tcb };
    tcb_ref.init();

    tcb_ref.name = name;
    tcb_ref.prio = prio;
    tcb_ref.base_prio = prio;
    tcb_ref.time_quanta = time_quanta;
    tcb_ref.time_quanta_ctr = time_quanta;
    tcb_ref.opt = opt;
    tcb_ref.task_state = OsTaskState::Ready;

    // Initialize stack
    let stk_ptr = unsafe { crate::port::os_task_stk_init(task_fn, arg, stk_base, stk_size, opt) };
    tcb_ref.stk_ptr = stk_ptr;
    tcb_ref.stk_base = stk_base;
    tcb_ref.stk_size = stk_size;
    tcb_ref.stk_limit = unsafe { stk_base.add(stk_size / 10) };

    tcb_ref.task_entry_addr = task_fn as u32;
    tcb_ref.task_entry_arg = arg;

    // Add to ready list
    let tcb_nonnull = unsafe { NonNull::new_unchecked(tcb) };
    unsafe {
        let prio_tbl = kernel::prio_table();
        let rdy_list = kernel::rdy_list(prio);

        rdy_list.insert_tail(tcb_nonnull);
        prio_tbl.insert(prio);
    }

    Ok(())
}

/// Delete a task
///
/// The TCB is unlinked from whatever list currently holds it and parked
/// on the kernel's terminating list; it is not actually reclaimed until
/// the idle task gets around to it via [`os_idle_reclaim`], since a task
/// cannot safely tear down its own stack while still running on it.
pub fn os_task_del(tcb: Option<NonNull<OsTcb>>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::TaskDelIsr);
    }

    critical_section(|_cs| {
        let tcb_ptr = match tcb {
            Some(ptr) => ptr,
            None => {
                // Delete self
                unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?
            }
        };

        let tcb_ref = unsafe { tcb_ptr.as_ref() };
        let prio = tcb_ref.prio;

        if prio == crate::config::CFG_PRIO_IDLE {
            return Err(OsError::TaskDelIdle);
        }

        // Remove the task from whichever list currently holds it. Only a
        // Ready task is actually linked into a priority's ready list —
        // `ReadyList::remove` assumes its argument belongs to that list,
        // so for every other state `state_item.unlink()` is used instead,
        // which follows the item's own container back-pointer regardless
        // of which list (a delayed list, in this case) it is on.
        let tcb_mut = unsafe { &mut *tcb_ptr.as_ptr() };
        if tcb_mut.is_ready() {
            unsafe {
                let rdy_list = kernel::rdy_list(prio);
                rdy_list.remove(tcb_ptr);
                if rdy_list.is_empty() {
                    kernel::prio_table().remove(prio);
                }
            }
        } else {
            tcb_mut.state_item.unlink();
        }
        crate::sched::remove_from_event_list(tcb_ptr);
        tcb_mut.task_state = OsTaskState::Deleted;
        tcb_mut.pend_status = OsPendStatus::Del;

        unsafe { kernel::terminating_push(tcb_ptr) };

        // If deleting current task, trigger reschedule — the storage
        // stays valid until the idle task reclaims it, but this task
        // must never run again.
        let is_current = unsafe { kernel::tcb_cur_ptr() } == Some(tcb_ptr);
        if is_current {
            crate::sched::os_sched();
        }

        Ok(())
    })
}

/// Reclaim TCBs of tasks deleted via [`os_task_del`].
///
/// Called from the idle task's loop body; resets each reclaimed TCB back
/// to its freshly-constructed state so its storage (and stack) can be
/// reused by a later `os_task_create`.
pub fn os_idle_reclaim() {
    critical_section(|_cs| {
        while let Some(mut tcb) = kernel::terminating_pop() {
            let tcb_ref = unsafe { tcb.as_mut() };
            tcb_ref.init();
        }
    });
}

/// Suspend a task
pub fn os_task_suspend(tcb: Option<NonNull<OsTcb>>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::TaskSuspendIsr);
    }

    critical_section(|_cs| {
        let tcb_ptr = match tcb {
            Some(ptr) => ptr,
            None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
        };

        let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };

        if tcb_ref.prio == crate::config::CFG_PRIO_IDLE {
            return Err(OsError::TaskSuspendIdle);
        }

        tcb_ref.suspend_ctr = tcb_ref.suspend_ctr.saturating_add(1);

        match tcb_ref.task_state {
            OsTaskState::Ready => {
                tcb_ref.task_state = OsTaskState::Suspended;
                unsafe {
                    let rdy_list = kernel::rdy_list(tcb_ref.prio);
                    rdy_list.remove(tcb_ptr);
                    if rdy_list.is_empty() {
                        kernel::prio_table().remove(tcb_ref.prio);
                    }
                }
            }
            OsTaskState::Delayed => {
                tcb_ref.task_state = OsTaskState::DelayedSuspended;
            }
            OsTaskState::Pend => {
                tcb_ref.task_state = OsTaskState::PendSuspended;
            }
            OsTaskState::PendTimeout => {
                tcb_ref.task_state = OsTaskState::PendTimeoutSuspended;
            }
            _ => {} // Already suspended
        }

        // Reschedule if suspended current task
        let is_current = unsafe { kernel::tcb_cur_ptr() } == Some(tcb_ptr);
        if is_current {
            crate::sched::os_sched();
        }

        Ok(())
    })
}

/// Resume a suspended task
pub fn os_task_resume(tcb: NonNull<OsTcb>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::TaskResumeIsr);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if tcb_ref.suspend_ctr == 0 {
            return Err(OsError::TaskNotSuspended);
        }

        tcb_ref.suspend_ctr -= 1;

        // Only resume if suspend counter reaches 0
        if tcb_ref.suspend_ctr == 0 {
            match tcb_ref.task_state {
                OsTaskState::Suspended => {
                    tcb_ref.task_state = OsTaskState::Ready;
                    unsafe {
                        let rdy_list = kernel::rdy_list(tcb_ref.prio);
                        rdy_list.insert_tail(tcb);
                        kernel::prio_table().insert(tcb_ref.prio);
                    }
                }
                OsTaskState::DelayedSuspended => {
                    tcb_ref.task_state = OsTaskState::Delayed;
                }
                OsTaskState::PendSuspended => {
                    tcb_ref.task_state = OsTaskState::Pend;
                }
                OsTaskState::PendTimeoutSuspended => {
                    tcb_ref.task_state = OsTaskState::PendTimeout;
                }
                _ => {}
            }

            crate::sched::os_sched();
        }

        Ok(())
    })
}

/// Resume a suspended task from an ISR.
///
/// Unlike [`os_task_resume`], a task freed while the scheduler is locked
/// is parked on `pending_ready` instead of touching the ready list
/// directly, and no reschedule is attempted here — `os_int_exit` drains
/// `pending_ready` and checks for a higher-priority task on its own.
pub fn os_task_resume_from_isr(tcb: NonNull<OsTcb>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if tcb_ref.suspend_ctr == 0 {
            return Err(OsError::TaskNotSuspended);
        }

        tcb_ref.suspend_ctr -= 1;

        if tcb_ref.suspend_ctr == 0 {
            match tcb_ref.task_state {
                OsTaskState::Suspended => {
                    tcb_ref.task_state = OsTaskState::Ready;
                    unsafe { kernel::ready_from_isr(tcb) };
                }
                OsTaskState::DelayedSuspended => {
                    tcb_ref.task_state = OsTaskState::Delayed;
                }
                OsTaskState::PendSuspended => {
                    tcb_ref.task_state = OsTaskState::Pend;
                }
                OsTaskState::PendTimeoutSuspended => {
                    tcb_ref.task_state = OsTaskState::PendTimeout;
                }
                _ => {}
            }
        }

        Ok(())
    })
}

/// Delay the calling task by `ticks` system ticks (spec §4.3 `delay`).
#[inline]
pub fn os_task_delay(ticks: OsTick) -> OsResult<()> {
    crate::time::os_time_dly(ticks)
}

/// Delay the calling task until `*prev_wake_time + increment` (spec
/// §4.3 `delay_until`), for drift-free periodic tasks. `*prev_wake_time`
/// is advanced unconditionally; returns `false` without blocking if the
/// target instant was already in the past (including across tick
/// overflow) rather than delaying almost a full tick-width.
#[inline]
pub fn os_task_delay_until(prev_wake_time: &mut OsTick, increment: OsTick) -> OsResult<bool> {
    crate::time::os_time_dly_until(prev_wake_time, increment)
}

/// Abort a task's delay early (spec §4.3 `abort_delay`).
#[inline]
pub fn os_task_delay_abort(tcb: NonNull<OsTcb>) -> OsResult<()> {
    crate::time::os_time_dly_abort(tcb)
}

/// Change a task's priority (spec §4.3 `priority_set`).
///
/// Only the base priority is changed directly; if the task currently
/// holds an inherited (boosted) priority via a mutex, the new base takes
/// effect once the inheritance unwinds.
pub fn os_task_change_prio(tcb: NonNull<OsTcb>, new_prio: OsPrio) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::TaskChangePrioIsr);
    }

    if new_prio as usize >= CFG_PRIO_MAX {
        return Err(OsError::PrioInvalid);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if tcb_ref.prio == crate::config::CFG_PRIO_IDLE
            || new_prio == crate::config::CFG_PRIO_IDLE
        {
            return Err(OsError::PrioInvalid);
        }

        tcb_ref.base_prio = new_prio;

        // A task holding inherited priority (via a mutex) keeps its
        // current effective priority until the inheritance unwinds;
        // only apply the change to tasks running at their own base
        // priority.
        if tcb_ref.mutexes_held == 0 {
            if tcb_ref.is_ready() {
                unsafe { crate::sched::os_rdy_list_change_prio(tcb, new_prio) };
            } else {
                tcb_ref.prio = new_prio;
            }
        }

        crate::sched::os_sched();

        Ok(())
    })
}

/// Current (possibly inherited) priority of a task (spec §4.3
/// `priority_get`).
pub fn os_task_prio_get(tcb: NonNull<OsTcb>) -> OsPrio {
    unsafe { tcb.as_ref().prio }
}

/// Base priority of a task, ignoring any priority inheritance currently
/// in effect (spec §4.3 `priority_get` base variant).
pub fn os_task_base_prio_get(tcb: NonNull<OsTcb>) -> OsPrio {
    unsafe { tcb.as_ref().base_prio }
}

/// Current state of a task (spec §4.3 `get_state`).
pub fn os_task_state_get(tcb: NonNull<OsTcb>) -> OsTaskState {
    unsafe { tcb.as_ref().task_state }
}

/// Handle of the currently running task (spec §4.3 `get_handle`).
pub fn os_task_handle_get() -> Option<NonNull<OsTcb>> {
    unsafe { kernel::tcb_cur_ptr() }
}

/// Whether the calling task's most recent blocking call timed out
/// (spec §4.3 `check_for_timeout`).
pub fn os_task_check_for_timeout() -> bool {
    unsafe {
        kernel::tcb_cur_ptr()
            .map(|tcb| tcb.as_ref().pend_status == OsPendStatus::Timeout)
            .unwrap_or(false)
    }
}

// ============ Direct task notifications ============
//
// A lightweight per-task signalling primitive (spec §3 `notify_value`/
// `notify_state`), used directly by application code and internally by
// `StreamBuffer`'s wake protocol. Unlike pending on a shared kernel
// object, a notification always targets one specific task, so waking it
// never needs an event list — only `state_item`, if the task happens to
// also be on a delayed (timeout) list.

fn notify_index_valid(index: usize) -> OsResult<()> {
    if index >= CFG_TASK_NOTIFICATION_ARRAY_ENTRIES {
        Err(OsError::OptInvalid)
    } else {
        Ok(())
    }
}

/// Transition a task blocked in `notify_wait`/`notify_take` back to
/// Ready (or a non-pending Suspended variant) now that it has something
/// to observe.
fn wake_notified(tcb_ptr: NonNull<OsTcb>, tcb_ref: &mut OsTcb) {
    match tcb_ref.task_state {
        OsTaskState::Pend => {
            tcb_ref.task_state = OsTaskState::Ready;
            tcb_ref.pend_status = OsPendStatus::Ok;
            unsafe { crate::sched::os_rdy_list_insert(tcb_ptr) };
        }
        OsTaskState::PendTimeout => {
            tcb_ref.task_state = OsTaskState::Ready;
            tcb_ref.pend_status = OsPendStatus::Ok;
            tcb_ref.state_item.unlink();
            unsafe { crate::sched::os_rdy_list_insert(tcb_ptr) };
        }
        OsTaskState::PendSuspended => {
            tcb_ref.task_state = OsTaskState::Suspended;
            tcb_ref.pend_status = OsPendStatus::Ok;
        }
        OsTaskState::PendTimeoutSuspended => {
            tcb_ref.task_state = OsTaskState::Suspended;
            tcb_ref.pend_status = OsPendStatus::Ok;
            tcb_ref.state_item.unlink();
        }
        _ => {}
    }
}

/// Send a notification to `tcb` on `index`, incrementing its value and
/// waking it if it is blocked in `notify_wait`/`notify_take` (spec §4.3
/// `notify_give`).
pub fn os_task_notify_give(tcb: NonNull<OsTcb>, index: usize) -> OsResult<()> {
    notify_index_valid(index)?;

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        tcb_ref.notify_value[index] = tcb_ref.notify_value[index].wrapping_add(1);
        let was_waiting = tcb_ref.notify_state[index] == OsNotifyState::Waiting;
        tcb_ref.notify_state[index] = OsNotifyState::Received;

        if was_waiting && tcb_ref.pend_on == OsPendOn::Notify {
            tcb_ref.pend_on = OsPendOn::Nothing;
            wake_notified(tcb, tcb_ref);
            crate::sched::os_sched();
        }
    });

    Ok(())
}

/// ISR variant of [`os_task_notify_give`]; defers the wake through
/// `pending_ready` if the scheduler is locked.
pub fn os_task_notify_give_from_isr(tcb: NonNull<OsTcb>, index: usize) -> OsResult<()> {
    notify_index_valid(index)?;

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        tcb_ref.notify_value[index] = tcb_ref.notify_value[index].wrapping_add(1);
        let was_waiting = tcb_ref.notify_state[index] == OsNotifyState::Waiting;
        tcb_ref.notify_state[index] = OsNotifyState::Received;

        if was_waiting && tcb_ref.pend_on == OsPendOn::Notify {
            tcb_ref.pend_on = OsPendOn::Nothing;
            match tcb_ref.task_state {
                OsTaskState::Pend => {
                    tcb_ref.task_state = OsTaskState::Ready;
                    tcb_ref.pend_status = OsPendStatus::Ok;
                    unsafe { kernel::ready_from_isr(tcb) };
                }
                OsTaskState::PendTimeout => {
                    tcb_ref.task_state = OsTaskState::Ready;
                    tcb_ref.pend_status = OsPendStatus::Ok;
                    tcb_ref.state_item.unlink();
                    unsafe { kernel::ready_from_isr(tcb) };
                }
                OsTaskState::PendSuspended => {
                    tcb_ref.task_state = OsTaskState::Suspended;
                    tcb_ref.pend_status = OsPendStatus::Ok;
                }
                OsTaskState::PendTimeoutSuspended => {
                    tcb_ref.task_state = OsTaskState::Suspended;
                    tcb_ref.pend_status = OsPendStatus::Ok;
                    tcb_ref.state_item.unlink();
                }
                _ => {}
            }
        }
    });

    Ok(())
}

/// Block the calling task until `index` is notified (spec §4.3
/// `notify_wait`), clearing bits/value on entry and exit as requested.
///
/// `ticks = 0` waits forever; a non-zero value bounds the wait and
/// surfaces `OsError::Timeout` if no notification arrives in time.
pub fn os_task_notify_wait(
    index: usize,
    clear_on_entry: bool,
    clear_on_exit: bool,
    ticks: OsTick,
) -> OsResult<OsNotifyValue> {
    notify_index_valid(index)?;

    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::PendIsr);
    }

    let cur_tcb = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;

    let already_pending = critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *cur_tcb.as_ptr() };
        if clear_on_entry {
            tcb_ref.notify_value[index] = 0;
        }
        if tcb_ref.notify_state[index] == OsNotifyState::Received {
            tcb_ref.notify_state[index] = OsNotifyState::NotWaiting;
            true
        } else {
            tcb_ref.notify_state[index] = OsNotifyState::Waiting;
            tcb_ref.pend_on = OsPendOn::Notify;
            tcb_ref.pend_status = OsPendStatus::Ok;

            if ticks == 0 {
                tcb_ref.task_state = OsTaskState::Pend;
                unsafe { crate::sched::os_rdy_list_remove(cur_tcb) };
            } else {
                let wake_tick =
                    unsafe { kernel::KERNEL.tick_get_unchecked().wrapping_add(ticks) };
                tcb_ref.task_state = OsTaskState::PendTimeout;
                unsafe {
                    crate::sched::os_rdy_list_remove(cur_tcb);
                    kernel::delayed_insert(cur_tcb, wake_tick);
                }
            }
            false
        }
    });

    if !already_pending {
        crate::sched::os_sched();
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *cur_tcb.as_ptr() };
        let value = tcb_ref.notify_value[index];
        if clear_on_exit {
            tcb_ref.notify_value[index] = 0;
        }
        tcb_ref.notify_state[index] = OsNotifyState::NotWaiting;

        if tcb_ref.pend_status == OsPendStatus::Timeout {
            Err(OsError::Timeout)
        } else {
            Ok(value)
        }
    })
}

/// Block until `index` is notified, returning the accumulated value
/// (spec §4.3 `notify_take`) — a thin wrapper over `notify_wait` that
/// never clears on entry, matching the "counting" notification idiom.
#[inline]
pub fn os_task_notify_take(index: usize, clear_on_exit: bool, ticks: OsTick) -> OsResult<OsNotifyValue> {
    os_task_notify_wait(index, false, clear_on_exit, ticks)
}

/// Clear `index`'s notification state without waiting (spec §4.3
/// `notify_state_clear`).
pub fn os_task_notify_state_clear(tcb: NonNull<OsTcb>, index: usize) -> OsResult<bool> {
    notify_index_valid(index)?;
    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        let was_pending = tcb_ref.notify_state[index] == OsNotifyState::Received;
        tcb_ref.notify_state[index] = OsNotifyState::NotWaiting;
        Ok(was_pending)
    })
}

/// Clear `index`'s notification value without waiting (spec §4.3
/// `notify_value_clear`).
pub fn os_task_notify_value_clear(tcb: NonNull<OsTcb>, index: usize) -> OsResult<()> {
    notify_index_valid(index)?;
    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        tcb_ref.notify_value[index] = 0;
        Ok(())
    })
}
