//! Time management module
//!
//! Provides tick handling, time delays, and timeout management.

use core::ptr::NonNull;

use crate::config::CFG_TICK_RATE_HZ;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{OsPendStatus, OsTaskState, OsTick};

/// Time delay in ticks
///
/// Delays the calling task for the specified number of system ticks.
/// The task is removed from the ready list and placed on the delayed
/// list. When the delay expires, the tick handler moves the task back
/// to ready.
///
/// # Arguments
/// * `ticks` - Number of ticks to delay (0 = no delay)
///
/// # Returns
/// * `Ok(())` - Delay completed
/// * `Err(OsError::TimeDlyIsr)` - Cannot delay from ISR
/// * `Err(OsError::SchedLocked)` - Scheduler is locked
pub fn os_time_dly(ticks: OsTick) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::TimeDlyIsr);
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return Err(OsError::SchedLocked);
    }

    if ticks == 0 {
        return Ok(());
    }

    critical_section(|_cs| {
        unsafe {
            if let Some(cur_tcb) = kernel::tcb_cur_ptr() {
                let tcb = &mut *cur_tcb.as_ptr();

                tcb.tick_remain = ticks;
                tcb.task_state = OsTaskState::Delayed;
                tcb.delay_aborted = false;

                let current_tick = kernel::KERNEL.tick_get_unchecked();
                let wake_tick = current_tick.wrapping_add(ticks);

                sched::os_rdy_list_remove(cur_tcb);
                kernel::delayed_insert(cur_tcb, wake_tick);
            }
        }
    });

    sched::os_sched();

    Ok(())
}

/// Delay the calling task until `*prev_wake_time + increment` (spec
/// §4.3 `delay_until`), for drift-free periodic tasks: callers keep a
/// running `prev_wake_time` across iterations instead of accumulating
/// rounding error from repeated relative delays.
///
/// `*prev_wake_time` is advanced to the new target unconditionally, even
/// when no delay is actually performed. A target that has already
/// passed — detected by comparing against `current_tick` with explicit
/// overflow handling, since a naive `wake_tick - current_tick` on
/// unsigned ticks wraps into a huge (wrong) delay rather than zero —
/// returns immediately without blocking (spec §8 boundary behaviour:
/// "delay_until with a target already in the past due to overflow
/// returns without delay and reports so").
pub fn os_time_dly_until(prev_wake_time: &mut OsTick, increment: OsTick) -> OsResult<bool> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::TimeDlyIsr);
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return Err(OsError::SchedLocked);
    }

    let last_wake = *prev_wake_time;
    let wake_tick = last_wake.wrapping_add(increment);

    let should_delay = critical_section(|_cs| unsafe {
        let current_tick = kernel::KERNEL.tick_get_unchecked();

        // Mirrors the standard overflow-safe periodic-delay check: decide
        // whether `wake_tick` is still ahead of `current_tick` by
        // reasoning about whether the tick counter has wrapped since
        // `last_wake` was recorded, rather than subtracting directly.
        let should_delay = if current_tick < last_wake {
            // Counter has wrapped since the last call.
            wake_tick < last_wake && wake_tick > current_tick
        } else {
            wake_tick < last_wake || wake_tick > current_tick
        };

        if should_delay {
            if let Some(cur_tcb) = kernel::tcb_cur_ptr() {
                let tcb = &mut *cur_tcb.as_ptr();
                tcb.tick_remain = wake_tick.wrapping_sub(current_tick);
                tcb.task_state = OsTaskState::Delayed;
                tcb.delay_aborted = false;

                sched::os_rdy_list_remove(cur_tcb);
                kernel::delayed_insert(cur_tcb, wake_tick);
            }
        }

        should_delay
    });

    *prev_wake_time = wake_tick;

    if should_delay {
        sched::os_sched();
    }

    Ok(should_delay)
}

/// Time delay in hours, minutes, seconds, milliseconds
///
/// # Arguments
/// * `hours` - Hours (0-999)
/// * `minutes` - Minutes (0-59)
/// * `seconds` - Seconds (0-59)
/// * `milliseconds` - Milliseconds (0-999)
pub fn os_time_dly_hmsm(
    hours: u16,
    minutes: u8,
    seconds: u8,
    milliseconds: u16,
) -> OsResult<()> {
    if minutes > 59 {
        return Err(OsError::StateInvalid);
    }
    if seconds > 59 {
        return Err(OsError::StateInvalid);
    }
    if milliseconds > 999 {
        return Err(OsError::StateInvalid);
    }

    let total_ms = (hours as u32) * 3_600_000
        + (minutes as u32) * 60_000
        + (seconds as u32) * 1000
        + (milliseconds as u32);

    let ticks = (total_ms * CFG_TICK_RATE_HZ) / 1000;

    os_time_dly(ticks as OsTick)
}

/// Resume a delayed task before its delay expires
pub fn os_time_dly_resume(tcb: NonNull<OsTcb>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::TimeDlyIsr);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if !tcb_ref.is_delayed() {
            return Err(OsError::TaskNotDly);
        }

        tcb_ref.tick_remain = 0;
        tcb_ref.state_item.unlink();

        match tcb_ref.task_state {
            OsTaskState::Delayed => {
                tcb_ref.task_state = OsTaskState::Ready;
                unsafe { sched::os_rdy_list_insert(tcb) };
            }
            OsTaskState::DelayedSuspended => {
                tcb_ref.task_state = OsTaskState::Suspended;
            }
            _ => {}
        }

        sched::os_sched();

        Ok(())
    })
}

/// Abort a task's delay early, distinguishing it from natural expiry
/// (spec §4.3 `abort_delay`). The aborted task observes
/// `delay_aborted == true` once scheduled again.
pub fn os_time_dly_abort(tcb: NonNull<OsTcb>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if !tcb_ref.is_delayed() {
            return Err(OsError::TaskNotDly);
        }

        tcb_ref.tick_remain = 0;
        tcb_ref.delay_aborted = true;
        tcb_ref.state_item.unlink();

        match tcb_ref.task_state {
            OsTaskState::Delayed => {
                tcb_ref.task_state = OsTaskState::Ready;
                unsafe { sched::os_rdy_list_insert(tcb) };
            }
            OsTaskState::DelayedSuspended => {
                tcb_ref.task_state = OsTaskState::Suspended;
            }
            _ => {}
        }

        sched::os_sched();

        Ok(())
    })
}

/// Get current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    kernel::KERNEL.tick_get()
}

/// Tick handler
pub fn os_tick_handler() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    kernel::KERNEL.int_enter();

    let _tick = kernel::KERNEL.tick_increment();

    critical_section(|_cs| {
        // Process delayed tasks
        process_delayed_tasks();
        // Round-robin time slicing
        sched::os_sched_round_robin();
    });

    kernel::os_int_exit();
}

/// Drain and reschedule every delayed task whose wake tick has come due.
///
/// Bails out early via the kernel's cached `next_unblock_time` so a
/// quiet system with nothing due costs a single comparison instead of a
/// list walk.
fn process_delayed_tasks() {
    let current_tick = unsafe { kernel::KERNEL.tick_get_unchecked() };
    if current_tick < kernel::next_unblock_time() {
        return;
    }

    let mut buf: [Option<NonNull<OsTcb>>; 8] = [None; 8];
    loop {
        let n = kernel::drain_due_delayed(&mut buf);
        if n == 0 {
            break;
        }

        for slot in buf.iter().take(n) {
            let tcb_ptr = slot.expect("drained slot must be populated");
            let tcb = unsafe { &mut *tcb_ptr.as_ptr() };
            tcb.tick_remain = 0;

            match tcb.task_state {
                OsTaskState::Delayed => {
                    tcb.task_state = OsTaskState::Ready;
                    unsafe { sched::os_rdy_list_insert(tcb_ptr) };
                }
                OsTaskState::DelayedSuspended => {
                    tcb.task_state = OsTaskState::Suspended;
                }
                OsTaskState::PendTimeout => {
                    tcb.task_state = OsTaskState::Ready;
                    tcb.pend_status = OsPendStatus::Timeout;
                    sched::remove_from_event_list(tcb_ptr);
                    unsafe { sched::os_rdy_list_insert(tcb_ptr) };
                }
                OsTaskState::PendTimeoutSuspended => {
                    tcb.task_state = OsTaskState::PendSuspended;
                    tcb.pend_status = OsPendStatus::Timeout;
                    sched::remove_from_event_list(tcb_ptr);
                }
                _ => {}
            }
        }
    }
}

/// SysTick interrupt handler
#[no_mangle]
pub extern "C" fn SysTick() {
    os_tick_handler();
}
