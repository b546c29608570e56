//! Scheduler module
//!
//! Priority-based preemptive scheduler with round-robin for same priority.

mod rdy_list;

pub use rdy_list::ReadyList;

use core::ptr::NonNull;

use crate::config::CFG_SCHED_ROUND_ROBIN_EN;
use crate::critical::{critical_section, is_isr_context, CriticalSection};
use crate::list::List;

use crate::kernel;
use crate::task::OsTcb;
use crate::types::OsPrio;

/// Main scheduling point
///
/// This function determines the highest priority ready task and
/// triggers a context switch if needed. It should be called:
/// - After any operation that may change task readiness
/// - After releasing a semaphore/mutex
/// - After resuming a task
/// - When a delay/timeout expires
pub fn os_sched() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    if is_isr_context() {
        return;
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return;
    }

    let _cs = CriticalSection::enter();

    let high_prio = unsafe { kernel::prio_table().get_highest() };

    unsafe {
        if let Some(high_rdy) = kernel::rdy_list(high_prio).head() {
            kernel::set_prio_high_rdy(high_prio);
            kernel::set_tcb_high_rdy_ptr(Some(high_rdy));

            if Some(high_rdy) != kernel::tcb_cur_ptr() {
                crate::port::os_ctx_sw();
            }
        }
    }
}

/// Round-robin scheduling for tasks at the same priority
pub fn os_sched_round_robin() {
    if !CFG_SCHED_ROUND_ROBIN_EN {
        return;
    }

    if !kernel::KERNEL.is_running() {
        return;
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return;
    }

    critical_section(|_cs| {
        unsafe {
            if let Some(cur_tcb_ptr) = kernel::tcb_cur_ptr() {
                let cur_tcb = &mut *cur_tcb_ptr.as_ptr();

                if cur_tcb.time_quanta_ctr > 0 {
                    cur_tcb.time_quanta_ctr -= 1;
                }

                if cur_tcb.time_quanta_ctr == 0 {
                    cur_tcb.time_quanta_ctr = cur_tcb.time_quanta;

                    let prio = cur_tcb.prio;
                    let rdy_list = kernel::rdy_list(prio);

                    // Only rotate if more than one task at this priority
                    if rdy_list.len() > 1 {
                        rdy_list.remove(cur_tcb_ptr);
                        rdy_list.insert_tail(cur_tcb_ptr);

                        if let Some(new_head) = rdy_list.head() {
                            kernel::set_tcb_high_rdy_ptr(Some(new_head));
                        }

                        crate::port::os_ctx_sw();
                    }
                }
            }
        }
    });
}

/// Make a task ready
pub(crate) unsafe fn os_rdy_list_insert(tcb: NonNull<OsTcb>) {
    let tcb_ref = unsafe { tcb.as_ref() };
    let prio = tcb_ref.prio;

    unsafe {
        let rdy_list = kernel::rdy_list(prio);
        rdy_list.insert_tail(tcb);
        kernel::prio_table().insert(prio);
    }
}

/// Remove a task from ready list
pub(crate) unsafe fn os_rdy_list_remove(tcb: NonNull<OsTcb>) {
    let tcb_ref = unsafe { tcb.as_ref() };
    let prio = tcb_ref.prio;

    unsafe {
        let rdy_list = kernel::rdy_list(prio);
        rdy_list.remove(tcb);

        if rdy_list.is_empty() {
            kernel::prio_table().remove(prio);
        }
    }
}

/// Move task to different priority
pub(crate) unsafe fn os_rdy_list_change_prio(tcb: NonNull<OsTcb>, new_prio: OsPrio) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };
    let old_prio = tcb_ref.prio;

    if old_prio == new_prio {
        return;
    }

    unsafe {
        let old_rdy_list = kernel::rdy_list(old_prio);
        old_rdy_list.remove(tcb);
        if old_rdy_list.is_empty() {
            kernel::prio_table().remove(old_prio);
        }
    }

    tcb_ref.prio = new_prio;

    unsafe {
        let new_rdy_list = kernel::rdy_list(new_prio);
        new_rdy_list.insert_tail(tcb);
        kernel::prio_table().insert(new_prio);
    }
}

/// Place `tcb` on a kernel object's wait list, ordered by effective
/// priority (spec §4.3 `place_on_event_list`). The list's ordering key
/// is `CFG_PRIO_MAX - 1 - priority` so its head is always the
/// highest-priority waiter, matching the priority-ordered pend lists
/// queues, semaphores and mutexes all share.
///
/// # Safety
/// `tcb` must not already be linked into any event list.
pub(crate) unsafe fn place_on_event_list(list: &mut List<OsTcb>, mut tcb: NonNull<OsTcb>) {
    let tcb_ref = unsafe { tcb.as_mut() };
    let key = (crate::config::CFG_PRIO_MAX as OsPrio)
        .saturating_sub(1)
        .saturating_sub(tcb_ref.prio) as crate::types::OsTick;
    tcb_ref.event_item.set_owner(tcb);
    tcb_ref.event_item.set_value(key);
    let item = NonNull::from(&mut tcb_ref.event_item);
    unsafe { list.insert_ordered(item) };
}

/// Remove `tcb` from whichever event list currently holds it (spec §4.3
/// `remove_from_event_list`).
pub(crate) fn remove_from_event_list(mut tcb: NonNull<OsTcb>) {
    let tcb_ref = unsafe { tcb.as_mut() };
    tcb_ref.event_item.unlink();
}

/// Highest-priority waiter on an event list, without removing it.
pub(crate) fn event_list_head(list: &List<OsTcb>) -> Option<NonNull<OsTcb>> {
    list.head()
}

/// Transition a task popped off an event list (spec §4.3
/// `remove_from_event_list`) back to Ready/Suspended from task context,
/// clearing its pend bookkeeping. Shared by queue, stream-buffer and
/// timer waits so each doesn't re-derive the same state-table logic
/// `sem.rs`/`mutex.rs` already inline.
///
/// Returns `true` iff the woken task outranks the currently running task
/// (the caller's cue to request a yield).
pub(crate) unsafe fn wake_pended_task(mut tcb_ptr: NonNull<OsTcb>) -> bool {
    let tcb = unsafe { tcb_ptr.as_mut() };
    tcb.pend_on = crate::types::OsPendOn::Nothing;
    tcb.pend_status = crate::types::OsPendStatus::Ok;
    tcb.pend_obj_ptr = core::ptr::null();
    tcb.tick_remain = 0;
    // A task that was pending-with-timeout is still linked on a delayed
    // list; drop it so it doesn't also observe a spurious timeout later.
    tcb.state_item.unlink();

    let cur_prio = unsafe {
        kernel::tcb_cur_ptr()
            .map(|c| c.as_ref().prio)
            .unwrap_or(0)
    };

    match tcb.task_state {
        crate::types::OsTaskState::PendSuspended | crate::types::OsTaskState::PendTimeoutSuspended => {
            tcb.task_state = crate::types::OsTaskState::Suspended;
            false
        }
        _ => {
            tcb.task_state = crate::types::OsTaskState::Ready;
            unsafe { os_rdy_list_insert(tcb_ptr) };
            tcb.prio > cur_prio
        }
    }
}

/// ISR variant of [`wake_pended_task`]: defers to `pending_ready` instead
/// of touching the ready list directly when the scheduler is locked,
/// matching `kernel::ready_from_isr`'s contract.
pub(crate) unsafe fn wake_pended_task_from_isr(mut tcb_ptr: NonNull<OsTcb>) -> bool {
    let tcb = unsafe { tcb_ptr.as_mut() };
    tcb.pend_on = crate::types::OsPendOn::Nothing;
    tcb.pend_status = crate::types::OsPendStatus::Ok;
    tcb.pend_obj_ptr = core::ptr::null();
    tcb.tick_remain = 0;
    tcb.state_item.unlink();

    let cur_prio = unsafe {
        kernel::tcb_cur_ptr()
            .map(|c| c.as_ref().prio)
            .unwrap_or(0)
    };

    match tcb.task_state {
        crate::types::OsTaskState::PendSuspended | crate::types::OsTaskState::PendTimeoutSuspended => {
            tcb.task_state = crate::types::OsTaskState::Suspended;
            false
        }
        _ => {
            tcb.task_state = crate::types::OsTaskState::Ready;
            unsafe { kernel::ready_from_isr(tcb_ptr) };
            tcb.prio > cur_prio
        }
    }
}

/// Force an immediate reschedule check — used after ISR-driven wakeups
/// and after priority changes (spec §4.3 `switch_context`).
#[inline]
pub(crate) fn switch_context() {
    os_sched();
}
