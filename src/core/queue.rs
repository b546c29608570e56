//! Generic fixed-capacity message queue
//!
//! A `Queue<T, N>` is a ring buffer of up to `N` copies of `T`, with two
//! priority-ordered wait lists (`waiting_to_send`/`waiting_to_receive`)
//! built on the same generic intrusive [`List`](crate::list::List) that
//! backs semaphores, mutexes and ready lists. Unlike [`OsSem`](crate::sync::sem::OsSem)
//! and [`OsMutex`](crate::sync::mutex::OsMutex), a queue's blocking path
//! goes through [`kernel::suspend_all`]/[`kernel::resume_all`] around the
//! wait-list insert, so there is a real (if brief) window where an ISR
//! must defer to the queue's `rx_lock`/`tx_lock` counters instead of
//! touching the wait lists directly — exactly the discipline this module
//! exists to exercise.

use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::config::CFG_PRIO_MAX;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::List;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{
    opt, OsObjType, OsOpt, OsPendOn, OsPendStatus, OsQueuePosition, OsTaskState, OsTick,
};

/// Sentinel meaning "not locked" for [`Queue::rx_lock`]/[`Queue::tx_lock`].
const UNLOCKED: i32 = -1;

/// Opaque identity of a queue that is a member of a [queue set](QueueSetSink)
/// — the set's own queue stores these, not the members' items.
pub type QueueSetHandle = *const ();

/// A queue set: any queue of [`QueueSetHandle`] can receive fan-in
/// notifications from its member queues. Implemented for every
/// `Queue<QueueSetHandle, M>` so a member only needs a trait object, not
/// the set's concrete capacity.
pub trait QueueSetSink {
    /// Called by a member when it transitions from empty to non-empty.
    /// Writes `handle` into the set's own queue and wakes a waiter on the
    /// set, if any. Returns whether that wake outranks the currently
    /// running task.
    fn notify_member_ready(&self, handle: QueueSetHandle) -> bool;
}

impl<const M: usize> QueueSetSink for Queue<QueueSetHandle, M> {
    fn notify_member_ready(&self, handle: QueueSetHandle) -> bool {
        // Always called from inside a member's own critical section, so
        // this never races a concurrent call against the same set.
        let this = unsafe { &mut *(self as *const Self as *mut Self) };
        this.try_send_immediate(handle, OsQueuePosition::Back)
            .unwrap_or(false)
    }
}

/// Fixed-capacity, copy-semantics message queue (spec §4.4 `Queue`).
///
/// Semaphores and mutexes are conceptually this same ring with
/// `item_size == 0`; this crate keeps them as the separate, already
/// priority-inheritance-aware [`OsSem`](crate::sync::sem::OsSem)/
/// [`OsMutex`](crate::sync::mutex::OsMutex) rather than routing their hot
/// paths through a generic ring (see `DESIGN.md`).
pub struct Queue<T: Copy, const N: usize> {
    obj_type: OsObjType,
    storage: [MaybeUninit<T>; N],
    head: usize,
    count: usize,
    waiting_to_send: List<OsTcb>,
    waiting_to_receive: List<OsTcb>,
    rx_lock: i32,
    tx_lock: i32,
    queue_set: Option<NonNull<dyn QueueSetSink>>,
    #[cfg(feature = "defmt")]
    name: &'static str,
}

// SAFETY: every access goes through a critical section or is otherwise
// serialized by the kernel; `T: Copy` rules out any drop-glue hazard.
unsafe impl<T: Copy, const N: usize> Send for Queue<T, N> {}
unsafe impl<T: Copy, const N: usize> Sync for Queue<T, N> {}

impl<T: Copy, const N: usize> Queue<T, N> {
    /// Build an empty queue. `init()`/`create()` still need to run once
    /// the queue has reached its final `'static` address.
    pub const fn new() -> Self {
        Queue {
            obj_type: OsObjType::Queue,
            // SAFETY: an array of `MaybeUninit` needs no initialization.
            storage: unsafe { MaybeUninit::uninit().assume_init() },
            head: 0,
            count: 0,
            waiting_to_send: List::new(),
            waiting_to_receive: List::new(),
            rx_lock: UNLOCKED,
            tx_lock: UNLOCKED,
            queue_set: None,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize the queue, discarding any prior contents.
    pub fn create(&mut self, _name: &'static str) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        critical_section(|_cs| {
            self.obj_type = OsObjType::Queue;
            self.head = 0;
            self.count = 0;
            self.waiting_to_send.init();
            self.waiting_to_receive.init();
            self.rx_lock = UNLOCKED;
            self.tx_lock = UNLOCKED;
            self.queue_set = None;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        N
    }

    #[inline]
    pub fn messages_waiting(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn spaces_available(&self) -> usize {
        N - self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == N
    }

    #[inline]
    fn has_room(&self, position: OsQueuePosition) -> bool {
        self.count < N || matches!(position, OsQueuePosition::Overwrite)
    }

    fn copy_in(&mut self, item: T, position: OsQueuePosition) {
        match position {
            OsQueuePosition::Back => {
                let idx = (self.head + self.count) % N;
                self.storage[idx] = MaybeUninit::new(item);
                self.count += 1;
            }
            OsQueuePosition::Front => {
                self.head = (self.head + N - 1) % N;
                self.storage[self.head] = MaybeUninit::new(item);
                self.count += 1;
            }
            OsQueuePosition::Overwrite => {
                // Only legal for N == 1 (checked by callers); the slot
                // always ends up holding exactly one item regardless of
                // whether it was previously empty.
                self.head = 0;
                self.storage[0] = MaybeUninit::new(item);
                self.count = 1;
            }
        }
    }

    fn copy_out(&mut self) -> T {
        // SAFETY: `count > 0` is checked by every caller before this runs.
        let item = unsafe { self.storage[self.head].assume_init() };
        self.head = (self.head + 1) % N;
        self.count -= 1;
        item
    }

    fn copy_peek(&self) -> T {
        unsafe { self.storage[self.head].assume_init() }
    }

    /// Hand `item` to whichever has first claim on it: the attached queue
    /// set (if any) or this queue's own `waiting_to_receive` list.
    /// Returns whether the wake outranks the currently running task.
    fn notify_after_send(&mut self) -> bool {
        if let Some(set) = self.queue_set {
            let handle = self as *const Self as QueueSetHandle;
            unsafe { set.as_ref().notify_member_ready(handle) }
        } else if let Some(rx) = self.waiting_to_receive.pop_head() {
            unsafe { sched::wake_pended_task(rx) }
        } else {
            false
        }
    }

    /// Non-blocking immediate send, used by the queue-set fan-in path
    /// (already inside a critical section) and by the ISR fast path.
    fn try_send_immediate(&mut self, item: T, position: OsQueuePosition) -> OsResult<bool> {
        if !self.has_room(position) {
            return Err(OsError::QFull);
        }
        self.copy_in(item, position);
        Ok(self.notify_after_send())
    }

    fn lock(&mut self) {
        self.rx_lock = 0;
        self.tx_lock = 0;
    }

    /// Replay whatever an ISR deferred while the queue was locked, then
    /// return to the unlocked state. Must be called from task context
    /// with the scheduler still suspended.
    fn unlock(&mut self) {
        while self.tx_lock > 0 {
            self.tx_lock -= 1;
            match self.waiting_to_receive.pop_head() {
                Some(rx) => {
                    unsafe { sched::wake_pended_task(rx) };
                }
                None => break,
            }
        }
        while self.rx_lock > 0 {
            self.rx_lock -= 1;
            match self.waiting_to_send.pop_head() {
                Some(tx) => {
                    unsafe { sched::wake_pended_task(tx) };
                }
                None => break,
            }
        }
        self.rx_lock = UNLOCKED;
        self.tx_lock = UNLOCKED;
    }

    fn block_on_send(&mut self, timeout: OsTick) -> OsResult<NonNull<OsTcb>> {
        let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
        let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };
        unsafe { sched::os_rdy_list_remove(cur_tcb_ptr) };
        cur_tcb.pend_on = OsPendOn::Queue;
        cur_tcb.pend_status = OsPendStatus::Ok;
        cur_tcb.pend_obj_ptr = self as *const Self as *const ();
        cur_tcb.tick_remain = timeout;
        unsafe { sched::place_on_event_list(&mut self.waiting_to_send, cur_tcb_ptr) };
        if timeout > 0 {
            cur_tcb.task_state = OsTaskState::PendTimeout;
            let wake_tick = unsafe { kernel::KERNEL.tick_get_unchecked().wrapping_add(timeout) };
            unsafe { kernel::delayed_insert(cur_tcb_ptr, wake_tick) };
        } else {
            cur_tcb.task_state = OsTaskState::Pend;
        }
        Ok(cur_tcb_ptr)
    }

    fn block_on_receive(&mut self, timeout: OsTick) -> OsResult<NonNull<OsTcb>> {
        let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
        let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };
        unsafe { sched::os_rdy_list_remove(cur_tcb_ptr) };
        cur_tcb.pend_on = OsPendOn::Queue;
        cur_tcb.pend_status = OsPendStatus::Ok;
        cur_tcb.pend_obj_ptr = self as *const Self as *const ();
        cur_tcb.tick_remain = timeout;
        unsafe { sched::place_on_event_list(&mut self.waiting_to_receive, cur_tcb_ptr) };
        if timeout > 0 {
            cur_tcb.task_state = OsTaskState::PendTimeout;
            let wake_tick = unsafe { kernel::KERNEL.tick_get_unchecked().wrapping_add(timeout) };
            unsafe { kernel::delayed_insert(cur_tcb_ptr, wake_tick) };
        } else {
            cur_tcb.task_state = OsTaskState::Pend;
        }
        Ok(cur_tcb_ptr)
    }

    fn pend_result(cur_tcb_ptr: NonNull<OsTcb>) -> OsResult<()> {
        match unsafe { cur_tcb_ptr.as_ref().pend_status } {
            OsPendStatus::Ok => Ok(()),
            OsPendStatus::Timeout => Err(OsError::Timeout),
            OsPendStatus::Abort => Err(OsError::PendAbort),
            OsPendStatus::Del => Err(OsError::ObjDel),
        }
    }

    /// Send `item` into the queue (spec §4.4 `send`).
    ///
    /// `timeout == 0` waits forever once blocking is required;
    /// `pend_opt & opt::PEND_NON_BLOCKING` requests an immediate
    /// `QFull` instead of blocking at all. `position` selects back,
    /// front, or (capacity-1 queues only) overwrite insertion.
    pub fn send(
        &mut self,
        item: T,
        timeout: OsTick,
        pend_opt: OsOpt,
        position: OsQueuePosition,
    ) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }
        if self.obj_type != OsObjType::Queue {
            return Err(OsError::ObjType);
        }
        if matches!(position, OsQueuePosition::Overwrite) && N != 1 {
            return Err(OsError::OptInvalid);
        }

        loop {
            let done = critical_section(|_cs| {
                if !self.has_room(position) {
                    return None;
                }
                self.copy_in(item, position);
                Some(self.notify_after_send())
            });

            if let Some(woken) = done {
                if woken {
                    sched::os_sched();
                }
                return Ok(());
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::QFull);
            }

            kernel::suspend_all()?;
            critical_section(|_cs| self.lock());

            // Re-check under the lock: an ISR send/receive between the
            // failed check above and `lock()` above doesn't touch the
            // wait lists while locked, but it can still free room via
            // `copy_in`/`copy_out` before the lock counters start being
            // the only record of ISR activity. Without this re-check
            // that freed room is lost and we'd block needlessly
            // (examples/original_source/queue.c's `xQueueGenericSend`
            // re-checks `prvIsQueueFull` the same way after its own
            // `vTaskSuspendAll`/`prvLockQueue`).
            if critical_section(|_cs| self.has_room(position)) {
                critical_section(|_cs| self.unlock());
                kernel::resume_all()?;
                continue;
            }

            let cur_tcb_ptr = critical_section(|_cs| self.block_on_send(timeout))?;

            critical_section(|_cs| self.unlock());
            kernel::resume_all()?;

            sched::os_sched();

            match Self::pend_result(cur_tcb_ptr) {
                Ok(()) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Receive an item, removing it from the queue (spec §4.4 `receive`).
    pub fn receive(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<T> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }
        if self.obj_type != OsObjType::Queue {
            return Err(OsError::ObjType);
        }

        loop {
            let done = critical_section(|_cs| {
                if self.count == 0 {
                    return None;
                }
                let item = self.copy_out();
                let woken = match self.waiting_to_send.pop_head() {
                    Some(tx) => unsafe { sched::wake_pended_task(tx) },
                    None => false,
                };
                Some((item, woken))
            });

            if let Some((item, woken)) = done {
                if woken {
                    sched::os_sched();
                }
                return Ok(item);
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::QEmpty);
            }

            kernel::suspend_all()?;
            critical_section(|_cs| self.lock());

            // Re-check under the lock: an ISR send can have delivered an
            // item between the empty check above and `lock()`, before
            // the lock counters started being the only record of ISR
            // activity (mirrors `xQueueGenericReceive`'s re-check of
            // `prvIsQueueEmpty` in examples/original_source/queue.c).
            if critical_section(|_cs| self.count > 0) {
                critical_section(|_cs| self.unlock());
                kernel::resume_all()?;
                continue;
            }

            let cur_tcb_ptr = critical_section(|_cs| self.block_on_receive(timeout))?;

            critical_section(|_cs| self.unlock());
            kernel::resume_all()?;

            sched::os_sched();

            match Self::pend_result(cur_tcb_ptr) {
                Ok(()) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read the head item without removing it (spec §4.4 `peek`). Blocks
    /// exactly like `receive` while empty, but leaves the queue unchanged
    /// on success.
    pub fn peek(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<T> {
        loop {
            let item = critical_section(|_cs| (self.count > 0).then(|| self.copy_peek()));
            if let Some(item) = item {
                return Ok(item);
            }

            if is_isr_context() {
                return Err(OsError::PendIsr);
            }
            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::QEmpty);
            }

            kernel::suspend_all()?;
            critical_section(|_cs| self.lock());

            // Re-check under the lock, same race as `receive()`.
            if critical_section(|_cs| self.count > 0) {
                critical_section(|_cs| self.unlock());
                kernel::resume_all()?;
                continue;
            }

            let cur_tcb_ptr = critical_section(|_cs| self.block_on_receive(timeout))?;
            critical_section(|_cs| self.unlock());
            kernel::resume_all()?;

            sched::os_sched();
            Self::pend_result(cur_tcb_ptr)?;
        }
    }

    /// ISR-side send. Never blocks; if the queue is locked (a task is
    /// mid-way through setting up a block on this queue), the wake is
    /// deferred and counted in `tx_lock` instead of touching
    /// `waiting_to_receive` directly.
    pub fn send_from_isr(
        &mut self,
        item: T,
        position: OsQueuePosition,
    ) -> OsResult<bool> {
        if matches!(position, OsQueuePosition::Overwrite) && N != 1 {
            return Err(OsError::OptInvalid);
        }

        critical_section(|_cs| {
            if !self.has_room(position) {
                return Err(OsError::QFull);
            }
            self.copy_in(item, position);

            if let Some(set) = self.queue_set {
                let handle = self as *const Self as QueueSetHandle;
                return Ok(unsafe { set.as_ref().notify_member_ready(handle) });
            }

            if self.rx_lock >= 0 {
                self.tx_lock = (self.tx_lock + 1).min(task_count_cap());
                return Ok(false);
            }

            match self.waiting_to_receive.pop_head() {
                Some(rx) => Ok(unsafe { sched::wake_pended_task_from_isr(rx) }),
                None => Ok(false),
            }
        })
    }

    /// ISR-side receive. Never blocks; returns `Err(QEmpty)` if nothing is
    /// available.
    pub fn receive_from_isr(&mut self) -> OsResult<(T, bool)> {
        critical_section(|_cs| {
            if self.count == 0 {
                return Err(OsError::QEmpty);
            }
            let item = self.copy_out();

            if self.tx_lock >= 0 {
                self.rx_lock = (self.rx_lock + 1).min(task_count_cap());
                return Ok((item, false));
            }

            let woken = match self.waiting_to_send.pop_head() {
                Some(tx) => unsafe { sched::wake_pended_task_from_isr(tx) },
                None => false,
            };
            Ok((item, woken))
        })
    }

    /// Drop all buffered items and wake every waiter with
    /// [`OsError::ObjDel`]-free `Ok` semantics is not attempted here —
    /// `reset` simply requires the queue be uncontended (spec §4.4
    /// `reset`).
    pub fn reset(&mut self) -> OsResult<()> {
        critical_section(|_cs| {
            if !self.waiting_to_send.is_empty() || !self.waiting_to_receive.is_empty() {
                return Err(OsError::StateInvalid);
            }
            self.head = 0;
            self.count = 0;
            Ok(())
        })
    }

    /// Attach this queue to a queue set (spec §4.4 queue sets). The queue
    /// must be empty and not already a member of another set.
    pub fn add_to_set(&mut self, set: &'static dyn QueueSetSink) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }
        critical_section(|_cs| {
            if self.queue_set.is_some() {
                return Err(OsError::AlreadyInSet);
            }
            if self.count != 0 {
                return Err(OsError::QNotEmptyForSet);
            }
            self.queue_set = Some(NonNull::from(set));
            Ok(())
        })
    }

    /// Detach this queue from whichever set it belongs to. The queue must
    /// be empty.
    pub fn remove_from_set(&mut self) -> OsResult<()> {
        critical_section(|_cs| {
            if self.queue_set.is_none() {
                return Err(OsError::NotInSet);
            }
            if self.count != 0 {
                return Err(OsError::QNotEmptyForSet);
            }
            self.queue_set = None;
            Ok(())
        })
    }
}

impl<T: Copy, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Upper bound used to saturate `rx_lock`/`tx_lock`: an ISR storm can
/// never usefully count past the number of priority levels, since at
/// most one task per priority can ever be blocked on a given direction
/// of a single queue's wait list at a time in the degenerate worst case
/// of one task per priority all pending here.
#[inline]
fn task_count_cap() -> i32 {
    CFG_PRIO_MAX as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_back_insertion() {
        let mut q: Queue<u8, 4> = Queue::new();
        q.waiting_to_send.init();
        q.waiting_to_receive.init();
        for v in 0..4u8 {
            q.copy_in(v, OsQueuePosition::Back);
        }
        assert!(q.is_full());
        assert_eq!(q.copy_out(), 0);
        q.copy_in(4, OsQueuePosition::Back);
        assert_eq!(q.copy_out(), 1);
        assert_eq!(q.copy_out(), 2);
        assert_eq!(q.copy_out(), 3);
        assert_eq!(q.copy_out(), 4);
        assert!(q.is_empty());
    }

    #[test]
    fn front_insertion_is_lifo_at_head() {
        let mut q: Queue<u8, 4> = Queue::new();
        q.waiting_to_send.init();
        q.waiting_to_receive.init();
        q.copy_in(1, OsQueuePosition::Back);
        q.copy_in(2, OsQueuePosition::Back);
        q.copy_in(9, OsQueuePosition::Front);
        assert_eq!(q.copy_out(), 9);
        assert_eq!(q.copy_out(), 1);
        assert_eq!(q.copy_out(), 2);
    }

    #[test]
    fn overwrite_keeps_single_slot_at_count_one() {
        let mut q: Queue<u32, 1> = Queue::new();
        q.waiting_to_send.init();
        q.waiting_to_receive.init();
        q.copy_in(1, OsQueuePosition::Overwrite);
        assert_eq!(q.messages_waiting(), 1);
        q.copy_in(2, OsQueuePosition::Overwrite);
        assert_eq!(q.messages_waiting(), 1);
        assert_eq!(q.copy_out(), 2);
    }

    #[test]
    fn lock_counters_default_unlocked_and_saturate() {
        let mut q: Queue<u8, 4> = Queue::new();
        assert_eq!(q.rx_lock, UNLOCKED);
        assert_eq!(q.tx_lock, UNLOCKED);
        q.lock();
        assert_eq!(q.rx_lock, 0);
        q.tx_lock = task_count_cap();
        let before = q.tx_lock;
        q.tx_lock = (q.tx_lock + 1).min(task_count_cap());
        assert_eq!(q.tx_lock, before);
    }

    #[test]
    fn reset_clears_buffered_items_when_uncontended() {
        let mut q: Queue<u8, 2> = Queue::new();
        q.waiting_to_send.init();
        q.waiting_to_receive.init();
        q.copy_in(7, OsQueuePosition::Back);
        assert!(q.reset().is_ok());
        assert!(q.is_empty());
    }

    #[test]
    fn add_to_set_requires_empty_and_single_membership() {
        static SET: Queue<QueueSetHandle, 4> = Queue::new();
        let mut member: Queue<u8, 2> = Queue::new();
        member.waiting_to_send.init();
        member.waiting_to_receive.init();
        assert!(member.add_to_set(&SET).is_ok());
        assert_eq!(member.add_to_set(&SET).unwrap_err(), OsError::AlreadyInSet);
        assert!(member.remove_from_set().is_ok());
        assert!(member.queue_set.is_none());
    }
}
