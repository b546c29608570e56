//! Mutex implementation with priority inheritance
//!
//! Mutexes provide mutual exclusion with automatic priority boosting
//! to prevent priority inversion. The wait list is the same generic
//! intrusive [`List`](crate::list::List) semaphores and queues share,
//! ordered by effective priority so the head is always the
//! highest-priority waiter — exactly who priority inheritance needs to
//! track.

use core::ptr::NonNull;

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::List;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{
    opt, OsNestingCtr, OsObjType, OsOpt, OsPendOn, OsPendStatus, OsPrio, OsTaskState, OsTick,
};

/// Mutex with priority inheritance
pub struct OsMutex {
    /// Object type marker
    obj_type: OsObjType,
    /// Tasks waiting on this mutex, ordered by effective priority
    pend_list: List<OsTcb>,
    /// Task that owns the mutex
    owner: Option<NonNull<OsTcb>>,
    /// Nesting counter
    nesting_ctr: OsNestingCtr,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsMutex {
    /// Create a new mutex
    pub const fn new() -> Self {
        OsMutex {
            obj_type: OsObjType::Mutex,
            pend_list: List::new(),
            owner: None,
            nesting_ctr: 0,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize the mutex
    pub fn create(&mut self, _name: &'static str) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        critical_section(|_cs| {
            self.obj_type = OsObjType::Mutex;
            self.pend_list.init();
            self.owner = None;
            self.nesting_ctr = 0;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Acquire the mutex
    ///
    /// If the mutex is owned by a lower-priority task, the owner's priority
    /// is temporarily boosted to prevent priority inversion. Re-acquiring
    /// a mutex already held by the calling task simply nests, matching
    /// this crate's support for recursive mutexes (spec §6
    /// `USE_RECURSIVE_MUTEXES`).
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait
    /// * `pend_opt` - Pend options
    pub fn pend(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_type != OsObjType::Mutex {
            return Err(OsError::ObjType);
        }

        let blocked = critical_section(|_cs| -> OsResult<bool> {
            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;

            if self.owner.is_none() {
                self.owner = Some(cur_tcb_ptr);
                self.nesting_ctr = 1;
                unsafe { (*cur_tcb_ptr.as_ptr()).mutexes_held += 1 };
                return Ok(false);
            }

            // Check if current task already owns it
            if self.owner == Some(cur_tcb_ptr) {
                if self.nesting_ctr == OsNestingCtr::MAX {
                    return Err(OsError::MutexOvf);
                }
                self.nesting_ctr += 1;
                return Ok(false);
            }

            // Mutex is owned by another task
            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::PendWouldBlock);
            }

            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            // Priority inheritance
            let cur_tcb = unsafe { cur_tcb_ptr.as_ref() };
            let cur_prio = cur_tcb.prio;

            if let Some(owner_ptr) = self.owner {
                let owner = unsafe { &mut *owner_ptr.as_ptr() };
                if cur_prio > owner.prio {
                    if owner.task_state == OsTaskState::Ready {
                        unsafe { sched::os_rdy_list_change_prio(owner_ptr, cur_prio) };
                    } else {
                        owner.prio = cur_prio;
                    }
                }
            }

            // Block current task
            let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };

            unsafe { sched::os_rdy_list_remove(cur_tcb_ptr) };

            cur_tcb.pend_on = OsPendOn::Mutex;
            cur_tcb.pend_status = OsPendStatus::Ok;
            cur_tcb.pend_obj_ptr = self as *const _ as *const ();
            cur_tcb.tick_remain = timeout;

            unsafe { sched::place_on_event_list(&mut self.pend_list, cur_tcb_ptr) };

            if timeout > 0 {
                cur_tcb.task_state = OsTaskState::PendTimeout;
                let wake_tick =
                    unsafe { kernel::KERNEL.tick_get_unchecked().wrapping_add(timeout) };
                unsafe { kernel::delayed_insert(cur_tcb_ptr, wake_tick) };
            } else {
                cur_tcb.task_state = OsTaskState::Pend;
            }

            Ok(true)
        })?;

        if !blocked {
            return Ok(());
        }

        sched::os_sched();

        critical_section(|_cs| {
            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            let cur_tcb = unsafe { cur_tcb_ptr.as_ref() };

            match cur_tcb.pend_status {
                OsPendStatus::Ok => {
                    unsafe { (*cur_tcb_ptr.as_ptr()).mutexes_held += 1 };
                    Ok(())
                }
                OsPendStatus::Timeout => {
                    self.disinherit_to_remaining_waiters();
                    Err(OsError::Timeout)
                }
                OsPendStatus::Abort => Err(OsError::PendAbort),
                OsPendStatus::Del => Err(OsError::ObjDel),
            }
        })
    }

    /// Release the mutex
    ///
    /// If the current task's priority was boosted due to priority inheritance,
    /// it is restored to its base priority once it is no longer holding any
    /// mutex.
    pub fn post(&mut self, post_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::AcceptIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_type != OsObjType::Mutex {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;

            if self.owner != Some(cur_tcb_ptr) {
                return Err(OsError::MutexNotOwner);
            }

            if self.nesting_ctr > 1 {
                self.nesting_ctr -= 1;
                return Ok(());
            }

            // Unlock completely
            self.nesting_ctr = 0;

            let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };
            cur_tcb.mutexes_held = cur_tcb.mutexes_held.saturating_sub(1);

            // Restore owner's priority if no other held mutex still needs
            // the boost and it was actually boosted.
            if cur_tcb.mutexes_held == 0 && cur_tcb.prio != cur_tcb.base_prio {
                if cur_tcb.task_state == OsTaskState::Ready {
                    unsafe { sched::os_rdy_list_change_prio(cur_tcb_ptr, cur_tcb.base_prio) };
                } else {
                    cur_tcb.prio = cur_tcb.base_prio;
                }
            }

            if let Some(waiter_ptr) = self.pend_list.pop_head() {
                let waiter = unsafe { &mut *waiter_ptr.as_ptr() };

                waiter.pend_on = OsPendOn::Nothing;
                waiter.pend_status = OsPendStatus::Ok;
                waiter.pend_obj_ptr = core::ptr::null();
                waiter.tick_remain = 0;
                waiter.state_item.unlink();

                match waiter.task_state {
                    OsTaskState::PendSuspended | OsTaskState::PendTimeoutSuspended => {
                        waiter.task_state = OsTaskState::Suspended;
                        self.owner = Some(waiter_ptr);
                        self.nesting_ctr = 1;
                        waiter.mutexes_held += 1;
                    }
                    _ => {
                        waiter.task_state = OsTaskState::Ready;
                        self.owner = Some(waiter_ptr);
                        self.nesting_ctr = 1;
                        waiter.mutexes_held += 1;
                        unsafe { sched::os_rdy_list_insert(waiter_ptr) };

                        if post_opt & opt::POST_NO_SCHED == 0 {
                            sched::os_sched();
                        }
                    }
                }
            } else {
                self.owner = None;
            }

            Ok(())
        })
    }

    /// Re-evaluate the current owner's inherited priority after a waiter
    /// has given up (timed out) without acquiring the mutex: the owner
    /// only needs to stay boosted as high as the highest *remaining*
    /// waiter, not unconditionally drop to base or stay at the old
    /// boosted level.
    fn disinherit_to_remaining_waiters(&mut self) {
        if let Some(owner_ptr) = self.owner {
            let owner = unsafe { &mut *owner_ptr.as_ptr() };
            if owner.prio == owner.base_prio {
                return;
            }

            let floor = self
                .pend_list
                .head()
                .map(|w| unsafe { w.as_ref().prio })
                .unwrap_or(0);
            let new_prio = owner.base_prio.max(floor);

            if new_prio != owner.prio {
                if owner.task_state == OsTaskState::Ready {
                    unsafe { sched::os_rdy_list_change_prio(owner_ptr, new_prio) };
                } else {
                    owner.prio = new_prio;
                }
            }
        }
    }

    /// Check if mutex is owned
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    /// Get owner's priority
    pub fn owner_prio(&self) -> Option<OsPrio> {
        self.owner.map(|ptr| unsafe { ptr.as_ref().prio })
    }
}

impl Default for OsMutex {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;
pub struct Mutex {
    inner: UnsafeCell<OsMutex>,
}

unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            inner: UnsafeCell::new(OsMutex::new()),
        }
    }

    pub fn create(&self, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(name) }
    }

    pub fn lock(&self, timeout: OsTick, opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).pend(timeout, opt) }
    }

    pub fn unlock(&self, opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).post(opt) }
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        unsafe { (*self.inner.get()).is_owned() }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
