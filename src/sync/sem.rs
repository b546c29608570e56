//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting.
//!
//! The wait list is the generic intrusive [`List`](crate::list::List) over
//! each waiter's `event_item`, ordered by effective priority via
//! [`sched::place_on_event_list`] — the same structure queues and mutexes
//! share, replacing what used to be a semaphore-private linked list.

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::list::List;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{opt, OsObjType, OsOpt, OsPendOn, OsPendStatus, OsSemCtr, OsTaskState, OsTick};

/// Counting semaphore
pub struct OsSem {
    /// Object type marker
    obj_type: OsObjType,
    /// Tasks waiting on this semaphore, ordered by effective priority
    pend_list: List<OsTcb>,
    /// Current count
    count: OsSemCtr,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsSem {
    /// Create a new semaphore
    ///
    /// # Arguments
    /// * `count` - Initial count value
    pub const fn new(count: OsSemCtr) -> Self {
        OsSem {
            obj_type: OsObjType::Sem,
            pend_list: List::new(),
            count,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize/create the semaphore
    pub fn create(&mut self, count: OsSemCtr, _name: &'static str) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        critical_section(|_cs| {
            self.obj_type = OsObjType::Sem;
            self.pend_list.init();
            self.count = count;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Wait on (pend) the semaphore
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait (0 = forever)
    /// * `pend_opt` - Pend options
    ///
    /// # Returns
    /// * `Ok(count)` - Semaphore acquired, returns current count
    /// * `Err(OsError::Timeout)` - Timeout expired
    /// * `Err(OsError::PendWouldBlock)` - Non-blocking and not available
    pub fn pend(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsSemCtr> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_type != OsObjType::Sem {
            return Err(OsError::ObjType);
        }

        let blocked = critical_section(|_cs| -> OsResult<bool> {
            if self.count > 0 {
                self.count -= 1;
                return Ok(false);
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::PendWouldBlock);
            }

            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };

            unsafe { sched::os_rdy_list_remove(cur_tcb_ptr) };

            cur_tcb.pend_on = OsPendOn::Semaphore;
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
            return Ok(self.count);
        }

        sched::os_sched();

        unsafe {
            let cur_tcb_ptr = kernel::tcb_cur_ptr().ok_or(OsError::TcbInvalid)?;
            let cur_tcb = cur_tcb_ptr.as_ref();

            match cur_tcb.pend_status {
                OsPendStatus::Ok => Ok(self.count),
                OsPendStatus::Timeout => Err(OsError::Timeout),
                OsPendStatus::Abort => Err(OsError::PendAbort),
                OsPendStatus::Del => Err(OsError::ObjDel),
            }
        }
    }

    /// Signal (post) the semaphore
    ///
    /// # Arguments
    /// * `post_opt` - Post options
    ///
    /// # Returns
    /// * `Ok(count)` - New count after post
    /// * `Err(OsError::SemOvf)` - Counter overflow
    pub fn post(&mut self, post_opt: OsOpt) -> OsResult<OsSemCtr> {
        if self.obj_type != OsObjType::Sem {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            if let Some(tcb_ptr) = self.pend_list.pop_head() {
                let tcb = unsafe { &mut *tcb_ptr.as_ptr() };

                tcb.pend_on = OsPendOn::Nothing;
                tcb.pend_status = OsPendStatus::Ok;
                tcb.pend_obj_ptr = core::ptr::null();
                tcb.tick_remain = 0;
                // A timed-out-pending-but-not-yet-expired task is still
                // linked on a delayed list too; drop it from there so it
                // doesn't also "time out" a second time later.
                tcb.state_item.unlink();

                match tcb.task_state {
                    OsTaskState::PendSuspended | OsTaskState::PendTimeoutSuspended => {
                        tcb.task_state = OsTaskState::Suspended;
                    }
                    _ => {
                        tcb.task_state = OsTaskState::Ready;
                        unsafe { sched::os_rdy_list_insert(tcb_ptr) };
                    }
                }

                if post_opt & opt::POST_NO_SCHED == 0 && !is_isr_context() {
                    sched::os_sched();
                }

                Ok(self.count)
            } else {
                if self.count == OsSemCtr::MAX {
                    return Err(OsError::SemOvf);
                }
                self.count += 1;
                Ok(self.count)
            }
        })
    }

    /// Get current semaphore count
    #[inline(always)]
    pub fn count(&self) -> OsSemCtr {
        self.count
    }

    /// Set semaphore count
    pub fn set(&mut self, count: OsSemCtr) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::AcceptIsr);
        }

        critical_section(|_cs| {
            self.count = count;
            Ok(())
        })
    }
}

impl Default for OsSem {
    fn default() -> Self {
        Self::new(0)
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

pub struct Semaphore {
    inner: UnsafeCell<OsSem>,
}

unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    pub const fn new(count: OsSemCtr) -> Self {
        Semaphore {
            inner: UnsafeCell::new(OsSem::new(count)),
        }
    }

    pub fn create(&self, count: OsSemCtr, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(count, name) }
    }

    pub fn wait(&self, timeout: OsTick, opt: OsOpt) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).pend(timeout, opt) }
    }

    pub fn signal(&self, opt: OsOpt) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).post(opt) }
    }

    #[inline]
    pub fn count(&self) -> OsSemCtr {
        unsafe { (*self.inner.get()).count() }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
