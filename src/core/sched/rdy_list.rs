//! Ready list - tasks ready to run at a single priority level
//!
//! Thin wrapper around the generic [`List`](crate::list::List) over each
//! TCB's `state_item` link. Tasks are inserted at the tail for FIFO order
//! and scheduled from the head; round-robin rotation is the same
//! remove-then-reinsert dance the original implementation used, now
//! expressed over the shared list.

use core::ptr::NonNull;

use crate::list::List;
use crate::task::OsTcb;

/// Ready list for a single priority level.
#[derive(Clone, Copy)]
pub struct ReadyList {
    list: List<OsTcb>,
}

impl ReadyList {
    /// Create a new empty ready list
    pub const fn new() -> Self {
        ReadyList { list: List::new() }
    }

    /// Initialize/reset the ready list
    pub fn init(&mut self) {
        self.list.init();
    }

    /// Get head of list (first to be scheduled)
    #[inline]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.list.head()
    }

    /// Check if list is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Number of tasks ready at this priority.
    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Insert TCB at the tail of the list (FIFO order)
    ///
    /// # Safety
    /// Caller must ensure tcb is valid and not already in any state list.
    pub fn insert_tail(&mut self, mut tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { tcb.as_mut() };
        tcb_ref.state_item.set_owner(tcb);
        let item = NonNull::from(&mut tcb_ref.state_item);
        unsafe { self.list.append(item) };
    }

    /// Remove a TCB from the list
    ///
    /// # Safety
    /// Caller must ensure tcb is in this list.
    pub fn remove(&mut self, mut tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { tcb.as_mut() };
        let item = NonNull::from(&mut tcb_ref.state_item);
        self.list.remove(item);
    }
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for ReadyList {}
unsafe impl Sync for ReadyList {}
