//! Global kernel state and initialization
//!
//! This module manages the global OS state including initialization,
//! starting the scheduler, and tracking kernel status.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::config::CFG_PRIO_MAX;
use crate::core::cs_cell::CsCell;
use crate::critical::{critical_section, CriticalSection};
use crate::error::{OsError, OsResult};
use crate::list::List;
use crate::prio::PrioTable;
use crate::sched::ReadyList;
use crate::task::OsTcb;
use crate::types::{OsNestingCtr, OsOverflowCtr, OsPrio, OsTick};

// ============ Kernel State Structures ============

/// Atomic kernel flags — these are read from ISR/hot paths without a
/// full critical section, so they stay plain atomics rather than living
/// behind `SCHED`'s `CsCell`.
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    int_nesting: AtomicU8,
    sched_lock_nesting: AtomicU8,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            int_nesting: AtomicU8::new(0),
            sched_lock_nesting: AtomicU8::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.int_nesting.store(0, Ordering::SeqCst);
        self.sched_lock_nesting.store(0, Ordering::SeqCst);
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if OS is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Get current tick count
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        critical_section(|cs| SCHED.get(cs).tick_count)
    }

    /// Get current tick count without entering a new critical section.
    ///
    /// # Safety
    /// Caller must already hold the critical section (directly or via
    /// `CriticalSection::enter()`/`critical_section()`); calling this
    /// outside one races the tick handler.
    #[inline(always)]
    pub(crate) unsafe fn tick_get_unchecked(&self) -> OsTick {
        unsafe { SCHED.get_unchecked().tick_count }
    }

    /// Get interrupt nesting level
    #[inline(always)]
    pub fn int_nesting(&self) -> OsNestingCtr {
        self.int_nesting.load(Ordering::Relaxed)
    }

    /// Get scheduler lock nesting level
    #[inline(always)]
    pub fn sched_lock_nesting(&self) -> OsNestingCtr {
        self.sched_lock_nesting.load(Ordering::SeqCst)
    }

    /// Increment and return tick count, tracking wraparound.
    #[inline(always)]
    pub(crate) fn tick_increment(&self) -> OsTick {
        critical_section(|cs| {
            let sched = SCHED.get(cs);
            let (next, wrapped) = sched.tick_count.overflowing_add(1);
            sched.tick_count = next;
            if wrapped {
                sched.overflow_count = sched.overflow_count.wrapping_add(1);
                sched.swap_delayed_lists();
            }
            next
        })
    }

    /// Enter ISR
    #[inline(always)]
    pub(crate) fn int_enter(&self) {
        if self.is_running() {
            let nesting = self.int_nesting.fetch_add(1, Ordering::Relaxed);
            if nesting == 254 {
                self.int_nesting.store(254, Ordering::Relaxed);
            }
        }
    }

    /// Set initialized flag
    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    /// Set running flag
    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }

    /// Decrement int nesting
    #[inline(always)]
    pub(crate) fn int_nesting_dec(&self) -> OsNestingCtr {
        let nesting = self.int_nesting.load(Ordering::Relaxed);
        if nesting > 0 {
            self.int_nesting.store(nesting - 1, Ordering::Relaxed);
        }
        nesting.saturating_sub(1)
    }

    /// Lock scheduler (generalized as `suspend_all` in the public API)
    pub(crate) fn try_sched_lock(&self) -> OsResult<()> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        if nesting == 255 {
            return Err(OsError::LockNestingOvf);
        }
        self.sched_lock_nesting.store(nesting + 1, Ordering::SeqCst);
        Ok(())
    }

    /// Unlock scheduler (generalized as `resume_all` in the public API)
    pub(crate) fn try_sched_unlock(&self) -> OsResult<OsNestingCtr> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        if nesting == 0 {
            return Err(OsError::SchedNotLocked);
        }
        self.sched_lock_nesting.store(nesting - 1, Ordering::SeqCst);
        Ok(nesting - 1)
    }
}

// ============ Global Instances ============

/// Global kernel state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

/// Scheduler state
pub struct SchedState {
    pub(crate) prio_tbl: PrioTable,
    pub(crate) rdy_list: [ReadyList; CFG_PRIO_MAX],
    /// Tasks delayed until a tick value that hasn't wrapped relative to
    /// `tick_count` yet, ordered ascending by wake tick.
    pub(crate) delayed_current: List<OsTcb>,
    /// Tasks delayed until a tick value beyond the next wraparound of the
    /// tick counter. Swapped with `delayed_current` every time
    /// `tick_count` overflows, so a task parked across the wraparound is
    /// never scheduled early or lost.
    pub(crate) delayed_overflow: List<OsTcb>,
    /// Tasks an ISR made ready while the scheduler held the lock; drained
    /// into their ready lists the moment the lock count returns to zero.
    pub(crate) pending_ready: List<OsTcb>,
    /// Deleted tasks awaiting reclamation by the idle task (spec §3
    /// `Deleted` state) — a task can't tear down its own stack while
    /// still running on it.
    pub(crate) terminating: List<OsTcb>,
    /// Free-running tick counter. Width follows `OsTick` so wraparound
    /// happens at the boundary the `delayed_overflow` split actually
    /// needs to track.
    pub(crate) tick_count: OsTick,
    /// Number of times `tick_count` has wrapped back to zero.
    pub(crate) overflow_count: OsOverflowCtr,
    /// Cached wake tick of `delayed_current`'s head, so the tick handler
    /// can skip walking the list when nothing is due yet.
    pub(crate) next_unblock_time: OsTick,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            prio_tbl: PrioTable::new(),
            rdy_list: [ReadyList::new(); CFG_PRIO_MAX],
            delayed_current: List::new(),
            delayed_overflow: List::new(),
            pending_ready: List::new(),
            terminating: List::new(),
            tick_count: 0,
            overflow_count: 0,
            next_unblock_time: OsTick::MAX,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.prio_tbl = PrioTable::new();
        self.rdy_list = [ReadyList::new(); CFG_PRIO_MAX];
        self.delayed_current.init();
        self.delayed_overflow.init();
        self.pending_ready.init();
        self.terminating.init();
        self.tick_count = 0;
        self.overflow_count = 0;
        self.next_unblock_time = OsTick::MAX;
    }

    /// Get mutable reference to priority table
    #[inline(always)]
    pub fn prio_table(&mut self) -> &mut PrioTable {
        &mut self.prio_tbl
    }

    /// Get reference to ready list
    #[inline(always)]
    pub fn rdy_list(&mut self, prio: OsPrio) -> &mut ReadyList {
        &mut self.rdy_list[prio as usize]
    }

    /// Swap the current/overflow delayed lists on tick-counter
    /// wraparound: entries previously parked "beyond the wrap" are now
    /// within range, and anything still on the old current list (there
    /// shouldn't be any left — every entry should have woken by the time
    /// the counter wraps) rolls over to become the new overflow list.
    fn swap_delayed_lists(&mut self) {
        core::mem::swap(&mut self.delayed_current, &mut self.delayed_overflow);
        self.next_unblock_time = self
            .delayed_current
            .head_value()
            .unwrap_or(OsTick::MAX);
    }

    /// Park `tcb` on the appropriate delayed list for `wake_tick`.
    ///
    /// # Safety
    /// `tcb` must not already be linked on a state list.
    pub unsafe fn delayed_insert(&mut self, mut tcb: NonNull<OsTcb>, wake_tick: OsTick) {
        let tcb_ref = unsafe { tcb.as_mut() };
        tcb_ref.state_item.set_owner(tcb);
        tcb_ref.state_item.set_value(wake_tick);
        let item = NonNull::from(&mut tcb_ref.state_item);

        if wake_tick < self.tick_count {
            unsafe { self.delayed_overflow.insert_ordered(item) };
        } else {
            unsafe { self.delayed_current.insert_ordered(item) };
            if wake_tick < self.next_unblock_time {
                self.next_unblock_time = wake_tick;
            }
        }
    }

    /// Drain every delayed task whose wake tick is now due (`<=
    /// tick_count`) from `delayed_current`, returning their pointers so
    /// the caller can transition each back to ready/timeout.
    pub fn drain_due(&mut self, out: &mut [Option<NonNull<OsTcb>>]) -> usize {
        let mut n = 0;
        while n < out.len() {
            match self.delayed_current.head_value() {
                Some(v) if v <= self.tick_count => {
                    out[n] = self.delayed_current.pop_head();
                    n += 1;
                }
                _ => break,
            }
        }
        self.next_unblock_time = self
            .delayed_current
            .head_value()
            .unwrap_or(OsTick::MAX);
        n
    }
}

/// Global scheduler state instance
pub(crate) static SCHED: CsCell<SchedState> = CsCell::new(SchedState::new());

/// IDLE task TCB
static mut IDLE_TCB: OsTcb = OsTcb::new();

/// IDLE task stack
static mut IDLE_STK: [crate::types::OsStkElement; crate::config::CFG_MINIMAL_STACK_SIZE] =
    [0; crate::config::CFG_MINIMAL_STACK_SIZE];

// ============ CPU/Context Switch State ============

/// CPU context switch state
#[repr(C)]
pub struct CpuState {
    /// Current running task's TCB pointer
    pub tcb_cur: *mut OsTcb,
    /// Highest priority ready task's TCB pointer
    pub tcb_high_rdy: *mut OsTcb,
    /// Current running task's priority
    pub prio_cur: OsPrio,
    /// Highest ready priority
    pub prio_high_rdy: OsPrio,
    /// Exception stack base
    pub except_stk_base: u32,
}

impl CpuState {
    pub const fn new() -> Self {
        Self {
            tcb_cur: core::ptr::null_mut(),
            tcb_high_rdy: core::ptr::null_mut(),
            prio_cur: 0,
            prio_high_rdy: 0,
            except_stk_base: 0,
        }
    }

    pub fn reset(&mut self) {
        self.tcb_cur = core::ptr::null_mut();
        self.tcb_high_rdy = core::ptr::null_mut();
        self.prio_cur = 0;
        self.prio_high_rdy = 0;
    }

    // ============ TCB Accessor Methods ============

    /// Get current TCB pointer
    #[inline(always)]
    pub unsafe fn tcb_cur_ptr(&self) -> Option<NonNull<OsTcb>> {
        NonNull::new(self.tcb_cur)
    }

    /// Set current TCB pointer
    #[inline(always)]
    pub unsafe fn set_tcb_cur(&mut self, tcb: Option<NonNull<OsTcb>>) {
        self.tcb_cur = tcb.map_or(core::ptr::null_mut(), |p| p.as_ptr());
    }

    /// Get high ready TCB pointer
    #[inline(always)]
    pub unsafe fn tcb_high_rdy_ptr(&self) -> Option<NonNull<OsTcb>> {
        NonNull::new(self.tcb_high_rdy)
    }

    /// Set high ready TCB pointer
    #[inline(always)]
    pub unsafe fn set_tcb_high_rdy(&mut self, tcb: Option<NonNull<OsTcb>>) {
        self.tcb_high_rdy = tcb.map_or(core::ptr::null_mut(), |p| p.as_ptr());
    }

    // ============ Priority Accessor Methods ============

    /// Get current priority
    #[inline(always)]
    pub unsafe fn get_prio_cur(&self) -> OsPrio {
        self.prio_cur
    }

    /// Set current priority
    #[inline(always)]
    pub unsafe fn set_prio_cur(&mut self, prio: OsPrio) {
        self.prio_cur = prio;
    }

    /// Get high ready priority
    #[inline(always)]
    pub unsafe fn get_prio_high_rdy(&self) -> OsPrio {
        self.prio_high_rdy
    }

    /// Set high ready priority
    #[inline(always)]
    pub unsafe fn set_prio_high_rdy(&mut self, prio: OsPrio) {
        self.prio_high_rdy = prio;
    }
}

/// Global CPU state instance
#[no_mangle]
#[used]
pub static mut CPU_STATE: CpuState = CpuState::new();

/// BASEPRI boundary
#[no_mangle]
pub static OS_KA_BASEPRI_Boundary: u32 = 0;

// ============ Initialization ============

/// Internal IDLE task function
///
/// Also responsible for reclaiming TCBs of deleted tasks (spec §3's
/// "Deleted" state) since deletion can't safely tear down a task's own
/// stack while it's still executing on it.
fn os_idle_task(_: *mut ()) -> ! {
    loop {
        crate::task::os_idle_reclaim();
        #[cfg(target_arch = "arm")]
        cortex_m::asm::nop();
    }
}

/// Reset global kernel state
unsafe fn os_reset_globals() {
    KERNEL.reset();

    unsafe {
        CPU_STATE.tcb_cur = core::ptr::null_mut();
        CPU_STATE.tcb_high_rdy = core::ptr::null_mut();
        CPU_STATE.prio_cur = 0;
        CPU_STATE.prio_high_rdy = 0;
    }

    unsafe {
        SCHED.get_unchecked().reset();
    }
}

// ============ Public API ============

/// Initialize the RTOS kernel
///
/// This must be called before any other OS function.
/// It initializes the priority table, ready lists, and internal state.
/// IDLE task is automatically created.
///
/// # Returns
/// * `Ok(())` - Initialization successful
/// * `Err(OsError::OsRunning)` - OS is already running
#[allow(static_mut_refs)]
pub fn os_init() -> OsResult<()> {
    unsafe {
        os_reset_globals();
    }

    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    critical_section(|cs| {
        let sched = SCHED.get(cs);

        // Initialize priority table
        sched.prio_tbl.init();

        // Initialize ready lists
        for list in sched.rdy_list.iter_mut() {
            list.init();
        }

        // Create IDLE task
        unsafe {
            crate::task::os_task_create_internal(
                &raw mut IDLE_TCB,
                "Idle",
                os_idle_task,
                core::ptr::null_mut(),
                crate::config::CFG_PRIO_IDLE,
                IDLE_STK.as_mut_ptr(),
                IDLE_STK.len(),
                0,
                0,
            )
            .expect("IDLE task creation failed");
        }

        KERNEL.set_initialized(true);
    });

    Ok(())
}

/// Start multitasking
///
/// This function starts the highest priority ready task. It never returns.
/// Before calling this, at least one application task must be created.
///
/// # Returns
/// This function does not return under normal operation.
/// * `Err(OsError::OsNotInit)` - OS not initialized
/// * `Err(OsError::OsRunning)` - OS is already running
/// * `Err(OsError::OsNoAppTask)` - No application task created
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::OsNotInit);
    }

    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    critical_section(|cs| {
        let sched = SCHED.get(cs);

        let high_prio = sched.prio_tbl.get_highest();

        unsafe {
            CPU_STATE.prio_high_rdy = high_prio;
            CPU_STATE.prio_cur = high_prio;

            if let Some(head) = sched.rdy_list[high_prio as usize].head() {
                CPU_STATE.tcb_high_rdy = head.as_ptr();
                CPU_STATE.tcb_cur = head.as_ptr();
            } else {
                return;
            }
        }

        KERNEL.set_running(true);
    });

    // Initialize SysTick
    crate::port::os_cpu_systick_init(16_000_000 / crate::config::CFG_TICK_RATE_HZ);

    unsafe {
        CPU_STATE.tcb_cur = CPU_STATE.tcb_high_rdy;
        crate::port::os_start_high_rdy()
    };

    Ok(())
}

/// Exit ISR
pub fn os_int_exit() {
    if !KERNEL.is_running() {
        return;
    }

    let _cs = CriticalSection::enter();

    let old_nesting = KERNEL.int_nesting();
    if old_nesting == 0 {
        return;
    }

    let new_nesting = KERNEL.int_nesting_dec();

    if new_nesting == 0 && KERNEL.sched_lock_nesting() == 0 {
        drain_pending_ready();

        // Check whether need to switch tasks
        let high_prio = unsafe { SCHED.get_unchecked().prio_tbl.get_highest() };

        unsafe {
            if high_prio > CPU_STATE.prio_cur {
                CPU_STATE.prio_high_rdy = high_prio;

                if let Some(head) = SCHED.get_unchecked().rdy_list[high_prio as usize].head() {
                    CPU_STATE.tcb_high_rdy = head.as_ptr();
                    crate::port::os_int_ctx_sw();
                }
            }
        }
    }
}

/// Lock the scheduler
pub fn os_sched_lock() -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if KERNEL.int_nesting() > 0 {
        return Err(OsError::SchedLockIsr);
    }

    critical_section(|_cs| KERNEL.try_sched_lock())
}

/// Unlock the scheduler
pub fn os_sched_unlock() -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if KERNEL.int_nesting() > 0 {
        return Err(OsError::SchedUnlockIsr);
    }

    critical_section(|_cs| {
        let remaining = KERNEL.try_sched_unlock()?;
        if remaining == 0 {
            drain_pending_ready();
            crate::sched::os_sched();
        }
        Ok(())
    })
}

/// Suspend scheduling of all tasks (spec §4.3 `suspend_all`). Alias of
/// [`os_sched_lock`] in the public vocabulary used by queues/timers.
#[inline]
pub fn suspend_all() -> OsResult<()> {
    os_sched_lock()
}

/// Resume scheduling of all tasks (spec §4.3 `resume_all`). Alias of
/// [`os_sched_unlock`].
#[inline]
pub fn resume_all() -> OsResult<()> {
    os_sched_unlock()
}

/// Move every task an ISR queued onto `pending_ready` while the
/// scheduler was locked into its real ready list now that the lock has
/// dropped to zero.
pub(crate) fn drain_pending_ready() {
    unsafe {
        let sched = SCHED.get_unchecked();
        while let Some(tcb) = sched.pending_ready.pop_head() {
            let prio = (*tcb.as_ptr()).prio;
            sched.rdy_list[prio as usize].insert_tail(tcb);
            sched.prio_tbl.insert(prio);
        }
    }
}

/// Make `tcb` ready from an ISR or notification-from-ISR context. If the
/// scheduler is locked, the task is parked on `pending_ready` and picked
/// up by [`drain_pending_ready`] on unlock instead of touching the real
/// ready list directly — the same deferred-wake path `os_int_exit` already
/// drains.
///
/// # Safety
/// `tcb` must not currently be linked on any state list.
pub(crate) unsafe fn ready_from_isr(mut tcb: NonNull<OsTcb>) {
    unsafe {
        let sched = SCHED.get_unchecked();
        if KERNEL.sched_lock_nesting() > 0 {
            let tcb_ref = tcb.as_mut();
            tcb_ref.state_item.set_owner(tcb);
            tcb_ref.state_item.set_value(0);
            let item = NonNull::from(&mut tcb_ref.state_item);
            sched.pending_ready.append(item);
        } else {
            let prio = tcb.as_ref().prio;
            sched.rdy_list[prio as usize].insert_tail(tcb);
            sched.prio_tbl.insert(prio);
        }
    }
}

// ============ Internal accessors for other modules ============

/// Get mutable reference to priority table
#[inline(always)]
pub(crate) unsafe fn prio_table() -> &'static mut PrioTable {
    unsafe { &mut SCHED.get_unchecked().prio_tbl }
}

/// Get reference to ready list for a priority
#[inline(always)]
pub(crate) unsafe fn rdy_list(prio: OsPrio) -> &'static mut ReadyList {
    unsafe { &mut SCHED.get_unchecked().rdy_list[prio as usize] }
}

/// Get current TCB pointer as Option<NonNull>
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn tcb_cur_ptr() -> Option<NonNull<OsTcb>> {
    unsafe { CPU_STATE.tcb_cur_ptr() }
}

/// Set current TCB pointer
#[inline]
#[allow(dead_code, static_mut_refs)]
pub(crate) unsafe fn set_tcb_cur_ptr(tcb: Option<NonNull<OsTcb>>) {
    unsafe { CPU_STATE.set_tcb_cur(tcb) }
}

/// Get high ready TCB pointer as Option<NonNull>
#[inline]
#[allow(dead_code, static_mut_refs)]
pub(crate) unsafe fn tcb_high_rdy_ptr() -> Option<NonNull<OsTcb>> {
    unsafe { CPU_STATE.tcb_high_rdy_ptr() }
}

/// Set high ready TCB pointer
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn set_tcb_high_rdy_ptr(tcb: Option<NonNull<OsTcb>>) {
    unsafe { CPU_STATE.set_tcb_high_rdy(tcb) }
}

/// Get current priority
#[inline]
#[allow(dead_code, static_mut_refs)]
pub(crate) unsafe fn prio_cur() -> OsPrio {
    unsafe { CPU_STATE.get_prio_cur() }
}

/// Set current priority
#[inline]
#[allow(dead_code, static_mut_refs)]
pub(crate) unsafe fn set_prio_cur(prio: OsPrio) {
    unsafe { CPU_STATE.set_prio_cur(prio) }
}

/// Get high ready priority
#[inline]
#[allow(dead_code, static_mut_refs)]
pub(crate) unsafe fn prio_high_rdy() -> OsPrio {
    unsafe { CPU_STATE.get_prio_high_rdy() }
}

/// Set high ready priority
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn set_prio_high_rdy(prio: OsPrio) {
    unsafe { CPU_STATE.set_prio_high_rdy(prio) }
}

// ============ Delayed-list management ============

/// Park `tcb` on the delayed list for `wake_tick`.
///
/// # Safety
/// `tcb` must not currently be linked on any state list.
pub(crate) unsafe fn delayed_insert(tcb: NonNull<OsTcb>, wake_tick: OsTick) {
    unsafe { SCHED.get_unchecked().delayed_insert(tcb, wake_tick) };
}

/// Cached next wake tick, `OsTick::MAX` if nothing is delayed.
pub(crate) fn next_unblock_time() -> OsTick {
    unsafe { SCHED.get_unchecked().next_unblock_time }
}

/// Drain due delayed tasks (wake tick `<= tick_count`) into `out`,
/// returning how many were drained.
pub(crate) fn drain_due_delayed(out: &mut [Option<NonNull<OsTcb>>]) -> usize {
    unsafe { SCHED.get_unchecked().drain_due(out) }
}

// ============ Terminating-list management ============

/// Park a deleted task on the terminating list for the idle task to
/// reclaim.
///
/// # Safety
/// `tcb` must not currently be linked on any state list.
pub(crate) unsafe fn terminating_push(mut tcb: NonNull<OsTcb>) {
    unsafe {
        let sched = SCHED.get_unchecked();
        let tcb_ref = tcb.as_mut();
        tcb_ref.state_item.set_owner(tcb);
        tcb_ref.state_item.set_value(0);
        let item = NonNull::from(&mut tcb_ref.state_item);
        sched.terminating.append(item);
    }
}

/// Pop the next deleted task awaiting reclamation, if any.
pub(crate) fn terminating_pop() -> Option<NonNull<OsTcb>> {
    unsafe { SCHED.get_unchecked().terminating.pop_head() }
}
