//! Critical section handling for Î¼C/OS-III
//!
//! Built on the `critical-section` crate rather than toggling PRIMASK by
//! hand: its registered implementation (see `SingleCoreCriticalSection` in
//! `lib.rs`) saves and restores the prior interrupt-enable state per
//! `acquire`/`release` pair, so nested `CriticalSection::enter()` calls
//! compose correctly — only the outermost guard's drop actually
//! re-enables interrupts. A pair of raw disable()/enable() calls, as a
//! nested kernel call graph relies on (e.g. `os_sched` entering its own
//! critical section from inside one already held by a caller), does not
//! have that property and would reopen the window early.
use core::sync::atomic::{AtomicUsize, Ordering};

/// Best-effort nesting depth, for [`CriticalSection::is_active`] only.
/// Not itself load-bearing for correctness — that's `critical_section`'s
/// job — just a cheap diagnostic for callers that want to assert they're
/// already inside one.
static DEPTH: AtomicUsize = AtomicUsize::new(0);

/// RAII guard for critical sections.
///
/// When this guard is created, interrupts are disabled (if not already).
/// When it is dropped, interrupts are restored to their state at the
/// matching `enter()` call, correctly handling nesting.
pub struct CriticalSection {
    restore_state: critical_section::RestoreState,
}

impl CriticalSection {
    /// Enter a critical section, disabling interrupts if not already
    /// inside one.
    ///
    /// Returns a guard that will restore interrupt state when dropped.
    #[inline(always)]
    pub fn enter() -> Self {
        // Safety: the matching `release` happens in `Drop`, with the same
        // `RestoreState` this `acquire` returned.
        let restore_state = unsafe { critical_section::acquire() };
        DEPTH.fetch_add(1, Ordering::Relaxed);
        CriticalSection { restore_state }
    }

    /// Check if we're currently in a critical section.
    #[inline(always)]
    pub fn is_active() -> bool {
        DEPTH.load(Ordering::Relaxed) > 0
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        DEPTH.fetch_sub(1, Ordering::Relaxed);
        // Safety: `restore_state` came from the `acquire` in `enter()` that
        // produced this guard.
        unsafe { critical_section::release(self.restore_state) };
    }
}

/// Execute a closure with interrupts disabled
/// 
/// The closure receives a reference to the critical section guard,
/// which can be used to access [`CsCell`] protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }
    
    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}

/// Mask priority levels using BASEPRI (Cortex-M3/M4/M7)
/// 
/// This allows selective interrupt masking where only interrupts
/// with a priority value >= the mask value are blocked.
#[inline]
pub fn set_basepri(priority: u8) {
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!(
            "msr BASEPRI, {}",
            in(reg) priority as u32,
            options(nomem, nostack, preserves_flags)
        );
    }
    
    #[cfg(not(target_arch = "arm"))]
    {
        let _ = priority;
    }
}

/// Get current BASEPRI value
#[inline]
pub fn get_basepri() -> u8 {
    #[cfg(target_arch = "arm")]
    {
        let basepri: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, BASEPRI",
                out(reg) basepri,
                options(nomem, nostack, preserves_flags)
            );
        }
        basepri as u8
    }
    
    #[cfg(not(target_arch = "arm"))]
    {
        0
    }
}
