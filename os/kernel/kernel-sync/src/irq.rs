//! IRQ masking on the executing core.
//!
//! On ARM the I bit of the CPSR is read with `mrs` and flipped with
//! `cpsid i` / `cpsie i`. Other targets only build for host-side testing;
//! there the mask is a process-wide flag so that the guards keep their
//! observable behaviour.

use crate::{SpinLock, SpinLockGuard};
use core::ops::{Deref, DerefMut};

#[cfg(target_arch = "arm")]
mod arch {
    /// CPSR bit 7: IRQs masked.
    const CPSR_I: u32 = 1 << 7;

    #[inline]
    pub fn interrupts_enabled() -> bool {
        let cpsr: u32;
        unsafe {
            core::arch::asm!("mrs {}, cpsr", out(reg) cpsr, options(nomem, nostack, preserves_flags));
        }
        cpsr & CPSR_I == 0
    }

    // No `nomem`: the compiler must not move memory accesses across these.
    #[inline]
    pub fn disable() {
        unsafe { core::arch::asm!("cpsid i", options(nostack, preserves_flags)) }
    }

    #[inline]
    pub fn enable() {
        unsafe { core::arch::asm!("cpsie i", options(nostack, preserves_flags)) }
    }
}

#[cfg(not(target_arch = "arm"))]
mod arch {
    use core::sync::atomic::{AtomicBool, Ordering};

    static ENABLED: AtomicBool = AtomicBool::new(true);

    #[inline]
    pub fn interrupts_enabled() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn disable() {
        ENABLED.store(false, Ordering::SeqCst);
    }

    #[inline]
    pub fn enable() {
        ENABLED.store(true, Ordering::SeqCst);
    }
}

/// Returns `true` if IRQs are currently unmasked.
///
/// # Privilege
///
/// Reading the CPSR is permitted in every mode.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    arch::interrupts_enabled()
}

/// Masks IRQs (`cpsid i`).
///
/// # Privilege
///
/// Has no effect in user mode. Misuse can hang the system.
#[inline]
pub fn cpsid_disable_interrupts() {
    arch::disable();
}

/// Unmasks IRQs (`cpsie i`).
///
/// Typically used to restore a previously saved state.
#[inline]
pub fn cpsie_enable_interrupts() {
    arch::enable();
}

/// RAII guard that masks IRQs on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the CPSR I bit. If IRQs were enabled it
/// masks them; on drop it unmasks them **only** if they were enabled
/// before, so guards nest.
///
/// ```
/// use kernel_sync::irq::{IrqGuard, interrupts_enabled};
///
/// let before = interrupts_enabled();
/// {
///     let _g = IrqGuard::new();
///     assert!(!interrupts_enabled());
/// }
/// assert_eq!(interrupts_enabled(), before);
/// ```
#[derive(Debug)]
pub struct IrqGuard {
    /// Whether IRQs were enabled when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            cpsid_disable_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            cpsie_enable_interrupts();
        }
    }
}

/// A [`SpinLockGuard`] that also keeps IRQs masked while held.
///
/// Created by [`SpinLock::lock_irq`]. IRQs are masked before the lock is
/// taken, and the lock is released before IRQs are restored, so an
/// interrupt handler never spins on a lock its own core holds.
pub struct IrqSpinLockGuard<'a, T> {
    // Field order is drop order: unlock first, then unmask.
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard,
}

impl<T> SpinLock<T> {
    /// Acquires the lock with IRQs masked for the guard's lifetime.
    #[inline]
    pub fn lock_irq(&self) -> IrqSpinLockGuard<'_, T> {
        let irq = IrqGuard::new();
        let guard = self.lock();
        IrqSpinLockGuard { guard, _irq: irq }
    }
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
