//! # Kernel synchronization primitives
//!
//! The paging core is single-core and explicitly serialised. These types
//! provide that serialisation:
//!
//! - [`SpinLock`] — a test-and-test-and-set lock around shared state,
//! - [`IrqGuard`] — masks IRQs on the executing core for a scope,
//! - [`SpinLock::lock_irq`] — both at once, for state an interrupt handler
//!   may also touch.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;

pub use irq::{IrqGuard, IrqSpinLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
