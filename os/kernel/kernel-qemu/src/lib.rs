//! # QEMU Serial Console Logging
//!
//! Early-boot diagnostics for the kernel running under `qemu-system-arm`
//! (`-M raspi0`/`raspi1ap`). Output goes to the PL011 UART, which QEMU
//! connects to the host with `-serial stdio`.
//!
//! ```text
//! log::trace!/debug!/...        qemu_trace!
//!         ↓                          ↓
//!     QemuLogger  ──────────────→ UartSink (fmt::Write)
//!                                    ↓
//!                        PL011 data register (UART0)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! QemuLogger::init(LevelFilter::Debug).expect("logger initialization");
//! info!("paging core up");
//! ```
//!
//! The UART is accessed at its physical address until the kernel maps the
//! peripheral window elsewhere and calls [`set_uart_base`].
//!
//! ## Features
//!
//! `enabled` (default) compiles the UART writes in. Without it, or on a
//! non-ARM target, every write is a no-op and the logger only filters.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

use core::sync::atomic::{AtomicU32, Ordering};

pub use logger::QemuLogger;

static UART_BASE: AtomicU32 = AtomicU32::new(kernel_info::memory::UART0_BASE);

/// Move the UART to `base`, e.g. once the peripheral block is remapped.
pub fn set_uart_base(base: u32) {
    UART_BASE.store(base, Ordering::Relaxed);
}

/// Address the UART is currently accessed at.
#[must_use]
pub fn uart_base() -> u32 {
    UART_BASE.load(Ordering::Relaxed)
}

#[cfg(all(feature = "enabled", target_arch = "arm"))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// PL011 data register.
    const UARTDR: u32 = 0x00;
    /// PL011 flag register.
    const UARTFR: u32 = 0x18;
    /// Flag register: transmit FIFO full.
    const FR_TXFF: u32 = 1 << 5;

    /// Write a single byte to the UART, waiting for FIFO space.
    #[inline]
    pub fn uart_putc(c: u8) {
        let base = super::uart_base();
        let fr = (base + UARTFR) as *const u32;
        let dr = (base + UARTDR) as *mut u32;
        unsafe {
            while core::ptr::read_volatile(fr) & FR_TXFF != 0 {
                core::hint::spin_loop();
            }
            core::ptr::write_volatile(dr, u32::from(c));
        }
    }

    pub struct UartSink;

    impl Write for UartSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                uart_putc(b);
            }
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort debug output.
        let _ = fmt::write(&mut UartSink, args);
    }
}

#[cfg(not(all(feature = "enabled", target_arch = "arm")))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt;

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(_: fmt::Arguments) {}
}

/// Formats straight to the serial console, bypassing `log`.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
