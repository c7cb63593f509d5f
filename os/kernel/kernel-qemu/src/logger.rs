use crate::qemu_trace;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` sink writing `"[LEVEL] target: message\n"` lines to the UART.
///
/// Filtering happens through [`log::max_level`], so the threshold can be
/// changed at runtime with [`log::set_max_level`].
pub struct QemuLogger {
    _private: (),
}

static LOGGER: QemuLogger = QemuLogger { _private: () };

impl QemuLogger {
    /// Install the logger. Call this once during early init.
    ///
    /// # Errors
    /// Fails if another logger was installed first; the level is left as is.
    pub fn init(max_level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_logger(&LOGGER)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        qemu_trace!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}
