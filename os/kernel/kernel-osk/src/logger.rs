use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

/// `log` backend for hosted builds: one `[LEVEL] target: message` line per
/// record on stderr.
pub struct HostLogger {
    max_level: LevelFilter,
}

impl HostLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Installs the logger. Call once during early init.
    ///
    /// # Errors
    ///
    /// Fails if another logger is already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Default for HostLogger {
    fn default() -> Self {
        Self::new(LevelFilter::Info)
    }
}

impl Log for HostLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Lock once so lines from different threads do not interleave.
        let mut err = std::io::stderr().lock();
        let _ = writeln!(
            err,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
