//! A small `log::Log` implementation: bracketed, level-tagged lines,
//! written under a lock so that concurrent faults never interleave their
//! log output.
//!
//! Writes to stderr under a `std::sync::Mutex` rather than pulling in a
//! heavier logging backend.

use std::io::Write;
use std::sync::{Mutex, Once};

static INIT: Once = Once::new();
static WRITER: Mutex<()> = Mutex::new(());

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let tag = match record.level() {
            log::Level::Error => "[!]",
            log::Level::Warn => "[-]",
            log::Level::Info => "[*]",
            log::Level::Debug => "[#]",
            log::Level::Trace => "[~]",
        };

        let _guard = WRITER.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(std::io::stderr(), "{tag} {}", record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: Logger = Logger;

/// Installs the pager's logger as the global `log` sink. Safe to call more
/// than once; only the first call has any effect.
pub fn install() {
    INIT.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);
    });
}
