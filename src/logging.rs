//! File sink for the `log` facade. The terminal is in raw mode while playing, so
//! log records go to a file or nowhere.

use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

struct FileLogger {
    started: Instant,
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(mut guard) = LOG_FILE.lock() {
            if let Some(file) = guard.as_mut() {
                let elapsed = self.started.elapsed();
                let _ = writeln!(
                    file,
                    "[{:>4}.{:03} {:<5} {}] {}",
                    elapsed.as_secs(),
                    elapsed.subsec_millis(),
                    record.level(),
                    record.target(),
                    record.args()
                );
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = LOG_FILE.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Truncates `path` and routes every record at or above `level` into it.
/// Calling it twice only swaps the file; the logger itself is installed once.
pub fn init_file(path: &Path, level: LevelFilter) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }
    let logger = Box::new(FileLogger {
        started: Instant::now(),
    });
    // Already installed on a restart; the new file is picked up above.
    let _ = log::set_boxed_logger(logger);
    log::set_max_level(level);
    Ok(())
}

/// Flushes and closes the log file.
pub fn shutdown() {
    log::logger().flush();
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = None;
    }
}
