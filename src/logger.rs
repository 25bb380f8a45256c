//! A `log` backend writing to a byte sink, normally the UART.
//!
//! Each record comes out on its own line, coloured by level:
//!
//! ```text
//! ESC[1;33m[warn src/kernel.rs:42] low memoryESC[0m\r\n
//! ```

use core::fmt::Write;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

use crate::printf::{Sink, SinkWriter};

pub struct SinkLogger<S> {
    sink: Mutex<S>,
    colored: bool,
}

impl<S> SinkLogger<S> {
    /// `colored` switches the ANSI escapes on or off.
    pub const fn new(sink: S, colored: bool) -> Self {
        SinkLogger {
            sink: Mutex::new(sink),
            colored,
        }
    }

    pub fn into_inner(self) -> S {
        self.sink.into_inner()
    }
}

fn name(level: Level) -> &'static str {
    match level {
        Level::Trace => "trace",
        Level::Debug => "debug",
        Level::Info => "info",
        Level::Warn => "warn",
        Level::Error => "error",
    }
}

fn color(level: Level) -> &'static str {
    match level {
        Level::Trace => "0;37",
        Level::Debug => "0",
        Level::Info => "1;30",
        Level::Warn => "1;33",
        Level::Error => "1;31",
    }
}

impl<S: Sink> SinkLogger<S> {
    /// Write `record` whatever the current level filter says.
    ///
    /// If the sink is busy, because a handler logged in the middle of another
    /// record, the record is dropped.
    pub fn write_record(&self, record: &Record) {
        let mut sink = match self.sink.try_lock() {
            Some(sink) => sink,
            None => return,
        };
        let mut w = SinkWriter::new(&mut *sink);

        let level = record.level();
        let file = record.file().unwrap_or("?");
        let line = record.line().unwrap_or(0);
        let _ = if self.colored {
            write!(
                w,
                "\x1b[{}m[{} {}:{}] {}\x1b[0m\r\n",
                color(level),
                name(level),
                file,
                line,
                record.args()
            )
        } else {
            write!(w, "[{} {}:{}] {}\r\n", name(level), file, line, record.args())
        };
    }
}

impl<S: Sink + Send> Log for SinkLogger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.write_record(record);
        }
    }

    fn flush(&self) {}
}

/// Install `logger` as the global logger, passing records up to `level`.
///
/// Fails if a logger was already installed.
pub fn init<S: Sink + Send>(logger: &'static SinkLogger<S>, level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::printf::BufferSink;
    use test_env_log::test;

    fn render(colored: bool, level: Level) -> ([u8; 96], usize) {
        let mut buf = [0u8; 96];
        let len = {
            let logger = SinkLogger::new(BufferSink::new(&mut buf), colored);
            logger.write_record(
                &Record::builder()
                    .args(format_args!("heap at {:#x}", 0x8_0000))
                    .level(level)
                    .file(Some("src/kernel.rs"))
                    .line(Some(42))
                    .build(),
            );
            logger.into_inner().len()
        };
        (buf, len)
    }

    #[test]
    fn test_colored() {
        let (buf, len) = render(true, Level::Warn);
        assert_eq!(
            &buf[..len],
            &b"\x1b[1;33m[warn src/kernel.rs:42] heap at 0x80000\x1b[0m\r\n"[..]
        );
    }

    #[test]
    fn test_plain() {
        let (buf, len) = render(false, Level::Trace);
        assert_eq!(&buf[..len], &b"[trace src/kernel.rs:42] heap at 0x80000\r\n"[..]);
    }

    #[test]
    fn test_busy_sink_drops_record() {
        let mut buf = [0u8; 16];
        let logger = SinkLogger::new(BufferSink::new(&mut buf), false);
        {
            let _held = logger.sink.lock();
            logger.write_record(&Record::builder().args(format_args!("lost")).build());
        }
        assert!(logger.into_inner().is_empty());
    }
}
