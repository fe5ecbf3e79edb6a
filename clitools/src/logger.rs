use std::io::{self, Write};

use log::{Level, LevelFilter, Metadata, Record};

/// Plain stderr logger for the host tools
pub struct StderrLogger {
    level: LevelFilter,
}

impl StderrLogger {
    pub fn new(quiet: bool, verbose: u8) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => LevelFilter::Off,
            (false, 0) => LevelFilter::Info,
            (false, 1) => LevelFilter::Debug,
            (false, _) => LevelFilter::Trace,
        };
        Self { level }
    }
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut err = io::stderr().lock();
        let _ = match record.level() {
            Level::Error | Level::Warn => {
                writeln!(err, "[{}] {}: {}", record.level(), record.target(), record.args())
            }
            level => writeln!(err, "[{}] {}", level, record.args()),
        };
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

pub fn init(quiet: bool, verbose: u8) {
    let logger = StderrLogger::new(quiet, verbose);
    let level = logger.level;
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(level);
    }
}
