//! Logging module for terminal and file based output control.
//!
//! Contains a custom logging implementation to disable/redirect output
//! based on command line switches baked into the application level. Every
//! line is stamped with the time and severity, and can be mirrored into a
//! log file for long running migrations.
use clap::ArgMatches;
use logger::{Level, LevelFilter, Log, Metadata, Record};

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::types::UtilResult;

/// Basic logger instance to allow quiet-aware logging.
struct BasicLogger {
    quiet: bool,
    file: Option<Mutex<File>>,
}

// Basic logging implementation.
impl Log for BasicLogger {
    /// Returns enabled only for aws-utils modules.
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with("aws_utils")
    }

    /// Logs out a `Record` when logging is enabled.
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = record.metadata().level();
        let line = format_line(SystemTime::now(), level, &record.args().to_string());

        if level == Level::Error {
            eprintln!("{}", line);
        } else if !self.quiet {
            println!("{}", line);
        }

        // the file always gets everything, quiet or not
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{}", line);
            }
        }
    }

    /// Flushes this logger.
    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Formats a log line as `<timestamp> [<LEVEL>] <message>`.
fn format_line(time: SystemTime, level: Level, message: &str) -> String {
    format!(
        "{} [{}] {}",
        humantime::format_rfc3339_seconds(time),
        level,
        message
    )
}

/// Initializes the logger based on the provided arguments.
///
/// Switches live on the subcommands, so the matches of whichever command
/// was invoked are inspected. If `-q` was provided, console output is
/// limited to errors; a `log-file` value opens that file for appending.
pub fn init(args: &ArgMatches) -> UtilResult<()> {
    let (quiet, path) = match args.subcommand() {
        (_, Some(sub)) => (sub.is_present("quiet"), sub.value_of("log-file")),
        _ => (false, None),
    };

    let file = match path {
        Some(path) => Some(Mutex::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    let logger = Box::new(BasicLogger { quiet, file });
    logger::set_boxed_logger(logger)?;
    logger::set_max_level(LevelFilter::Info);
    Ok(())
}
