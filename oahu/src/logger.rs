use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Metadata, Record};
use std::io::Write;

/// Writes records to stderr so command output on stdout stays clean.
///
/// Records of other crates only show up at trace level.
pub struct Logger;

static LOGGER: Logger = Logger;

impl Logger {
    pub fn init(level: LevelFilter) -> anyhow::Result<()> {
        log::set_logger(&LOGGER)?;
        log::set_max_level(level);
        Ok(())
    }

    /// `-q` silences everything but errors, each `-v` adds one level.
    pub fn level(verbose: u8, quiet: bool) -> LevelFilter {
        if quiet {
            return LevelFilter::Error;
        }

        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
            && (log::max_level() == LevelFilter::Trace || is_own(metadata.target()))
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut stderr = std::io::stderr().lock();
        let stage = stage(record.target());

        let _ = if log::max_level() <= LevelFilter::Info {
            match (record.level(), stage) {
                (Level::Info, _) => writeln!(stderr, "{}", record.args()),
                (level, Some(stage)) => {
                    writeln!(stderr, "{} {}: {}", label(level), stage.bold(), record.args())
                }
                (level, None) => writeln!(stderr, "{} {}", label(level), record.args()),
            }
        } else {
            let location = match (record.file(), record.line()) {
                (Some(file), Some(line)) => format!("{}:{}", file, line),
                _ => String::from("?"),
            };

            writeln!(
                stderr,
                "{} {} {} {}",
                label(record.level()),
                stage.unwrap_or(record.target()).cyan(),
                location.dimmed(),
                record.args()
            )
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn is_own(target: &str) -> bool {
    target == "oahu" || target.starts_with("oahu::") || target.starts_with("oahu_mp4")
}

/// Library module a record comes from, e.g. `demux` or `filters::decrypt`.
fn stage(target: &str) -> Option<&str> {
    target.strip_prefix("oahu_mp4::")
}

fn label(level: Level) -> ColoredString {
    match level {
        Level::Error => "error".bold().red(),
        Level::Warn => "warning".bold().yellow(),
        Level::Info => "info".bold().green(),
        Level::Debug => "debug".bold().blue(),
        Level::Trace => "trace".bold().purple(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(Logger::level(0, true), LevelFilter::Error);
        assert_eq!(Logger::level(3, true), LevelFilter::Error);
        assert_eq!(Logger::level(0, false), LevelFilter::Info);
        assert_eq!(Logger::level(1, false), LevelFilter::Debug);
        assert_eq!(Logger::level(2, false), LevelFilter::Trace);
    }

    #[test]
    fn test_targets() {
        assert!(is_own("oahu"));
        assert!(is_own("oahu::commands::split"));
        assert!(is_own("oahu_mp4::demux"));
        assert!(!is_own("oahu_extra"));
        assert!(!is_own("aes"));

        assert_eq!(stage("oahu_mp4::filters::decrypt"), Some("filters::decrypt"));
        assert_eq!(stage("oahu::commands::decrypt"), None);
    }
}
