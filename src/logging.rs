//! Process logger. Writes to stderr and, once the data directory is known,
//! also appends to `wallet.log` there so it can be viewed from the window.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use env_logger::{Env, Target};

pub const LOG_FILE: &str = "wallet.log";
pub const LOG_TAIL_LINES: usize = 200;

/// Copies every record to stderr and the log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

pub fn init(log_file: Option<&Path>) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(TeeWriter { file })));
            }
            Err(e) => eprintln!("cannot open log file {}: {e}", path.display()),
        }
    }
    builder.init();
}

/// The last `max_lines` lines of the log file.
pub fn read_log_tail(path: &Path, max_lines: usize) -> anyhow::Result<String> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    Ok(lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path).unwrap();
        let mut writer = TeeWriter { file };
        writer.write_all(b"first\n").unwrap();
        writer.write_all(b"second\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn tail_keeps_only_the_newest_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let contents: String = (1..=5).map(|i| format!("line {i}\n")).collect();
        fs::write(&path, contents).unwrap();

        assert_eq!(read_log_tail(&path, 2).unwrap(), "line 4\nline 5");
        assert_eq!(read_log_tail(&path, 10).unwrap().lines().count(), 5);
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_log_tail(&dir.path().join(LOG_FILE), 10).is_err());
    }
}
