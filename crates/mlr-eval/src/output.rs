//! Output routing for `tee`, `print`/`printn`, `dump`, and `emit` redirects.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::process::{Child, Command, Stdio};

use mlr_core::Record;
use mlr_cst::cst::RedirectMode;

use crate::error::RuntimeError;

/// A minimal DKVP rendering of a record, used by `tee`/`emit ... > file`:
/// these output statements don't depend on the stream's overall output
/// format.
pub fn format_record_dkvp(rec: &Record) -> String {
    rec.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

enum Sink {
    File(File),
    Pipe(Child),
}

impl Sink {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Sink::File(f) => f,
            Sink::Pipe(child) => child.stdin.as_mut().expect("pipe stdin captured at spawn"),
        }
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if let Sink::Pipe(child) = self {
            let _ = child.stdin.take();
            let _ = child.wait();
        }
    }
}

/// Lazily-created, cached-by-target output sinks: a redirect target's
/// writer is opened once and reused for the life of the run.
#[derive(Default)]
pub struct OutputRouter {
    sinks: HashMap<String, Sink>,
    flush_every_record: bool,
}

impl OutputRouter {
    pub fn new(flush_every_record: bool) -> Self {
        Self { sinks: HashMap::new(), flush_every_record }
    }

    /// Write `line` (without trailing newline) plus an optional newline to
    /// stdout, or to the cached sink for `(mode, target)`.
    pub fn write_line(
        &mut self,
        dest: Option<(RedirectMode, &str)>,
        line: &str,
        trailing_newline: bool,
    ) -> Result<(), RuntimeError> {
        match dest {
            None => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                write_with_newline(&mut out, line, trailing_newline)
                    .map_err(|e| RuntimeError::Io("(stdout)".to_string(), e))?;
                Ok(())
            }
            Some((mode, target)) => {
                let sink = self.sink_for(mode, target)?;
                write_with_newline(sink.writer(), line, trailing_newline)
                    .map_err(|e| RuntimeError::Io(target.to_string(), e))?;
                if self.flush_every_record {
                    let _ = sink.writer().flush();
                }
                Ok(())
            }
        }
    }

    fn sink_for(&mut self, mode: RedirectMode, target: &str) -> Result<&mut Sink, RuntimeError> {
        let key = format!("{mode:?}:{target}");
        if !self.sinks.contains_key(&key) {
            let sink = open_sink(mode, target)?;
            self.sinks.insert(key.clone(), sink);
        }
        Ok(self.sinks.get_mut(&key).expect("just inserted"))
    }

    /// Flush and close all cached sinks (called once at end-of-stream).
    pub fn close_all(&mut self) {
        self.sinks.clear();
    }
}

fn open_sink(mode: RedirectMode, target: &str) -> Result<Sink, RuntimeError> {
    match mode {
        RedirectMode::Write => {
            let f = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(target)
                .map_err(|e| RuntimeError::Io(target.to_string(), e))?;
            Ok(Sink::File(f))
        }
        RedirectMode::Append => {
            let f = OpenOptions::new()
                .append(true)
                .create(true)
                .open(target)
                .map_err(|e| RuntimeError::Io(target.to_string(), e))?;
            Ok(Sink::File(f))
        }
        RedirectMode::Pipe => {
            let child = Command::new("sh")
                .arg("-c")
                .arg(target)
                .stdin(Stdio::piped())
                .spawn()
                .map_err(|e| RuntimeError::Io(target.to_string(), e))?;
            Ok(Sink::Pipe(child))
        }
    }
}

fn write_with_newline(w: &mut dyn Write, line: &str, trailing_newline: bool) -> std::io::Result<()> {
    if trailing_newline {
        writeln!(w, "{line}")
    } else {
        write!(w, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_append_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path_str = path.to_str().unwrap();

        let mut router = OutputRouter::new(false);
        router.write_line(Some((RedirectMode::Write, path_str)), "one", true).unwrap();
        router.write_line(Some((RedirectMode::Write, path_str)), "two", true).unwrap();
        router.close_all();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "one\ntwo\n");
    }
}
