use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use replay_executor::{Context, Cursor, ErrorQueue, Extension, ReplayError};
use tracing::{error, info, warn};

/// Errors consumed, and the first failure to write the error log.
type Consumed = (usize, Option<std::io::Error>);

/// Collects the errors tolerated during a run on a dedicated thread, logging
/// them and mirroring them to an optional file.
pub struct ErrorLogger {
    capacity: usize,
    path: Option<PathBuf>,
    queue: Option<ErrorQueue<Consumed>>,
    recorded: usize,
}

impl ErrorLogger {
    pub fn new(workers: usize, path: Option<PathBuf>) -> Self {
        Self {
            capacity: workers.max(1) * 10,
            path,
            queue: None,
            recorded: 0,
        }
    }

    /// Number of errors consumed, available once the run has ended.
    pub fn recorded(&self) -> usize {
        self.recorded
    }
}

impl<T> Extension<T> for ErrorLogger {
    fn pre_run(&mut self, _cursor: Cursor<'_, T>, ctx: &mut Context) -> Result<(), ReplayError> {
        let mut file = match &self.path {
            Some(path) => Some(BufWriter::new(File::create(path).map_err(|err| {
                ReplayError::Setup(format!("cannot create error log {}: {err}", path.display()))
            })?)),
            None => None,
        };
        let queue = ErrorQueue::spawn(self.capacity, move |errors| {
            drain(errors, file.as_mut())
        })?;
        ctx.error_reporter = Some(queue.reporter());
        self.queue = Some(queue);
        Ok(())
    }

    fn post_run(
        &mut self,
        _cursor: Cursor<'_, T>,
        ctx: &mut Context,
        _err: Option<&ReplayError>,
    ) -> Result<(), ReplayError> {
        ctx.error_reporter = None;
        let Some(queue) = self.queue.take() else {
            return Ok(());
        };
        let (recorded, write_error) = queue.close()?;
        self.recorded = recorded;
        if self.recorded > 0 {
            warn!(count = self.recorded, "Total number of errors recorded");
        } else {
            info!("No errors recorded");
        }
        match write_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Logs every error until the stream ends. Once a write fails the file is
/// abandoned, but the remaining errors are still consumed and logged.
fn drain<W: Write>(errors: impl Iterator<Item = ReplayError>, mut file: Option<W>) -> Consumed {
    let mut count = 0;
    let mut write_error = None;
    for err in errors {
        count += 1;
        error!(%err, "Recorded execution failure");
        if let Some(writer) = file.as_mut() {
            if let Err(io_err) = writeln!(writer, "{err}") {
                warn!(%io_err, "Cannot write error log, continuing without it");
                write_error = Some(io_err);
                file = None;
            }
        }
    }
    if let Some(writer) = file.as_mut() {
        if let Err(io_err) = writer.flush() {
            warn!(%io_err, "Cannot flush error log");
            write_error = Some(io_err);
        }
    }
    (count, write_error)
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    /// Accepts a fixed number of writes, then fails.
    struct ShortWriter {
        lines: Vec<u8>,
        budget: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("disk full"));
            }
            self.budget -= 1;
            self.lines.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_do_not_stop_the_drain() {
        let errors = (0..5).map(|i| ReplayError::Execution(format!("failure {i}")));
        let mut writer = ShortWriter {
            lines: Vec::new(),
            budget: 0,
        };

        let (count, write_error) = drain(errors, Some(&mut writer));

        assert_eq!(count, 5);
        assert_eq!(write_error.unwrap().to_string(), "disk full");
        assert!(writer.lines.is_empty());
    }

    #[test]
    fn every_error_reaches_a_healthy_file() {
        let errors = (0..3).map(|i| ReplayError::Execution(format!("failure {i}")));
        let mut lines = Vec::new();

        let (count, write_error) = drain(errors, Some(&mut lines));

        assert_eq!(count, 3);
        assert!(write_error.is_none());
        assert_eq!(String::from_utf8(lines).unwrap().lines().count(), 3);
    }
}
