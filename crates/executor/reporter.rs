use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, bounded};
use tracing::warn;

use crate::ReplayError;

enum Message {
    Error(ReplayError),
    Close,
}

/// Sending half of an [`ErrorQueue`]. Cheap to clone; reporting blocks while
/// the queue is full.
#[derive(Clone)]
pub struct ErrorReporter {
    sender: Sender<Message>,
}

impl ErrorReporter {
    /// Returns false if the queue is no longer consumed.
    pub fn report(&self, err: ReplayError) -> bool {
        self.sender.send(Message::Error(err)).is_ok()
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("queued", &self.sender.len())
            .finish()
    }
}

/// Errors delivered to the consumer thread, ending at the close marker.
pub struct ErrorStream {
    receiver: Receiver<Message>,
}

impl Iterator for ErrorStream {
    type Item = ReplayError;

    fn next(&mut self) -> Option<Self::Item> {
        match self.receiver.recv() {
            Ok(Message::Error(err)) => Some(err),
            Ok(Message::Close) | Err(_) => None,
        }
    }
}

/// Bounded queue of non-fatal errors drained by a dedicated consumer thread.
///
/// Shutdown follows a close-then-join protocol: [`ErrorQueue::close`] enqueues
/// a close marker behind every error reported so far and waits for the
/// consumer to drain them.
pub struct ErrorQueue<R> {
    sender: Sender<Message>,
    handle: JoinHandle<R>,
}

impl<R: Send + 'static> ErrorQueue<R> {
    pub fn spawn<F>(capacity: usize, consumer: F) -> Result<Self, ReplayError>
    where
        F: FnOnce(ErrorStream) -> R + Send + 'static,
    {
        let (sender, receiver) = bounded(capacity.max(1));
        let handle = std::thread::Builder::new()
            .name("error-queue".to_string())
            .spawn(move || consumer(ErrorStream { receiver }))?;
        Ok(Self { sender, handle })
    }

    pub fn reporter(&self) -> ErrorReporter {
        ErrorReporter {
            sender: self.sender.clone(),
        }
    }

    /// Closes the queue and returns the consumer's output once every pending
    /// error has been processed.
    pub fn close(self) -> Result<R, ReplayError> {
        if self.sender.send(Message::Close).is_err() {
            warn!("Error consumer exited before the queue was closed");
        }
        drop(self.sender);
        self.handle
            .join()
            .map_err(|_| ReplayError::Setup("error consumer thread panicked".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_drains_pending_errors() {
        let queue = ErrorQueue::spawn(2, |errors| {
            errors.map(|err| err.to_string()).collect::<Vec<_>>()
        })
        .unwrap();
        let reporter = queue.reporter();
        for i in 0..5 {
            assert!(reporter.report(ReplayError::Execution(format!("failure {i}"))));
        }
        // A clone left alive must not prevent shutdown.
        let _lingering = reporter.clone();

        let seen = queue.close().unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[4], "execution error: failure 4");
    }
}
