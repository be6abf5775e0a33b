use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::queue::{BoundedQueue, Message};

/// A stage's transformation, shared by every worker of that stage.
pub type Transform<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Queue of work items terminated by [`Message::Shutdown`].
pub type WorkQueue<T> = Arc<BoundedQueue<Message<T>>>;

/// Counters owned by a single worker thread, handed back when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Items transformed and forwarded.
    pub processed: usize,
    /// Dequeues performed, including the one that saw the sentinel.
    pub polled: usize,
}

/// Pulls from `input`, transforms, pushes to `output` until it receives a
/// shutdown sentinel.
pub struct Worker<T> {
    name: String,
    transform: Transform<T>,
    input: WorkQueue<T>,
    output: WorkQueue<T>,
}

impl<T> fmt::Debug for Worker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker").field("name", &self.name).finish()
    }
}

impl<T: Send + 'static> Worker<T> {
    pub fn new(
        name: impl Into<String>,
        transform: Transform<T>,
        input: WorkQueue<T>,
        output: WorkQueue<T>,
    ) -> Self {
        Worker {
            name: name.into(),
            transform,
            input,
            output,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the processing loop on the current thread.
    ///
    /// The result is forwarded before the input item is marked done, so once
    /// the input queue's `join` returns every result is already downstream.
    /// A panicking transform unwinds straight out of this loop; the item it
    /// was holding is never marked done.
    pub fn run(self) -> WorkerStats {
        log::debug!("worker {} started", self.name);

        let mut stats = WorkerStats::default();
        let mut items = self.input.consume();
        for item in items.by_ref() {
            let result = (self.transform)(item);
            self.output.put_item(result);
            stats.processed += 1;
        }
        stats.polled = items.polled();

        log::debug!(
            "worker {} stopped after {} items ({} polls)",
            self.name,
            stats.processed,
            stats.polled
        );
        stats
    }

    /// Start [`run`](Self::run) on a new thread named after the worker.
    pub fn spawn(self) -> io::Result<JoinHandle<WorkerStats>> {
        thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || self.run())
    }
}
