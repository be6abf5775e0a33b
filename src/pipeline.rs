//! Multi-stage pipeline coordinator.
//!
//! A pipeline of `n` stages owns `n + 1` queues. Stage `i` reads queue `i`
//! and writes queue `i + 1`; the last queue collects results and is
//! unbounded, since nothing consumes it until the drain finishes.
//!
//! Shutdown goes stage by stage: close the stage's input once per worker,
//! `join` that queue, join the worker threads, then move downstream. A stage
//! is never closed while an upstream worker could still feed it.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::queue::{BoundedQueue, Message};
use crate::worker::{Transform, WorkQueue, Worker, WorkerStats};

pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Queues allocated, workers being spawned.
    Assembled,
    Running,
    /// Shutdown markers have reached the stage at this index.
    Draining(usize),
    Terminated,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Assembled => write!(f, "assembled"),
            PipelineState::Running => write!(f, "running"),
            PipelineState::Draining(stage) => write!(f, "draining stage {stage}"),
            PipelineState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Aggregated worker counters for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    pub workers: usize,
    pub processed: usize,
    pub polled: usize,
}

#[derive(Debug)]
pub struct PipelineReport<T> {
    /// Everything the last stage produced, in final-queue order.
    pub outputs: Vec<T>,
    pub stages: Vec<StageReport>,
}

impl<T> PipelineReport<T> {
    pub fn processed(&self) -> usize {
        self.outputs.len()
    }

    pub fn polled(&self) -> usize {
        self.stages.iter().map(|stage| stage.polled).sum()
    }
}

struct StageSpec<T> {
    name: String,
    workers: usize,
    transform: Transform<T>,
}

pub struct PipelineBuilder<T> {
    capacity: usize,
    stages: Vec<StageSpec<T>>,
}

impl<T> Default for PipelineBuilder<T> {
    fn default() -> Self {
        PipelineBuilder {
            capacity: DEFAULT_CAPACITY,
            stages: Vec::new(),
        }
    }
}

impl<T: Send + 'static> PipelineBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity of every inter-stage queue.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Append a stage run by `workers` threads sharing `transform`.
    pub fn stage<F>(self, name: impl Into<String>, workers: usize, transform: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.stage_transform(name, workers, Arc::new(transform))
    }

    pub fn stage_transform(
        mut self,
        name: impl Into<String>,
        workers: usize,
        transform: Transform<T>,
    ) -> Self {
        self.stages.push(StageSpec {
            name: name.into(),
            workers,
            transform,
        });
        self
    }

    fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(PipelineError::NoStages);
        }
        if self.capacity == 0 {
            return Err(PipelineError::ZeroCapacity);
        }
        if let Some(stage) = self.stages.iter().find(|stage| stage.workers == 0) {
            return Err(PipelineError::NoWorkers {
                stage: stage.name.clone(),
            });
        }
        Ok(())
    }

    /// Allocate the queues and start every worker.
    ///
    /// # Errors
    ///
    /// Fails on an empty stage list, a zero capacity, a stage without
    /// workers, or when the OS refuses to spawn a thread. In the last case the
    /// workers already started are shut down before returning.
    pub fn build(self) -> Result<Pipeline<T>> {
        self.validate()?;

        let mut queues: Vec<WorkQueue<T>> = Vec::with_capacity(self.stages.len() + 1);
        for _ in &self.stages {
            let queue = BoundedQueue::new(self.capacity)
                .map_err(|_| PipelineError::ZeroCapacity)?;
            queues.push(Arc::new(queue));
        }
        queues.push(Arc::new(BoundedQueue::unbounded()));

        let mut pipeline = Pipeline {
            queues,
            stages: Vec::with_capacity(self.stages.len()),
            reports: Vec::new(),
            closed: 0,
            state: PipelineState::Assembled,
        };
        log::info!(
            "pipeline assembled: {} stages, capacity {}",
            self.stages.len(),
            self.capacity
        );

        for (index, spec) in self.stages.into_iter().enumerate() {
            let mut group = StageGroup {
                name: spec.name,
                workers: spec.workers,
                handles: Vec::with_capacity(spec.workers),
                settled: WorkerStats::default(),
                panicked: None,
            };
            for worker in 0..spec.workers {
                let spawned = Worker::new(
                    format!("{}-{}", group.name, worker),
                    Arc::clone(&spec.transform),
                    Arc::clone(&pipeline.queues[index]),
                    Arc::clone(&pipeline.queues[index + 1]),
                )
                .spawn();
                match spawned {
                    Ok(handle) => group.handles.push((worker, handle)),
                    Err(err) => {
                        let error = PipelineError::Spawn {
                            stage: group.name.clone(),
                            worker,
                            reason: err.to_string(),
                        };
                        pipeline.stages.push(group);
                        pipeline.abort_spawned();
                        return Err(error);
                    }
                }
            }
            pipeline.stages.push(group);
        }

        pipeline.transition(PipelineState::Running);
        Ok(pipeline)
    }
}

struct StageGroup {
    name: String,
    workers: usize,
    handles: Vec<(usize, JoinHandle<WorkerStats>)>,
    // Counters of workers already joined, and the first of them found dead.
    settled: WorkerStats,
    panicked: Option<usize>,
}

impl StageGroup {
    fn reap(&mut self, worker: usize, handle: JoinHandle<WorkerStats>) {
        match handle.join() {
            Ok(stats) => {
                self.settled.processed += stats.processed;
                self.settled.polled += stats.polled;
            }
            Err(_) => {
                log::warn!("worker {worker} of stage '{}' panicked", self.name);
                self.panicked.get_or_insert(worker);
            }
        }
    }

    fn panic_error(&self) -> Option<PipelineError> {
        self.panicked.map(|worker| PipelineError::WorkerPanicked {
            stage: self.name.clone(),
            worker,
        })
    }
}

/// A running set of stages, created by [`PipelineBuilder::build`].
///
/// Workers only exit on a shutdown marker. Dropping a pipeline that was never
/// drained sends none, so its worker threads stay blocked in `get` for the
/// rest of the process; always finish with
/// [`shutdown_and_drain`](Self::shutdown_and_drain) or its timed variant.
pub struct Pipeline<T> {
    queues: Vec<WorkQueue<T>>,
    stages: Vec<StageGroup>,
    reports: Vec<StageReport>,
    // Stages whose input has already received its shutdown markers.
    closed: usize,
    state: PipelineState,
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn builder() -> PipelineBuilder<T> {
        PipelineBuilder::new()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// The queue feeding stage `index`, or the final output queue when
    /// `index == stage_count()`.
    pub fn queue(&self, index: usize) -> Option<&WorkQueue<T>> {
        self.queues.get(index)
    }

    fn transition(&mut self, next: PipelineState) {
        log::info!("pipeline {} -> {}", self.state, next);
        self.state = next;
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state {
            PipelineState::Running => Ok(()),
            PipelineState::Terminated => Err(PipelineError::AlreadyTerminated),
            state => Err(PipelineError::NotRunning {
                state: state.to_string(),
            }),
        }
    }

    pub fn submit_one(&self, item: T) -> Result<()> {
        self.ensure_running()?;
        self.queues[0].put_item(item);
        Ok(())
    }

    /// Feed `items` to the first stage, blocking whenever its queue is full.
    /// Returns how many items were submitted.
    pub fn submit<I>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
    {
        self.ensure_running()?;
        let mut count = 0;
        for item in items {
            self.queues[0].put_item(item);
            count += 1;
        }
        Ok(count)
    }

    /// Shut every stage down in order and collect the results.
    ///
    /// Blocks until each stage has drained. If a transform panicked, its item
    /// is never marked done and this call does not return; use
    /// [`shutdown_and_drain_timeout`](Self::shutdown_and_drain_timeout) to
    /// diagnose such a hang.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AlreadyTerminated`] on a second call, or
    /// [`PipelineError::WorkerPanicked`] if a worker thread died after its
    /// stage drained.
    pub fn shutdown_and_drain(&mut self) -> Result<PipelineReport<T>> {
        self.drain_stages(None)
    }

    /// Like [`shutdown_and_drain`](Self::shutdown_and_drain), but waits at
    /// most `limit` for each stage's queue to drain.
    ///
    /// On timeout the pipeline stays in [`PipelineState::Draining`] and the
    /// call may be retried; markers already sent are not sent twice.
    ///
    /// # Errors
    ///
    /// [`PipelineError::WorkerPanicked`] when the stalled stage has a dead
    /// worker, otherwise [`PipelineError::DrainTimedOut`].
    pub fn shutdown_and_drain_timeout(&mut self, limit: Duration) -> Result<PipelineReport<T>> {
        self.drain_stages(Some(limit))
    }

    fn drain_stages(&mut self, limit: Option<Duration>) -> Result<PipelineReport<T>> {
        let start = match self.state {
            PipelineState::Running => 0,
            PipelineState::Draining(stage) => stage,
            PipelineState::Terminated => return Err(PipelineError::AlreadyTerminated),
            PipelineState::Assembled => {
                return Err(PipelineError::NotRunning {
                    state: self.state.to_string(),
                })
            }
        };

        for index in start..self.stages.len() {
            if self.state != PipelineState::Draining(index) {
                self.transition(PipelineState::Draining(index));
            }
            self.close_stage(index);

            let input = &self.queues[index];
            match limit {
                None => input.join(),
                Some(limit) => {
                    if !input.join_timeout(limit) {
                        return Err(self.diagnose_stall(index));
                    }
                }
            }

            let report = self.join_stage(index)?;
            self.reports.push(report);
        }

        let outputs = self
            .queues
            .last()
            .map(|queue| queue.drain())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| match message {
                Message::Item(item) => Some(item),
                Message::Shutdown => None,
            })
            .collect();

        self.transition(PipelineState::Terminated);
        Ok(PipelineReport {
            outputs,
            stages: std::mem::take(&mut self.reports),
        })
    }

    fn close_stage(&mut self, index: usize) {
        if index < self.closed {
            return;
        }
        let group = &self.stages[index];
        for _ in 0..group.workers {
            self.queues[index].close();
        }
        log::debug!(
            "sent {} shutdown markers to stage '{}'",
            group.workers,
            group.name
        );
        self.closed = index + 1;
    }

    fn join_stage(&mut self, index: usize) -> Result<StageReport> {
        let group = &mut self.stages[index];
        for (worker, handle) in std::mem::take(&mut group.handles) {
            group.reap(worker, handle);
        }
        if let Some(err) = group.panic_error() {
            return Err(err);
        }
        let report = StageReport {
            name: group.name.clone(),
            workers: group.workers,
            processed: group.settled.processed,
            polled: group.settled.polled,
        };
        log::debug!(
            "stage '{}' drained: {} items, {} polls",
            report.name,
            report.processed,
            report.polled
        );
        Ok(report)
    }

    // A worker that exits before its stage drains either panicked or took a
    // marker meant for a stalled peer. Every finished worker is joined here;
    // the counters of clean exits are kept for the retry.
    fn diagnose_stall(&mut self, index: usize) -> PipelineError {
        let group = &mut self.stages[index];
        log::warn!(
            "stage '{}' still has {} unfinished items",
            group.name,
            self.queues[index].outstanding()
        );

        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut group.handles)
            .into_iter()
            .partition(|(_, handle)| handle.is_finished());
        group.handles = running;
        for (worker, handle) in finished {
            group.reap(worker, handle);
        }
        group
            .panic_error()
            .unwrap_or_else(|| PipelineError::DrainTimedOut {
                stage: group.name.clone(),
            })
    }

    // Only used while building: nothing has been submitted yet, so closing
    // each stage in order lets every spawned worker exit.
    fn abort_spawned(&mut self) {
        for (index, group) in self.stages.iter_mut().enumerate() {
            for _ in &group.handles {
                self.queues[index].close();
            }
            for (worker, handle) in std::mem::take(&mut group.handles) {
                group.reap(worker, handle);
            }
        }
        self.transition(PipelineState::Terminated);
    }
}

impl<T> Drop for Pipeline<T> {
    fn drop(&mut self) {
        if self.state != PipelineState::Terminated {
            log::warn!(
                "pipeline dropped while {}; its workers stay blocked",
                self.state
            );
        }
    }
}
