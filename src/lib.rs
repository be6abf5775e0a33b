//! # Queue Pipeline
//!
//! A cooperative producer/consumer pipeline built from bounded blocking queues.
//!
//! Items flow `download -> resize -> upload -> done`; every stage is a pool of
//! worker threads sharing one input and one output queue. Shutdown travels
//! through the data itself: the coordinator enqueues one sentinel per worker,
//! waits for the stage's queue to drain, joins its workers, then moves on.
//!
//! ## Modules
//!
//! 1. **queue** - `BoundedQueue<T>`: `Mutex` + `Condvar` FIFO with
//!    `put`/`get`/`mark_done`/`join`
//! 2. **worker** - a thread that transforms items until it sees a sentinel
//! 3. **pipeline** - builder, coordinator and stage-ordered drain
//! 4. **config** - TOML description of a pipeline run
//!
//! ## Example
//!
//! ```
//! use queue_pipeline::Pipeline;
//!
//! let mut pipeline = Pipeline::builder()
//!     .capacity(8)
//!     .stage("double", 2, |x: u32| x * 2)
//!     .stage("inc", 3, |x: u32| x + 1)
//!     .build()?;
//!
//! pipeline.submit(0..100)?;
//! let report = pipeline.shutdown_and_drain()?;
//! assert_eq!(report.processed(), 100);
//! # Ok::<(), queue_pipeline::PipelineError>(())
//! ```
//!
//! ## Running Examples
//!
//! ```bash
//! cargo run --example p1_condvar_queue
//! cargo run --example p2_join_notification
//! cargo run --example p3_bounded_backpressure
//! cargo run --example p4_sentinel_pipeline
//! cargo run --example p5_crossbeam_pipeline
//! ```
//!
//! ## Key Dependencies
//!
//! - `thiserror` - Derive macro for the error enums
//! - `serde` + `toml` - Pipeline configuration files
//! - `log` - Worker lifecycle and drain progress

pub mod config;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod worker;

pub use config::{PipelineConfig, StageConfig};
pub use error::{ConfigError, PipelineError, QueueError, Result};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineReport, PipelineState, StageReport};
pub use queue::{BoundedQueue, Consume, Message};
pub use worker::{Transform, WorkQueue, Worker, WorkerStats};
