//! Deferred reference resolution.
//!
//! References whose endpoints are not indexed yet are parked in one of two
//! collections and drained by scheduled tasks as symbols arrive:
//!
//! - **deferred**: source known, waiting for a target name
//! - **pending**: target known, waiting for the source to be indexed
//!
//! Batches resolve their anchor once and yield periodically. Each entry is
//! taken out of its list before it is linked, so a second batch over the
//! same range, queued while the first one was yielding, skips it.

mod deferred;
mod metrics;
mod processor;
mod task;

pub use deferred::{DeferredReference, PendingDeferredReference, ReferenceLists, ReferenceStore};
pub use metrics::{BatchMetrics, BatchReport, MetricsSnapshot, ResolutionCounters};
pub use processor::{DeferredReferenceProcessor, ResolutionOutcome};
pub use task::{BatchTask, TaskMeta};
