//! Units of resolution work handed to the scheduler.

use super::deferred::{DeferredReference, PendingDeferredReference};
use crate::scheduler::Priority;
use std::time::Instant;

/// Scheduling metadata shared by every task variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskMeta {
    pub priority: Priority,
    pub retry_count: u32,
    pub first_attempt_at: Instant,
}

impl TaskMeta {
    pub fn new(priority: Priority, now: Instant) -> Self {
        Self {
            priority,
            retry_count: 0,
            first_attempt_at: now,
        }
    }

    /// Metadata for the next attempt: background priority, one more retry.
    pub fn retried(self) -> Self {
        Self {
            priority: Priority::Background,
            retry_count: self.retry_count + 1,
            first_attempt_at: self.first_attempt_at,
        }
    }
}

/// Resolution work. Single-item variants own their entry, which has already
/// been taken out of its collection; batch variants point at a range of the
/// owning name's list.
#[derive(Debug, Clone)]
pub enum BatchTask {
    Deferred {
        target_name: String,
        reference: DeferredReference,
        meta: TaskMeta,
    },
    PendingDeferred {
        source_name: String,
        reference: PendingDeferredReference,
        meta: TaskMeta,
    },
    DeferredBatch {
        target_name: String,
        start: usize,
        end: usize,
        batch_id: u64,
        meta: TaskMeta,
    },
    PendingDeferredBatch {
        source_name: String,
        start: usize,
        end: usize,
        batch_id: u64,
        meta: TaskMeta,
    },
}

impl BatchTask {
    pub fn meta(&self) -> &TaskMeta {
        match self {
            BatchTask::Deferred { meta, .. }
            | BatchTask::PendingDeferred { meta, .. }
            | BatchTask::DeferredBatch { meta, .. }
            | BatchTask::PendingDeferredBatch { meta, .. } => meta,
        }
    }

    pub fn priority(&self) -> Priority {
        self.meta().priority
    }

    /// The name whose list this task works on.
    pub fn name(&self) -> &str {
        match self {
            BatchTask::Deferred { target_name, .. } | BatchTask::DeferredBatch { target_name, .. } => {
                target_name
            }
            BatchTask::PendingDeferred { source_name, .. }
            | BatchTask::PendingDeferredBatch { source_name, .. } => source_name,
        }
    }

    /// Label shown in scheduler logs.
    pub fn label(&self) -> String {
        match self {
            BatchTask::Deferred { target_name, meta, .. } => {
                format!("deferred:{target_name} (retry {})", meta.retry_count)
            }
            BatchTask::PendingDeferred { source_name, meta, .. } => {
                format!("pending:{source_name} (retry {})", meta.retry_count)
            }
            BatchTask::DeferredBatch {
                target_name,
                start,
                end,
                batch_id,
                ..
            } => format!("deferred-batch#{batch_id}:{target_name}[{start}..{end})"),
            BatchTask::PendingDeferredBatch {
                source_name,
                start,
                end,
                batch_id,
                ..
            } => format!("pending-batch#{batch_id}:{source_name}[{start}..{end})"),
        }
    }
}
