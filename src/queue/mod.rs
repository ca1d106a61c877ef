//! Request queue facade consumed by the protocol layer.
//!
//! Every request type is bound to a handler and a [`HandlerConfig`]
//! (priority, timeout, retries). Submitting a request schedules it on the
//! shared [`Scheduler`](crate::scheduler::Scheduler) and hands back a
//! [`RequestHandle`] that resolves to the handler's JSON answer.

mod handlers;
mod manager;
mod workspace;

pub use handlers::{ManagerHandler, RequestHandler};
pub use manager::{QueueStats, RequestHandle, RequestOptions, RequestQueueManager};
pub use workspace::{WorkspaceLoadCoordinator, WorkspaceLoadStats, WorkspaceLoader};

use crate::config::HandlerConfig;
use crate::scheduler::Priority;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Requests the protocol layer forwards to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    Hover,
    Completion,
    Definition,
    References,
    DocumentSymbol,
    WorkspaceSymbol,
    Diagnostics,
    CodeAction,
    Rename,
    DocumentOpen,
    DocumentSave,
    DocumentChange,
    DocumentClose,
}

impl RequestType {
    pub const ALL: [RequestType; 13] = [
        RequestType::Hover,
        RequestType::Completion,
        RequestType::Definition,
        RequestType::References,
        RequestType::DocumentSymbol,
        RequestType::WorkspaceSymbol,
        RequestType::Diagnostics,
        RequestType::CodeAction,
        RequestType::Rename,
        RequestType::DocumentOpen,
        RequestType::DocumentSave,
        RequestType::DocumentChange,
        RequestType::DocumentClose,
    ];

    /// LSP method name.
    pub fn method(&self) -> &'static str {
        match self {
            RequestType::Hover => "textDocument/hover",
            RequestType::Completion => "textDocument/completion",
            RequestType::Definition => "textDocument/definition",
            RequestType::References => "textDocument/references",
            RequestType::DocumentSymbol => "textDocument/documentSymbol",
            RequestType::WorkspaceSymbol => "workspace/symbol",
            RequestType::Diagnostics => "textDocument/diagnostic",
            RequestType::CodeAction => "textDocument/codeAction",
            RequestType::Rename => "textDocument/rename",
            RequestType::DocumentOpen => "textDocument/didOpen",
            RequestType::DocumentSave => "textDocument/didSave",
            RequestType::DocumentChange => "textDocument/didChange",
            RequestType::DocumentClose => "textDocument/didClose",
        }
    }

    pub fn from_method(method: &str) -> Option<RequestType> {
        Self::ALL.into_iter().find(|r| r.method() == method)
    }

    /// Interactive lookups first, heavy or optional work last.
    pub fn priority(&self) -> Priority {
        match self {
            RequestType::Hover | RequestType::Completion | RequestType::DocumentClose => {
                Priority::Immediate
            }
            RequestType::Definition | RequestType::DocumentOpen | RequestType::DocumentSymbol => {
                Priority::High
            }
            RequestType::References
            | RequestType::WorkspaceSymbol
            | RequestType::Diagnostics
            | RequestType::DocumentSave
            | RequestType::DocumentChange => Priority::Normal,
            RequestType::CodeAction | RequestType::Rename => Priority::Low,
        }
    }

    pub fn default_config(&self) -> HandlerConfig {
        let priority = self.priority();
        let (timeout_ms, max_retries) = match priority {
            Priority::Immediate => (2_000, 0),
            Priority::High => (5_000, 1),
            Priority::Normal => (10_000, 2),
            Priority::Low | Priority::Background => (30_000, 1),
        };
        HandlerConfig {
            priority,
            timeout_ms,
            max_retries,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("request queue has been shut down")]
    Shutdown,

    #[error("{method} timed out after {timeout:?}")]
    Timeout {
        method: &'static str,
        timeout: Duration,
    },

    #[error("{method} failed: {reason}")]
    Handler { method: &'static str, reason: String },

    #[error("{method} was dropped before it completed")]
    Dropped { method: &'static str },
}

pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_mapping() {
        assert_eq!(RequestType::Hover.priority(), Priority::Immediate);
        assert_eq!(RequestType::DocumentClose.priority(), Priority::Immediate);
        assert_eq!(RequestType::DocumentOpen.priority(), Priority::High);
        assert_eq!(RequestType::DocumentChange.priority(), Priority::Normal);
        assert_eq!(RequestType::Rename.priority(), Priority::Low);
    }

    #[test]
    fn test_method_round_trip() {
        for request in RequestType::ALL {
            assert_eq!(RequestType::from_method(request.method()), Some(request));
        }
        assert_eq!(RequestType::from_method("textDocument/unknown"), None);
    }
}
