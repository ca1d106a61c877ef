use super::handlers::{ManagerHandler, RequestHandler};
use super::{QueueError, QueueResult, RequestType};
use crate::config::{HandlerConfig, QueueConfig};
use crate::manager::SymbolManager;
use crate::scheduler::{Priority, Scheduler, SharedClock, SystemClock, with_deadline, yield_now};
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

/// Per-call overrides of the registered handler configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequestOptions {
    pub priority: Option<Priority>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

impl RequestOptions {
    pub fn at(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Self::default()
        }
    }

    fn apply(&self, base: HandlerConfig) -> HandlerConfig {
        HandlerConfig {
            priority: self.priority.unwrap_or(base.priority),
            timeout_ms: self
                .timeout
                .map_or(base.timeout_ms, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub retries: u64,
    pub rejected: u64,
    pub in_flight: usize,
    pub queue_depth: usize,
    pub is_shutdown: bool,
}

/// Eventual answer to a submitted request.
///
/// Resolves once the scheduler has run the request. [`try_result`]
/// (Self::try_result) lets synchronous callers check after driving the
/// scheduler themselves.
#[must_use = "dropping the handle discards the answer"]
pub struct RequestHandle {
    request: RequestType,
    receiver: oneshot::Receiver<QueueResult<Value>>,
}

impl RequestHandle {
    pub fn request(&self) -> RequestType {
        self.request
    }

    /// The answer, if the request has finished.
    pub fn try_result(&mut self) -> Option<QueueResult<Value>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(QueueError::Dropped {
                method: self.request.method(),
            })),
        }
    }
}

impl Future for RequestHandle {
    type Output = QueueResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let method = self.request.method();
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QueueError::Dropped { method })))
    }
}

#[derive(Clone)]
struct Registration {
    handler: Rc<dyn RequestHandler>,
    config: HandlerConfig,
}

struct QueueInner {
    manager: SymbolManager,
    scheduler: Scheduler,
    clock: SharedClock,
    handlers: RefCell<HashMap<RequestType, Registration>>,
    stats: RefCell<QueueStats>,
    shutdown: Cell<bool>,
    next_id: Cell<u64>,
}

/// Front door for protocol requests. Clones share one queue.
///
/// Created once per server with the symbol manager it answers from; a
/// handler per [`RequestType`] is registered on construction.
#[derive(Clone)]
pub struct RequestQueueManager {
    inner: Rc<QueueInner>,
}

impl RequestQueueManager {
    pub fn new(manager: SymbolManager, config: &QueueConfig) -> Self {
        Self::with_clock(manager, config, Rc::new(SystemClock))
    }

    pub fn with_clock(manager: SymbolManager, config: &QueueConfig, clock: SharedClock) -> Self {
        let handlers = RequestType::ALL
            .into_iter()
            .map(|request| {
                let registration = Registration {
                    handler: Rc::new(ManagerHandler::new(request)),
                    config: config.handler(request),
                };
                (request, registration)
            })
            .collect();

        tracing::debug!(target: "queue", "registered {} request handlers", RequestType::ALL.len());

        Self {
            inner: Rc::new(QueueInner {
                scheduler: manager.scheduler().clone(),
                manager,
                clock,
                handlers: RefCell::new(handlers),
                stats: RefCell::new(QueueStats::default()),
                shutdown: Cell::new(false),
                next_id: Cell::new(0),
            }),
        }
    }

    pub fn symbol_manager(&self) -> &SymbolManager {
        &self.inner.manager
    }

    /// Replace the handler for a request type, keeping its configuration.
    pub fn register_handler(&self, request: RequestType, handler: Rc<dyn RequestHandler>) {
        let mut handlers = self.inner.handlers.borrow_mut();
        let config = handlers
            .get(&request)
            .map_or_else(|| request.default_config(), |r| r.config);
        handlers.insert(request, Registration { handler, config });
    }

    pub fn handler_config(&self, request: RequestType) -> HandlerConfig {
        self.inner
            .handlers
            .borrow()
            .get(&request)
            .map_or_else(|| request.default_config(), |r| r.config)
    }

    /// Schedule a request. Fails only once the queue has been shut down.
    pub fn submit_request(
        &self,
        request: RequestType,
        params: Value,
        options: RequestOptions,
    ) -> QueueResult<RequestHandle> {
        if self.inner.shutdown.get() {
            self.inner.stats.borrow_mut().rejected += 1;
            return Err(QueueError::Shutdown);
        }

        let registration = self
            .inner
            .handlers
            .borrow()
            .get(&request)
            .cloned()
            .unwrap_or_else(|| Registration {
                handler: Rc::new(ManagerHandler::new(request)),
                config: request.default_config(),
            });
        let config = options.apply(registration.config);

        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        {
            let mut stats = self.inner.stats.borrow_mut();
            stats.submitted += 1;
            stats.in_flight += 1;
        }

        let (sender, receiver) = oneshot::channel();
        let inner = Rc::clone(&self.inner);
        let label = format!("{}#{id}", request.method());
        self.inner.scheduler.offer(config.priority, label, async move {
            let result = if inner.shutdown.get() {
                Err(QueueError::Shutdown)
            } else {
                execute(&inner, request, registration.handler, params, config).await
            };
            inner.finish(&result);
            // Receiver may be gone if the caller dropped the handle
            let _ = sender.send(result);
        });

        Ok(RequestHandle { request, receiver })
    }

    pub fn submit_hover_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::Hover, params, RequestOptions::default())
    }

    pub fn submit_completion_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::Completion, params, RequestOptions::default())
    }

    pub fn submit_definition_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::Definition, params, RequestOptions::default())
    }

    pub fn submit_references_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::References, params, RequestOptions::default())
    }

    pub fn submit_document_symbol_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::DocumentSymbol, params, RequestOptions::default())
    }

    pub fn submit_workspace_symbol_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::WorkspaceSymbol, params, RequestOptions::default())
    }

    pub fn submit_diagnostics_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::Diagnostics, params, RequestOptions::default())
    }

    pub fn submit_code_action_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::CodeAction, params, RequestOptions::default())
    }

    pub fn submit_rename_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::Rename, params, RequestOptions::default())
    }

    pub fn submit_document_open_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::DocumentOpen, params, RequestOptions::default())
    }

    pub fn submit_document_save_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::DocumentSave, params, RequestOptions::default())
    }

    pub fn submit_document_change_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::DocumentChange, params, RequestOptions::default())
    }

    pub fn submit_document_close_request(&self, params: Value) -> QueueResult<RequestHandle> {
        self.submit_request(RequestType::DocumentClose, params, RequestOptions::default())
    }

    pub fn get_stats(&self) -> QueueStats {
        let mut stats = *self.inner.stats.borrow();
        stats.queue_depth = self.inner.scheduler.queue_depth();
        stats.is_shutdown = self.inner.shutdown.get();
        stats
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.get()
    }

    /// Stop accepting requests. Requests already queued answer with
    /// [`QueueError::Shutdown`] when they reach the front. Returns false if
    /// the queue was already shut down.
    pub fn shutdown(&self) -> bool {
        if self.inner.shutdown.replace(true) {
            return false;
        }
        crate::log_event!("queue", "shutdown", "{} requests in flight", self.inner.stats.borrow().in_flight);
        true
    }
}

impl QueueInner {
    fn finish(&self, result: &QueueResult<Value>) {
        let mut stats = self.stats.borrow_mut();
        stats.in_flight = stats.in_flight.saturating_sub(1);
        match result {
            Ok(_) => stats.completed += 1,
            Err(_) => stats.failed += 1,
        }
    }
}

/// Run the handler under a cooperative deadline, retrying failures and
/// timeouts up to `max_retries` times.
async fn execute(
    inner: &QueueInner,
    request: RequestType,
    handler: Rc<dyn RequestHandler>,
    params: Value,
    config: HandlerConfig,
) -> QueueResult<Value> {
    let method = request.method();
    let mut attempt = 0;

    loop {
        let answer = handler.handle(params.clone(), inner.manager.clone());
        let error = match with_deadline(Rc::clone(&inner.clock), config.timeout(), answer).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => QueueError::Handler {
                method,
                reason: format!("{e:#}"),
            },
            Err(elapsed) => {
                inner.stats.borrow_mut().timed_out += 1;
                QueueError::Timeout {
                    method,
                    timeout: elapsed.0,
                }
            }
        };

        if attempt >= config.max_retries {
            tracing::warn!(target: "queue", "{error} (after {} attempts)", attempt + 1);
            return Err(error);
        }
        attempt += 1;
        inner.stats.borrow_mut().retries += 1;
        tracing::debug!(target: "queue", "{error}, retry {attempt}/{}", config.max_retries);
        yield_now().await;
    }
}
