//! Streaming session coordinator.
//!
//! An [`Exchange`] owns the receive side of a [`Session`]: a background pump
//! reads every server event in arrival order, folds it into a
//! [`Conversation`] and then notifies an [`Observer`]. Callers start
//! exchanges, wait for the current response to reach a terminal status and
//! answer function calls through it.
//!
//! The conversation lock is never held while observer callbacks run.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::client_event::ClientEvent;
use crate::conversation::{Conversation, ResponseStatus, ToolCall};
use crate::error::{ApiError, Error, Result, ToolInvocationError};
use crate::event::ServerEvent;
use crate::item::ItemSnapshot;
use crate::session::Session;
use crate::types::{ConversationItem, error_output};

/// Receives merged events. All methods default to no-ops.
pub trait Observer: Send + Sync {
    /// Called after `event` was merged; `item` is the updated item, if the
    /// event addressed one.
    fn on_event(&self, event: &ServerEvent, item: Option<&ItemSnapshot>) {
        let _ = (event, item);
    }

    /// Called once per function call when its arguments are complete.
    fn on_tool_call(&self, call: &ToolCall) {
        let _ = call;
    }

    /// Called for server error events, events that could not be merged and
    /// transport failures.
    fn on_error(&self, error: &Error) {
        let _ = error;
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Progress {
    /// Events taken off the transport, merged or not.
    delivered: u64,
    /// Bumped under the conversation lock by every `expect_response`.
    epoch: u64,
    status: ResponseStatus,
    closed: bool,
}

struct Inner {
    session: Arc<dyn Session>,
    observer: Arc<dyn Observer>,
    state: Mutex<Conversation>,
    progress: watch::Sender<Progress>,
    shutdown: CancellationToken,
}

/// Coordinates one streaming session.
pub struct Exchange {
    inner: Arc<Inner>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl Exchange {
    /// Starts pumping events from `session`. Must be called within a Tokio
    /// runtime.
    pub fn spawn(session: Arc<dyn Session>, observer: Arc<dyn Observer>) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        let inner = Arc::new(Inner {
            session,
            observer,
            state: Mutex::new(Conversation::new()),
            progress,
            shutdown: CancellationToken::new(),
        });
        let pump = tokio::spawn(pump(inner.clone()));
        Self {
            inner,
            pump: StdMutex::new(Some(pump)),
        }
    }

    /// The underlying transport.
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.inner.session
    }

    /// Sends `request` and returns once the server has delivered at least
    /// one event afterwards.
    ///
    /// A `response.create` request also resets the tracked response status,
    /// so a following [`wait_for_terminal`](Self::wait_for_terminal) waits
    /// for the new response instead of returning the previous one.
    pub async fn start(&self, request: ClientEvent, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.inner.progress.subscribe();
        let before = rx.borrow_and_update().delivered;

        if matches!(request, ClientEvent::ResponseCreate { .. }) {
            self.inner.expect_response().await;
        }
        debug!(tag = request.tag(), "starting exchange");
        self.inner.session.send(request).await?;

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = wait_for(&mut rx, |p| p.delivered > before) => result.map(|_| ()),
        }
    }

    /// Merges one event as if the pump had received it.
    ///
    /// Useful for replaying captured events; merge failures are logged and
    /// reported to the observer, never returned.
    pub async fn on_event(&self, event: ServerEvent) {
        self.inner.dispatch(event).await;
    }

    /// Waits until the current response is completed, cancelled, incomplete
    /// or failed.
    ///
    /// On timeout the last observed status is returned. Cancellation yields
    /// [`Error::Cancelled`]; a transport that ends first yields
    /// [`Error::SessionClosed`].
    pub async fn wait_for_terminal(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ResponseStatus> {
        let mut rx = self.inner.progress.subscribe();
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(timeout, wait_for(&mut rx, |p| p.status.is_terminal())) => {
                match result {
                    Ok(progress) => progress.map(|p| p.status),
                    Err(_) => {
                        let status = self.status();
                        debug!(?status, ?timeout, "no terminal status before timeout");
                        Ok(status)
                    }
                }
            }
        }
    }

    /// Submits the outcome of a function call.
    ///
    /// A tool failure is sent as `{"error": message}` so the model can
    /// react to it. With `respond`, a new response is requested right after.
    pub async fn submit_tool_output(
        &self,
        call_id: &str,
        output: std::result::Result<String, ToolInvocationError>,
        respond: bool,
    ) -> Result<()> {
        let call = self.inner.state.lock().await.resolve_tool_call(call_id)?;

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                warn!(call_id, name = %call.name, error = %err, "tool invocation failed");
                self.inner.observer.on_error(&Error::ToolInvocation {
                    call_id: call_id.to_string(),
                    message: err.message.clone(),
                });
                error_output(&err.message)
            }
        };

        let item = ConversationItem::function_call_output(call_id, &output);
        if let Err(err) = self.inner.session.send(ClientEvent::create_item(item)).await {
            self.inner.state.lock().await.requeue_tool_call(call);
            return Err(err);
        }

        if respond {
            self.inner.expect_response().await;
            self.inner.session.send(ClientEvent::create_response(None)).await?;
        }
        Ok(())
    }

    /// Asks the server to stop the in-progress response.
    pub async fn cancel_response(&self) -> Result<()> {
        self.inner.session.send(ClientEvent::cancel_response()).await
    }

    /// Last observed status of the current response.
    pub fn status(&self) -> ResponseStatus {
        self.inner.progress.borrow().status
    }

    /// Returns true once the pump has stopped.
    pub fn is_closed(&self) -> bool {
        self.inner.progress.borrow().closed
    }

    /// Snapshot of one item.
    pub async fn item(&self, id: &str) -> Option<ItemSnapshot> {
        self.inner.state.lock().await.snapshot(id)
    }

    /// Snapshots of all items in conversation order.
    pub async fn snapshot(&self) -> Vec<ItemSnapshot> {
        self.inner.state.lock().await.snapshots()
    }

    /// Function calls still awaiting output.
    pub async fn pending_tool_calls(&self) -> Vec<ToolCall> {
        self.inner.state.lock().await.pending_tool_calls().to_vec()
    }

    pub async fn anomaly_count(&self) -> usize {
        self.inner.state.lock().await.anomaly_count()
    }

    pub async fn last_error(&self) -> Option<ApiError> {
        self.inner.state.lock().await.last_error().cloned()
    }

    /// Runs `f` against the conversation under its lock.
    pub async fn inspect<R>(&self, f: impl FnOnce(&Conversation) -> R) -> R {
        f(&*self.inner.state.lock().await)
    }

    /// Stops the pump and closes the transport.
    pub async fn close(&self) -> Result<()> {
        self.inner.shutdown.cancel();
        let pump = self.pump.lock().ok().and_then(|mut p| p.take());
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                warn!(error = %e, "event pump ended abnormally");
            }
        }
        self.inner.session.close().await
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    async fn expect_response(&self) {
        let mut state = self.state.lock().await;
        state.expect_response();
        self.progress.send_modify(|p| {
            p.epoch += 1;
            p.status = ResponseStatus::NotStarted;
        });
    }

    async fn dispatch(&self, event: ServerEvent) {
        let (merged, item, status, epoch) = {
            let mut state = self.state.lock().await;
            let merged = state.apply(&event);
            let item = match &merged {
                Ok(update) => update.item_id.as_deref().and_then(|id| state.snapshot(id)),
                Err(_) => None,
            };
            let epoch = self.progress.borrow().epoch;
            (merged, item, state.response_status(), epoch)
        };

        match merged {
            Ok(update) => {
                self.observer.on_event(&event, item.as_ref());
                if let ServerEvent::Error(e) = &event {
                    self.observer.on_error(&Error::Api(e.api_error()));
                }
                for call in &update.tool_calls {
                    debug!(call_id = %call.call_id, name = %call.name, "tool call ready");
                    self.observer.on_tool_call(call);
                }
            }
            Err(err) => {
                warn!(tag = event.tag(), error = %err, "event not merged");
                self.observer.on_error(&err);
            }
        }

        // A response requested while the callbacks ran owns the status now.
        self.progress.send_modify(|p| {
            p.delivered += 1;
            if p.epoch == epoch {
                p.status = status;
            }
        });
    }

    fn skip(&self, err: &Error) {
        warn!(error = %err, "skipping server event");
        self.observer.on_error(err);
        self.progress.send_modify(|p| p.delivered += 1);
    }
}

async fn pump(inner: Arc<Inner>) {
    loop {
        let next = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            next = inner.session.recv() => next,
        };
        match next {
            Some(Ok(event)) => inner.dispatch(event).await,
            Some(Err(err)) if err.is_event_local() => inner.skip(&err),
            Some(Err(err)) => {
                error!(error = %err, "transport failed");
                inner.observer.on_error(&err);
                break;
            }
            None => {
                debug!("session closed");
                break;
            }
        }
    }
    inner.progress.send_modify(|p| p.closed = true);
}

async fn wait_for(
    rx: &mut watch::Receiver<Progress>,
    done: impl Fn(&Progress) -> bool,
) -> Result<Progress> {
    loop {
        let progress = *rx.borrow_and_update();
        if done(&progress) {
            return Ok(progress);
        }
        if progress.closed {
            return Err(Error::SessionClosed);
        }
        if rx.changed().await.is_err() {
            return Err(Error::SessionClosed);
        }
    }
}
