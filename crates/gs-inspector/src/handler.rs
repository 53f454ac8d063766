//! The per-notebook inspection state machine.
//!
//! One handler is created per notebook session and keyed by the
//! session path. It initializes the kernel with the introspection
//! helpers, then watches the kernel's broadcast channel: any code
//! execution other than its own query command triggers a fresh
//! inspection. A kernel restart produces an immediate placeholder
//! update, re-initialization once the new kernel is ready, and one
//! follow-up inspection.
//!
//! State machine:
//! `uninitialized → initializing → listening ⇄ querying`;
//! restart: `* → restarting → initializing`;
//! `* → disposed` (terminal, idempotent).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use log::{debug, info, warn};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::connector::{
    ExecuteRequest, KernelConnector, KernelMessageContent, ReplyStatus,
};
use crate::variable::{parse_inspection_reply, InspectorUpdate, UpdateTitle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Uninitialized,
    Initializing,
    Listening,
    Querying,
    Restarting,
    Disposed,
}

/// Instantiation options for an inspection handler.
pub struct HandlerOptions {
    /// Notebook-session path, unique per notebook.
    pub id: String,
    pub connector: KernelConnector,
    pub init_script: String,
    pub query_command: String,
}

/// Handler driving inspections for one notebook's kernel.
pub struct VariableInspectionHandler {
    inner: Arc<HandlerInner>,
    event_loop: StdMutex<Option<JoinHandle<()>>>,
}

struct HandlerInner {
    id: String,
    connector: KernelConnector,
    init_script: String,
    query_command: String,
    inspected_tx: broadcast::Sender<InspectorUpdate>,
    disposed_tx: broadcast::Sender<()>,
    disposed: AtomicBool,
    ready_tx: watch::Sender<bool>,
    state_tx: watch::Sender<HandlerState>,
    /// Serializes inspection queries so overlapping triggers cannot
    /// produce out-of-order updates.
    inspect_gate: Mutex<()>,
}

impl VariableInspectionHandler {
    pub fn new(options: HandlerOptions) -> Arc<Self> {
        let (inspected_tx, _) = broadcast::channel(64);
        let (disposed_tx, _) = broadcast::channel(4);
        let (ready_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(HandlerState::Uninitialized);

        let inner = Arc::new(HandlerInner {
            id: options.id,
            connector: options.connector,
            init_script: options.init_script,
            query_command: options.query_command,
            inspected_tx,
            disposed_tx,
            disposed: AtomicBool::new(false),
            ready_tx,
            state_tx,
            inspect_gate: Mutex::new(()),
        });

        let event_loop = tokio::spawn(HandlerInner::run(inner.clone()));
        Arc::new(Self {
            inner,
            event_loop: StdMutex::new(Some(event_loop)),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Signal carrying inspection results.
    pub fn inspected(&self) -> broadcast::Receiver<InspectorUpdate> {
        self.inner.inspected_tx.subscribe()
    }

    /// Signal emitted exactly once when the handler is disposed.
    pub fn disposed(&self) -> broadcast::Receiver<()> {
        self.inner.disposed_tx.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn state(&self) -> HandlerState {
        *self.inner.state_tx.borrow()
    }

    /// Resolves once the kernel has been initialized with the
    /// introspection helpers, or once the handler is disposed (a
    /// kernel that never comes up must not strand callers).
    pub async fn ready(&self) {
        let mut rx = self.inner.ready_tx.subscribe();
        let mut disposed = self.inner.disposed_tx.subscribe();
        if self.inner.is_disposed() {
            return;
        }
        tokio::select! {
            _ = rx.wait_for(|ready| *ready) => {}
            _ = disposed.recv() => {}
        }
    }

    /// Run one inspection query now.
    pub async fn perform_inspection(&self) {
        self.inner.perform_inspection().await;
    }

    /// Dispose the handler. Idempotent; emits the disposed signal once
    /// and stops the event loop. In-flight replies arriving afterwards
    /// are dropped.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.event_loop.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
        let _ = self.inner.state_tx.send(HandlerState::Disposed);
        let _ = self.inner.disposed_tx.send(());
        info!("inspection handler disposed: {}", self.inner.id);
    }
}

impl Drop for VariableInspectionHandler {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl HandlerInner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Terminal exit from inside the event loop: flips the disposed
    /// flag so ready() waiters unblock and panels drop the source.
    fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.state_tx.send(HandlerState::Disposed);
        let _ = self.disposed_tx.send(());
    }

    fn set_state(&self, state: HandlerState) {
        if !self.is_disposed() {
            let _ = self.state_tx.send(state);
        }
    }

    /// Emit an update unless the handler was disposed in the meantime.
    fn emit(&self, update: InspectorUpdate) {
        if self.is_disposed() {
            debug!("dropping update for disposed handler {}", self.id);
            return;
        }
        let _ = self.inspected_tx.send(update);
    }

    async fn run(inner: Arc<Self>) {
        let mut restarted = inner.connector.kernel_restarted();
        let mut resuming_from_restart = false;

        loop {
            inner.set_state(HandlerState::Initializing);
            // Subscribed before ready is reported, so activity right
            // after ready() cannot slip past the loop below.
            let mut iopub = inner.connector.iopub();
            if let Err(e) = inner.connector.ready().await {
                warn!("kernel for {} never became ready: {}", inner.id, e);
                inner.shutdown();
                return;
            }
            inner.init_on_kernel().await;
            let _ = inner.ready_tx.send(true);
            inner.set_state(HandlerState::Listening);

            if resuming_from_restart {
                inner.perform_inspection().await;
            }

            loop {
                tokio::select! {
                    msg = iopub.recv() => match msg {
                        Ok(msg) => {
                            if let KernelMessageContent::ExecuteInput { code } = msg.content {
                                if code != inner.query_command {
                                    inner.perform_inspection().await;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("handler {} lagged on broadcast, skipped {}", inner.id, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("broadcast channel closed for {}", inner.id);
                            inner.shutdown();
                            return;
                        }
                    },
                    restart = restarted.recv() => match restart {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => {
                            inner.shutdown();
                            return;
                        }
                    },
                }
            }

            // Kernel restart: show a transient placeholder right away,
            // then go back to initialization once the new kernel is up.
            inner.set_state(HandlerState::Restarting);
            info!("kernel restarting for {}", inner.id);
            inner.emit(InspectorUpdate {
                title: UpdateTitle {
                    kernel_name: None,
                    context_name: Some("Restarting kernel".to_string()),
                },
                payload: Vec::new(),
            });
            resuming_from_restart = true;
        }
    }

    /// Run the init script on the kernel. Silent and best-effort:
    /// failures are logged, never surfaced to the user.
    async fn init_on_kernel(&self) {
        let request = ExecuteRequest {
            code: self.init_script.clone(),
            stop_on_error: false,
            store_history: false,
            silent: true,
        };
        match self.connector.execute(request).await {
            Ok(ReplyStatus::Ok) => debug!("kernel initialized for {}", self.id),
            Ok(ReplyStatus::Error) => warn!("init script failed on kernel for {}", self.id),
            Err(e) => warn!("could not initialize kernel for {}: {}", self.id, e),
        }
    }

    async fn perform_inspection(&self) {
        if self.is_disposed() {
            return;
        }
        let _gate = self.inspect_gate.lock().await;
        self.set_state(HandlerState::Querying);

        let request = ExecuteRequest {
            code: self.query_command.clone(),
            stop_on_error: false,
            store_history: false,
            silent: false,
        };
        let mut result_text: Option<String> = None;
        let outcome = self
            .connector
            .execute_with_callback(request, |msg| {
                if let KernelMessageContent::ExecuteResult { text } = &msg.content {
                    result_text = text.clone();
                }
            })
            .await;

        match outcome {
            Ok(ReplyStatus::Ok) => {
                let raw = result_text.unwrap_or_default();
                match parse_inspection_reply(&raw) {
                    Ok(payload) => self.emit(InspectorUpdate {
                        title: UpdateTitle {
                            kernel_name: Some(self.connector.kernel_name()),
                            context_name: None,
                        },
                        payload,
                    }),
                    Err(e) => {
                        // Keep the previous UI state rather than crash
                        // the subscriber chain.
                        warn!("dropping inspection update for {}: {}", self.id, e);
                    }
                }
            }
            Ok(ReplyStatus::Error) => {
                debug!("inspection query errored on kernel for {}", self.id);
            }
            Err(e) => {
                warn!("inspection query failed for {}: {}", self.id, e);
            }
        }

        self.set_state(HandlerState::Listening);
    }
}
