//! Connector between an inspection handler and one kernel session.
//!
//! The session itself (process, transport, restart policy) is owned by
//! the host; the connector only holds a shared reference and layers
//! two things on top: a restart notification derived from the status
//! stream, and request/reply correlation for execute requests.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Errors raised on the kernel communication path.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("No kernel found.")]
    NoKernel,

    #[error("Kernel connection closed")]
    Disconnected,

    #[error("Kernel execution failed: {0}")]
    Execution(String),

    #[error("Timed out waiting for kernel reply")]
    Timeout,
}

/// Lifecycle status of the kernel behind a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStatus {
    Starting,
    Idle,
    Busy,
    Restarting,
    AutoRestarting,
    Dead,
}

impl KernelStatus {
    pub fn is_restarting(self) -> bool {
        matches!(self, KernelStatus::Restarting | KernelStatus::AutoRestarting)
    }

    /// Whether the kernel can accept execute requests.
    pub fn is_ready(self) -> bool {
        matches!(self, KernelStatus::Idle | KernelStatus::Busy)
    }
}

/// An execute request as the inspection core issues it.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub code: String,
    pub stop_on_error: bool,
    pub store_history: bool,
    pub silent: bool,
}

/// Completion status of an execute request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// A broadcast message from the kernel, reduced to the kinds the
/// inspection core consumes. Everything else stays opaque.
#[derive(Debug, Clone)]
pub struct KernelMessage {
    pub parent_msg_id: Option<String>,
    pub content: KernelMessageContent,
}

#[derive(Debug, Clone)]
pub enum KernelMessageContent {
    /// Code the kernel started executing (user activity detector).
    ExecuteInput { code: String },
    /// Expression evaluation result; `text` is the text/plain payload.
    ExecuteResult { text: Option<String> },
    /// Kernel execution state change.
    Status(KernelStatus),
    /// An error raised while executing.
    Error { ename: String, evalue: String },
    /// Anything else on the broadcast channel.
    Other { msg_type: String },
}

/// The host-owned kernel session boundary.
///
/// The real implementation speaks ZeroMQ through `runtimelib`
/// ([`crate::session::ZmqKernelSession`]); tests substitute a scripted
/// mock. Implementations must fail `send_execute` with
/// [`ConnectorError::NoKernel`] when no kernel is attached rather than
/// panicking.
#[async_trait]
pub trait KernelSession: Send + Sync {
    /// Resolves once the kernel is ready to accept requests.
    async fn wait_ready(&self) -> Result<(), ConnectorError>;

    /// Watch stream of the kernel's lifecycle status.
    fn status(&self) -> watch::Receiver<KernelStatus>;

    /// Subscribe to the kernel's broadcast (iopub) channel.
    fn iopub(&self) -> broadcast::Receiver<KernelMessage>;

    /// Send an execute request; returns the message id used to
    /// correlate broadcast replies.
    async fn send_execute(&self, request: ExecuteRequest) -> Result<String, ConnectorError>;

    /// Name of the kernel's implementation language.
    async fn kernel_language(&self) -> Result<String, ConnectorError>;

    /// Display name of the kernel.
    fn kernel_name(&self) -> String;
}

/// Handles execute requests and restart notifications for one session.
pub struct KernelConnector {
    session: Arc<dyn KernelSession>,
    restarted_tx: broadcast::Sender<()>,
    status_task: JoinHandle<()>,
}

impl KernelConnector {
    /// Wrap a session, subscribing to its status stream. A transition
    /// into `restarting`/`autorestarting` emits on the
    /// [`kernel_restarted`](Self::kernel_restarted) channel; the
    /// subscriber then awaits [`ready`](Self::ready) again for the new
    /// kernel.
    pub fn new(session: Arc<dyn KernelSession>) -> Self {
        let (restarted_tx, _) = broadcast::channel(8);
        let tx = restarted_tx.clone();
        let mut status_rx = session.status();
        let status_task = tokio::spawn(async move {
            let mut prev = *status_rx.borrow();
            while status_rx.changed().await.is_ok() {
                let now = *status_rx.borrow();
                if now.is_restarting() && !prev.is_restarting() {
                    let _ = tx.send(());
                }
                prev = now;
            }
        });
        Self {
            session,
            restarted_tx,
            status_task,
        }
    }

    /// Resolves when the session's kernel is ready.
    pub async fn ready(&self) -> Result<(), ConnectorError> {
        self.session.wait_ready().await
    }

    /// Emitted whenever the kernel enters a restart.
    pub fn kernel_restarted(&self) -> broadcast::Receiver<()> {
        self.restarted_tx.subscribe()
    }

    /// Subscribe to the kernel's broadcast channel.
    pub fn iopub(&self) -> broadcast::Receiver<KernelMessage> {
        self.session.iopub()
    }

    pub fn kernel_name(&self) -> String {
        self.session.kernel_name()
    }

    pub async fn kernel_language(&self) -> Result<String, ConnectorError> {
        self.session.kernel_language().await
    }

    /// Execute a request, forwarding every broadcast message belonging
    /// to it into `on_message` until the kernel reports idle again.
    ///
    /// The broadcast channel is subscribed *before* the request is
    /// sent, so no reply can slip past the correlation window.
    pub async fn execute_with_callback<F>(
        &self,
        request: ExecuteRequest,
        mut on_message: F,
    ) -> Result<ReplyStatus, ConnectorError>
    where
        F: FnMut(&KernelMessage) + Send,
    {
        let mut iopub = self.session.iopub();
        let msg_id = self.session.send_execute(request).await?;
        let mut status = ReplyStatus::Ok;
        loop {
            match iopub.recv().await {
                Ok(msg) => {
                    if msg.parent_msg_id.as_deref() != Some(msg_id.as_str()) {
                        continue;
                    }
                    match &msg.content {
                        KernelMessageContent::Status(KernelStatus::Idle) => return Ok(status),
                        KernelMessageContent::Status(_) => {}
                        KernelMessageContent::Error { .. } => {
                            status = ReplyStatus::Error;
                            on_message(&msg);
                        }
                        _ => on_message(&msg),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("broadcast channel lagged, skipped {} messages", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ConnectorError::Disconnected)
                }
            }
        }
    }

    /// Execute a request, discarding its broadcast output.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ReplyStatus, ConnectorError> {
        self.execute_with_callback(request, |_| {}).await
    }
}

impl Drop for KernelConnector {
    fn drop(&mut self) {
        self.status_task.abort();
    }
}
