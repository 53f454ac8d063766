//! ZeroMQ-backed kernel session.
//!
//! Connects to an already-running kernel through its Jupyter connection
//! file and adapts the wire protocol onto the [`KernelSession`] trait:
//! one task pumps the iopub socket into a broadcast channel and the
//! status watch, another serializes shell requests.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use jupyter_protocol::{
    ConnectionInfo, ExecutionState, JupyterMessage, JupyterMessageContent, KernelInfoRequest,
    MediaType,
};
use log::{debug, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::connector::{
    ConnectorError, ExecuteRequest, KernelMessage, KernelMessageContent, KernelSession,
    KernelStatus,
};

const KERNEL_INFO_TIMEOUT: Duration = Duration::from_secs(30);

enum ShellCommand {
    Execute {
        message: JupyterMessage,
        sent: oneshot::Sender<Result<(), ConnectorError>>,
    },
    KernelInfo {
        reply: oneshot::Sender<Result<String, ConnectorError>>,
    },
}

/// Waiters for in-flight kernel-info requests on the shell channel.
///
/// The shell socket also carries execute replies; those are already
/// correlated over iopub, so they resolve nothing here and are simply
/// consumed. Not consuming them would leave them queued on the socket.
#[derive(Default)]
struct ShellReplies {
    pending: Vec<oneshot::Sender<Result<String, ConnectorError>>>,
}

impl ShellReplies {
    fn push(&mut self, tx: oneshot::Sender<Result<String, ConnectorError>>) {
        self.pending.push(tx);
    }

    /// Route one shell reply: a kernel-info reply (carrying the
    /// language name) resolves every waiter, anything else is dropped.
    fn resolve(&mut self, language: Option<String>) {
        let Some(language) = language else { return };
        for tx in self.pending.drain(..) {
            let _ = tx.send(Ok(language.clone()));
        }
    }

    fn fail_all(&mut self) {
        for tx in self.pending.drain(..) {
            let _ = tx.send(Err(ConnectorError::Disconnected));
        }
    }
}

fn language_of(content: &JupyterMessageContent) -> Option<String> {
    match content {
        JupyterMessageContent::KernelInfoReply(info) => Some(info.language_info.name.clone()),
        _ => None,
    }
}

/// A client session on a live kernel, speaking ZeroMQ via `runtimelib`.
pub struct ZmqKernelSession {
    kernel_name: String,
    language: OnceLock<String>,
    status_rx: watch::Receiver<KernelStatus>,
    iopub_tx: broadcast::Sender<KernelMessage>,
    shell_tx: mpsc::Sender<ShellCommand>,
    iopub_task: JoinHandle<()>,
    shell_task: JoinHandle<()>,
}

impl ZmqKernelSession {
    /// Connect using a kernel connection file (the JSON the kernel was
    /// launched with).
    pub async fn connect(connection_file: &Path) -> anyhow::Result<Arc<Self>> {
        let content = tokio::fs::read_to_string(connection_file).await?;
        let connection_info: ConnectionInfo = serde_json::from_str(&content)?;
        Self::from_connection_info(connection_info).await
    }

    pub async fn from_connection_info(connection_info: ConnectionInfo) -> anyhow::Result<Arc<Self>> {
        let session_id = Uuid::new_v4().to_string();
        let kernel_name = connection_info
            .kernel_name
            .clone()
            .unwrap_or_else(|| "kernel".to_string());

        let mut iopub =
            runtimelib::create_client_iopub_connection(&connection_info, "", &session_id).await?;
        let identity = runtimelib::peer_identity_for_session(&session_id)?;
        let shell = runtimelib::create_client_shell_connection_with_identity(
            &connection_info,
            &session_id,
            identity,
        )
        .await?;
        let (mut shell_writer, mut shell_reader) = shell.split();

        let (status_tx, status_rx) = watch::channel(KernelStatus::Starting);
        let (iopub_tx, _) = broadcast::channel(256);

        let broadcast_tx = iopub_tx.clone();
        let iopub_task = tokio::spawn(async move {
            loop {
                match iopub.read().await {
                    Ok(message) => {
                        debug!(
                            "iopub: type={} parent_msg_id={:?}",
                            message.header.msg_type,
                            message.parent_header.as_ref().map(|h| &h.msg_id)
                        );
                        let mapped = map_message(&message);
                        if let KernelMessageContent::Status(status) = &mapped.content {
                            let _ = status_tx.send(*status);
                        }
                        let _ = broadcast_tx.send(mapped);
                    }
                    Err(e) => {
                        warn!("iopub connection lost: {}", e);
                        let _ = status_tx.send(KernelStatus::Dead);
                        return;
                    }
                }
            }
        });

        let (shell_tx, mut cmd_rx) = mpsc::channel::<ShellCommand>(16);
        let shell_task = tokio::spawn(async move {
            let mut replies = ShellReplies::default();
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break };
                        match cmd {
                            ShellCommand::Execute { message, sent } => {
                                let result = shell_writer
                                    .send(message)
                                    .await
                                    .map_err(|e| ConnectorError::Execution(e.to_string()));
                                let _ = sent.send(result);
                            }
                            ShellCommand::KernelInfo { reply } => {
                                let request: JupyterMessage =
                                    KernelInfoRequest::default().into();
                                match shell_writer.send(request).await {
                                    Ok(_) => replies.push(reply),
                                    Err(e) => {
                                        let _ = reply.send(Err(ConnectorError::Execution(
                                            e.to_string(),
                                        )));
                                    }
                                }
                            }
                        }
                    }
                    reply = shell_reader.read() => match reply {
                        Ok(msg) => replies.resolve(language_of(&msg.content)),
                        Err(e) => {
                            warn!("shell connection lost: {}", e);
                            replies.fail_all();
                            break;
                        }
                    },
                }
            }
        });

        Ok(Arc::new(Self {
            kernel_name,
            language: OnceLock::new(),
            status_rx,
            iopub_tx,
            shell_tx,
            iopub_task,
            shell_task,
        }))
    }

    async fn fetch_language(&self) -> Result<String, ConnectorError> {
        if let Some(language) = self.language.get() {
            return Ok(language.clone());
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.shell_tx
            .send(ShellCommand::KernelInfo { reply: reply_tx })
            .await
            .map_err(|_| ConnectorError::Disconnected)?;
        let language = tokio::time::timeout(KERNEL_INFO_TIMEOUT, reply_rx)
            .await
            .map_err(|_| ConnectorError::Timeout)?
            .map_err(|_| ConnectorError::Disconnected)??;
        let _ = self.language.set(language.clone());
        Ok(language)
    }
}

#[async_trait]
impl KernelSession for ZmqKernelSession {
    /// A kernel-info round trip doubles as the readiness probe; the
    /// kernel answering on shell means it can take execute requests.
    async fn wait_ready(&self) -> Result<(), ConnectorError> {
        self.fetch_language().await.map(|_| ())
    }

    fn status(&self) -> watch::Receiver<KernelStatus> {
        self.status_rx.clone()
    }

    fn iopub(&self) -> broadcast::Receiver<KernelMessage> {
        self.iopub_tx.subscribe()
    }

    async fn send_execute(&self, request: ExecuteRequest) -> Result<String, ConnectorError> {
        let execute = jupyter_protocol::ExecuteRequest {
            code: request.code,
            silent: request.silent,
            store_history: request.store_history,
            user_expressions: None,
            allow_stdin: false,
            stop_on_error: request.stop_on_error,
        };
        let message: JupyterMessage = execute.into();
        let msg_id = message.header.msg_id.clone();

        let (sent_tx, sent_rx) = oneshot::channel();
        self.shell_tx
            .send(ShellCommand::Execute {
                message,
                sent: sent_tx,
            })
            .await
            .map_err(|_| ConnectorError::Disconnected)?;
        sent_rx.await.map_err(|_| ConnectorError::Disconnected)??;
        Ok(msg_id)
    }

    async fn kernel_language(&self) -> Result<String, ConnectorError> {
        self.fetch_language().await
    }

    fn kernel_name(&self) -> String {
        self.kernel_name.clone()
    }
}

impl Drop for ZmqKernelSession {
    fn drop(&mut self) {
        self.iopub_task.abort();
        self.shell_task.abort();
    }
}

fn map_message(message: &JupyterMessage) -> KernelMessage {
    let parent_msg_id = message.parent_header.as_ref().map(|h| h.msg_id.clone());
    let content = match &message.content {
        JupyterMessageContent::ExecuteInput(input) => KernelMessageContent::ExecuteInput {
            code: input.code.clone(),
        },
        JupyterMessageContent::ExecuteResult(result) => KernelMessageContent::ExecuteResult {
            text: plain_text(&result.data),
        },
        JupyterMessageContent::Status(status) => {
            KernelMessageContent::Status(map_state(&status.execution_state))
        }
        JupyterMessageContent::ErrorOutput(err) => KernelMessageContent::Error {
            ename: err.ename.clone(),
            evalue: err.evalue.clone(),
        },
        _ => KernelMessageContent::Other {
            msg_type: message.header.msg_type.clone(),
        },
    };
    KernelMessage {
        parent_msg_id,
        content,
    }
}

fn map_state(state: &ExecutionState) -> KernelStatus {
    match state {
        ExecutionState::Busy => KernelStatus::Busy,
        ExecutionState::Idle => KernelStatus::Idle,
        ExecutionState::Starting => KernelStatus::Starting,
        ExecutionState::Restarting => KernelStatus::Restarting,
        ExecutionState::Terminating | ExecutionState::Dead => KernelStatus::Dead,
        _ => KernelStatus::Dead,
    }
}

fn plain_text(data: &jupyter_protocol::Media) -> Option<String> {
    data.content.iter().find_map(|media| match media {
        MediaType::Plain(text) => Some(text.clone()),
        _ => None,
    })
}
