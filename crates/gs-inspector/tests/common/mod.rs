//! Shared test doubles: a scripted in-process kernel session, plus
//! recording stand-ins for the host shell surfaces.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use gs_inspector::connector::{
    ConnectorError, ExecuteRequest, KernelMessage, KernelMessageContent, KernelSession,
    KernelStatus,
};
use gs_inspector::handler::VariableInspectionHandler;
use gs_inspector::manager::{InspectionConsumer, Panel};
use gs_inspector::shell::{NotebookTracker, ShellUi};

#[derive(Clone, Default)]
pub struct ScriptedReply {
    pub result: Option<String>,
    pub error: bool,
}

/// An in-process kernel. Executes synchronously: every request emits
/// busy / input / (scripted output) / idle on the broadcast channel
/// before `send_execute` returns.
pub struct MockKernelSession {
    language: String,
    status_tx: watch::Sender<KernelStatus>,
    iopub_tx: broadcast::Sender<KernelMessage>,
    replies: StdMutex<HashMap<String, ScriptedReply>>,
    pub executed: StdMutex<Vec<ExecuteRequest>>,
    counter: AtomicUsize,
    fail_ready: AtomicBool,
}

impl MockKernelSession {
    pub fn new(language: &str) -> Arc<Self> {
        let (status_tx, _) = watch::channel(KernelStatus::Idle);
        let (iopub_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            language: language.to_string(),
            status_tx,
            iopub_tx,
            replies: StdMutex::new(HashMap::new()),
            executed: StdMutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
            fail_ready: AtomicBool::new(false),
        })
    }

    /// Make `wait_ready` fail, simulating a kernel that never came up.
    pub fn fail_ready(&self) {
        self.fail_ready.store(true, Ordering::SeqCst);
    }

    /// Script the reply for an exact code string.
    pub fn script_reply(&self, code: &str, reply: ScriptedReply) {
        self.replies.lock().unwrap().insert(code.to_string(), reply);
    }

    pub fn set_status(&self, status: KernelStatus) {
        let _ = self.status_tx.send(status);
    }

    /// Simulate the user running code from a notebook cell.
    pub fn emit_user_execution(&self, code: &str) {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let parent = format!("user-{}", n);
        self.emit(Some(&parent), KernelMessageContent::Status(KernelStatus::Busy));
        self.emit(
            Some(&parent),
            KernelMessageContent::ExecuteInput {
                code: code.to_string(),
            },
        );
        self.emit(Some(&parent), KernelMessageContent::Status(KernelStatus::Idle));
    }

    pub fn executed_codes(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.code.clone())
            .collect()
    }

    fn emit(&self, parent: Option<&str>, content: KernelMessageContent) {
        let _ = self.iopub_tx.send(KernelMessage {
            parent_msg_id: parent.map(str::to_string),
            content,
        });
    }
}

#[async_trait]
impl KernelSession for MockKernelSession {
    async fn wait_ready(&self) -> Result<(), ConnectorError> {
        if self.fail_ready.load(Ordering::SeqCst) {
            return Err(ConnectorError::NoKernel);
        }
        let mut rx = self.status_tx.subscribe();
        rx.wait_for(|s| s.is_ready())
            .await
            .map_err(|_| ConnectorError::Disconnected)?;
        Ok(())
    }

    fn status(&self) -> watch::Receiver<KernelStatus> {
        self.status_tx.subscribe()
    }

    fn iopub(&self) -> broadcast::Receiver<KernelMessage> {
        self.iopub_tx.subscribe()
    }

    async fn send_execute(&self, request: ExecuteRequest) -> Result<String, ConnectorError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let msg_id = format!("msg-{}", n);
        self.executed.lock().unwrap().push(request.clone());

        self.emit(Some(&msg_id), KernelMessageContent::Status(KernelStatus::Busy));
        // Silent executions produce no execute_input broadcast.
        if !request.silent {
            self.emit(
                Some(&msg_id),
                KernelMessageContent::ExecuteInput {
                    code: request.code.clone(),
                },
            );
        }
        let scripted = self.replies.lock().unwrap().get(&request.code).cloned();
        if let Some(reply) = scripted {
            if let Some(text) = reply.result {
                self.emit(
                    Some(&msg_id),
                    KernelMessageContent::ExecuteResult { text: Some(text) },
                );
            }
            if reply.error {
                self.emit(
                    Some(&msg_id),
                    KernelMessageContent::Error {
                        ename: "RuntimeError".to_string(),
                        evalue: "scripted failure".to_string(),
                    },
                );
            }
        }
        self.emit(Some(&msg_id), KernelMessageContent::Status(KernelStatus::Idle));
        Ok(msg_id)
    }

    async fn kernel_language(&self) -> Result<String, ConnectorError> {
        Ok(self.language.clone())
    }

    fn kernel_name(&self) -> String {
        "Python 3".to_string()
    }
}

/// A panel that records everything pushed at it.
pub struct TestPanel {
    id: String,
    pub sources: StdMutex<Vec<Option<Arc<VariableInspectionHandler>>>>,
    pub notebooks: StdMutex<Vec<Arc<dyn NotebookTracker>>>,
    disposed_tx: broadcast::Sender<()>,
}

impl TestPanel {
    pub fn new(id: &str) -> Arc<Self> {
        let (disposed_tx, _) = broadcast::channel(4);
        Arc::new(Self {
            id: id.to_string(),
            sources: StdMutex::new(Vec::new()),
            notebooks: StdMutex::new(Vec::new()),
            disposed_tx,
        })
    }

    pub fn dispose(&self) {
        let _ = self.disposed_tx.send(());
    }

    pub fn last_source(&self) -> Option<Option<Arc<VariableInspectionHandler>>> {
        self.sources.lock().unwrap().last().cloned()
    }
}

impl InspectionConsumer for TestPanel {
    fn on_source_changed(&self, handler: Option<Arc<VariableInspectionHandler>>) {
        self.sources.lock().unwrap().push(handler);
    }

    fn on_notebook_changed(&self, notebook: Arc<dyn NotebookTracker>) {
        self.notebooks.lock().unwrap().push(notebook);
    }
}

impl Panel for TestPanel {
    fn id(&self) -> &str {
        &self.id
    }

    fn disposed(&self) -> broadcast::Receiver<()> {
        self.disposed_tx.subscribe()
    }
}

/// Records dialogs instead of showing them.
#[derive(Default)]
pub struct RecordingUi {
    pub errors: StdMutex<Vec<(String, String)>>,
    pub warnings: StdMutex<Vec<(String, String)>>,
}

impl ShellUi for RecordingUi {
    fn show_error(&self, title: &str, body: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }

    fn show_warning(&self, title: &str, body: &str) {
        self.warnings
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}

/// A notebook tracker with a controllable focused cell.
pub struct MockNotebookTracker {
    pub path: Option<String>,
    pub has_focus: bool,
    pub inserted: StdMutex<Vec<String>>,
}

impl MockNotebookTracker {
    pub fn new(path: Option<&str>, has_focus: bool) -> Arc<Self> {
        Arc::new(Self {
            path: path.map(str::to_string),
            has_focus,
            inserted: StdMutex::new(Vec::new()),
        })
    }
}

impl NotebookTracker for MockNotebookTracker {
    fn current_path(&self) -> Option<String> {
        self.path.clone()
    }

    fn insert_into_focused_cell(&self, code: &str) -> bool {
        if !self.has_focus {
            return false;
        }
        self.inserted.lock().unwrap().push(code.to_string());
        true
    }
}
