//! Data models behind the UI panels.
//!
//! Rendering is the host's business; these types hold the state a
//! renderer reads (latest inspection projection, graph schema under
//! edit) and dispatch edit operations into the schema manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use gs_schema::{Edge, GraphManager, SchemaError, Vertex};
use log::debug;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::handler::VariableInspectionHandler;
use crate::manager::{InspectionConsumer, Panel};
use crate::shell::{self, NotebookTracker, ShellError, ShellUi};
use crate::variable::{group_by_session, InspectorUpdate, SessionVariable, UpdateTitle};

/// Follows one handler's inspected signal, keeping the latest update.
struct UpdateFeed {
    latest: StdMutex<Option<InspectorUpdate>>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl UpdateFeed {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            latest: StdMutex::new(None),
            task: StdMutex::new(None),
        })
    }

    /// Switch to a new source handler. The previous subscription is
    /// torn down first; `None` stops following entirely but keeps the
    /// last rendered state (a stale panel beats a flashing one).
    fn follow(self: &Arc<Self>, handler: Option<&Arc<VariableInspectionHandler>>) {
        let mut task = self.task.lock().expect("feed lock poisoned");
        if let Some(old) = task.take() {
            old.abort();
        }
        let Some(handler) = handler else {
            return;
        };
        let mut updates = handler.inspected();
        let feed = self.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => {
                        *feed.latest.lock().expect("feed lock poisoned") = Some(update);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("update feed lagged, skipped {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().expect("feed lock poisoned").take() {
            task.abort();
        }
    }

    fn sessions(&self) -> Vec<SessionVariable> {
        self.latest
            .lock()
            .expect("feed lock poisoned")
            .as_ref()
            .map(|u| group_by_session(&u.payload))
            .unwrap_or_default()
    }

    fn title(&self) -> UpdateTitle {
        self.latest
            .lock()
            .expect("feed lock poisoned")
            .as_ref()
            .map(|u| u.title.clone())
            .unwrap_or_default()
    }
}

/// Shared plumbing both panel kinds compose.
struct PanelBase {
    id: String,
    feed: Arc<UpdateFeed>,
    source: StdMutex<Option<Arc<VariableInspectionHandler>>>,
    notebook: StdMutex<Option<Arc<dyn NotebookTracker>>>,
    disposed_tx: broadcast::Sender<()>,
    disposed: AtomicBool,
}

impl PanelBase {
    fn new(prefix: &str) -> Self {
        let (disposed_tx, _) = broadcast::channel(4);
        Self {
            id: format!("{}-{}", prefix, Uuid::new_v4()),
            feed: UpdateFeed::new(),
            source: StdMutex::new(None),
            notebook: StdMutex::new(None),
            disposed_tx,
            disposed: AtomicBool::new(false),
        }
    }

    fn set_source(&self, handler: Option<Arc<VariableInspectionHandler>>) {
        self.feed.follow(handler.as_ref());
        *self.source.lock().expect("panel lock poisoned") = handler;
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.feed.stop();
        let _ = self.disposed_tx.send(());
    }

    /// Ask the current source for a fresh inspection.
    fn refresh(&self) {
        let source = self.source.lock().expect("panel lock poisoned").clone();
        if let Some(handler) = source {
            tokio::spawn(async move {
                handler.perform_inspection().await;
            });
        }
    }
}

/// The graph-operation panel: one per kernel session.
///
/// Owns the schema being assembled. The schema lives and dies with the
/// panel; nothing is persisted across restarts.
pub struct GraphOpPanel {
    base: PanelBase,
    session_name: String,
    schema: StdMutex<GraphManager>,
}

impl GraphOpPanel {
    pub fn new(session_name: String) -> Arc<Self> {
        Arc::new(Self {
            base: PanelBase::new("graph-op"),
            session_name,
            schema: StdMutex::new(GraphManager::new()),
        })
    }

    /// The session variable this panel builds graphs from.
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn sessions(&self) -> Vec<SessionVariable> {
        self.base.feed.sessions()
    }

    pub fn title(&self) -> UpdateTitle {
        self.base.feed.title()
    }

    pub fn refresh(&self) {
        self.base.refresh();
    }

    pub fn dispose(&self) {
        self.base.dispose();
    }

    // Schema edits. Validation errors propagate to the caller, which
    // owns the user-facing presentation.

    pub fn add_vertex(&self, v: Vertex) -> Result<(), SchemaError> {
        self.schema.lock().expect("schema lock poisoned").add_vertex(v)
    }

    pub fn edit_vertex(&self, v: Vertex) {
        self.schema.lock().expect("schema lock poisoned").edit_vertex(v)
    }

    pub fn delete_vertex(&self, v: &Vertex) {
        self.schema.lock().expect("schema lock poisoned").delete_vertex(v)
    }

    pub fn add_edge(&self, e: Edge) -> Result<(), SchemaError> {
        self.schema.lock().expect("schema lock poisoned").add_edge(e)
    }

    pub fn edit_edge(&self, e: Edge) -> Result<(), SchemaError> {
        self.schema.lock().expect("schema lock poisoned").edit_edge(e)
    }

    pub fn delete_edge(&self, e: &Edge) {
        self.schema.lock().expect("schema lock poisoned").delete_edge(e)
    }

    /// Compile the schema against this panel's session.
    pub fn generate_code(
        &self,
        graph_name: &str,
        oid_type: &str,
        directed: bool,
        generate_eid: bool,
    ) -> String {
        self.schema
            .lock()
            .expect("schema lock poisoned")
            .generate_code(&self.session_name, graph_name, oid_type, directed, generate_eid)
    }

    /// Generate and insert into the focused cell. Generation always
    /// succeeds; a missing focused cell only skips the insertion.
    pub fn generate_and_insert(
        &self,
        ui: &dyn ShellUi,
        graph_name: &str,
        oid_type: &str,
        directed: bool,
        generate_eid: bool,
    ) -> (String, Result<(), ShellError>) {
        let code = self.generate_code(graph_name, oid_type, directed, generate_eid);
        let notebook = self.base.notebook.lock().expect("panel lock poisoned").clone();
        let inserted = shell::insert_code(notebook.as_deref(), ui, &code);
        (code, inserted)
    }
}

impl InspectionConsumer for GraphOpPanel {
    fn on_source_changed(&self, handler: Option<Arc<VariableInspectionHandler>>) {
        self.base.set_source(handler);
    }

    fn on_notebook_changed(&self, notebook: Arc<dyn NotebookTracker>) {
        *self.base.notebook.lock().expect("panel lock poisoned") = Some(notebook);
    }
}

impl Panel for GraphOpPanel {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn disposed(&self) -> broadcast::Receiver<()> {
        self.base.disposed_tx.subscribe()
    }
}

/// The sidebar panel: a passive listing of sessions and their graphs.
pub struct SidebarPanel {
    base: PanelBase,
}

impl SidebarPanel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: PanelBase::new("sidebar"),
        })
    }

    pub fn sessions(&self) -> Vec<SessionVariable> {
        self.base.feed.sessions()
    }

    pub fn title(&self) -> UpdateTitle {
        self.base.feed.title()
    }

    pub fn refresh(&self) {
        self.base.refresh();
    }

    pub fn dispose(&self) {
        self.base.dispose();
    }
}

impl InspectionConsumer for SidebarPanel {
    fn on_source_changed(&self, handler: Option<Arc<VariableInspectionHandler>>) {
        self.base.set_source(handler);
    }

    fn on_notebook_changed(&self, notebook: Arc<dyn NotebookTracker>) {
        *self.base.notebook.lock().expect("panel lock poisoned") = Some(notebook);
    }
}

impl Panel for SidebarPanel {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn disposed(&self) -> broadcast::Receiver<()> {
        self.base.disposed_tx.subscribe()
    }
}
