//! Process-wide registry routing inspection handlers to UI panels.
//!
//! One manager lives for the process. It maps notebook-session paths
//! to handlers, panel ids to registered consumers, and holds the one
//! "currently active" handler that every panel renders from. Handlers
//! accumulate for the process lifetime; the only removal path is a
//! panel unregistering itself on disposal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use log::debug;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::handler::VariableInspectionHandler;
use crate::shell::NotebookTracker;

/// Capability: receives the active inspection source and the notebook
/// tracker. Split from rendering so a panel composes both rather than
/// inheriting a widget base.
pub trait InspectionConsumer: Send + Sync {
    fn on_source_changed(&self, handler: Option<Arc<VariableInspectionHandler>>);
    fn on_notebook_changed(&self, notebook: Arc<dyn NotebookTracker>);
}

/// Capability: a registrable panel with identity and a disposal signal.
pub trait Panel: InspectionConsumer {
    fn id(&self) -> &str;
    fn disposed(&self) -> broadcast::Receiver<()>;
}

struct ManagerInner {
    handlers: HashMap<String, Arc<VariableInspectionHandler>>,
    panels: HashMap<String, Arc<dyn Panel>>,
    notebook: Option<Arc<dyn NotebookTracker>>,
    active: Option<Arc<VariableInspectionHandler>>,
    /// Watches the active handler's disposed signal; aborted before a
    /// new watcher is installed so the old subscription cannot dangle.
    disposal_watch: Option<JoinHandle<()>>,
}

/// The process-wide variable manager.
#[derive(Clone)]
pub struct VariableManager {
    inner: Arc<StdMutex<ManagerInner>>,
}

impl Default for VariableManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StdMutex::new(ManagerInner {
                handlers: HashMap::new(),
                panels: HashMap::new(),
                notebook: None,
                active: None,
                disposal_watch: None,
            })),
        }
    }

    /// Register a handler under its id. Overwrites silently.
    pub fn add_handler(&self, handler: Arc<VariableInspectionHandler>) {
        let mut inner = self.inner.lock().expect("manager lock poisoned");
        inner.handlers.insert(handler.id().to_string(), handler);
    }

    pub fn has_handler(&self, id: &str) -> bool {
        let inner = self.inner.lock().expect("manager lock poisoned");
        inner.handlers.contains_key(id)
    }

    pub fn get_handler(&self, id: &str) -> Option<Arc<VariableInspectionHandler>> {
        let inner = self.inner.lock().expect("manager lock poisoned");
        inner.handlers.get(id).cloned()
    }

    pub fn active_handler(&self) -> Option<Arc<VariableInspectionHandler>> {
        let inner = self.inner.lock().expect("manager lock poisoned");
        inner.active.clone()
    }

    /// Make `handler` the source every registered panel renders from.
    ///
    /// The previous handler's disposal watcher is torn down before the
    /// new one is installed, and a disposed active handler auto-clears
    /// back to `None` (fanning that out too). Setting the same handler
    /// again is a no-op.
    pub fn set_active_handler(&self, handler: Option<Arc<VariableInspectionHandler>>) {
        let panels: Vec<Arc<dyn Panel>> = {
            let mut inner = self.inner.lock().expect("manager lock poisoned");
            let same = match (&inner.active, &handler) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if same {
                return;
            }
            if let Some(watch) = inner.disposal_watch.take() {
                watch.abort();
            }
            inner.active = handler.clone();
            if let Some(h) = &handler {
                let manager = self.clone();
                let mut disposed = h.disposed();
                let already_disposed = h.is_disposed();
                let id = h.id().to_string();
                inner.disposal_watch = Some(tokio::spawn(async move {
                    if !already_disposed {
                        let _ = disposed.recv().await;
                    }
                    debug!("active handler {} disposed, clearing source", id);
                    manager.set_active_handler(None);
                }));
            }
            inner.panels.values().cloned().collect()
        };

        for panel in panels {
            panel.on_source_changed(handler.clone());
        }
    }

    /// Register a consumer panel. The current notebook tracker is
    /// pushed immediately if known, and the panel unregisters itself
    /// when its disposed signal fires.
    pub fn register_panel(&self, panel: Arc<dyn Panel>) {
        let id = panel.id().to_string();
        let notebook = {
            let mut inner = self.inner.lock().expect("manager lock poisoned");
            inner.panels.insert(id.clone(), panel.clone());
            inner.notebook.clone()
        };
        if let Some(nb) = notebook {
            panel.on_notebook_changed(nb);
        }

        let manager = self.clone();
        let mut disposed = panel.disposed();
        tokio::spawn(async move {
            let _ = disposed.recv().await;
            let mut inner = manager.inner.lock().expect("manager lock poisoned");
            inner.panels.remove(&id);
            debug!("panel {} unregistered", id);
        });
    }

    pub fn get_panel(&self, id: &str) -> Option<Arc<dyn Panel>> {
        let inner = self.inner.lock().expect("manager lock poisoned");
        inner.panels.get(id).cloned()
    }

    pub fn notebook(&self) -> Option<Arc<dyn NotebookTracker>> {
        let inner = self.inner.lock().expect("manager lock poisoned");
        inner.notebook.clone()
    }

    /// Share the notebook tracker with every registered panel.
    pub fn set_notebook(&self, notebook: Arc<dyn NotebookTracker>) {
        let panels: Vec<Arc<dyn Panel>> = {
            let mut inner = self.inner.lock().expect("manager lock poisoned");
            inner.notebook = Some(notebook.clone());
            inner.panels.values().cloned().collect()
        };
        for panel in panels {
            panel.on_notebook_changed(notebook.clone());
        }
    }
}
