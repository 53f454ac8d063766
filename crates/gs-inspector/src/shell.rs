//! Entry points the host notebook shell calls, and the thin UI
//! collaborators they talk back through.
//!
//! The shell owns widgets, layout and dialogs; this module only needs
//! it to show a dialog, track the focused cell, and hand over a kernel
//! session when a notebook opens.

use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::connector::{ConnectorError, KernelConnector, KernelSession};
use crate::handler::{HandlerOptions, VariableInspectionHandler};
use crate::manager::VariableManager;
use crate::panels::GraphOpPanel;
use crate::scripts::{self, ScriptError};
use crate::state::StateStore;

/// State-store key for the session a graph panel was last opened with.
pub const STATE_KEY_LAST_SESSION: &str = "last-used-session";

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("No focused cell to insert code into.")]
    MissingFocusedCell,

    #[error("No session selected and no last-used session recorded.")]
    NoSession,

    #[error(transparent)]
    UnsupportedLanguage(#[from] ScriptError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

/// Dialog surface provided by the host shell.
pub trait ShellUi: Send + Sync {
    fn show_error(&self, title: &str, body: &str);
    fn show_warning(&self, title: &str, body: &str);
}

/// The host's notebook tracker: enough surface to insert generated
/// code into the focused editor cell.
pub trait NotebookTracker: Send + Sync {
    /// Session path of the notebook that currently has focus.
    fn current_path(&self) -> Option<String>;

    /// Insert code into the focused cell; `false` when no cell has
    /// focus.
    fn insert_into_focused_cell(&self, code: &str) -> bool;
}

/// Outcome of an open-graph-panel command.
pub enum OpenOutcome {
    /// A new panel was created and registered.
    Opened(Arc<GraphOpPanel>),
    /// The existing panel already targets the requested session.
    Reused,
    /// An existing panel targets a different session; a warning dialog
    /// was shown and nothing changed.
    Blocked,
}

/// A notebook was opened: wire up a handler for its kernel.
///
/// Fails with [`ScriptError::UnsupportedLanguage`] when the kernel's
/// language has no script mapping, in which case no handler is
/// registered.
pub async fn on_notebook_opened(
    manager: &VariableManager,
    session: Arc<dyn KernelSession>,
    path: &str,
) -> Result<Arc<VariableInspectionHandler>, ShellError> {
    let connector = KernelConnector::new(session);
    connector.ready().await?;
    let language = connector.kernel_language().await?;
    let script = scripts::get_script(&language)?;

    let handler = VariableInspectionHandler::new(HandlerOptions {
        id: path.to_string(),
        connector,
        init_script: script.init_script.to_string(),
        query_command: script.query_command.to_string(),
    });
    manager.add_handler(handler.clone());
    info!("inspection handler registered for {}", path);
    Ok(handler)
}

/// Focus moved to the notebook at `path`: route its handler to the
/// panels and refresh once.
pub fn on_focus_changed(manager: &VariableManager, path: &str) {
    let Some(handler) = manager.get_handler(path) else {
        return;
    };
    manager.set_active_handler(Some(handler.clone()));
    tokio::spawn(async move {
        handler.perform_inspection().await;
    });
}

/// The "open graph panel" command.
///
/// `requested_session` falls back to the persisted last-used session
/// name; opening with neither fails. A successful open persists the
/// chosen session.
pub fn open_graph_panel(
    manager: &VariableManager,
    store: &dyn StateStore,
    ui: &dyn ShellUi,
    existing: Option<&GraphOpPanel>,
    requested_session: Option<&str>,
) -> Result<OpenOutcome, ShellError> {
    let sess = requested_session
        .map(str::to_string)
        .or_else(|| {
            store
                .fetch(STATE_KEY_LAST_SESSION)
                .and_then(|v| v.as_str().map(String::from))
        })
        .ok_or(ShellError::NoSession)?;

    if let Some(panel) = existing {
        if panel.session_name() != sess {
            ui.show_warning(
                "WARNING",
                &format!(
                    "The graph schema panel already exists with different session \"{}\". Please close it first.",
                    panel.session_name()
                ),
            );
            return Ok(OpenOutcome::Blocked);
        }
        return Ok(OpenOutcome::Reused);
    }

    let panel = GraphOpPanel::new(sess.clone());
    manager.register_panel(panel.clone());
    store.save(STATE_KEY_LAST_SESSION, serde_json::Value::String(sess));
    Ok(OpenOutcome::Opened(panel))
}

/// Insert generated code into the focused cell.
///
/// Missing focus is a warning, not a failure of generation; the caller
/// still has the code.
pub fn insert_code(
    tracker: Option<&dyn NotebookTracker>,
    ui: &dyn ShellUi,
    code: &str,
) -> Result<(), ShellError> {
    match tracker {
        Some(tracker) if tracker.insert_into_focused_cell(code) => Ok(()),
        _ => {
            ui.show_warning(
                "WARNING",
                "No focused cell to insert the generated code into.",
            );
            Err(ShellError::MissingFocusedCell)
        }
    }
}

/// Present a schema validation failure as a dismissable error dialog.
pub fn present_schema_error(ui: &dyn ShellUi, err: &gs_schema::SchemaError) {
    ui.show_error("ERROR", &err.to_string());
}
