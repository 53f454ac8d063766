//! Tests of the process-wide manager and the shell entry points,
//! driven through the scripted kernel session.

mod common;

use std::sync::Arc;
use std::time::Duration;

use gs_schema::Vertex;

use gs_inspector::connector::KernelConnector;
use gs_inspector::handler::{HandlerOptions, VariableInspectionHandler};
use gs_inspector::panels::GraphOpPanel;
use gs_inspector::scripts;
use gs_inspector::shell::{self, OpenOutcome, ShellError, STATE_KEY_LAST_SESSION};
use gs_inspector::state::{FileStateStore, StateStore};
use gs_inspector::VariableManager;

use common::{MockKernelSession, MockNotebookTracker, RecordingUi, TestPanel};

const QUERY: &str = "_gs_inspector_inspect_variable()";

fn make_handler(mock: &Arc<MockKernelSession>, id: &str) -> Arc<VariableInspectionHandler> {
    let model = scripts::get_script("python").unwrap();
    VariableInspectionHandler::new(HandlerOptions {
        id: id.to_string(),
        connector: KernelConnector::new(mock.clone()),
        init_script: model.init_script.to_string(),
        query_command: model.query_command.to_string(),
    })
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn vertex(label: &str) -> Vertex {
    Vertex {
        label: label.to_string(),
        id_field: "id".to_string(),
        location: "file:///v.csv".to_string(),
        header_row: true,
        delimiter: ",".to_string(),
        extra_params_switch: false,
        extra_params: Vec::new(),
        select_all_properties: true,
        properties_data: Vec::new(),
    }
}

#[tokio::test]
async fn active_handler_fans_out_to_every_panel() {
    let manager = VariableManager::new();
    let a = TestPanel::new("a");
    let b = TestPanel::new("b");
    manager.register_panel(a.clone());
    manager.register_panel(b.clone());

    let mock = MockKernelSession::new("python");
    let handler = make_handler(&mock, "nb-1");

    manager.set_active_handler(Some(handler.clone()));
    assert!(a.last_source().unwrap().is_some());
    assert!(b.last_source().unwrap().is_some());

    manager.set_active_handler(None);
    assert!(a.last_source().unwrap().is_none());
    assert!(b.last_source().unwrap().is_none());
}

#[tokio::test]
async fn setting_the_same_handler_is_a_noop() {
    let manager = VariableManager::new();
    let panel = TestPanel::new("a");
    manager.register_panel(panel.clone());

    let mock = MockKernelSession::new("python");
    let handler = make_handler(&mock, "nb-1");

    manager.set_active_handler(Some(handler.clone()));
    manager.set_active_handler(Some(handler.clone()));
    assert_eq!(panel.sources.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn disposing_the_active_handler_clears_it() {
    let manager = VariableManager::new();
    let panel = TestPanel::new("a");
    manager.register_panel(panel.clone());

    let mock = MockKernelSession::new("python");
    let handler = make_handler(&mock, "nb-1");
    manager.set_active_handler(Some(handler.clone()));

    handler.dispose();
    let m = manager.clone();
    wait_until(move || m.active_handler().is_none()).await;
    let p = panel.clone();
    wait_until(move || matches!(p.last_source(), Some(None))).await;
}

#[tokio::test]
async fn handlers_are_keyed_by_id_and_overwritten() {
    let manager = VariableManager::new();
    let mock = MockKernelSession::new("python");

    let first = make_handler(&mock, "nb-1");
    let second = make_handler(&mock, "nb-1");
    manager.add_handler(first.clone());
    manager.add_handler(second.clone());

    assert!(manager.has_handler("nb-1"));
    assert!(!manager.has_handler("nb-2"));
    let stored = manager.get_handler("nb-1").unwrap();
    assert!(Arc::ptr_eq(&stored, &second));
}

#[tokio::test]
async fn panels_receive_the_notebook_tracker() {
    let manager = VariableManager::new();
    let tracker = MockNotebookTracker::new(Some("nb-1"), true);
    manager.set_notebook(tracker.clone());

    // Registered after the fact: pushed immediately.
    let late = TestPanel::new("late");
    manager.register_panel(late.clone());
    assert_eq!(late.notebooks.lock().unwrap().len(), 1);

    // A new tracker fans out to everyone.
    let replacement = MockNotebookTracker::new(Some("nb-2"), true);
    manager.set_notebook(replacement);
    assert_eq!(late.notebooks.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn disposed_panels_unregister_themselves() {
    let manager = VariableManager::new();
    let panel = TestPanel::new("a");
    manager.register_panel(panel.clone());
    assert!(manager.get_panel("a").is_some());

    panel.dispose();
    let m = manager.clone();
    wait_until(move || m.get_panel("a").is_none()).await;
}

#[tokio::test]
async fn notebook_open_registers_a_handler() {
    let manager = VariableManager::new();
    let mock = MockKernelSession::new("python");

    let handler = shell::on_notebook_opened(&manager, mock.clone(), "nb-1")
        .await
        .unwrap();
    assert_eq!(handler.id(), "nb-1");
    assert!(manager.has_handler("nb-1"));
}

#[tokio::test]
async fn unsupported_kernel_language_is_rejected() {
    let manager = VariableManager::new();
    let mock = MockKernelSession::new("julia");

    let result = shell::on_notebook_opened(&manager, mock.clone(), "nb-1").await;
    assert!(matches!(result, Err(ShellError::UnsupportedLanguage(_))));
    assert!(!manager.has_handler("nb-1"));
}

#[tokio::test]
async fn focus_change_activates_and_refreshes() {
    let manager = VariableManager::new();
    let mock = MockKernelSession::new("python");
    let handler = shell::on_notebook_opened(&manager, mock.clone(), "nb-1")
        .await
        .unwrap();
    handler.ready().await;

    shell::on_focus_changed(&manager, "nb-1");
    assert!(manager.active_handler().is_some());
    let m = mock.clone();
    wait_until(move || m.executed_codes().iter().any(|c| c == QUERY)).await;

    // Unknown paths leave the active handler untouched.
    shell::on_focus_changed(&manager, "nb-404");
    assert!(manager.active_handler().is_some());
}

#[tokio::test]
async fn open_graph_panel_requires_a_session() {
    let manager = VariableManager::new();
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::open(dir.path().join("state.json"));
    let ui = RecordingUi::default();

    let result = shell::open_graph_panel(&manager, &store, &ui, None, None);
    assert!(matches!(result, Err(ShellError::NoSession)));
}

#[tokio::test]
async fn open_graph_panel_persists_the_session() {
    let manager = VariableManager::new();
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::open(dir.path().join("state.json"));
    let ui = RecordingUi::default();

    let outcome = shell::open_graph_panel(&manager, &store, &ui, None, Some("sess")).unwrap();
    let panel = match outcome {
        OpenOutcome::Opened(panel) => panel,
        _ => panic!("expected a new panel"),
    };
    assert_eq!(panel.session_name(), "sess");
    assert_eq!(
        store.fetch(STATE_KEY_LAST_SESSION),
        Some(serde_json::Value::String("sess".into()))
    );
    assert!(manager.get_panel(panel.session_name()).is_none()); // keyed by panel id, not session
}

#[tokio::test]
async fn open_graph_panel_falls_back_to_the_last_session() {
    let manager = VariableManager::new();
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::open(dir.path().join("state.json"));
    store.save(
        STATE_KEY_LAST_SESSION,
        serde_json::Value::String("stored".into()),
    );
    let ui = RecordingUi::default();

    let outcome = shell::open_graph_panel(&manager, &store, &ui, None, None).unwrap();
    match outcome {
        OpenOutcome::Opened(panel) => assert_eq!(panel.session_name(), "stored"),
        _ => panic!("expected a new panel"),
    }
}

#[tokio::test]
async fn open_graph_panel_blocks_on_session_mismatch() {
    let manager = VariableManager::new();
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::open(dir.path().join("state.json"));
    let ui = RecordingUi::default();

    let existing = GraphOpPanel::new("old".to_string());
    let outcome =
        shell::open_graph_panel(&manager, &store, &ui, Some(&existing), Some("new")).unwrap();
    assert!(matches!(outcome, OpenOutcome::Blocked));
    let warnings = ui.warnings.lock().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].1.contains("old"));

    drop(warnings);
    let outcome =
        shell::open_graph_panel(&manager, &store, &ui, Some(&existing), Some("old")).unwrap();
    assert!(matches!(outcome, OpenOutcome::Reused));
}

#[tokio::test]
async fn insert_code_requires_a_focused_cell() {
    let ui = RecordingUi::default();

    let focused = MockNotebookTracker::new(Some("nb-1"), true);
    assert!(shell::insert_code(Some(&*focused), &ui, "g = 1").is_ok());
    assert_eq!(focused.inserted.lock().unwrap().as_slice(), ["g = 1"]);

    let unfocused = MockNotebookTracker::new(Some("nb-1"), false);
    let result = shell::insert_code(Some(&*unfocused), &ui, "g = 1");
    assert!(matches!(result, Err(ShellError::MissingFocusedCell)));
    assert_eq!(ui.warnings.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn graph_panel_generates_and_inserts_loader_code() {
    let manager = VariableManager::new();
    let ui = RecordingUi::default();
    let tracker = MockNotebookTracker::new(Some("nb-1"), true);
    manager.set_notebook(tracker.clone());

    let panel = GraphOpPanel::new("sess".to_string());
    manager.register_panel(panel.clone());
    panel.add_vertex(vertex("person")).unwrap();

    let (code, inserted) = panel.generate_and_insert(&ui, "g1", "int64_t", true, false);
    assert!(inserted.is_ok());
    assert!(code.contains("sess.load_from"));
    assert!(code.contains("\"person\""));
    assert_eq!(tracker.inserted.lock().unwrap().as_slice(), [code]);
}

#[tokio::test]
async fn duplicate_vertex_label_surfaces_as_an_error_dialog() {
    let ui = RecordingUi::default();
    let panel = GraphOpPanel::new("sess".to_string());
    panel.add_vertex(vertex("person")).unwrap();

    let err = panel.add_vertex(vertex("person")).unwrap_err();
    shell::present_schema_error(&ui, &err);
    let errors = ui.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].1,
        "Vertex label 'person' exists in current graph."
    );
}
