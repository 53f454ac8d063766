//! The inspection payload: kernel-side variables and their UI
//! projection.
//!
//! Variables are ephemeral; every successful query regenerates the
//! whole list, there is no incremental diffing.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminator for the tagged variant records the kernel serializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    Session,
    Graph,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableProps {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub state: String,
}

/// One in-scope kernel variable recognized as a domain object.
///
/// `content` arrives already truncated by the kernel-side helper (500
/// chars plus an ellipsis). `size`/`shape` are reserved for
/// tensor/dataframe-like variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariableKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub props: VariableProps,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
}

/// Heading shown above an inspector panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTitle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_name: Option<String>,
}

/// One inspection result, produced exactly once per successful query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectorUpdate {
    pub title: UpdateTitle,
    pub payload: Vec<Variable>,
}

/// A graph variable attached to its owning session in the UI tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphVariable {
    pub name: String,
    pub content: String,
    pub state: String,
}

/// A session with its child graphs, as the sidebar lists them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionVariable {
    pub session_id: String,
    pub name: String,
    pub content: String,
    pub state: String,
    pub graphs: Vec<GraphVariable>,
}

/// An inspection reply that could not be decoded. Never propagated
/// into the emit channel; the handler logs and drops it.
#[derive(Debug, Error)]
#[error("malformed inspection payload: {0}")]
pub struct MalformedUpdate(#[from] serde_json::Error);

/// Decode the text/plain result of the query command.
///
/// The kernel evaluates the query as an expression, so the JSON array
/// arrives wrapped in one layer of string quoting (the repr of a
/// string). That layer is stripped and embedded quotes unescaped
/// before parsing. Empty content is a valid reply meaning "nothing in
/// scope" and yields an empty list without a parse attempt.
pub fn parse_inspection_reply(raw: &str) -> Result<Vec<Variable>, MalformedUpdate> {
    let content = unquote_repr(raw);
    if content.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

fn unquote_repr(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(q @ ('\'' | '"')) if raw.len() >= 2 && raw.ends_with(q) => {
            let inner = &raw[1..raw.len() - 1];
            inner.replace("\\\"", "\"").replace("\\'", "'")
        }
        _ => raw.to_string(),
    }
}

/// Project a flat payload into the per-session tree the UI renders.
///
/// Sessions appear in payload order; each graph variable is attached
/// to the session whose id matches its `props.session_id`. A graph
/// with an unknown session id is silently dropped.
pub fn group_by_session(payload: &[Variable]) -> Vec<SessionVariable> {
    let mut sessions: Vec<SessionVariable> = payload
        .iter()
        .filter(|v| v.kind == VariableKind::Session)
        .map(|v| SessionVariable {
            session_id: v.props.session_id.clone(),
            name: v.name.clone(),
            content: v.content.clone(),
            state: v.props.state.clone(),
            graphs: Vec::new(),
        })
        .collect();

    for v in payload.iter().filter(|v| v.kind == VariableKind::Graph) {
        match sessions
            .iter_mut()
            .find(|s| s.session_id == v.props.session_id)
        {
            Some(session) => session.graphs.push(GraphVariable {
                name: v.name.clone(),
                content: v.content.clone(),
                state: v.props.state.clone(),
            }),
            None => {
                debug!(
                    "dropping graph variable '{}' with unknown session '{}'",
                    v.name, v.props.session_id
                );
            }
        }
    }

    sessions
}
