//! Schema definitions edited through the graph-operation panel.
//!
//! These structs cross a JSON boundary to the front end, hence the
//! camelCase field renames. They describe *how to load* a labeled
//! vertex or edge set from a tabular source, not the loaded data.

use serde::{Deserialize, Serialize};

/// A single named property selected from a data source.
///
/// `type_name` of `"auto"` means "let the engine infer the type"; any
/// other value is passed through to the generated loader verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// An extra keyword argument forwarded to the loader call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraParam {
    pub key: String,
    pub value: String,
}

/// A vertex label definition. `label` is the unique key within a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vertex {
    pub label: String,
    pub id_field: String,
    pub location: String,
    pub header_row: bool,
    pub delimiter: String,
    #[serde(default)]
    pub extra_params_switch: bool,
    #[serde(default)]
    pub extra_params: Vec<ExtraParam>,
    #[serde(default)]
    pub select_all_properties: bool,
    #[serde(default)]
    pub properties_data: Vec<Property>,
}

/// An edge label definition.
///
/// Several edges may share a `label` (sub-labels); within one label the
/// `(src_label, dst_label)` pair is the distinguishing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub label: String,
    pub src_label: String,
    pub dst_label: String,
    pub src_field: String,
    pub dst_field: String,
    pub location: String,
    pub header_row: bool,
    pub delimiter: String,
    #[serde(default)]
    pub extra_params_switch: bool,
    #[serde(default)]
    pub extra_params: Vec<ExtraParam>,
    #[serde(default)]
    pub select_all_properties: bool,
    #[serde(default)]
    pub properties_data: Vec<Property>,
}

impl Edge {
    /// Whether `other` addresses the same sub-label slot as `self`.
    pub fn same_sub_label(&self, other: &Edge) -> bool {
        self.src_label == other.src_label && self.dst_label == other.dst_label
    }
}
