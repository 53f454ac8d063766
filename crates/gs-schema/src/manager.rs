//! In-memory graph schema with uniqueness validation.
//!
//! One `GraphManager` backs one graph-operation panel. Every mutation
//! validates before touching the model, so a rejected operation leaves
//! the schema exactly as it was.

use indexmap::IndexMap;
use thiserror::Error;

use crate::model::{Edge, Vertex};

/// Validation failures raised by schema mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Vertex label '{0}' exists in current graph.")]
    DuplicateLabel(String),

    #[error("Edge label '{label}({src_label} => {dst_label})' exists in current graph.")]
    DuplicateEdge {
        label: String,
        src_label: String,
        dst_label: String,
    },

    #[error("Edge label '{label}({src_label} => {dst_label})' not found in current graph.")]
    EdgeNotFound {
        label: String,
        src_label: String,
        dst_label: String,
    },
}

/// Mutable schema of one graph under construction.
///
/// Insertion order is preserved for both vertex labels and edge
/// sub-label lists; code generation depends on it for determinism.
#[derive(Debug, Default)]
pub struct GraphManager {
    vertices: IndexMap<String, Vertex>,
    edges: IndexMap<String, Vec<Edge>>,
}

impl GraphManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new vertex label. Fails if the label is already present.
    pub fn add_vertex(&mut self, v: Vertex) -> Result<(), SchemaError> {
        if self.vertices.contains_key(&v.label) {
            return Err(SchemaError::DuplicateLabel(v.label));
        }
        self.vertices.insert(v.label.clone(), v);
        Ok(())
    }

    /// Upsert a vertex by label.
    pub fn edit_vertex(&mut self, v: Vertex) {
        self.vertices.insert(v.label.clone(), v);
    }

    /// Remove a vertex by label. No-op if absent.
    pub fn delete_vertex(&mut self, v: &Vertex) {
        self.vertices.shift_remove(&v.label);
    }

    /// Add a new edge. Fails if an edge with the same
    /// `(label, src_label, dst_label)` already exists; otherwise the
    /// edge joins the sub-label list for its label.
    pub fn add_edge(&mut self, ne: Edge) -> Result<(), SchemaError> {
        if let Some(edges) = self.edges.get_mut(&ne.label) {
            if edges.iter().any(|e| ne.same_sub_label(e)) {
                return Err(SchemaError::DuplicateEdge {
                    label: ne.label,
                    src_label: ne.src_label,
                    dst_label: ne.dst_label,
                });
            }
            edges.push(ne);
        } else {
            self.edges.insert(ne.label.clone(), vec![ne]);
        }
        Ok(())
    }

    /// Replace the sub-label edge matching `(label, src_label, dst_label)`.
    ///
    /// An edit that addresses no existing sub-label fails with
    /// `EdgeNotFound` and leaves the model unchanged.
    pub fn edit_edge(&mut self, ne: Edge) -> Result<(), SchemaError> {
        let not_found = || SchemaError::EdgeNotFound {
            label: ne.label.clone(),
            src_label: ne.src_label.clone(),
            dst_label: ne.dst_label.clone(),
        };
        let edges = self.edges.get_mut(&ne.label).ok_or_else(not_found)?;
        let slot = edges
            .iter_mut()
            .find(|e| ne.same_sub_label(e))
            .ok_or_else(not_found)?;
        *slot = ne;
        Ok(())
    }

    /// Remove the sub-label edge matching `(label, src_label, dst_label)`.
    ///
    /// No-op if absent. When a label's last sub-label is removed the
    /// whole label entry disappears.
    pub fn delete_edge(&mut self, ne: &Edge) {
        if let Some(edges) = self.edges.get_mut(&ne.label) {
            edges.retain(|e| !ne.same_sub_label(e));
            if edges.is_empty() {
                self.edges.shift_remove(&ne.label);
            }
        }
    }

    pub fn vertices(&self) -> &IndexMap<String, Vertex> {
        &self.vertices
    }

    pub fn edges(&self) -> &IndexMap<String, Vec<Edge>> {
        &self.edges
    }
}
