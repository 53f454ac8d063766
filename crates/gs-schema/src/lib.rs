//! Graph schema modeling and loader-script generation.
//!
//! A [`GraphManager`] holds the vertex and edge label definitions a
//! user assembles in the graph-operation panel, enforces the
//! uniqueness invariants (vertex labels unique; edge identity is the
//! `(label, src_label, dst_label)` triple), and compiles the schema
//! into a self-contained Python script that binds a new graph from an
//! existing GraphScope session.
//!
//! Everything here is synchronous and in-memory; the schema lives and
//! dies with its panel.

pub mod codegen;
pub mod manager;
pub mod model;

pub use manager::{GraphManager, SchemaError};
pub use model::{Edge, ExtraParam, Property, Vertex};
