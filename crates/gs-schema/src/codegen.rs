//! Compilation of a graph schema into an executable loading script.
//!
//! The output is a self-contained Python block: an import, a vertex
//! mapping, an edge mapping and a single `load_from` call binding the
//! new graph variable. Rendering is a pure function of the schema plus
//! the explicit arguments, and every interpolated string goes through
//! a literal escaper so arbitrary labels or fields cannot produce
//! syntactically broken code.

use std::fmt::Write;

use log::warn;

use crate::manager::GraphManager;
use crate::model::{ExtraParam, Property};

/// Render a string as a double-quoted Python literal.
fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    push_escaped(&mut out, s, '"');
    out.push('"');
    out
}

/// Render a string as a single-quoted Python literal.
fn py_str_single(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    push_escaped(&mut out, s, '\'');
    out.push('\'');
    out
}

fn push_escaped(out: &mut String, s: &str, quote: char) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            // A tab delimiter must appear as the two characters `\t`,
            // never as a literal tab byte.
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

fn py_bool(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

/// Whether an id-field value looks like a number and may be rendered
/// unquoted (a column index rather than a column name).
fn is_numeric_literal(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'))
        && s.parse::<f64>().is_ok()
}

fn id_field_expr(s: &str) -> String {
    if is_numeric_literal(s) {
        s.to_string()
    } else {
        py_str(s)
    }
}

/// Whether an extra-parameter value is structured-literal text (a JSON
/// object or array) that should be inlined unquoted.
fn is_structured_literal(s: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(s),
        Ok(serde_json::Value::Object(_)) | Ok(serde_json::Value::Array(_))
    )
}

fn is_python_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Render a `Loader(...)` call for one data source.
fn loader_expr(
    location: &str,
    header_row: bool,
    delimiter: &str,
    extra_params_switch: bool,
    extra_params: &[ExtraParam],
) -> String {
    let mut out = format!(
        "Loader({}, header_row={}, delimiter={})",
        py_str(location),
        py_bool(header_row),
        py_str(delimiter)
    );
    if extra_params_switch {
        out.pop(); // reopen the call for the extra keyword arguments
        for p in extra_params {
            if p.key.is_empty() || p.value.is_empty() {
                continue;
            }
            if !is_python_identifier(&p.key) {
                warn!("skipping loader parameter with invalid key {:?}", p.key);
                continue;
            }
            if is_structured_literal(&p.value) {
                let _ = write!(out, ", {}={}", p.key, p.value);
            } else {
                let _ = write!(out, ", {}={}", p.key, py_str(&p.value));
            }
        }
        out.push(')');
    }
    out
}

/// Render a property selection.
///
/// `None` is the engine's "no filter" sentinel meaning every property
/// in the source is loaded.
fn property_list_expr(select_all: bool, properties: &[Property]) -> String {
    if select_all {
        return "None".to_string();
    }
    let mut out = String::from("[");
    for p in properties {
        if p.type_name == "auto" {
            let _ = write!(out, "{}, ", py_str_single(&p.name));
        } else {
            let _ = write!(
                out,
                "({}, {}), ",
                py_str_single(&p.name),
                py_str_single(&p.type_name)
            );
        }
    }
    out.push(']');
    out
}

impl GraphManager {
    /// Compile the current schema into a loading script.
    ///
    /// `sess` and `name` are the session variable and the graph
    /// variable to bind; both are used verbatim as Python identifiers.
    /// Vertices, edge labels and sub-label entries are rendered in
    /// insertion order, so the output is deterministic: calling this
    /// twice without mutating the schema yields identical text.
    pub fn generate_code(
        &self,
        sess: &str,
        name: &str,
        oid_type: &str,
        directed: bool,
        generate_eid: bool,
    ) -> String {
        let mut code = String::from("from graphscope.framework.loader import Loader\n");

        let _ = write!(code, "\n{}_vertices = {{\n", name);
        for (label, v) in self.vertices() {
            let _ = write!(
                code,
                "    {}: (\n        {},\n        {},\n        {},\n    ),\n",
                py_str(label),
                loader_expr(
                    &v.location,
                    v.header_row,
                    &v.delimiter,
                    v.extra_params_switch,
                    &v.extra_params,
                ),
                property_list_expr(v.select_all_properties, &v.properties_data),
                id_field_expr(&v.id_field),
            );
        }
        code.push_str("}\n");

        let _ = write!(code, "\n{}_edges = {{\n", name);
        for (label, edges) in self.edges() {
            let _ = write!(code, "    {}: [\n", py_str(label));
            for e in edges {
                let _ = write!(
                    code,
                    "        (\n            {},\n            {},\n            ({}, {}),\n            ({}, {}),\n        ),\n",
                    loader_expr(
                        &e.location,
                        e.header_row,
                        &e.delimiter,
                        e.extra_params_switch,
                        &e.extra_params,
                    ),
                    property_list_expr(e.select_all_properties, &e.properties_data),
                    id_field_expr(&e.src_field),
                    py_str(&e.src_label),
                    id_field_expr(&e.dst_field),
                    py_str(&e.dst_label),
                );
            }
            code.push_str("    ],\n");
        }
        code.push_str("}\n");

        let _ = write!(
            code,
            "\n{name} = {sess}.load_from({name}_edges, {name}_vertices, oid_type={oid}, directed={directed}, generate_eid={eid})\n",
            name = name,
            sess = sess,
            oid = py_str(oid_type),
            directed = py_bool(directed),
            eid = py_bool(generate_eid),
        );

        code
    }
}
