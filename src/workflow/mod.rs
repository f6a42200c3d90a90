//! SOP document definition, parsing, validation, and graph resolution.
//!
//! Documents are defined in YAML and consist of:
//! - Nodes: typed units of work (tasks, decisions, loops, ...)
//! - Edges: directed transitions, optionally tagged with a branch label
//! - Prerequisites: declared environment requirements

mod graph;
mod parser;
mod types;
mod validator;

pub use graph::DocumentGraph;
pub use parser::{parse_document, parse_document_file};
pub use types::*;
pub use validator::validate_document;
