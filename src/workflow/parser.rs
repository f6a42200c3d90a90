//! SOP document YAML parser.

use std::path::Path;

use super::types::WorkflowDocument;
use crate::error::{Error, Result};

/// Parse a document from a YAML string.
pub fn parse_document(yaml: &str) -> Result<WorkflowDocument> {
    if yaml.trim().is_empty() {
        return Err(Error::Validation("Empty document definition".to_string()));
    }

    let document: WorkflowDocument = serde_yaml::from_str(yaml).map_err(|e| {
        let msg = e.to_string();
        if let Some(field) = extract_missing_field(&msg) {
            Error::Validation(format!("Missing required field: {}", field))
        } else {
            Error::Validation(format!("Invalid YAML: {}", msg))
        }
    })?;
    Ok(document)
}

/// Parse a document from a file path.
pub fn parse_document_file(path: impl AsRef<Path>) -> Result<WorkflowDocument> {
    let content = std::fs::read_to_string(path)?;
    parse_document(&content)
}

fn extract_missing_field(error_message: &str) -> Option<&str> {
    let marker = "missing field `";
    let start = error_message.find(marker)? + marker.len();
    let rest = &error_message[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}
