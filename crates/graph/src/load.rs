// SPDX-License-Identifier: MIT

//! Top-level entry point: read a graph file from disk, parse it, and validate it.

use std::path::Path;

use crate::document::GraphDocument;
use crate::error::GraphError;
use crate::format::format_for_path;
use crate::parser::parse_str;
use crate::validate::validate;

/// Load and validate the graph file at `path`. Returns a document a caller can hand
/// to [`crate::materialize::materialize`] to build the session/task rows to persist.
pub fn load_graph_file(path: &Path) -> Result<GraphDocument, GraphError> {
    let format = format_for_path(path)?;
    let content = std::fs::read_to_string(path)?;
    let doc = parse_str(&content, format)?;
    validate(&doc)?;
    tracing::info!(path = %path.display(), task_count = doc.tasks.len(), "graph:loaded");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_valid_yaml_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "version: \"1\"\nsession:\n  name: demo\ntasks:\n  a:\n    name: A\n    prompt: p\n    type: coding\n"
        )
        .unwrap();
        let doc = load_graph_file(&path).unwrap();
        assert_eq!(doc.tasks.len(), 1);
    }

    #[test]
    fn a_missing_file_is_a_system_error() {
        let err = load_graph_file(Path::new("/nonexistent/graph.yaml")).unwrap_err();
        assert!(matches!(err, GraphError::System(_)));
    }

    #[test]
    fn an_invalid_graph_fails_validation_not_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.yaml");
        std::fs::write(&path, "version: \"1\"\nsession:\n  name: demo\ntasks: {}\n").unwrap();
        let err = load_graph_file(&path).unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
    }
}
