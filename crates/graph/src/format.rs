// SPDX-License-Identifier: MIT

//! Graph file format dispatch, decided by file extension.

use std::path::Path;

use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

/// Decide the format of `path` from its extension. `.yaml`/`.yml` parse as YAML,
/// `.json` as JSON; anything else is a parse error rather than a silent guess.
pub fn format_for_path(path: &Path) -> Result<Format, GraphError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(Format::Yaml),
        Some("json") => Ok(Format::Json),
        other => Err(GraphError::Parse(format!(
            "unrecognized graph file extension: {}",
            other.unwrap_or("<none>")
        ))),
    }
}
