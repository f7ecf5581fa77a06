// SPDX-License-Identifier: MIT

//! Raw deserialization of graph file content into a [`GraphDocument`], before any
//! semantic validation runs.

use crate::document::GraphDocument;
use crate::error::GraphError;
use crate::format::Format;

pub fn parse_str(content: &str, format: Format) -> Result<GraphDocument, GraphError> {
    match format {
        Format::Yaml => serde_yaml::from_str(content).map_err(|e| GraphError::Parse(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| GraphError::Parse(e.to_string())),
    }
}
