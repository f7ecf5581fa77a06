// SPDX-License-Identifier: MIT

//! substrate-graph: graph file parsing (YAML/JSON, dispatched by extension),
//! semantic validation (version, non-empty, dangling dependencies, cycles, unknown
//! task types), and materialization into the session/task/dependency rows a caller
//! persists through substrate-storage.

mod document;
mod error;
mod format;
mod load;
mod materialize;
mod parser;
mod validate;

pub use document::{GraphDocument, SessionDef, TaskDef, SUPPORTED_VERSIONS};
pub use error::GraphError;
pub use format::{format_for_path, Format};
pub use load::load_graph_file;
pub use materialize::{materialize, MaterializedGraph};
pub use parser::parse_str;
pub use validate::validate;
