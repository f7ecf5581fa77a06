// SPDX-License-Identifier: MIT

//! substrate-orchestrator: the story pipeline layered over substrate-engine's task
//! graph. Owns the CREATE -> DEV -> REVIEW phase state machine, conflict-group
//! partitioning, review-cycle bookkeeping and escalation, and output-contract
//! recovery for dev dispatches that complete without structured output.

mod conflict_group;
mod error;
mod output_contract;
mod pipeline;
mod review;
mod story;

pub use conflict_group::{conflict_key, partition_into_groups};
pub use error::OrchestratorError;
pub use output_contract::recover_output_contract;
pub use pipeline::{PipelineConfig, PipelineOrchestrator, PipelineStatus, StorySnapshot};
pub use review::{parse_review_output, ReviewVerdict};
pub use story::{Story, StoryStatus};
