// SPDX-License-Identifier: MIT

//! The orchestrator's own state machine, layered over a session's persisted
//! (coarser) `SessionStatus`. `OrchestratorState` tracks exactly the in-memory phase
//! a running engine instance is in; it does not survive a process restart on its own
//! — crash recovery rebuilds it from `SessionStatus` plus the task table.

use substrate_core::{ExecutionLogEntry, LogEventKind, SessionId};
use substrate_storage::Store;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Loading,
    Executing,
    Paused,
    Completing,
    Cancelling,
}

impl OrchestratorState {
    fn can_transition_to(self, next: OrchestratorState) -> bool {
        use OrchestratorState::*;
        matches!(
            (self, next),
            (Idle, Loading)
                | (Loading, Executing)
                | (Executing, Executing)
                | (Executing, Paused)
                | (Paused, Executing)
                | (Executing, Completing)
                | (Completing, Idle)
                | (Executing, Cancelling)
                | (Paused, Cancelling)
                | (Cancelling, Idle)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Loading => "loading",
            OrchestratorState::Executing => "executing",
            OrchestratorState::Paused => "paused",
            OrchestratorState::Completing => "completing",
            OrchestratorState::Cancelling => "cancelling",
        }
    }
}

/// Validate and apply a transition, writing an `orchestrator:state_change` log entry
/// for the session it belongs to. Any transition not in the table above fails with
/// `IllegalState` and leaves `state` untouched.
pub fn transition(
    store: &mut Store,
    session_id: &SessionId,
    state: &mut OrchestratorState,
    next: OrchestratorState,
    now_ms: u64,
) -> Result<(), EngineError> {
    if !state.can_transition_to(next) {
        return Err(EngineError::IllegalState(format!(
            "orchestrator cannot transition from {} to {}",
            state.as_str(),
            next.as_str()
        )));
    }
    let prior = *state;
    store.with_transaction(|tx| {
        let entry = ExecutionLogEntry::new(
            session_id.clone(),
            None,
            LogEventKind::OrchestratorStateChanged,
            Some(prior.as_str().to_string()),
            next.as_str().to_string(),
            None,
            None,
            serde_json::json!({}),
            now_ms,
        );
        substrate_storage::exec_log::append(tx, &entry)
    })?;
    *state = next;
    Ok(())
}
