// SPDX-License-Identifier: MIT

//! SessionSignal: single-row-per-signal IPC queue between the CLI and the running
//! engine. The CLI inserts a row and exits; the engine polls at ~500ms cadence.

use crate::ids::{SessionId, SignalId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Pause,
    Resume,
    Cancel,
}

crate::simple_display! {
    SignalKind {
        Pause => "pause",
        Resume => "resume",
        Cancel => "cancel",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSignal {
    pub id: SignalId,
    pub session_id: SessionId,
    pub kind: SignalKind,
    pub created_at_ms: u64,
    pub processed_at_ms: Option<u64>,
}
