// SPDX-License-Identifier: MIT

//! `pause`/`resume`/`cancel`: the CLI's half of the signal protocol. Each inserts one
//! row into `session_signals` and exits immediately; a running engine picks it up on
//! its own poll cadence. No socket, no shared memory — the database row is the entire
//! cross-process channel.

use substrate_core::{Clock, SessionId, SignalKind, SystemClock};
use substrate_storage::{signals, Store};

use crate::config::SubstrateConfig;
use crate::exit_error::ExitError;
use crate::output::OutputFormat;

pub fn run(
    config: &SubstrateConfig,
    session_id: &str,
    kind: SignalKind,
    format: OutputFormat,
) -> Result<(), ExitError> {
    let store = Store::open(config.state_db_path())?;
    let session_id = SessionId::from(session_id);
    let now_ms = SystemClock.now_ms();

    let signal_id = signals::enqueue(store.conn(), &session_id, kind, now_ms)?;

    match format {
        OutputFormat::Json => {
            let envelope = serde_json::json!({
                "event": format!("{kind}:queued"),
                "timestamp": now_ms,
                "data": { "session_id": session_id.as_str(), "signal_id": signal_id.as_str() },
            });
            println!("{envelope}");
        }
        OutputFormat::Text => println!("queued {kind} signal {signal_id} for session {session_id}"),
    }
    Ok(())
}
