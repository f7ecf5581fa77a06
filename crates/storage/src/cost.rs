// SPDX-License-Identifier: MIT

//! Cost entries and the aggregate views the `cost` CLI command reads.

use crate::error::StoreError;
use rusqlite::{params, Connection, Row};
use substrate_core::{
    BillingMode, CostCategory, CostEntry, CostEntryId, CostTotals, SessionId, TaskId,
};

fn parse_billing_mode(s: &str) -> Result<BillingMode, StoreError> {
    match s {
        "subscription" => Ok(BillingMode::Subscription),
        "api" => Ok(BillingMode::Api),
        "free" => Ok(BillingMode::Free),
        other => Err(StoreError::Validation(format!("unknown billing mode: {other}"))),
    }
}

fn parse_category(s: &str) -> Result<CostCategory, StoreError> {
    match s {
        "execution" => Ok(CostCategory::Execution),
        "planning" => Ok(CostCategory::Planning),
        other => Err(StoreError::Validation(format!("unknown cost category: {other}"))),
    }
}

fn from_row(row: &Row) -> rusqlite::Result<CostEntry> {
    let billing_mode_str: String = row.get("billing_mode")?;
    let billing_mode = parse_billing_mode(&billing_mode_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let category_str: String = row.get("category")?;
    let category = parse_category(&category_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let task_id: Option<String> = row.get("task_id")?;

    Ok(CostEntry {
        id: CostEntryId::from(row.get::<_, String>("id")?),
        session_id: SessionId::from(row.get::<_, String>("session_id")?),
        task_id: task_id.map(TaskId::from),
        agent: row.get("agent")?,
        billing_mode,
        category,
        input_tokens: row.get::<_, i64>("input_tokens")? as u64,
        output_tokens: row.get::<_, i64>("output_tokens")? as u64,
        estimated_cost_usd: row.get("estimated_cost_usd")?,
        actual_cost_usd: row.get("actual_cost_usd")?,
        savings_usd: row.get("savings_usd")?,
        model: row.get("model")?,
        provider: row.get("provider")?,
        recorded_at_ms: row.get::<_, i64>("recorded_at_ms")? as u64,
    })
}

pub fn insert(conn: &Connection, entry: &CostEntry) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO cost_entries (id, session_id, task_id, agent, billing_mode, category,
            input_tokens, output_tokens, estimated_cost_usd, actual_cost_usd, savings_usd,
            model, provider, recorded_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            entry.id.as_str(),
            entry.session_id.as_str(),
            entry.task_id.as_ref().map(|t| t.as_str()),
            entry.agent,
            entry.billing_mode.to_string(),
            entry.category.to_string(),
            entry.input_tokens,
            entry.output_tokens,
            entry.estimated_cost_usd,
            entry.actual_cost_usd,
            entry.savings_usd,
            entry.model,
            entry.provider,
            entry.recorded_at_ms as i64,
        ],
    )?;
    Ok(())
}

pub fn list_for_session(conn: &Connection, session_id: &SessionId) -> Result<Vec<CostEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM cost_entries WHERE session_id = ?1 ORDER BY recorded_at_ms",
    )?;
    let rows = stmt.query_map(params![session_id.as_str()], from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

/// Totals for a session, optionally scoped to one category (e.g. excluding planning
/// spend from an execution-only report).
pub fn totals_for_session(
    conn: &Connection,
    session_id: &SessionId,
    category: Option<CostCategory>,
) -> Result<CostTotals, StoreError> {
    let (cost, input, output, count): (Option<f64>, Option<i64>, Option<i64>, i64) = match category
    {
        Some(category) => conn.query_row(
            "SELECT SUM(COALESCE(actual_cost_usd, estimated_cost_usd)), SUM(input_tokens),
                SUM(output_tokens), COUNT(*)
             FROM cost_entries WHERE session_id = ?1 AND category = ?2",
            params![session_id.as_str(), category.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?,
        None => conn.query_row(
            "SELECT SUM(COALESCE(actual_cost_usd, estimated_cost_usd)), SUM(input_tokens),
                SUM(output_tokens), COUNT(*)
             FROM cost_entries WHERE session_id = ?1",
            params![session_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?,
    };

    Ok(CostTotals {
        total_cost_usd: cost.unwrap_or(0.0),
        total_input_tokens: input.unwrap_or(0) as u64,
        total_output_tokens: output.unwrap_or(0) as u64,
        entry_count: count as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions;
    use crate::store::Store;
    use substrate_core::Session;

    fn seed_session(conn: &Connection) -> SessionId {
        let session = Session::new("demo", "g.yaml", "main", None, serde_json::json!({}), 0);
        sessions::insert(conn, &session).unwrap();
        session.id
    }

    #[test]
    fn totals_sum_across_entries() {
        let store = Store::open_in_memory().unwrap();
        let session_id = seed_session(store.conn());
        for _ in 0..2 {
            let entry = CostEntry::new(
                session_id.clone(),
                None,
                "claude-code",
                BillingMode::Api,
                CostCategory::Execution,
                100,
                50,
                0.25,
                "sonnet",
                "anthropic",
                0,
            );
            insert(store.conn(), &entry).unwrap();
        }

        let totals = totals_for_session(store.conn(), &session_id, None).unwrap();
        assert_eq!(totals.entry_count, 2);
        assert!((totals.total_cost_usd - 0.5).abs() < 1e-9);
        assert_eq!(totals.total_input_tokens, 200);
    }

    #[test]
    fn category_filter_excludes_other_categories() {
        let store = Store::open_in_memory().unwrap();
        let session_id = seed_session(store.conn());
        let exec_entry = CostEntry::new(
            session_id.clone(),
            None,
            "claude-code",
            BillingMode::Api,
            CostCategory::Execution,
            10,
            10,
            0.1,
            "sonnet",
            "anthropic",
            0,
        );
        let plan_entry = CostEntry::new(
            session_id.clone(),
            None,
            "claude-code",
            BillingMode::Api,
            CostCategory::Planning,
            10,
            10,
            0.2,
            "sonnet",
            "anthropic",
            0,
        );
        insert(store.conn(), &exec_entry).unwrap();
        insert(store.conn(), &plan_entry).unwrap();

        let totals =
            totals_for_session(store.conn(), &session_id, Some(CostCategory::Execution)).unwrap();
        assert_eq!(totals.entry_count, 1);
        assert!((totals.total_cost_usd - 0.1).abs() < 1e-9);
    }

    #[test]
    fn actual_cost_overrides_estimate_in_totals() {
        let store = Store::open_in_memory().unwrap();
        let session_id = seed_session(store.conn());
        let mut entry = CostEntry::new(
            session_id.clone(),
            None,
            "claude-code",
            BillingMode::Subscription,
            CostCategory::Execution,
            10,
            10,
            1.0,
            "sonnet",
            "anthropic",
            0,
        );
        entry.actual_cost_usd = Some(0.0);
        entry.savings_usd = Some(1.0);
        insert(store.conn(), &entry).unwrap();

        let totals = totals_for_session(store.conn(), &session_id, None).unwrap();
        assert_eq!(totals.total_cost_usd, 0.0);
    }
}
