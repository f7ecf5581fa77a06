// SPDX-License-Identifier: MIT

//! Property-based coverage for the three invariants that only hold across arbitrary
//! sequences of operations rather than one literal scenario: the intent-log's
//! old/new status chain, the concurrency cap, and the retry round-trip.

use std::sync::Arc;

use proptest::prelude::*;
use substrate_core::{Session, SessionId, Task, TaskStatus, TaskType};
use substrate_engine::{EventBus, GraphEngine, WorkerPool};
use substrate_storage::{exec_log, tasks, Store};

fn new_engine(max_concurrency: u32) -> (GraphEngine, SessionId, Arc<parking_lot::Mutex<Store>>) {
    let store = Store::open_in_memory().unwrap();
    let session = Session::new("props", "g.yaml", "main", None, serde_json::json!({}), 0);
    let session_id = session.id.clone();
    substrate_storage::sessions::insert(store.conn(), &session).unwrap();
    let store = Arc::new(parking_lot::Mutex::new(store));
    let bus = Arc::new(EventBus::new());
    let pool = Arc::new(WorkerPool::new(bus.clone()));
    let engine = GraphEngine::new(store.clone(), bus, pool, session_id.clone(), max_concurrency);
    (engine, session_id, store)
}

fn seed_independent_tasks(
    store: &parking_lot::Mutex<Store>,
    session_id: &SessionId,
    count: usize,
    retry_ceiling: u32,
) -> Vec<substrate_core::TaskId> {
    let store = store.lock();
    (0..count)
        .map(|i| {
            let key = format!("t{i}");
            let task = Task::new(
                session_id.clone(),
                &key,
                &key,
                "do it",
                TaskType::Coding,
                retry_ceiling,
                None,
                None,
                None,
                0,
            );
            tasks::insert(store.conn(), &task).unwrap();
            task.id
        })
        .collect()
}

fn in_flight_plus_running(store: &parking_lot::Mutex<Store>, session_id: &SessionId) -> u32 {
    let store = store.lock();
    tasks::list_for_session(store.conn(), session_id)
        .unwrap()
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Ready | TaskStatus::Queued | TaskStatus::Running))
        .count() as u32
}

/// A completion-or-failure outcome for one in-flight task, used to drive every
/// independent task in a round through a random resolution without favoring one
/// path over the other.
#[derive(Debug, Clone, Copy)]
enum Resolution {
    Complete,
    Fail,
}

fn resolution_strategy() -> impl Strategy<Value = Resolution> {
    prop_oneof![Just(Resolution::Complete), Just(Resolution::Fail)]
}

proptest! {
    /// Invariant 2: `inFlight + count(running) <= maxConcurrency` holds after every
    /// transition, for an arbitrary number of independent tasks, an arbitrary cap,
    /// and an arbitrary interleaving of queue/run/resolve steps.
    #[test]
    fn in_flight_plus_running_never_exceeds_the_cap(
        task_count in 1usize..8,
        max_concurrency in 1u32..5,
        resolutions in prop::collection::vec(resolution_strategy(), 0..8),
    ) {
        let (mut engine, session_id, store) = new_engine(max_concurrency);
        seed_independent_tasks(&store, &session_id, task_count, 3);
        let mut now = 0u64;

        engine.start_execution(now).unwrap();
        prop_assert!(in_flight_plus_running(&store, &session_id) <= max_concurrency);

        for resolution in resolutions {
            now += 1;
            let ready: Vec<_> = {
                let guard = store.lock();
                tasks::list_for_session(guard.conn(), &session_id)
                    .unwrap()
                    .into_iter()
                    .filter(|t| t.status == TaskStatus::Ready)
                    .map(|t| t.id)
                    .collect()
            };
            let Some(task_id) = ready.into_iter().next() else { continue };

            engine.mark_task_queued(&task_id, now).unwrap();
            prop_assert!(in_flight_plus_running(&store, &session_id) <= max_concurrency);
            engine.mark_task_running(&task_id, now).unwrap();
            prop_assert!(in_flight_plus_running(&store, &session_id) <= max_concurrency);

            match resolution {
                Resolution::Complete => engine.mark_task_complete(&task_id, None, 0.0, now).unwrap(),
                Resolution::Fail => engine.mark_task_failed(&task_id, "boom", Some(1), now).unwrap(),
            }
            prop_assert!(in_flight_plus_running(&store, &session_id) <= max_concurrency);
        }
    }

    /// Invariant 1: every log entry's `prior_status`/`new_status` pair matches a
    /// transition the task actually underwent. Retries make some transitions (e.g.
    /// `running -> pending`) recur, and the scheduler's own post-failure pass writes
    /// its `pending -> ready` promotion at the same `now_ms` as the failure that
    /// triggered it, so two entries can share a timestamp — `list_for_session`'s
    /// tie-break on a random id means their *return order* is not significant, only
    /// that the set of logged pairs matches the set of transitions driven here.
    #[test]
    fn log_chain_matches_every_observed_status_change(
        retry_ceiling in 0u32..4,
        failures_before_success in 0u32..4,
    ) {
        let failures_before_success = failures_before_success.min(retry_ceiling);
        let (mut engine, session_id, store) = new_engine(5);
        let ids = seed_independent_tasks(&store, &session_id, 1, retry_ceiling);
        let task_id = ids[0].clone();
        let mut now = 0u64;

        let mut expected: Vec<(Option<String>, String)> = Vec::new();
        engine.start_execution(now).unwrap();
        expected.push((Some(TaskStatus::Pending.to_string()), TaskStatus::Ready.to_string()));

        for _ in 0..failures_before_success {
            now += 1;
            engine.mark_task_queued(&task_id, now).unwrap();
            expected.push((Some(TaskStatus::Ready.to_string()), TaskStatus::Queued.to_string()));
            engine.mark_task_running(&task_id, now).unwrap();
            expected.push((Some(TaskStatus::Queued.to_string()), TaskStatus::Running.to_string()));
            engine.mark_task_failed(&task_id, "boom", Some(1), now).unwrap();
            expected.push((Some(TaskStatus::Running.to_string()), TaskStatus::Pending.to_string()));
            expected.push((Some(TaskStatus::Pending.to_string()), TaskStatus::Ready.to_string()));
        }
        now += 1;
        engine.mark_task_queued(&task_id, now).unwrap();
        expected.push((Some(TaskStatus::Ready.to_string()), TaskStatus::Queued.to_string()));
        engine.mark_task_running(&task_id, now).unwrap();
        expected.push((Some(TaskStatus::Queued.to_string()), TaskStatus::Running.to_string()));
        engine.mark_task_complete(&task_id, None, 0.05, now).unwrap();
        expected.push((Some(TaskStatus::Running.to_string()), TaskStatus::Completed.to_string()));

        let guard = store.lock();
        let mut actual: Vec<(Option<String>, String)> = exec_log::list_for_session(guard.conn(), &session_id)
            .unwrap()
            .into_iter()
            .filter(|e| e.task_id.as_ref() == Some(&task_id))
            .map(|e| (e.prior_status, e.new_status))
            .collect();
        drop(guard);

        expected.sort();
        actual.sort();
        prop_assert_eq!(actual, expected);
    }

    /// Invariant 6: a task failing exactly `retryCeiling` times then succeeding ends
    /// terminal-completed; failing one more time than its ceiling allows ends
    /// terminal-failed.
    #[test]
    fn retry_round_trip_lands_on_the_expected_terminal_status(
        retry_ceiling in 0u32..5,
        one_failure_too_many in any::<bool>(),
    ) {
        let (mut engine, session_id, store) = new_engine(5);
        let ids = seed_independent_tasks(&store, &session_id, 1, retry_ceiling);
        let task_id = ids[0].clone();
        let mut now = 0u64;

        engine.start_execution(now).unwrap();
        let failure_count = if one_failure_too_many { retry_ceiling + 1 } else { retry_ceiling };
        for _ in 0..failure_count {
            now += 1;
            engine.mark_task_queued(&task_id, now).unwrap();
            engine.mark_task_running(&task_id, now).unwrap();
            engine.mark_task_failed(&task_id, "boom", Some(1), now).unwrap();
        }

        let status_after_failures = {
            let guard = store.lock();
            tasks::get(guard.conn(), &task_id).unwrap().status
        };

        if one_failure_too_many {
            prop_assert_eq!(status_after_failures, TaskStatus::Failed);
        } else {
            now += 1;
            engine.mark_task_queued(&task_id, now).unwrap();
            engine.mark_task_running(&task_id, now).unwrap();
            engine.mark_task_complete(&task_id, None, 0.02, now).unwrap();
            let guard = store.lock();
            prop_assert_eq!(tasks::get(guard.conn(), &task_id).unwrap().status, TaskStatus::Completed);
        }
    }
}
