// SPDX-License-Identifier: MIT

//! Identifier newtypes for every persisted entity.

crate::define_id! {
    /// Root of one graph execution.
    pub struct SessionId("ses-");
}

crate::define_id! {
    /// Unique within a session; used as the task's composite key's second half.
    pub struct TaskId("tsk-");
}

crate::define_id! {
    pub struct ExecutionLogId("log-");
}

crate::define_id! {
    pub struct SignalId("sig-");
}

crate::define_id! {
    pub struct CostEntryId("cst-");
}

crate::define_id! {
    pub struct PlanId("pln-");
}

crate::define_id! {
    pub struct StoryId("sty-");
}

crate::define_id! {
    pub struct WorkerId("wkr-");
}
