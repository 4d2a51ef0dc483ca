//! Deterministic invoker for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tradeflow_core::{AgentInvoker, Error, Invocation, Result, Role, RunId};

/// Answers by role from a script, recording every invocation it sees
///
/// Queued replies are consumed first; after that the role's fixed reply is
/// used, and roles with neither answer `"<role> reply"`.
#[derive(Default)]
pub(crate) struct ScriptedInvoker {
    queued: Mutex<HashMap<Role, VecDeque<Result<String>>>>,
    fixed: HashMap<Role, String>,
    calls: Mutex<Vec<Invocation>>,
    closed: Mutex<Vec<RunId>>,
}

impl ScriptedInvoker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Always answer `role` with `text`
    pub(crate) fn reply(mut self, role: Role, text: impl Into<String>) -> Self {
        self.fixed.insert(role, text.into());
        self
    }

    /// Answer the next calls of `role` from `replies`, in order
    pub(crate) fn script(self, role: Role, replies: impl IntoIterator<Item = Result<String>>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .extend(replies);
        self
    }

    /// Fail every call of `role` with a transport error
    pub(crate) fn fail(self, role: Role, reason: &str) -> Self {
        let failures: Vec<Result<String>> = (0..64)
            .map(|_| Err(Error::Transport(reason.to_string())))
            .collect();
        self.script(role, failures)
    }

    pub(crate) fn calls(&self, role: Role) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.role == role)
            .cloned()
            .collect()
    }

    pub(crate) fn prompts(&self, role: Role) -> Vec<String> {
        self.calls(role).into_iter().map(|call| call.prompt).collect()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn closed_runs(&self) -> Vec<RunId> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(&self, invocation: Invocation) -> Result<String> {
        let role = invocation.role;
        self.calls.lock().unwrap().push(invocation);

        if let Some(next) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
        {
            return next;
        }

        Ok(self
            .fixed
            .get(&role)
            .cloned()
            .unwrap_or_else(|| format!("{role} reply")))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    async fn close_run(&self, run_id: RunId) {
        self.closed.lock().unwrap().push(run_id);
    }
}
