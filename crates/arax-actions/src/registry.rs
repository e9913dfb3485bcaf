//! Action registry and trait definitions
//!
//! Each action is a self-contained module implementing the Action trait.
//! The registry maps command names to handlers; the executor looks a
//! command up here and reports `UnrecognizedCommand` when it is absent.

use arax_core::{ParamError, Parameters, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// One step of a processing plan.
///
/// Handlers mutate the message held by `response` and append to its log.
/// Expected failures (bad parameters, unknown keys) are recorded with
/// `response.error()` and the handler returns `Ok`. An `Err` is a fault:
/// the executor converts it to `UncaughtARAXiError` and aborts.
#[async_trait::async_trait]
pub trait Action: Send + Sync {
    /// Command name as it appears in a request (e.g. "add_qnode").
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Parameter names this action accepts. Empty means none.
    fn allowed_parameters(&self) -> &[&'static str] {
        &[]
    }

    /// Error code for unknown parameter names that invalidate the whole
    /// request before anything runs. `None` leaves the check to `apply`.
    fn request_shape_code(&self) -> Option<&'static str> {
        None
    }

    async fn apply(&self, response: &mut Response, params: &Parameters) -> anyhow::Result<()>;
}

pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Register an action. Replaces any existing action with the same name.
    pub fn register(&mut self, action: impl Action + 'static) {
        let name = action.name().to_string();
        self.actions.insert(name, Arc::new(action));
    }

    /// Make `alias` dispatch to the already-registered `target`.
    pub fn alias(&mut self, alias: &str, target: &str) -> bool {
        match self.actions.get(target).cloned() {
            Some(action) => {
                self.actions.insert(alias.to_string(), action);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.actions.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    /// Registered command names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Record a parameter error on the response. Returns the value on success.
pub(crate) fn param<T>(response: &mut Response, value: Result<T, ParamError>) -> Option<T> {
    match value {
        Ok(v) => Some(v),
        Err(e) => {
            response.error(e.to_string(), e.code());
            None
        }
    }
}

/// Reject unknown parameter names, reporting them under `code`.
pub(crate) fn check_params(
    response: &mut Response,
    params: &Parameters,
    allowed: &[&str],
    code: &str,
) -> bool {
    match params.check_allowed(allowed) {
        Ok(()) => true,
        Err(e) => {
            response.error(e.to_string(), code);
            false
        }
    }
}
