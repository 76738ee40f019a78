use crate::ui::binding::ActionRef;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type ActionHandler = Arc<dyn Fn(&Value) -> ActionOutcome + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed { notice: Option<String> },
    Failed { message: String },
}

impl ActionOutcome {
    pub fn done() -> Self {
        Self::Completed { notice: None }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self::Completed {
            notice: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    UnknownAction { name: String },
    DuplicateHandler { name: String },
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAction { name } => {
                write!(f, "no handler registered for action `{name}`")
            }
            Self::DuplicateHandler { name } => {
                write!(f, "action `{name}` already has a handler")
            }
        }
    }
}

impl std::error::Error for ActionError {}

// Filled once at startup, read-only afterwards. Handlers must tolerate being
// invoked repeatedly with the same params (double-clicks are not debounced).
#[derive(Default)]
pub struct ActionRegistry {
    handlers: BTreeMap<String, ActionHandler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: ActionHandler,
    ) -> Result<(), ActionError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(ActionError::DuplicateHandler { name });
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn dispatch(&self, action: &ActionRef) -> Result<ActionOutcome, ActionError> {
        let handler = self
            .handlers
            .get(&action.name)
            .ok_or_else(|| ActionError::UnknownAction {
                name: action.name.clone(),
            })?;
        Ok(handler(&action.params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn dispatch_passes_params_to_the_handler() {
        // Scenario D: a Button action {"name":"alert","params":{"message":"hi"}}.
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut registry = ActionRegistry::new();
        registry
            .register(
                "alert",
                Arc::new(move |params: &Value| {
                    if let Ok(mut guard) = sink.lock() {
                        guard.push(params.clone());
                    }
                    ActionOutcome::done()
                }),
            )
            .expect("first registration should succeed");

        let action = ActionRef {
            name: "alert".to_string(),
            params: json!({ "message": "hi" }),
        };
        let outcome = registry.dispatch(&action).expect("alert is registered");
        assert_eq!(outcome, ActionOutcome::done());
        assert_eq!(
            seen.lock().expect("sink lock").as_slice(),
            [json!({ "message": "hi" })]
        );
    }

    #[test]
    fn unknown_action_is_an_error_not_a_panic() {
        let registry = ActionRegistry::new();
        let action = ActionRef {
            name: "launch_rocket".to_string(),
            params: Value::Null,
        };
        assert!(matches!(
            registry.dispatch(&action),
            Err(ActionError::UnknownAction { name }) if name == "launch_rocket"
        ));
    }

    #[test]
    fn repeat_dispatch_invokes_the_handler_again() {
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);

        let mut registry = ActionRegistry::new();
        registry
            .register(
                "refresh_graph",
                Arc::new(move |_params: &Value| {
                    if let Ok(mut guard) = sink.lock() {
                        *guard += 1;
                    }
                    ActionOutcome::notice("refreshing")
                }),
            )
            .expect("first registration should succeed");

        let action = ActionRef {
            name: "refresh_graph".to_string(),
            params: json!({}),
        };
        let _ = registry.dispatch(&action);
        let _ = registry.dispatch(&action);
        assert_eq!(*count.lock().expect("count lock"), 2);
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ActionRegistry::new();
        let handler: ActionHandler = Arc::new(|_params: &Value| ActionOutcome::done());
        registry
            .register("alert", Arc::clone(&handler))
            .expect("first registration should succeed");
        assert!(matches!(
            registry.register("alert", handler),
            Err(ActionError::DuplicateHandler { .. })
        ));
    }
}
