//! Scripted engine behaviour for tests and demos.

use std::collections::HashMap;
use std::time::Duration;

use protocol::RemoteErrorCode;

/// What the engine does with one operation instead of (or before) running
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Run the operation after `Duration`.
    Delay(Duration),
    /// Accept the operation and never complete it. The completer is held
    /// until the session closes.
    Hang,
    /// Complete the operation with a remote failure.
    Fail(RemoteErrorCode),
    /// Refuse to schedule the operation; `Begin` fails synchronously.
    RejectSchedule,
}

/// Per-operation behaviour overrides, keyed by operation name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineScript {
    overrides: HashMap<String, Behavior>,
}

impl EngineScript {
    /// An empty script: every operation runs normally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the behaviour of `operation`.
    #[must_use]
    pub fn on(mut self, operation: &str, behavior: Behavior) -> Self {
        self.set(operation, behavior);
        self
    }

    /// Sets the behaviour of `operation`, replacing any earlier override.
    pub fn set(&mut self, operation: &str, behavior: Behavior) {
        self.overrides.insert(operation.to_string(), behavior);
    }

    /// Removes the override of `operation`.
    pub fn clear(&mut self, operation: &str) {
        self.overrides.remove(operation);
    }

    /// The override of `operation`, if any.
    pub fn behavior_for(&self, operation: &str) -> Option<&Behavior> {
        self.overrides.get(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_are_per_operation() {
        let mut script = EngineScript::new()
            .on("GetProperty", Behavior::Hang)
            .on("CreateName", Behavior::Fail(RemoteErrorCode::NotReady));
        assert_eq!(script.behavior_for("GetProperty"), Some(&Behavior::Hang));
        assert_eq!(script.behavior_for("DeleteName"), None);
        script.clear("GetProperty");
        assert_eq!(script.behavior_for("GetProperty"), None);
    }
}
