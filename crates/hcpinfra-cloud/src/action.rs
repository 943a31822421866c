//! Bookkeeping for batches of resource actions

use serde::{Deserialize, Serialize};

/// What happened to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// The resource was created or updated
    Create,
    /// The resource was deleted
    Delete,
    /// Nothing to do (already present, or already gone)
    Skip,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::Skip => write!(f, "skip"),
        }
    }
}

/// Result of applying a batch of actions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Successfully applied actions
    pub succeeded: Vec<ActionResult>,

    /// Failed actions
    pub failed: Vec<ActionResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(
        &mut self,
        resource_id: impl Into<String>,
        action: ActionType,
        message: impl Into<String>,
    ) {
        self.succeeded.push(ActionResult {
            resource_id: resource_id.into(),
            action,
            message: message.into(),
            error: None,
        });
    }

    pub fn add_failure(
        &mut self,
        resource_id: impl Into<String>,
        action: ActionType,
        error: impl Into<String>,
    ) {
        self.failed.push(ActionResult {
            resource_id: resource_id.into(),
            action,
            message: String::new(),
            error: Some(error.into()),
        });
    }

    /// Number of successful results of the given type.
    pub fn count(&self, action: ActionType) -> usize {
        self.succeeded.iter().filter(|r| r.action == action).count()
    }

    /// One line per failure, `resource: error`.
    pub fn failure_lines(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|r| format!("{}: {}", r.resource_id, r.error.as_deref().unwrap_or("")))
            .collect()
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Resource id or name the action applied to
    pub resource_id: String,

    pub action: ActionType,

    /// Success message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,
}
