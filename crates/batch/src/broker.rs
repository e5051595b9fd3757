//! Remote execution collaborator: the broker that plans and runs SQL tasks.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::{Error, Result, types::SqlQuery};

/// Statement kinds that can run as a scheduled batch job.
pub const SUPPORTED_STATEMENT_KINDS: &[&str] = &["INSERT", "REPLACE"];

/// Lifecycle state reported for a submitted task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Running,
    Success,
    Failed,
}

/// Broker response to a task submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SqlTaskStatus {
    pub task_id: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl SqlTaskStatus {
    /// Human-readable error text, preferring `errorMessage` from an error
    /// object.
    #[must_use]
    pub fn error_detail(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        match error {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => Some(
                map.get("errorMessage")
                    .and_then(Value::as_str)
                    .map_or_else(|| error.to_string(), str::to_string),
            ),
            other => Some(other.to_string()),
        }
    }
}

/// Classification of a statement returned by the explain step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatementAttributes {
    pub statement_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_resource: Option<String>,
}

impl StatementAttributes {
    #[must_use]
    pub fn new(statement_kind: impl Into<String>, target_resource: Option<&str>) -> Self {
        Self {
            statement_kind: statement_kind.into(),
            target_resource: target_resource.map(str::to_string),
        }
    }
}

/// Client for the remote execution service.
///
/// Both calls are asynchronous; any timeout is the implementation's own and
/// should surface as an error.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Submit `query` for execution.
    async fn submit_task(&self, query: &SqlQuery) -> Result<SqlTaskStatus>;

    /// Classify `query` without executing it.
    async fn explain_plan_for(&self, query: &SqlQuery) -> Result<Vec<StatementAttributes>>;
}

/// Check that an explain result describes exactly one INSERT or REPLACE
/// statement with a target, and return that target.
pub fn validate_plan(plan: &[StatementAttributes]) -> Result<&str> {
    let [attributes] = plan else {
        return Err(Error::plan_validation(format!(
            "expected exactly one statement, explain returned {}",
            plan.len()
        )));
    };

    let kind = attributes.statement_kind.as_str();
    if !SUPPORTED_STATEMENT_KINDS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(kind))
    {
        return Err(Error::plan_validation(format!(
            "statement kind '{kind}' is not supported, expected one of {}",
            SUPPORTED_STATEMENT_KINDS.join(", ")
        )));
    }

    match attributes.target_resource.as_deref() {
        Some(target) if !target.trim().is_empty() => Ok(target),
        _ => Err(Error::plan_validation(format!(
            "{kind} statement has no target resource"
        ))),
    }
}
