use crate::ids::RuleId;

/// Run-level failures. Any of these aborts the whole validation request.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("missing rule ids: {}", join_ids(.0))]
    MissingRules(Vec<RuleId>),

    #[error("rule {0} does not declare a check type")]
    MissingCheckType(RuleId),

    #[error("issue store failure: {0:#}")]
    Store(#[source] anyhow::Error),

    #[error("issue detail extension for tooling {tooling_id} failed: {source:#}")]
    Extension {
        tooling_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("issue details for rule {rule_id} could not be encoded: {source}")]
    Detail {
        rule_id: RuleId,
        #[source]
        source: serde_json::Error,
    },

    #[error("worker pool setup failed: {0}")]
    Pool(String),

    #[error("validation run interrupted")]
    Interrupted,
}

fn join_ids(ids: &[RuleId]) -> String {
    ids.iter().map(RuleId::as_str).collect::<Vec<_>>().join(", ")
}

/// Failure of a single rule evaluation. The run continues without that rule's batch.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
