use std::collections::HashMap;
use std::sync::Arc;

use termcheck_core::{RuleParameters, ValidationIssue};

use crate::EvalContext;

/// Tooling-specific enrichment applied to issues right before they are written.
///
/// Implementations may change `details` in place but must leave issue identity
/// and the affected component alone.
pub trait IssueDetailExtension: Send + Sync {
    fn tooling_id(&self) -> &str;

    fn extend(&self, ctx: &EvalContext, issues: &mut [ValidationIssue], params: &RuleParameters) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    extensions: HashMap<String, Arc<dyn IssueDetailExtension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Arc<dyn IssueDetailExtension>) -> &mut Self {
        self.extensions.insert(extension.tooling_id().to_string(), extension);
        self
    }

    pub fn with(mut self, extension: Arc<dyn IssueDetailExtension>) -> Self {
        self.register(extension);
        self
    }

    pub fn get(&self, tooling_id: &str) -> Option<Arc<dyn IssueDetailExtension>> {
        self.extensions.get(tooling_id).cloned()
    }
}
