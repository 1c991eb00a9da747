use std::collections::HashMap;
use std::sync::Arc;

use termcheck_core::{EvalError, Finding, ResultId, RuleParameters, ValidationRule};

/// Read-only context handed to every evaluation of one run.
#[derive(Clone, Debug)]
pub struct EvalContext {
    pub result_id: ResultId,
    pub resource_uri: String,
}

pub trait RuleEvaluator: Send + Sync {
    /// Evaluator type name rules refer to via `evaluator_type`.
    fn evaluator_type(&self) -> &str;

    fn eval(&self, ctx: &EvalContext, rule: &ValidationRule, params: &RuleParameters) -> Result<Vec<Finding>, EvalError>;
}

/// Explicit evaluator lookup by type name, injected into the validation service.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn RuleEvaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `evaluator` under its own type name, replacing any previous one.
    pub fn register(&mut self, evaluator: Arc<dyn RuleEvaluator>) -> &mut Self {
        self.evaluators.insert(evaluator.evaluator_type().to_string(), evaluator);
        self
    }

    pub fn with(mut self, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        self.register(evaluator);
        self
    }

    pub fn get(&self, evaluator_type: &str) -> Option<Arc<dyn RuleEvaluator>> {
        self.evaluators.get(evaluator_type).cloned()
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.evaluators.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
