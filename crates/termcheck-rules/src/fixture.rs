use serde::Deserialize;
use termcheck_core::{ComponentIdentifier, EvalError, Finding, RuleParameters, TextRange, ValidationRule};
use tracing::debug;

use crate::{EvalContext, RuleEvaluator};

pub const FIXTURE_EVALUATOR: &str = "fixture";

/// Data-driven evaluator: reports exactly the findings declared for the rule.
///
/// Findings come from the run parameter `<rule id>.findings` when present,
/// otherwise from `config.findings`. A string `config.fail` makes the rule fail.
pub struct FixtureEvaluator;

#[derive(Debug, Deserialize)]
struct FixtureFinding {
    #[serde(rename = "type")]
    component_type: String,
    id: String,
    #[serde(default)]
    highlights: Vec<TextRange>,
}

impl From<FixtureFinding> for Finding {
    fn from(f: FixtureFinding) -> Self {
        let component = ComponentIdentifier::new(f.component_type, f.id);
        if f.highlights.is_empty() {
            Finding::Component(component)
        } else {
            Finding::Detailed {
                component,
                highlights: f.highlights,
            }
        }
    }
}

impl RuleEvaluator for FixtureEvaluator {
    fn evaluator_type(&self) -> &str {
        FIXTURE_EVALUATOR
    }

    fn eval(&self, ctx: &EvalContext, rule: &ValidationRule, params: &RuleParameters) -> Result<Vec<Finding>, EvalError> {
        if let Some(msg) = rule.config.get("fail").and_then(|v| v.as_str()) {
            return Err(EvalError::new(msg));
        }

        let override_key = format!("{}.findings", rule.id);
        let source = match params.get(&override_key) {
            Some(v) => v.clone(),
            None => rule.config.get("findings").cloned().unwrap_or_else(|| serde_json::json!([])),
        };

        let findings: Vec<FixtureFinding> =
            serde_json::from_value(source).map_err(|e| EvalError::new(format!("invalid fixture findings for {}: {e}", rule.id)))?;
        debug!(rule_id = %rule.id, resource = %ctx.resource_uri, count = findings.len(), "fixture findings");
        Ok(findings.into_iter().map(Finding::from).collect())
    }
}
