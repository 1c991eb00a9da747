use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ids::*, model::*};

/// Named, evaluator-specific run parameters.
pub type RuleParameters = BTreeMap<String, serde_json::Value>;

/// Detail map key under which highlight ranges are attached to an issue.
pub const HIGHLIGHTS_DETAIL: &str = "highlights";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationRule {
    pub id: RuleId,
    /// Owning terminology tooling; selects the issue detail extension.
    pub tooling_id: String,
    pub evaluator_type: String,
    #[serde(default)]
    pub check_type: Option<CheckType>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentIdentifier {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(rename = "id")]
    pub component_id: String,
}

impl ComponentIdentifier {
    pub fn new(component_type: impl Into<String>, component_id: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            component_id: component_id.into(),
        }
    }
}

impl fmt::Display for ComponentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component_type, self.component_id)
    }
}

/// Highlighted span inside a component's text, e.g. a description term.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextRange {
    pub start: u32,
    pub length: u32,
}

/// Raw evaluator output. Never persisted directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Finding {
    Component(ComponentIdentifier),
    Detailed {
        component: ComponentIdentifier,
        highlights: Vec<TextRange>,
    },
}

impl Finding {
    pub fn component(&self) -> &ComponentIdentifier {
        match self {
            Finding::Component(c) => c,
            Finding::Detailed { component, .. } => component,
        }
    }

    pub fn into_parts(self) -> (ComponentIdentifier, Vec<TextRange>) {
        match self {
            Finding::Component(c) => (c, vec![]),
            Finding::Detailed { component, highlights } => (component, highlights),
        }
    }
}

impl From<ComponentIdentifier> for Finding {
    fn from(c: ComponentIdentifier) -> Self {
        Finding::Component(c)
    }
}

/// Persisted validation issue.
///
/// At most one issue exists per (result id, rule id, affected component) once a
/// reconciliation cycle has committed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub id: IssueId,
    pub result_id: ResultId,
    pub rule_id: RuleId,
    pub tooling_id: String,
    pub resource_uri: String,
    pub affected_component: ComponentIdentifier,
    pub whitelisted: bool,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ValidationIssue {
    pub fn highlights(&self) -> Vec<TextRange> {
        self.details
            .get(HIGHLIGHTS_DETAIL)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhitelistEntry {
    pub id: WhitelistId,
    pub rule_id: RuleId,
    pub component: ComponentIdentifier,
    #[serde(default)]
    pub reporter: String,
    pub created_at_unix: i64,
}

/// One validation request. An empty `rule_ids` set selects every catalog rule.
#[derive(Clone, Debug, Default)]
pub struct ValidateRequest {
    pub result_id: ResultId,
    pub resource_uri: String,
    pub rule_ids: BTreeSet<RuleId>,
    pub rule_parameters: RuleParameters,
}

impl ValidateRequest {
    pub fn new(result_id: ResultId, resource_uri: impl Into<String>) -> Self {
        Self {
            result_id,
            resource_uri: resource_uri.into(),
            rule_ids: BTreeSet::new(),
            rule_parameters: RuleParameters::new(),
        }
    }

    pub fn with_rules<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule_ids.extend(ids.into_iter().map(RuleId::from_str));
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.rule_parameters.insert(name.into(), value);
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunDescriptor {
    pub result_id: ResultId,
    pub branch_path: String,
}
