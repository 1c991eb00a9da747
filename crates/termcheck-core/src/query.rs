use std::collections::BTreeSet;

use crate::{ids::*, types::ValidationIssue};

/// Filter over committed issues. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct IssueQuery {
    pub result_id: Option<ResultId>,
    pub resource_uri: Option<String>,
    pub rule_ids: BTreeSet<RuleId>,
    pub tooling_id: Option<String>,
    pub whitelisted: Option<bool>,
    pub affected_component_id: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl IssueQuery {
    pub fn for_result(result_id: ResultId) -> Self {
        Self {
            result_id: Some(result_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, issue: &ValidationIssue) -> bool {
        if let Some(r) = &self.result_id {
            if &issue.result_id != r {
                return false;
            }
        }
        if let Some(uri) = &self.resource_uri {
            if &issue.resource_uri != uri {
                return false;
            }
        }
        if !self.rule_ids.is_empty() && !self.rule_ids.contains(&issue.rule_id) {
            return false;
        }
        if let Some(t) = &self.tooling_id {
            if &issue.tooling_id != t {
                return false;
            }
        }
        if let Some(w) = self.whitelisted {
            if issue.whitelisted != w {
                return false;
            }
        }
        if let Some(c) = &self.affected_component_id {
            if &issue.affected_component.component_id != c {
                return false;
            }
        }
        true
    }

    /// Sorts by rule id then affected component and applies offset/limit.
    pub fn page(&self, mut issues: Vec<ValidationIssue>) -> Vec<ValidationIssue> {
        issues.sort_by(|a, b| {
            a.rule_id
                .cmp(&b.rule_id)
                .then_with(|| a.affected_component.cmp(&b.affected_component))
                .then_with(|| a.id.cmp(&b.id))
        });
        let iter = issues.into_iter().skip(self.offset);
        match self.limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }
}
