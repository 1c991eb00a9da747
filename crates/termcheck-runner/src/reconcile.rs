use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use termcheck_core::{
    ComponentIdentifier, Finding, IssueId, RuleId, RuleParameters, TextRange, ValidationError, ValidationIssue, ValidationRule,
    HIGHLIGHTS_DETAIL,
};
use termcheck_queue::{group_batches, ValidationBatch};
use termcheck_rules::{EvalContext, ExtensionRegistry};
use termcheck_storage::{IssueStore, WhitelistSnapshot};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub rules: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub whitelisted: usize,
}

impl CycleStats {
    pub fn absorb(&mut self, other: CycleStats) {
        self.rules += other.rules;
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.whitelisted += other.whitelisted;
    }
}

/// Turns drained findings into the persisted issue set. Only the drain-loop
/// thread uses it, so the store sees a single writer.
pub struct Reconciler<'a> {
    pub ctx: &'a EvalContext,
    pub params: &'a RuleParameters,
    pub rules: &'a HashMap<RuleId, ValidationRule>,
    pub store: &'a dyn IssueStore,
    pub extensions: &'a ExtensionRegistry,
}

impl Reconciler<'_> {
    /// Reconcile every rule in `batches` against the stored issues, run the
    /// detail extensions and commit once.
    ///
    /// Each reconciled rule's whitelist entries are taken out of `whitelist`.
    pub fn run_cycle(&self, batches: Vec<ValidationBatch>, whitelist: &mut WhitelistSnapshot) -> Result<CycleStats, ValidationError> {
        let mut stats = CycleStats::default();
        let mut by_tooling: BTreeMap<String, Vec<ValidationIssue>> = BTreeMap::new();
        let mut to_delete: Vec<IssueId> = vec![];

        for (rule_id, findings) in group_batches(batches) {
            let Some(rule) = self.rules.get(&rule_id) else {
                warn!(rule_id = %rule_id, "batch for a rule outside this run; ignored");
                continue;
            };
            let suppressed = whitelist.remove(&rule_id).unwrap_or_default();
            let (issues, stale, rule_stats) = self.reconcile_rule(rule, findings, |c| suppressed.contains(c))?;
            stats.absorb(rule_stats);
            to_delete.extend(stale);
            by_tooling.entry(rule.tooling_id.clone()).or_default().extend(issues);
        }

        for (tooling_id, issues) in by_tooling.iter_mut() {
            if let Some(extension) = self.extensions.get(tooling_id) {
                extension
                    .extend(self.ctx, issues, self.params)
                    .map_err(|source| ValidationError::Extension {
                        tooling_id: tooling_id.clone(),
                        source,
                    })?;
            }
        }

        // Nothing is staged until every extension succeeded.
        self.store.remove_all(&to_delete).map_err(ValidationError::Store)?;
        for issue in by_tooling.into_values().flatten() {
            self.store.put(issue).map_err(ValidationError::Store)?;
        }
        self.store.commit().map_err(ValidationError::Store)?;

        info!(
            result_id = %self.ctx.result_id,
            rules = stats.rules,
            created = stats.created,
            updated = stats.updated,
            deleted = stats.deleted,
            whitelisted = stats.whitelisted,
            "reconciliation cycle committed"
        );
        Ok(stats)
    }

    /// Diff one rule's findings against its persisted issues.
    ///
    /// Returns the issues to write and the ids to delete: duplicates plus
    /// components no longer reported.
    fn reconcile_rule(
        &self,
        rule: &ValidationRule,
        findings: Vec<Finding>,
        is_suppressed: impl Fn(&ComponentIdentifier) -> bool,
    ) -> Result<(Vec<ValidationIssue>, Vec<IssueId>, CycleStats), ValidationError> {
        let existing = self
            .store
            .search(&self.ctx.result_id, &self.ctx.resource_uri, &rule.id)
            .map_err(ValidationError::Store)?;

        let mut to_delete: Vec<IssueId> = vec![];
        let mut by_component: HashMap<ComponentIdentifier, ValidationIssue> = HashMap::with_capacity(existing.len());
        for issue in existing {
            match by_component.entry(issue.affected_component.clone()) {
                Entry::Occupied(_) => to_delete.push(issue.id),
                Entry::Vacant(slot) => {
                    slot.insert(issue);
                }
            }
        }
        if !to_delete.is_empty() {
            debug!(rule_id = %rule.id, duplicates = to_delete.len(), "healing duplicate issues");
        }

        let mut stats = CycleStats {
            rules: 1,
            ..CycleStats::default()
        };
        let mut issues = Vec::new();
        for (component, highlights) in merge_findings(findings) {
            let (id, result_id, rule_id) = match by_component.remove(&component) {
                Some(prev) => {
                    stats.updated += 1;
                    (prev.id, prev.result_id, prev.rule_id)
                }
                None => {
                    stats.created += 1;
                    (IssueId::new(), self.ctx.result_id.clone(), rule.id.clone())
                }
            };

            let whitelisted = is_suppressed(&component);
            if whitelisted {
                stats.whitelisted += 1;
            }

            let mut details = BTreeMap::new();
            if !highlights.is_empty() {
                let value = serde_json::to_value(&highlights).map_err(|source| ValidationError::Detail {
                    rule_id: rule.id.clone(),
                    source,
                })?;
                details.insert(HIGHLIGHTS_DETAIL.to_string(), value);
            }

            issues.push(ValidationIssue {
                id,
                result_id,
                rule_id,
                tooling_id: rule.tooling_id.clone(),
                resource_uri: self.ctx.resource_uri.clone(),
                affected_component: component,
                whitelisted,
                details,
            });
        }

        to_delete.extend(by_component.into_values().map(|stale| stale.id));
        to_delete.sort();
        stats.deleted = to_delete.len();

        Ok((issues, to_delete, stats))
    }
}

/// Collapse findings that name the same component, keeping first-seen order and
/// concatenating their highlight ranges.
fn merge_findings(findings: Vec<Finding>) -> Vec<(ComponentIdentifier, Vec<TextRange>)> {
    let mut merged: Vec<(ComponentIdentifier, Vec<TextRange>)> = Vec::with_capacity(findings.len());
    let mut index: HashMap<ComponentIdentifier, usize> = HashMap::with_capacity(findings.len());
    for finding in findings {
        let (component, highlights) = finding.into_parts();
        match index.get(&component) {
            Some(&i) => merged[i].1.extend(highlights),
            None => {
                index.insert(component.clone(), merged.len());
                merged.push((component, highlights));
            }
        }
    }
    merged
}
