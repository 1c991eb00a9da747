use std::collections::{BTreeSet, HashMap, HashSet};

use termcheck_core::{ComponentIdentifier, IssueId, IssueQuery, ResultId, RuleId, ValidationIssue, WhitelistEntry, WhitelistId};

/// Suppressed components per rule, as read from the whitelist at run start.
pub type WhitelistSnapshot = HashMap<RuleId, HashSet<ComponentIdentifier>>;

/// Transactional write surface for validation issues.
///
/// `put`, `remove_all` and `delete_result` are staged and become visible to
/// readers only after `commit`. Reads always see committed state.
///
/// The staging buffer belongs to the store, not to a caller: `commit` applies
/// whatever any writer staged. Use one writer at a time per store.
pub trait IssueStore: Send + Sync {
    fn search(&self, result_id: &ResultId, resource_uri: &str, rule_id: &RuleId) -> anyhow::Result<Vec<ValidationIssue>>;
    fn query(&self, query: &IssueQuery) -> anyhow::Result<Vec<ValidationIssue>>;

    fn put(&self, issue: ValidationIssue) -> anyhow::Result<()>;
    fn remove_all(&self, ids: &[IssueId]) -> anyhow::Result<()>;
    fn delete_result(&self, result_id: &ResultId) -> anyhow::Result<()>;

    /// Apply everything staged since the last commit atomically.
    fn commit(&self) -> anyhow::Result<()>;
}

pub trait WhitelistIndex: Send + Sync {
    /// Whitelisted components keyed by rule. An empty id set means all rules.
    fn search(&self, rule_ids: &BTreeSet<RuleId>) -> anyhow::Result<WhitelistSnapshot>;

    fn add(&self, entry: WhitelistEntry) -> anyhow::Result<()>;
    fn remove(&self, ids: &[WhitelistId]) -> anyhow::Result<usize>;
    fn list(&self) -> anyhow::Result<Vec<WhitelistEntry>>;
}
