use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use termcheck_core::{IssueId, IssueQuery, ResultId, RuleId, ValidationIssue, WhitelistEntry, WhitelistId};

use crate::traits::{IssueStore, WhitelistIndex, WhitelistSnapshot};

enum Staged {
    Put(ValidationIssue),
    Remove(Vec<IssueId>),
    DeleteResult(ResultId),
}

/// In-memory issue store for tests. Not durable, but keeps the staged/commit contract.
#[derive(Default)]
pub struct InMemoryIssueStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    committed: HashMap<IssueId, ValidationIssue>,
    staged: Vec<Staged>,
    commits: usize,
}

impl InMemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits applied so far.
    pub fn commit_count(&self) -> usize {
        self.inner.lock().commits
    }

    pub fn all(&self) -> Vec<ValidationIssue> {
        let inner = self.inner.lock();
        IssueQuery::default().page(inner.committed.values().cloned().collect())
    }
}

impl IssueStore for InMemoryIssueStore {
    fn search(&self, result_id: &ResultId, resource_uri: &str, rule_id: &RuleId) -> anyhow::Result<Vec<ValidationIssue>> {
        let inner = self.inner.lock();
        let mut issues: Vec<ValidationIssue> = inner
            .committed
            .values()
            .filter(|i| &i.result_id == result_id && i.resource_uri == resource_uri && &i.rule_id == rule_id)
            .cloned()
            .collect();
        issues.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(issues)
    }

    fn query(&self, query: &IssueQuery) -> anyhow::Result<Vec<ValidationIssue>> {
        let inner = self.inner.lock();
        let matched = inner.committed.values().filter(|i| query.matches(i)).cloned().collect();
        Ok(query.page(matched))
    }

    fn put(&self, issue: ValidationIssue) -> anyhow::Result<()> {
        self.inner.lock().staged.push(Staged::Put(issue));
        Ok(())
    }

    fn remove_all(&self, ids: &[IssueId]) -> anyhow::Result<()> {
        if !ids.is_empty() {
            self.inner.lock().staged.push(Staged::Remove(ids.to_vec()));
        }
        Ok(())
    }

    fn delete_result(&self, result_id: &ResultId) -> anyhow::Result<()> {
        self.inner.lock().staged.push(Staged::DeleteResult(result_id.clone()));
        Ok(())
    }

    fn commit(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let staged = std::mem::take(&mut inner.staged);
        for op in staged {
            match op {
                Staged::Put(issue) => {
                    inner.committed.insert(issue.id.clone(), issue);
                }
                Staged::Remove(ids) => {
                    for id in ids {
                        inner.committed.remove(&id);
                    }
                }
                Staged::DeleteResult(result_id) => {
                    inner.committed.retain(|_, i| i.result_id != result_id);
                }
            }
        }
        inner.commits += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWhitelist {
    entries: Mutex<Vec<WhitelistEntry>>,
}

impl InMemoryWhitelist {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WhitelistIndex for InMemoryWhitelist {
    fn search(&self, rule_ids: &BTreeSet<RuleId>) -> anyhow::Result<WhitelistSnapshot> {
        let entries = self.entries.lock();
        let mut out = WhitelistSnapshot::new();
        for e in entries.iter().filter(|e| rule_ids.is_empty() || rule_ids.contains(&e.rule_id)) {
            out.entry(e.rule_id.clone()).or_default().insert(e.component.clone());
        }
        Ok(out)
    }

    fn add(&self, entry: WhitelistEntry) -> anyhow::Result<()> {
        self.entries.lock().push(entry);
        Ok(())
    }

    fn remove(&self, ids: &[WhitelistId]) -> anyhow::Result<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| !ids.contains(&e.id));
        Ok(before - entries.len())
    }

    fn list(&self) -> anyhow::Result<Vec<WhitelistEntry>> {
        Ok(self.entries.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use termcheck_core::ComponentIdentifier;

    fn issue(rule: &str, component: &str) -> ValidationIssue {
        ValidationIssue {
            id: IssueId::new(),
            result_id: ResultId::from_str("res"),
            rule_id: RuleId::from_str(rule),
            tooling_id: "snomed".into(),
            resource_uri: "MAIN".into(),
            affected_component: ComponentIdentifier::new("concept", component),
            whitelisted: false,
            details: BTreeMap::new(),
        }
    }

    #[test]
    fn staged_writes_invisible_until_commit() {
        let store = InMemoryIssueStore::new();
        store.put(issue("R-1", "1")).unwrap();
        assert!(store.search(&ResultId::from_str("res"), "MAIN", &RuleId::from_str("R-1")).unwrap().is_empty());
        store.commit().unwrap();
        assert_eq!(store.search(&ResultId::from_str("res"), "MAIN", &RuleId::from_str("R-1")).unwrap().len(), 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn search_scopes_by_result_resource_and_rule() {
        let store = InMemoryIssueStore::new();
        store.put(issue("R-1", "1")).unwrap();
        store.put(issue("R-2", "1")).unwrap();
        let mut other = issue("R-1", "2");
        other.resource_uri = "MAIN/a".into();
        store.put(other).unwrap();
        store.commit().unwrap();
        let found = store.search(&ResultId::from_str("res"), "MAIN", &RuleId::from_str("R-1")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].affected_component.component_id, "1");
    }

    #[test]
    fn remove_all_and_delete_result() {
        let store = InMemoryIssueStore::new();
        let a = issue("R-1", "1");
        let a_id = a.id.clone();
        store.put(a).unwrap();
        store.put(issue("R-1", "2")).unwrap();
        store.commit().unwrap();

        store.remove_all(&[a_id]).unwrap();
        store.commit().unwrap();
        assert_eq!(store.all().len(), 1);

        store.delete_result(&ResultId::from_str("res")).unwrap();
        store.commit().unwrap();
        assert!(store.all().is_empty());
    }

    #[test]
    fn whitelist_search_groups_by_rule() {
        let wl = InMemoryWhitelist::new();
        let entry = |rule: &str, id: &str| WhitelistEntry {
            id: WhitelistId::new(),
            rule_id: RuleId::from_str(rule),
            component: ComponentIdentifier::new("concept", id),
            reporter: "test".into(),
            created_at_unix: 0,
        };
        let first = entry("R-1", "1");
        let first_id = first.id.clone();
        wl.add(first).unwrap();
        wl.add(entry("R-1", "2")).unwrap();
        wl.add(entry("R-2", "3")).unwrap();

        let all = wl.search(&BTreeSet::new()).unwrap();
        assert_eq!(all[&RuleId::from_str("R-1")].len(), 2);

        let only = wl.search(&[RuleId::from_str("R-2")].into()).unwrap();
        assert_eq!(only.len(), 1);

        assert_eq!(wl.remove(&[first_id]).unwrap(), 1);
        assert_eq!(wl.list().unwrap().len(), 2);
    }
}
