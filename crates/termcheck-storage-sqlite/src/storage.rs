use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, Row};
use termcheck_core::{
    ComponentIdentifier, IssueId, IssueQuery, ResultId, RuleId, ValidationIssue, WhitelistEntry, WhitelistId,
};
use termcheck_storage::{IssueStore, WhitelistIndex, WhitelistSnapshot};
use tracing::debug;

enum Staged {
    Put(ValidationIssue),
    Remove(Vec<IssueId>),
    DeleteResult(ResultId),
}

/// SQLite-backed issue store and whitelist. Writes are staged in memory and
/// applied in a single transaction on `commit`.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    staged: Mutex<Vec<Staged>>,
}

const ISSUE_COLUMNS: &str =
    "id, result_id, rule_id, tooling_id, resource_uri, component_type, component_id, whitelisted, details_json";

impl SqliteStorage {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory sqlite db")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).context("apply schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
            staged: Mutex::new(vec![]),
        })
    }

    fn issue_from_row(r: &Row<'_>) -> rusqlite::Result<ValidationIssue> {
        let details_json: String = r.get(8)?;
        let details: BTreeMap<String, serde_json::Value> = serde_json::from_str(&details_json).unwrap_or_default();
        Ok(ValidationIssue {
            id: IssueId::from_str(r.get::<_, String>(0)?),
            result_id: ResultId::from_str(r.get::<_, String>(1)?),
            rule_id: RuleId::from_str(r.get::<_, String>(2)?),
            tooling_id: r.get(3)?,
            resource_uri: r.get(4)?,
            affected_component: ComponentIdentifier::new(r.get::<_, String>(5)?, r.get::<_, String>(6)?),
            whitelisted: r.get::<_, i64>(7)? != 0,
            details,
        })
    }

    fn whitelist_from_row(r: &Row<'_>) -> rusqlite::Result<WhitelistEntry> {
        Ok(WhitelistEntry {
            id: WhitelistId::from_str(r.get::<_, String>(0)?),
            rule_id: RuleId::from_str(r.get::<_, String>(1)?),
            component: ComponentIdentifier::new(r.get::<_, String>(2)?, r.get::<_, String>(3)?),
            reporter: r.get(4)?,
            created_at_unix: r.get(5)?,
        })
    }
}

impl IssueStore for SqliteStorage {
    fn search(&self, result_id: &ResultId, resource_uri: &str, rule_id: &RuleId) -> Result<Vec<ValidationIssue>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ISSUE_COLUMNS} FROM validation_issues
             WHERE result_id=?1 AND resource_uri=?2 AND rule_id=?3 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![result_id.0, resource_uri, rule_id.0], Self::issue_from_row)?;
        let mut issues = vec![];
        for row in rows {
            issues.push(row?);
        }
        Ok(issues)
    }

    fn query(&self, query: &IssueQuery) -> Result<Vec<ValidationIssue>> {
        let conn = self.conn.lock();
        let mut clauses = vec![];
        let mut args: Vec<String> = vec![];
        if let Some(r) = &query.result_id {
            args.push(r.0.clone());
            clauses.push(format!("result_id=?{}", args.len()));
        }
        if let Some(uri) = &query.resource_uri {
            args.push(uri.clone());
            clauses.push(format!("resource_uri=?{}", args.len()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let mut stmt = conn.prepare(&format!("SELECT {ISSUE_COLUMNS} FROM validation_issues{where_sql}"))?;
        let rows = stmt.query_map(params_from_iter(args.iter()), Self::issue_from_row)?;
        let mut issues = vec![];
        for row in rows {
            let issue = row?;
            if query.matches(&issue) {
                issues.push(issue);
            }
        }
        Ok(query.page(issues))
    }

    fn put(&self, issue: ValidationIssue) -> Result<()> {
        self.staged.lock().push(Staged::Put(issue));
        Ok(())
    }

    fn remove_all(&self, ids: &[IssueId]) -> Result<()> {
        if !ids.is_empty() {
            self.staged.lock().push(Staged::Remove(ids.to_vec()));
        }
        Ok(())
    }

    fn delete_result(&self, result_id: &ResultId) -> Result<()> {
        self.staged.lock().push(Staged::DeleteResult(result_id.clone()));
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let staged = std::mem::take(&mut *self.staged.lock());
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let (mut puts, mut removes) = (0usize, 0usize);
        for op in staged {
            match op {
                Staged::Put(issue) => {
                    let details_json = serde_json::to_string(&issue.details).context("serialize issue details")?;
                    tx.execute(
                        "INSERT OR REPLACE INTO validation_issues(id, result_id, rule_id, tooling_id, resource_uri, component_type, component_id, whitelisted, details_json)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            issue.id.0,
                            issue.result_id.0,
                            issue.rule_id.0,
                            issue.tooling_id,
                            issue.resource_uri,
                            issue.affected_component.component_type,
                            issue.affected_component.component_id,
                            issue.whitelisted as i64,
                            details_json
                        ],
                    )?;
                    puts += 1;
                }
                Staged::Remove(ids) => {
                    let mut stmt = tx.prepare_cached("DELETE FROM validation_issues WHERE id=?1")?;
                    for id in ids {
                        removes += stmt.execute(params![id.0])?;
                    }
                }
                Staged::DeleteResult(result_id) => {
                    removes += tx.execute("DELETE FROM validation_issues WHERE result_id=?1", params![result_id.0])?;
                }
            }
        }
        tx.commit().context("commit validation issues")?;
        debug!(puts, removes, "issue store commit");
        Ok(())
    }
}

impl WhitelistIndex for SqliteStorage {
    fn search(&self, rule_ids: &BTreeSet<RuleId>) -> Result<WhitelistSnapshot> {
        let mut out = WhitelistSnapshot::new();
        for e in self.list()? {
            if rule_ids.is_empty() || rule_ids.contains(&e.rule_id) {
                out.entry(e.rule_id).or_default().insert(e.component);
            }
        }
        Ok(out)
    }

    fn add(&self, entry: WhitelistEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO whitelist_entries(id, rule_id, component_type, component_id, reporter, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id.0,
                entry.rule_id.0,
                entry.component.component_type,
                entry.component.component_id,
                entry.reporter,
                entry.created_at_unix
            ],
        )?;
        Ok(())
    }

    fn remove(&self, ids: &[WhitelistId]) -> Result<usize> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let mut removed = 0;
        for id in ids {
            removed += tx.execute("DELETE FROM whitelist_entries WHERE id=?1", params![id.0])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<WhitelistEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, rule_id, component_type, component_id, reporter, created_at
             FROM whitelist_entries ORDER BY rule_id, component_type, component_id",
        )?;
        let rows = stmt.query_map([], Self::whitelist_from_row)?;
        let mut entries = vec![];
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn issue(rule: &str, component: &str) -> ValidationIssue {
        let mut details = BTreeMap::new();
        details.insert("highlights".to_string(), json!([{ "start": 1, "length": 2 }]));
        ValidationIssue {
            id: IssueId::new(),
            result_id: ResultId::from_str("res"),
            rule_id: RuleId::from_str(rule),
            tooling_id: "snomed".into(),
            resource_uri: "SNOMEDCT/MAIN".into(),
            affected_component: ComponentIdentifier::new("description", component),
            whitelisted: true,
            details,
        }
    }

    #[test]
    fn sqlite_open_and_migrate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("termcheck.db");
        let _ = SqliteStorage::open(&db_path).unwrap();
        // reopening must not fail on existing schema
        let _ = SqliteStorage::open(&db_path).unwrap();
    }

    #[test]
    fn put_is_staged_until_commit() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let i = issue("R-1", "11");
        store.put(i.clone()).unwrap();
        let res = ResultId::from_str("res");
        let rule = RuleId::from_str("R-1");
        assert!(IssueStore::search(&store, &res, "SNOMEDCT/MAIN", &rule).unwrap().is_empty());

        store.commit().unwrap();
        let found = IssueStore::search(&store, &res, "SNOMEDCT/MAIN", &rule).unwrap();
        assert_eq!(found, vec![i]);
    }

    #[test]
    fn put_same_id_replaces() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let mut i = issue("R-1", "11");
        store.put(i.clone()).unwrap();
        store.commit().unwrap();
        i.whitelisted = false;
        store.put(i.clone()).unwrap();
        store.commit().unwrap();
        let all = store.query(&IssueQuery::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].whitelisted);
    }

    #[test]
    fn remove_and_delete_result_persist() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("termcheck.db");
        let a = issue("R-1", "1");
        let a_id = a.id.clone();
        {
            let store = SqliteStorage::open(&db_path).unwrap();
            store.put(a).unwrap();
            store.put(issue("R-2", "2")).unwrap();
            store.commit().unwrap();
            store.remove_all(&[a_id]).unwrap();
            store.commit().unwrap();
        }
        let store = SqliteStorage::open(&db_path).unwrap();
        let left = store.query(&IssueQuery::default()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].rule_id.as_str(), "R-2");

        store.delete_result(&ResultId::from_str("res")).unwrap();
        store.commit().unwrap();
        assert!(store.query(&IssueQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn query_filters_whitelisted() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let mut shown = issue("R-1", "1");
        shown.whitelisted = false;
        store.put(shown).unwrap();
        store.put(issue("R-1", "2")).unwrap();
        store.commit().unwrap();

        let q = IssueQuery {
            whitelisted: Some(true),
            ..IssueQuery::for_result(ResultId::from_str("res"))
        };
        let found = store.query(&q).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].affected_component.component_id, "2");
    }

    #[test]
    fn whitelist_add_search_remove() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let entry = WhitelistEntry {
            id: WhitelistId::new(),
            rule_id: RuleId::from_str("R-1"),
            component: ComponentIdentifier::new("concept", "42"),
            reporter: "tester".into(),
            created_at_unix: 1,
        };
        store.add(entry.clone()).unwrap();
        assert_eq!(store.list().unwrap(), vec![entry.clone()]);

        let snap = WhitelistIndex::search(&store, &[RuleId::from_str("R-1")].into()).unwrap();
        assert!(snap[&RuleId::from_str("R-1")].contains(&ComponentIdentifier::new("concept", "42")));
        assert!(WhitelistIndex::search(&store, &[RuleId::from_str("R-2")].into()).unwrap().is_empty());

        assert_eq!(store.remove(&[entry.id]).unwrap(), 1);
        assert!(store.list().unwrap().is_empty());
    }
}
