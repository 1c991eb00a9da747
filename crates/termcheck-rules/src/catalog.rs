use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use termcheck_core::{CheckType, RuleId, ValidationError, ValidationRule};

/// Rule selection filter. Unset parts match every rule.
#[derive(Clone, Debug, Default)]
pub struct RuleFilter {
    pub ids: BTreeSet<RuleId>,
    pub tooling_ids: BTreeSet<String>,
    pub check_types: BTreeSet<CheckType>,
}

impl RuleFilter {
    pub fn by_ids(ids: BTreeSet<RuleId>) -> Self {
        Self {
            ids,
            ..Self::default()
        }
    }

    fn matches(&self, rule: &ValidationRule) -> bool {
        (self.ids.is_empty() || self.ids.contains(&rule.id))
            && (self.tooling_ids.is_empty() || self.tooling_ids.contains(&rule.tooling_id))
            && (self.check_types.is_empty() || rule.check_type.is_some_and(|ct| self.check_types.contains(&ct)))
    }
}

pub trait RuleCatalog: Send + Sync {
    /// Resolve rules matching `filter`.
    ///
    /// Fails with [`ValidationError::MissingRules`] when explicit ids are given
    /// and some of them are not in the catalog.
    fn search(&self, filter: &RuleFilter) -> Result<Vec<ValidationRule>, ValidationError>;

    /// Stable fingerprint of the catalog contents.
    fn fingerprint(&self) -> String;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuleCatalogFile {
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
}

/// Catalog held in memory, ordered by rule id.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRuleCatalog {
    rules: BTreeMap<RuleId, ValidationRule>,
}

impl InMemoryRuleCatalog {
    pub fn new(rules: Vec<ValidationRule>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for rule in rules {
            validate_rule(&rule)?;
            let id = rule.id.clone();
            if map.insert(id.clone(), rule).is_some() {
                return Err(anyhow!("duplicate rule id in catalog: {id}"));
            }
        }
        Ok(Self { rules: map })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path).with_context(|| format!("read rule catalog: {}", path.display()))?;
        let file: RuleCatalogFile = serde_yaml::from_str(&s).with_context(|| "parse rule catalog yaml")?;
        Self::new(file.rules).with_context(|| format!("load rule catalog: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = RuleCatalogFile {
            rules: self.rules.values().cloned().collect(),
        };
        let s = serde_yaml::to_string(&file).with_context(|| "serialize rule catalog")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleCatalog for InMemoryRuleCatalog {
    fn search(&self, filter: &RuleFilter) -> Result<Vec<ValidationRule>, ValidationError> {
        let missing: Vec<RuleId> = filter.ids.iter().filter(|id| !self.rules.contains_key(*id)).cloned().collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingRules(missing));
        }
        Ok(self.rules.values().filter(|r| filter.matches(r)).cloned().collect())
    }

    fn fingerprint(&self) -> String {
        let rules: Vec<_> = self.rules.values().collect();
        let v = serde_json::to_value(&rules).unwrap_or(serde_json::Value::Null);
        let bytes = serde_json::to_vec(&sort_json(v)).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

fn validate_rule(rule: &ValidationRule) -> Result<()> {
    if rule.id.as_str().trim().is_empty() {
        return Err(anyhow!("rule with empty id"));
    }
    if rule.evaluator_type.trim().is_empty() {
        return Err(anyhow!("rule {} missing evaluator_type", rule.id));
    }
    if rule.tooling_id.trim().is_empty() {
        return Err(anyhow!("rule {} missing tooling_id", rule.id));
    }
    Ok(())
}

/// Recursively sort object keys for stable hashing.
fn sort_json(v: serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<_, _> = map.into_iter().map(|(k, v)| (k, sort_json(v))).collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(arr) => serde_json::Value::Array(arr.into_iter().map(sort_json).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use termcheck_core::Severity;
    use tempfile::tempdir;

    fn rule(id: &str, ct: Option<CheckType>) -> ValidationRule {
        ValidationRule {
            id: RuleId::from_str(id),
            tooling_id: "snomed".into(),
            evaluator_type: "fixture".into(),
            check_type: ct,
            severity: Severity::Error,
            message: String::new(),
            config: json!({}),
        }
    }

    #[test]
    fn empty_filter_selects_all() {
        let cat = InMemoryRuleCatalog::new(vec![rule("b", Some(CheckType::Fast)), rule("a", None)]).unwrap();
        let rules = cat.search(&RuleFilter::default()).unwrap();
        let ids: Vec<_> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn unknown_ids_are_reported_together() {
        let cat = InMemoryRuleCatalog::new(vec![rule("a", Some(CheckType::Fast))]).unwrap();
        let filter = RuleFilter::by_ids([RuleId::from_str("a"), RuleId::from_str("x"), RuleId::from_str("y")].into());
        match cat.search(&filter) {
            Err(ValidationError::MissingRules(ids)) => {
                assert_eq!(ids, vec![RuleId::from_str("x"), RuleId::from_str("y")]);
            }
            other => panic!("expected MissingRules, got {other:?}"),
        }
    }

    #[test]
    fn filter_by_check_type() {
        let cat = InMemoryRuleCatalog::new(vec![rule("a", Some(CheckType::Fast)), rule("b", Some(CheckType::Expensive))]).unwrap();
        let filter = RuleFilter {
            check_types: [CheckType::Expensive].into(),
            ..RuleFilter::default()
        };
        let rules = cat.search(&filter).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id.as_str(), "b");
    }

    #[test]
    fn duplicate_ids_rejected() {
        assert!(InMemoryRuleCatalog::new(vec![rule("a", None), rule("a", None)]).is_err());
    }

    #[test]
    fn load_save_and_fingerprint_is_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        let cat = InMemoryRuleCatalog::new(vec![rule("a", Some(CheckType::Normal))]).unwrap();
        cat.save(&path).unwrap();
        let loaded = InMemoryRuleCatalog::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.fingerprint(), cat.fingerprint());
        assert_eq!(cat.fingerprint().len(), 64);
    }

    #[test]
    fn missing_file_is_empty_catalog() {
        let dir = tempdir().unwrap();
        let cat = InMemoryRuleCatalog::load(&dir.path().join("nope.yaml")).unwrap();
        assert!(cat.is_empty());
    }
}
