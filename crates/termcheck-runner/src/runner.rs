use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use termcheck_core::{
    ComponentIdentifier, IssueQuery, ResultId, RuleId, RunDescriptor, ValidateRequest, ValidationIssue, WhitelistEntry, WhitelistId,
};
use termcheck_rules::{EvaluatorRegistry, ExtensionRegistry, FixtureEvaluator, InMemoryRuleCatalog, RuleCatalog, RuleFilter};
use termcheck_storage::{IssueStore, WhitelistIndex};
use termcheck_storage_sqlite::SqliteStorage;

use crate::{util::now_unix, Config, ValidationPools, ValidationService};

/// Repo-local wiring: config, rule catalog and SQLite store under `.termcheck/`.
pub struct Runner {
    pub repo_root: PathBuf,
    pub cfg: Config,
    pub catalog: Arc<InMemoryRuleCatalog>,
    pub storage: Arc<SqliteStorage>,
    pub service: ValidationService,
}

impl Runner {
    pub fn open(repo_root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&repo_root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_repo();
            cfg.save_to(&cfg_path)?;
            cfg
        };

        let storage = Arc::new(SqliteStorage::open(&cfg.db_path(&repo_root))?);
        let catalog = Arc::new(InMemoryRuleCatalog::load(&cfg.catalog_path(&repo_root))?);
        let evaluators = EvaluatorRegistry::new().with(Arc::new(FixtureEvaluator));
        let pools = ValidationPools::new(&cfg.pools).context("build validation pools")?;

        let service = ValidationService::new(
            catalog.clone(),
            Arc::new(evaluators),
            Arc::new(ExtensionRegistry::new()),
            storage.clone(),
            storage.clone(),
            Arc::new(pools),
            cfg.polling.clone(),
        );

        Ok(Self {
            repo_root,
            cfg,
            catalog,
            storage,
            service,
        })
    }

    pub fn init_repo(repo_root: &Path) -> Result<()> {
        let cfg_path = Config::config_path(repo_root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_repo();
            cfg.save_to(&cfg_path)?;
            cfg
        };
        let catalog_path = cfg.catalog_path(repo_root);
        if !catalog_path.exists() {
            InMemoryRuleCatalog::default().save(&catalog_path)?;
        }
        // create db
        let _ = SqliteStorage::open(&cfg.db_path(repo_root))?;
        Ok(())
    }

    pub fn validate(&self, request: ValidateRequest) -> Result<RunDescriptor> {
        Ok(self.service.validate(request)?)
    }

    pub fn rules(&self) -> Result<Vec<termcheck_core::ValidationRule>> {
        Ok(self.catalog.search(&RuleFilter::default())?)
    }

    pub fn fingerprint(&self) -> String {
        self.catalog.fingerprint()
    }

    pub fn issues(&self, query: &IssueQuery) -> Result<Vec<ValidationIssue>> {
        self.storage.query(query)
    }

    /// Drop every stored issue of `result_id`.
    pub fn purge(&self, result_id: &ResultId) -> Result<()> {
        Ok(self.service.purge(result_id)?)
    }

    pub fn whitelist_add(&self, rule_id: &str, component: ComponentIdentifier, reporter: &str) -> Result<WhitelistId> {
        let rule_id = RuleId::from_str(rule_id);
        // surface unknown rule ids the same way validation does
        self.catalog.search(&RuleFilter::by_ids([rule_id.clone()].into()))?;
        let entry = WhitelistEntry {
            id: WhitelistId::new(),
            rule_id,
            component,
            reporter: reporter.to_string(),
            created_at_unix: now_unix(),
        };
        let id = entry.id.clone();
        self.storage.add(entry)?;
        Ok(id)
    }

    pub fn whitelist_remove(&self, ids: &[String]) -> Result<usize> {
        let ids: Vec<WhitelistId> = ids.iter().map(WhitelistId::from_str).collect();
        self.storage.remove(&ids)
    }

    pub fn whitelist(&self) -> Result<Vec<WhitelistEntry>> {
        self.storage.list()
    }
}
