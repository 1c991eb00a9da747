use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use termcheck_core::CheckType;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub rules: RulesConfig,
    #[serde(default)]
    pub pools: PoolsConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RulesConfig {
    pub catalog_path: String,
}

/// Worker threads per check type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolsConfig {
    pub fast: usize,
    pub normal: usize,
    pub expensive: usize,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            fast: 8,
            normal: 4,
            expensive: 2,
        }
    }
}

impl PoolsConfig {
    pub fn threads_for(&self, check_type: CheckType) -> usize {
        let n = match check_type {
            CheckType::Fast => self.fast,
            CheckType::Normal => self.normal,
            CheckType::Expensive => self.expensive,
        };
        n.max(1)
    }
}

/// Drain-loop backoff: `min(rules * unit_ms, ceiling_ms)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    pub unit_ms: u64,
    pub ceiling_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            unit_ms: 50,
            ceiling_ms: 2000,
        }
    }
}

impl PollingConfig {
    /// Never zero, so the drain loop always yields while rules are running.
    pub fn unit(&self) -> Duration {
        Duration::from_millis(self.unit_ms.max(1))
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms.max(self.unit_ms).max(1))
    }
}

impl Config {
    pub fn default_for_repo() -> Self {
        Self {
            store: StoreConfig {
                db_path: ".termcheck/termcheck.db".to_string(),
            },
            rules: RulesConfig {
                catalog_path: ".termcheck/rules.yaml".to_string(),
            },
            pools: PoolsConfig::default(),
            polling: PollingConfig::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse termcheck.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".termcheck").join("termcheck.toml")
    }

    /// Database path, tilde-expanded and resolved against `repo_root` when relative.
    pub fn db_path(&self, repo_root: &Path) -> PathBuf {
        resolve(repo_root, &self.store.db_path)
    }

    pub fn catalog_path(&self, repo_root: &Path) -> PathBuf {
        resolve(repo_root, &self.rules.catalog_path)
    }
}

fn resolve(repo_root: &Path, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).to_string());
    if expanded.is_absolute() {
        expanded
    } else {
        repo_root.join(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = Config::config_path(dir.path());
        let cfg = Config::default_for_repo();
        cfg.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.pools, cfg.pools);
        assert_eq!(loaded.polling, cfg.polling);
        assert_eq!(loaded.db_path(dir.path()), dir.path().join(".termcheck/termcheck.db"));
    }

    #[test]
    fn pools_and_polling_sections_are_optional() {
        let cfg: Config = toml::from_str(
            r#"
            [store]
            db_path = "/var/lib/termcheck/issues.db"
            [rules]
            catalog_path = "rules.yaml"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.pools, PoolsConfig::default());
        assert_eq!(cfg.db_path(Path::new("/repo")), PathBuf::from("/var/lib/termcheck/issues.db"));
        assert_eq!(cfg.catalog_path(Path::new("/repo")), PathBuf::from("/repo/rules.yaml"));
    }

    #[test]
    fn zero_threads_means_one() {
        let pools = PoolsConfig {
            fast: 0,
            normal: 3,
            expensive: 1,
        };
        assert_eq!(pools.threads_for(CheckType::Fast), 1);
        assert_eq!(pools.threads_for(CheckType::Normal), 3);
    }

    #[test]
    fn zero_unit_still_backs_off() {
        let polling = PollingConfig {
            unit_ms: 0,
            ceiling_ms: 2000,
        };
        assert_eq!(polling.unit(), Duration::from_millis(1));
        assert_eq!(termcheck_core::poll_delay(10, polling.unit(), polling.ceiling()), Duration::from_millis(10));

        let polling = PollingConfig {
            unit_ms: 0,
            ceiling_ms: 0,
        };
        assert_eq!(termcheck_core::poll_delay(10, polling.unit(), polling.ceiling()), Duration::from_millis(1));
    }
}
