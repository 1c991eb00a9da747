use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Concurrency category of a rule. Each check type gets its own worker pool.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Fast,
    Normal,
    Expensive,
}

impl CheckType {
    pub const ALL: [CheckType; 3] = [CheckType::Fast, CheckType::Normal, CheckType::Expensive];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Fast => "fast",
            CheckType::Normal => "normal",
            CheckType::Expensive => "expensive",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fast" => Ok(CheckType::Fast),
            "normal" => Ok(CheckType::Normal),
            "expensive" => Ok(CheckType::Expensive),
            other => Err(format!("unknown check type: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}
