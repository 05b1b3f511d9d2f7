//! Composite (group, name) keys for jobs and triggers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Group used when a key is given without one.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Identifies a job definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub group: String,
    pub name: String,
}

/// Identifies the trigger that caused an execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerKey {
    pub group: String,
    pub name: String,
}

impl JobKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl TriggerKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Split `group.name` on the first dot; a bare `name` lands in [`DEFAULT_GROUP`].
fn split_key(s: &str) -> Result<(String, String), String> {
    let (group, name) = match s.split_once('.') {
        Some((g, n)) => (g, n),
        None => (DEFAULT_GROUP, s),
    };
    if group.is_empty() || name.is_empty() {
        return Err(format!("invalid key '{}': expected 'group.name' or 'name'", s));
    }
    Ok((group.to_string(), name.to_string()))
}

impl FromStr for JobKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group, name) = split_key(s)?;
        Ok(Self { group, name })
    }
}

impl FromStr for TriggerKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group, name) = split_key(s)?;
        Ok(Self { group, name })
    }
}
