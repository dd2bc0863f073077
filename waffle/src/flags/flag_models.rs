use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::InvalidDefinition;
use crate::store::{Record, RecordKind};

/// Hard override for a flag. Stored as `true`, `false` or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Everyone {
    On,
    Off,
    #[default]
    Unset,
}

impl Everyone {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Everyone::On => Some(true),
            Everyone::Off => Some(false),
            Everyone::Unset => None,
        }
    }
}

impl From<Option<bool>> for Everyone {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Everyone::On,
            Some(false) => Everyone::Off,
            None => Everyone::Unset,
        }
    }
}

impl From<Everyone> for Option<bool> {
    fn from(value: Everyone) -> Self {
        value.as_bool()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub name: String,
    #[serde(default)]
    pub everyone: Everyone,
    #[serde(default)]
    pub testing: bool,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub superusers: bool,
    #[serde(default)]
    pub staff: bool,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub rollout: bool,
    #[serde(default)]
    pub note: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
    /// Free-form data read by custom rules.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl FlagRecord {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        FlagRecord {
            name: name.into(),
            everyone: Everyone::Unset,
            testing: false,
            percent: None,
            superusers: false,
            staff: false,
            authenticated: false,
            languages: Vec::new(),
            group_ids: Vec::new(),
            user_ids: Vec::new(),
            rollout: false,
            note: String::new(),
            created: now,
            modified: now,
            extensions: BTreeMap::new(),
        }
    }

    pub fn extension(&self, key: &str) -> Option<&serde_json::Value> {
        self.extensions.get(key)
    }
}

impl Record for FlagRecord {
    const KIND: RecordKind = RecordKind::Flag;

    fn name(&self) -> &str {
        &self.name
    }

    fn from_default(name: &str, active: bool) -> Self {
        FlagRecord {
            everyone: Everyone::from(Some(active)),
            ..FlagRecord::new(name)
        }
    }

    fn validate(&self) -> Result<(), InvalidDefinition> {
        validate_name(&self.name)?;
        if let Some(percent) = self.percent {
            validate_percent(percent)?;
        }
        ensure_unique("languages", &self.languages)?;
        ensure_unique("group_ids", &self.group_ids)?;
        ensure_unique("user_ids", &self.user_ids)?;
        Ok(())
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), InvalidDefinition> {
    if name.trim().is_empty() {
        return Err(InvalidDefinition::EmptyName);
    }
    Ok(())
}

// NaN fails the range check too.
pub(crate) fn validate_percent(percent: f64) -> Result<(), InvalidDefinition> {
    if !(0.0..=100.0).contains(&percent) {
        return Err(InvalidDefinition::PercentOutOfRange(percent));
    }
    Ok(())
}

fn ensure_unique(field: &'static str, values: &[String]) -> Result<(), InvalidDefinition> {
    let mut seen = HashSet::with_capacity(values.len());
    for value in values {
        if !seen.insert(value.as_str()) {
            return Err(InvalidDefinition::DuplicateEntry {
                field,
                value: value.clone(),
            });
        }
    }
    Ok(())
}
