use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::InvalidDefinition;
use crate::flags::flag_models::validate_name;
use crate::store::{Record, RecordKind};

/// A named global on/off value with no per-caller logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub note: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
}

impl SwitchRecord {
    pub fn new(name: impl Into<String>, active: bool) -> Self {
        let now = Utc::now();
        SwitchRecord {
            name: name.into(),
            active,
            note: String::new(),
            created: now,
            modified: now,
        }
    }
}

impl Record for SwitchRecord {
    const KIND: RecordKind = RecordKind::Switch;

    fn name(&self) -> &str {
        &self.name
    }

    fn from_default(name: &str, active: bool) -> Self {
        SwitchRecord::new(name, active)
    }

    fn validate(&self) -> Result<(), InvalidDefinition> {
        validate_name(&self.name)
    }
}
