use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::InvalidDefinition;
use crate::flags::flag_models::{validate_name, validate_percent};
use crate::store::{Record, RecordKind};

/// A named percentage. Every check is an independent draw, nothing sticks to
/// the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub name: String,
    pub percent: f64,
    #[serde(default)]
    pub note: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
}

impl SampleRecord {
    pub fn new(name: impl Into<String>, percent: f64) -> Self {
        let now = Utc::now();
        SampleRecord {
            name: name.into(),
            percent,
            note: String::new(),
            created: now,
            modified: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active_with(&mut rand::thread_rng())
    }

    pub fn is_active_with<G: Rng>(&self, rng: &mut G) -> bool {
        rng.gen_range(0.0..100.0) < self.percent
    }
}

impl Record for SampleRecord {
    const KIND: RecordKind = RecordKind::Sample;

    fn name(&self) -> &str {
        &self.name
    }

    fn from_default(name: &str, active: bool) -> Self {
        SampleRecord::new(name, if active { 100.0 } else { 0.0 })
    }

    fn validate(&self) -> Result<(), InvalidDefinition> {
        validate_name(&self.name)?;
        validate_percent(self.percent)
    }
}
