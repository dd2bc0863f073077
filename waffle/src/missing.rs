use tracing::Level;

use crate::cache::RecordCache;
use crate::config::{Config, LogLevel};
use crate::errors::StoreError;
use crate::metrics_consts::{MISSING_RECORDS_COUNTER, RECORDS_CREATED_COUNTER};
use crate::metrics_utils::{inc, kind_label};
use crate::store::{Record, RecordKind};

/// Why a record could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingCause {
    NotFound,
    StoreUnavailable,
}

impl MissingCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingCause::NotFound => "not_found",
            MissingCause::StoreUnavailable => "store_unavailable",
        }
    }
}

/// What happens when a flag, switch or sample is looked up but not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingPolicy {
    pub kind: RecordKind,
    pub default: bool,
    pub auto_create: bool,
    pub log_level: LogLevel,
}

impl MissingPolicy {
    pub fn for_kind(config: &Config, kind: RecordKind) -> Self {
        let (default, auto_create, log_level) = match kind {
            RecordKind::Flag => (
                config.flag_default.0,
                config.create_missing_flags.0,
                config.log_missing_flags,
            ),
            RecordKind::Switch => (
                config.switch_default.0,
                config.create_missing_switches.0,
                config.log_missing_switches,
            ),
            RecordKind::Sample => (
                config.sample_default.0,
                config.create_missing_samples.0,
                config.log_missing_samples,
            ),
        };

        MissingPolicy {
            kind,
            default,
            auto_create,
            log_level,
        }
    }

    /// Returns the configured default for `name`, creating the record first
    /// when auto-creation is on. Creation is skipped if the store itself was
    /// the problem.
    pub async fn resolve<R: Record>(
        &self,
        cache: &RecordCache<R>,
        name: &str,
        cause: MissingCause,
    ) -> bool {
        inc(
            MISSING_RECORDS_COUNTER,
            &[
                kind_label(self.kind),
                ("cause".to_string(), cause.as_str().to_string()),
            ],
            1,
        );
        self.log_missing(name, cause);

        if self.auto_create && cause == MissingCause::NotFound {
            self.create(cache, name).await;
        }

        self.default
    }

    async fn create<R: Record>(&self, cache: &RecordCache<R>, name: &str) {
        match cache.store().create(name, self.default).await {
            Ok(_) => {
                inc(RECORDS_CREATED_COUNTER, &[kind_label(self.kind)], 1);
                tracing::debug!(kind = %self.kind, name, default = self.default, "created missing record");
            }
            Err(StoreError::CreateConflict(_)) => {
                tracing::debug!(kind = %self.kind, name, "missing record created concurrently");
            }
            Err(e) => {
                tracing::warn!(kind = %self.kind, name, error = %e, "failed to create missing record");
                return;
            }
        }
        cache.invalidate(name).await;
    }

    fn log_missing(&self, name: &str, cause: MissingCause) {
        let Some(level) = *self.log_level else {
            return;
        };
        let cause = cause.as_str();
        let kind = self.kind.as_str();

        if level == Level::ERROR {
            tracing::error!(kind, name, cause, "{kind} does not exist");
        } else if level == Level::WARN {
            tracing::warn!(kind, name, cause, "{kind} does not exist");
        } else if level == Level::INFO {
            tracing::info!(kind, name, cause, "{kind} does not exist");
        } else if level == Level::DEBUG {
            tracing::debug!(kind, name, cause, "{kind} does not exist");
        } else {
            tracing::trace!(kind, name, cause, "{kind} does not exist");
        }
    }
}
