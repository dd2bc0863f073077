use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::cache::RecordCache;
use crate::config::Config;
use crate::context::EvaluationContext;
use crate::cookie::CookieCodec;
use crate::errors::{InvalidDefinition, StoreError, WaffleError};
use crate::flags::decision::Decision;
use crate::flags::flag_matching::FlagEvaluator;
use crate::flags::flag_models::FlagRecord;
use crate::flags::rules::RuleSet;
use crate::identity::Identity;
use crate::metrics_consts::{
    FLAG_DECISIONS_COUNTER, INVALID_DEFINITIONS_COUNTER, SAMPLE_CHECKS_COUNTER,
    SWITCH_CHECKS_COUNTER,
};
use crate::metrics_utils::{inc, kind_label};
use crate::missing::{MissingCause, MissingPolicy};
use crate::samples::SampleRecord;
use crate::store::{InMemoryStore, Record, RecordKind, RecordStore, RedisStore};
use crate::switches::SwitchRecord;

/// One store per record kind. A single Redis store can back all three.
#[derive(Clone)]
pub struct Stores {
    pub flags: Arc<dyn RecordStore<FlagRecord>>,
    pub switches: Arc<dyn RecordStore<SwitchRecord>>,
    pub samples: Arc<dyn RecordStore<SampleRecord>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Stores {
            flags: Arc::new(InMemoryStore::<FlagRecord>::new()),
            switches: Arc::new(InMemoryStore::<SwitchRecord>::new()),
            samples: Arc::new(InMemoryStore::<SampleRecord>::new()),
        }
    }

    pub fn redis(config: &Config) -> Result<Self, StoreError> {
        let store = Arc::new(RedisStore::new(
            &config.redis_url,
            config.cache_prefix.clone(),
        )?);
        Ok(Stores {
            flags: store.clone(),
            switches: store.clone(),
            samples: store,
        })
    }
}

/// Entry point for application code. Cheap to clone, clones share caches.
#[derive(Clone)]
pub struct Waffle {
    evaluator: Arc<FlagEvaluator>,
    flags: RecordCache<FlagRecord>,
    switches: RecordCache<SwitchRecord>,
    samples: RecordCache<SampleRecord>,
    switch_policy: MissingPolicy,
    sample_policy: MissingPolicy,
    codec: CookieCodec,
}

impl Waffle {
    pub fn new(config: &Config, stores: Stores, rules: RuleSet) -> Self {
        Waffle {
            evaluator: Arc::new(FlagEvaluator::new(config, rules)),
            flags: RecordCache::from_config(stores.flags, config),
            switches: RecordCache::from_config(stores.switches, config),
            samples: RecordCache::from_config(stores.samples, config),
            switch_policy: MissingPolicy::for_kind(config, RecordKind::Switch),
            sample_policy: MissingPolicy::for_kind(config, RecordKind::Sample),
            codec: CookieCodec::from_config(config),
        }
    }

    pub fn in_memory(config: &Config) -> Self {
        Self::new(config, Stores::in_memory(), RuleSet::builtin())
    }

    pub fn with_redis(config: &Config, rules: RuleSet) -> Result<Self, WaffleError> {
        Ok(Self::new(config, Stores::redis(config)?, rules))
    }

    pub fn cookie_codec(&self) -> &CookieCodec {
        &self.codec
    }

    /// `Set-Cookie` header value the transport should send for `decision`.
    pub fn set_cookie_header(&self, flag_name: &str, decision: &Decision) -> Option<String> {
        decision
            .cookie_directive(flag_name)
            .map(|directive| self.codec.set_cookie_header(&directive))
    }

    #[instrument(skip_all, fields(flag = %name))]
    pub async fn flag_is_active(
        &self,
        name: &str,
        context: &EvaluationContext,
    ) -> Result<Decision, WaffleError> {
        let flag = self.find_flag(name).await?;

        let decision = self
            .evaluator
            .evaluate(flag.as_ref(), context)
            .map_err(|source| invalid(RecordKind::Flag, name, source))?;
        tracing::debug!(active = decision.active, reason = %decision.reason, "flag decided");

        Ok(record_decision(decision))
    }

    pub async fn is_active(
        &self,
        name: &str,
        context: &EvaluationContext,
    ) -> Result<bool, WaffleError> {
        Ok(self.flag_is_active(name, context).await?.active)
    }

    /// Decides `name` for `identity` without a request, e.g. from a background
    /// job. Cookies, overrides and percentages are not consulted.
    #[instrument(skip_all, fields(flag = %name))]
    pub async fn is_active_for_user(
        &self,
        name: &str,
        identity: &Identity,
    ) -> Result<bool, WaffleError> {
        let flag = self.find_flag(name).await?;

        self.evaluator
            .is_active_for_user(flag.as_ref(), identity)
            .map(|decision| decision.active)
            .map_err(|source| invalid(RecordKind::Flag, name, source))
    }

    /// Looks `name` up, applying the missing-flag policy when it is absent.
    async fn find_flag(&self, name: &str) -> Result<Option<FlagRecord>, WaffleError> {
        match lookup(&self.flags, name).await? {
            Lookup::Found(flag) => Ok(Some(flag)),
            Lookup::Missing(cause) => {
                self.evaluator
                    .missing_policy()
                    .resolve(&self.flags, name, cause)
                    .await;
                Ok(None)
            }
        }
    }

    #[instrument(skip_all, fields(switch = %name))]
    pub async fn switch_is_active(&self, name: &str) -> Result<bool, WaffleError> {
        let active = match lookup(&self.switches, name).await? {
            Lookup::Found(switch) => {
                switch
                    .validate()
                    .map_err(|source| invalid(RecordKind::Switch, name, source))?;
                switch.active
            }
            Lookup::Missing(cause) => self.switch_policy.resolve(&self.switches, name, cause).await,
        };

        inc(
            SWITCH_CHECKS_COUNTER,
            &[("active".to_string(), active.to_string())],
            1,
        );
        Ok(active)
    }

    #[instrument(skip_all, fields(sample = %name))]
    pub async fn sample_is_active(&self, name: &str) -> Result<bool, WaffleError> {
        let active = match lookup(&self.samples, name).await? {
            Lookup::Found(sample) => {
                sample
                    .validate()
                    .map_err(|source| invalid(RecordKind::Sample, name, source))?;
                sample.is_active()
            }
            Lookup::Missing(cause) => self.sample_policy.resolve(&self.samples, name, cause).await,
        };

        inc(
            SAMPLE_CHECKS_COUNTER,
            &[("active".to_string(), active.to_string())],
            1,
        );
        Ok(active)
    }

    /// Validates and stores `flag`. Cached copies and anything custom rules
    /// derived from the old record are dropped before this returns.
    pub async fn put_flag(&self, flag: FlagRecord) -> Result<(), WaffleError> {
        let name = flag.name.clone();
        flag.validate()
            .map_err(|source| invalid(RecordKind::Flag, &name, source))?;

        self.flags.store().put(flag).await?;
        self.invalidate_flag(&name).await;
        Ok(())
    }

    pub async fn put_switch(&self, switch: SwitchRecord) -> Result<(), WaffleError> {
        put(&self.switches, switch).await
    }

    pub async fn put_sample(&self, sample: SampleRecord) -> Result<(), WaffleError> {
        put(&self.samples, sample).await
    }

    pub async fn delete_flag(&self, name: &str) -> Result<(), WaffleError> {
        self.flags.store().delete(name).await?;
        self.invalidate_flag(name).await;
        Ok(())
    }

    pub async fn delete_switch(&self, name: &str) -> Result<(), WaffleError> {
        self.switches.store().delete(name).await?;
        self.switches.invalidate(name).await;
        Ok(())
    }

    pub async fn delete_sample(&self, name: &str) -> Result<(), WaffleError> {
        self.samples.store().delete(name).await?;
        self.samples.invalidate(name).await;
        Ok(())
    }

    /// Drops every cached copy of `name`, for writers that bypass this
    /// instance.
    pub async fn invalidate(&self, kind: RecordKind, name: &str) {
        match kind {
            RecordKind::Flag => self.invalidate_flag(name).await,
            RecordKind::Switch => self.switches.invalidate(name).await,
            RecordKind::Sample => self.samples.invalidate(name).await,
        }
    }

    async fn invalidate_flag(&self, name: &str) {
        self.flags.invalidate(name).await;
        self.evaluator.rules().invalidate(name);
    }

    /// Spawns one task per record kind that invalidates cached records when
    /// their store reports a change. The tasks run until aborted.
    pub fn spawn_invalidation_listeners(&self) -> Vec<JoinHandle<()>> {
        vec![
            spawn_listener(self.flags.clone(), Some(self.evaluator.clone())),
            spawn_listener(self.switches.clone(), None),
            spawn_listener(self.samples.clone(), None),
        ]
    }
}

enum Lookup<R> {
    Found(R),
    Missing(MissingCause),
}

/// Unreachable stores degrade to the missing path. A record that is stored
/// but cannot be decoded is a broken definition and fails the check.
async fn lookup<R: Record>(
    cache: &RecordCache<R>,
    name: &str,
) -> Result<Lookup<R>, WaffleError> {
    match cache.get(name).await {
        Ok(Some(record)) => Ok(Lookup::Found(record)),
        Ok(None) => Ok(Lookup::Missing(MissingCause::NotFound)),
        Err(StoreError::DataParsingError(msg)) => {
            Err(invalid(R::KIND, name, InvalidDefinition::Malformed(msg)))
        }
        Err(e) => {
            tracing::error!(kind = %R::KIND, name, error = %e, "record store unavailable, using default");
            Ok(Lookup::Missing(MissingCause::StoreUnavailable))
        }
    }
}

async fn put<R: Record>(cache: &RecordCache<R>, record: R) -> Result<(), WaffleError> {
    let name = record.name().to_string();
    record
        .validate()
        .map_err(|source| invalid(R::KIND, &name, source))?;

    cache.store().put(record).await?;
    cache.invalidate(&name).await;
    Ok(())
}

fn invalid(kind: RecordKind, name: &str, source: InvalidDefinition) -> WaffleError {
    inc(INVALID_DEFINITIONS_COUNTER, &[kind_label(kind)], 1);
    tracing::error!(kind = %kind, name, error = %source, "invalid record definition");
    WaffleError::invalid(kind, name, source)
}

fn record_decision(decision: Decision) -> Decision {
    inc(
        FLAG_DECISIONS_COUNTER,
        &[
            ("reason".to_string(), decision.reason.as_str().to_string()),
            ("active".to_string(), decision.active.to_string()),
        ],
        1,
    );
    decision
}

fn spawn_listener<R: Record>(
    cache: RecordCache<R>,
    evaluator: Option<Arc<FlagEvaluator>>,
) -> JoinHandle<()> {
    let mut changes = cache.store().subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) if change.kind == R::KIND => {
                    cache.invalidate(&change.name).await;
                    if let Some(evaluator) = &evaluator {
                        evaluator.rules().invalidate(&change.name);
                    }
                }
                // A store shared between kinds reports them all on one channel.
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(kind = %R::KIND, skipped, "change listener lagged, flushing cache");
                    cache.invalidate_all();
                    if let Some(evaluator) = &evaluator {
                        evaluator.rules().invalidate_all();
                    }
                }
                Err(RecvError::Closed) => {
                    tracing::debug!(kind = %R::KIND, "change stream closed");
                    break;
                }
            }
        }
    })
}
