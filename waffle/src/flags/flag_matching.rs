use std::time::Duration;

use crate::config::Config;
use crate::context::EvaluationContext;
use crate::cookie::CookieTtl;
use crate::errors::InvalidDefinition;
use crate::flags::bucketing::bucket;
use crate::flags::decision::{Decision, DecisionReason};
use crate::flags::flag_models::FlagRecord;
use crate::flags::rules::RuleSet;
use crate::identity::Identity;
use crate::missing::MissingPolicy;
use crate::store::{Record, RecordKind};

/// Runs the flag precedence chain. Holds no per-request state, so one evaluator
/// is shared by every request.
#[derive(Debug, Clone)]
pub struct FlagEvaluator {
    override_enabled: bool,
    max_age: Duration,
    missing: MissingPolicy,
    rules: RuleSet,
}

impl FlagEvaluator {
    pub fn new(config: &Config, rules: RuleSet) -> Self {
        FlagEvaluator {
            override_enabled: *config.override_enabled,
            max_age: config.max_age(),
            missing: MissingPolicy::for_kind(config, RecordKind::Flag),
            rules,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// What the engine does before deciding an absent flag.
    pub fn missing_policy(&self) -> &MissingPolicy {
        &self.missing
    }

    /// Decides `flag` for one request. First matching step wins.
    pub fn evaluate(
        &self,
        flag: Option<&FlagRecord>,
        context: &EvaluationContext,
    ) -> Result<Decision, InvalidDefinition> {
        let Some(flag) = flag else {
            return Ok(Decision::new(
                self.missing.default,
                DecisionReason::MissingFlag,
            ));
        };
        flag.validate()?;

        if self.override_enabled {
            if let Some(&value) = context.query_overrides.get(&flag.name) {
                return Ok(Decision::new(value, DecisionReason::QueryOverride));
            }
        }

        if let Some(value) = flag.everyone.as_bool() {
            return Ok(Decision::new(value, DecisionReason::Everyone));
        }

        if flag.testing {
            if let Some(&value) = context.testing_overrides.get(&flag.name) {
                return Ok(Decision::with_cookie(
                    value,
                    CookieTtl::Persistent(self.max_age),
                    DecisionReason::TestingOverride,
                ));
            }
        }

        if let Some(reason) = self.rules.first_match(flag, context) {
            return Ok(Decision::new(true, reason));
        }

        // Honoured even when the cookie was written by a testing override that
        // has since been switched off.
        if let Some(&value) = context.existing_cookies.get(&flag.name) {
            return Ok(Decision::new(value, DecisionReason::StickyCookie));
        }

        if let Some(percent) = flag.percent {
            let value = bucket(&flag.name, context.identity.bucketing_token()) < percent;
            let ttl = if flag.rollout && !value {
                CookieTtl::Session
            } else {
                CookieTtl::Persistent(self.max_age)
            };
            return Ok(Decision::with_cookie(value, ttl, DecisionReason::Percentage));
        }

        Ok(Decision::new(false, DecisionReason::Default))
    }

    /// Whether `flag` is on for `identity` outside of a request: only the
    /// `everyone` override and the attribute rules are consulted.
    pub fn is_active_for_user(
        &self,
        flag: Option<&FlagRecord>,
        identity: &Identity,
    ) -> Result<Decision, InvalidDefinition> {
        let Some(flag) = flag else {
            return Ok(Decision::new(
                self.missing.default,
                DecisionReason::MissingFlag,
            ));
        };
        flag.validate()?;

        if let Some(value) = flag.everyone.as_bool() {
            return Ok(Decision::new(value, DecisionReason::Everyone));
        }

        let context = EvaluationContext::new(identity.clone());
        match self.rules.first_match(flag, &context) {
            Some(reason) => Ok(Decision::new(true, reason)),
            None => Ok(Decision::new(false, DecisionReason::Default)),
        }
    }
}
