#![allow(dead_code)]

use once_cell::sync::Lazy;

use waffle::config::{Config, FlexBool, DEFAULT_TEST_CONFIG};
use waffle::test_utils::{setup_waffle, TestStores};
use waffle::{EvaluationContext, FlagRecord, Waffle};

pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| DEFAULT_TEST_CONFIG.clone());

pub static AUTO_CREATE_CONFIG: Lazy<Config> = Lazy::new(|| {
    let mut config = DEFAULT_TEST_CONFIG.clone();
    config.create_missing_flags = FlexBool(true);
    config.create_missing_switches = FlexBool(true);
    config.create_missing_samples = FlexBool(true);
    config
});

/// A waffle over counting in-memory stores.
pub struct WaffleHandle {
    pub waffle: Waffle,
    pub stores: TestStores,
}

impl WaffleHandle {
    pub fn for_config(config: &Config) -> WaffleHandle {
        Self::with_flags(config, std::iter::empty())
    }

    pub fn with_flags(
        config: &Config,
        flags: impl IntoIterator<Item = FlagRecord>,
    ) -> WaffleHandle {
        let stores = TestStores::new().with_flags(flags);
        let waffle = setup_waffle(Some(config), &stores);
        WaffleHandle { waffle, stores }
    }

    /// Simulates a browser within one session: evaluates `flag` and feeds the
    /// cookie it was told to set back into the next request.
    pub async fn visit(
        &self,
        flag: &str,
        context: EvaluationContext,
    ) -> anyhow::Result<(bool, EvaluationContext)> {
        let decision = self.waffle.flag_is_active(flag, &context).await?;
        let next = match decision.cookie_directive(flag) {
            Some(directive) => context.with_cookie(flag, directive.value),
            None => context,
        };
        Ok((decision.active, next))
    }
}
