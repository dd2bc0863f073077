use std::time::Duration;

use anyhow::Result;

use waffle::config::FlexBool;
use waffle::cookie::CookieTtl;
use waffle::flags::bucketing::bucket;
use waffle::store::RecordStore;
use waffle::test_utils::random_string;
use waffle::{
    AnonymousToken, CookieAction, Decision, DecisionReason, EvaluationContext, Everyone,
    FlagRecord, User, WaffleError,
};

use crate::common::*;
mod common;

fn persistent() -> CookieTtl {
    CookieTtl::Persistent(DEFAULT_CONFIG.max_age())
}

fn visitor() -> EvaluationContext {
    EvaluationContext::new(AnonymousToken::generate())
}

#[tokio::test]
async fn it_sticks_testing_override_with_a_cookie() -> Result<()> {
    let handle = WaffleHandle::with_flags(
        &DEFAULT_CONFIG,
        [FlagRecord {
            testing: true,
            ..FlagRecord::new("foo")
        }],
    );

    let context = visitor().with_testing_override("foo", true);
    let decision = handle.waffle.flag_is_active("foo", &context).await?;

    assert_eq!(
        decision,
        Decision::with_cookie(true, persistent(), DecisionReason::TestingOverride)
    );
    Ok(())
}

#[tokio::test]
async fn it_turns_full_percent_on_for_everyone() -> Result<()> {
    let handle = WaffleHandle::with_flags(
        &DEFAULT_CONFIG,
        [FlagRecord {
            percent: Some(100.0),
            ..FlagRecord::new("bar")
        }],
    );

    for context in [
        visitor(),
        EvaluationContext::new(User::new(random_string("user_", 8))),
        EvaluationContext::default(),
    ] {
        let decision = handle.waffle.flag_is_active("bar", &context).await?;
        assert_eq!(
            decision,
            Decision::with_cookie(true, persistent(), DecisionReason::Percentage)
        );
    }
    Ok(())
}

#[tokio::test]
async fn it_keeps_zero_percent_rollout_off_for_the_session_only() -> Result<()> {
    let handle = WaffleHandle::with_flags(
        &DEFAULT_CONFIG,
        [FlagRecord {
            percent: Some(0.0),
            rollout: true,
            ..FlagRecord::new("baz")
        }],
    );

    let decision = handle.waffle.flag_is_active("baz", &visitor()).await?;

    assert_eq!(
        decision,
        Decision::with_cookie(false, CookieTtl::Session, DecisionReason::Percentage)
    );
    Ok(())
}

#[tokio::test]
async fn it_lets_everyone_win_over_percent() -> Result<()> {
    let handle = WaffleHandle::with_flags(
        &DEFAULT_CONFIG,
        [FlagRecord {
            everyone: Everyone::On,
            percent: Some(0.0),
            ..FlagRecord::new("launched")
        }],
    );

    for _ in 0..20 {
        let context = visitor().with_cookie("launched", false);
        assert!(handle.waffle.is_active("launched", &context).await?);
    }
    Ok(())
}

#[tokio::test]
async fn it_keeps_a_visitor_in_their_bucket_after_percent_changes() -> Result<()> {
    let handle = WaffleHandle::with_flags(
        &DEFAULT_CONFIG,
        [FlagRecord {
            percent: Some(30.0),
            ..FlagRecord::new("checkout")
        }],
    );

    let (first, mut context) = handle.visit("checkout", visitor()).await?;
    assert!(context.existing_cookies.contains_key("checkout"));

    for percent in [0.0, 100.0, 50.0] {
        handle
            .waffle
            .put_flag(FlagRecord {
                percent: Some(percent),
                ..FlagRecord::new("checkout")
            })
            .await?;

        let (active, next) = handle.visit("checkout", context).await?;
        assert_eq!(active, first, "flipped after percent moved to {percent}");
        context = next;
    }
    Ok(())
}

#[tokio::test]
async fn it_rebuckets_rollout_visitors_in_a_new_session() -> Result<()> {
    let token = loop {
        let token = random_string("anon_", 16);
        if bucket("ramp", &token) >= 20.0 {
            break token;
        }
    };
    let handle = WaffleHandle::with_flags(
        &DEFAULT_CONFIG,
        [FlagRecord {
            percent: Some(20.0),
            rollout: true,
            ..FlagRecord::new("ramp")
        }],
    );
    let context = EvaluationContext::new(AnonymousToken::new(token.clone()));

    let decision = handle.waffle.flag_is_active("ramp", &context).await?;
    assert_eq!(
        decision.cookie,
        CookieAction::Write {
            value: false,
            ttl: CookieTtl::Session
        }
    );

    handle
        .waffle
        .put_flag(FlagRecord {
            percent: Some(100.0),
            rollout: true,
            ..FlagRecord::new("ramp")
        })
        .await?;

    // Same session: the cookie still pins the visitor.
    let same_session = EvaluationContext::new(AnonymousToken::new(token.clone()))
        .with_cookie("ramp", false);
    assert!(!handle.waffle.is_active("ramp", &same_session).await?);

    // New session: the cookie is gone and the visitor is bucketed again.
    let new_session = EvaluationContext::new(AnonymousToken::new(token));
    assert!(handle.waffle.is_active("ramp", &new_session).await?);
    Ok(())
}

#[tokio::test]
async fn it_returns_the_default_for_missing_flags_without_creating_them() -> Result<()> {
    let handle = WaffleHandle::for_config(&DEFAULT_CONFIG);

    let decision = handle.waffle.flag_is_active("nope", &visitor()).await?;

    assert_eq!(decision, Decision::new(false, DecisionReason::MissingFlag));
    assert_eq!(handle.stores.flags.create_calls(), 0);
    assert!(handle.stores.flags.get("nope").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn it_creates_a_missing_flag_once_under_concurrency() -> Result<()> {
    let handle = WaffleHandle::for_config(&AUTO_CREATE_CONFIG);

    let contexts: Vec<_> = (0..10).map(|_| visitor()).collect();
    let checks = contexts
        .iter()
        .map(|context| handle.waffle.flag_is_active("brand_new", context));
    for decision in futures::future::join_all(checks).await {
        assert_eq!(decision?.reason, DecisionReason::MissingFlag);
    }

    assert_eq!(handle.stores.flags.inner().len().await, 1);
    let stored = handle.stores.flags.get("brand_new").await?;
    assert_eq!(stored.map(|f| f.everyone), Some(Everyone::Off));

    // Later requests see the stored record.
    let decision = handle.waffle.flag_is_active("brand_new", &visitor()).await?;
    assert_eq!(decision, Decision::new(false, DecisionReason::Everyone));
    Ok(())
}

#[tokio::test]
async fn it_creates_missing_flags_with_the_configured_default() -> Result<()> {
    let mut config = AUTO_CREATE_CONFIG.clone();
    config.flag_default = FlexBool(true);
    let handle = WaffleHandle::for_config(&config);

    assert!(handle.waffle.is_active("opt_out", &visitor()).await?);
    let stored = handle.stores.flags.get("opt_out").await?;
    assert_eq!(stored.map(|f| f.everyone), Some(Everyone::On));
    Ok(())
}

#[tokio::test]
async fn it_ignores_query_overrides_unless_enabled() -> Result<()> {
    let flag = FlagRecord {
        everyone: Everyone::Off,
        ..FlagRecord::new("hidden")
    };
    let context = visitor().with_query_override("hidden", true);

    let handle = WaffleHandle::with_flags(&DEFAULT_CONFIG, [flag.clone()]);
    assert!(!handle.waffle.is_active("hidden", &context).await?);

    let mut config = DEFAULT_CONFIG.clone();
    config.override_enabled = FlexBool(true);
    let handle = WaffleHandle::with_flags(&config, [flag]);
    let decision = handle.waffle.flag_is_active("hidden", &context).await?;
    assert_eq!(decision, Decision::new(true, DecisionReason::QueryOverride));
    Ok(())
}

#[tokio::test]
async fn it_surfaces_invalid_definitions() {
    let handle = WaffleHandle::with_flags(
        &DEFAULT_CONFIG,
        [FlagRecord {
            percent: Some(f64::NAN),
            ..FlagRecord::new("nan")
        }],
    );

    let err = handle
        .waffle
        .flag_is_active("nan", &visitor())
        .await
        .unwrap_err();

    assert!(matches!(err, WaffleError::InvalidFlagDefinition { .. }));
    assert_eq!(err.error_code(), "invalid_definition");
}

#[tokio::test]
async fn it_picks_up_external_writes_through_the_listener() -> Result<()> {
    let handle = WaffleHandle::for_config(&DEFAULT_CONFIG);
    let listeners = handle.waffle.spawn_invalidation_listeners();

    assert!(!handle.waffle.is_active("remote", &visitor()).await?);
    handle
        .stores
        .flags
        .inner()
        .put(FlagRecord {
            everyone: Everyone::On,
            ..FlagRecord::new("remote")
        })
        .await?;

    let mut picked_up = false;
    for _ in 0..100 {
        if handle.waffle.is_active("remote", &visitor()).await? {
            picked_up = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(picked_up);

    for listener in listeners {
        listener.abort();
    }
    Ok(())
}

#[tokio::test]
async fn it_decides_from_request_cookies() -> Result<()> {
    let handle = WaffleHandle::with_flags(
        &DEFAULT_CONFIG,
        [FlagRecord {
            percent: Some(0.0),
            ..FlagRecord::new("search")
        }],
    );
    let codec = handle.waffle.cookie_codec();

    let context = visitor().with_request_cookies(codec, [("dwf_search", "True")]);
    let decision = handle.waffle.flag_is_active("search", &context).await?;
    assert_eq!(decision, Decision::new(true, DecisionReason::StickyCookie));

    let decision = handle.waffle.flag_is_active("search", &visitor()).await?;
    assert_eq!(
        handle.waffle.set_cookie_header("search", &decision).as_deref(),
        Some("dwf_search=False; Path=/; Max-Age=2592000; Secure")
    );
    Ok(())
}
