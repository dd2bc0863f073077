use std::fmt;

use crate::cookie::{CookieDirective, CookieTtl};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieAction {
    Write { value: bool, ttl: CookieTtl },
    NoAction,
}

/// Which step of the precedence chain produced a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReason {
    MissingFlag,
    QueryOverride,
    Everyone,
    TestingOverride,
    Authenticated,
    Superuser,
    Staff,
    Language,
    Group,
    User,
    CustomRule(String),
    StickyCookie,
    Percentage,
    Default,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::MissingFlag => "missing_flag",
            DecisionReason::QueryOverride => "query_override",
            DecisionReason::Everyone => "everyone",
            DecisionReason::TestingOverride => "testing_override",
            DecisionReason::Authenticated => "authenticated",
            DecisionReason::Superuser => "superuser",
            DecisionReason::Staff => "staff",
            DecisionReason::Language => "language",
            DecisionReason::Group => "group",
            DecisionReason::User => "user",
            DecisionReason::CustomRule(_) => "custom_rule",
            DecisionReason::StickyCookie => "sticky_cookie",
            DecisionReason::Percentage => "percentage",
            DecisionReason::Default => "default",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::CustomRule(rule) => write!(f, "custom_rule:{}", rule),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub active: bool,
    pub cookie: CookieAction,
    pub reason: DecisionReason,
}

impl Decision {
    pub fn new(active: bool, reason: DecisionReason) -> Self {
        Decision {
            active,
            cookie: CookieAction::NoAction,
            reason,
        }
    }

    pub fn with_cookie(active: bool, ttl: CookieTtl, reason: DecisionReason) -> Self {
        Decision {
            active,
            cookie: CookieAction::Write { value: active, ttl },
            reason,
        }
    }

    /// The cookie the transport should set for `flag_name`, if any.
    pub fn cookie_directive(&self, flag_name: &str) -> Option<CookieDirective> {
        match self.cookie {
            CookieAction::Write { value, ttl } => Some(CookieDirective {
                flag_name: flag_name.to_string(),
                value,
                ttl,
            }),
            CookieAction::NoAction => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_decision_without_cookie() {
        let decision = Decision::new(true, DecisionReason::Everyone);
        assert_eq!(decision.cookie, CookieAction::NoAction);
        assert_eq!(decision.cookie_directive("f"), None);
    }

    #[test]
    fn test_decision_with_cookie_carries_value() {
        let ttl = CookieTtl::Persistent(Duration::from_secs(60));
        let decision = Decision::with_cookie(false, ttl, DecisionReason::Percentage);

        assert_eq!(
            decision.cookie,
            CookieAction::Write { value: false, ttl }
        );
        assert_eq!(
            decision.cookie_directive("f"),
            Some(CookieDirective {
                flag_name: "f".to_string(),
                value: false,
                ttl,
            })
        );
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(DecisionReason::StickyCookie.to_string(), "sticky_cookie");
        assert_eq!(
            DecisionReason::CustomRule("company".to_string()).to_string(),
            "custom_rule:company"
        );
        assert_eq!(
            DecisionReason::CustomRule("company".to_string()).as_str(),
            "custom_rule"
        );
    }
}
