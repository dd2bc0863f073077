use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use moka::sync::Cache;

use crate::context::EvaluationContext;
use crate::flags::decision::DecisionReason;
use crate::flags::flag_models::FlagRecord;
use crate::identity::{Attribute, HasAttributes};

const MEMBERSHIP_CACHE_CAPACITY: u64 = 10_000;

/// A context-derived activation rule, checked after the testing override and
/// before sticky cookies.
pub trait FlagRule: Send + Sync {
    fn name(&self) -> &str;

    /// `None` when the flag does not use this rule, otherwise whether the
    /// caller matched it. Only a match activates the flag.
    fn evaluate(&self, flag: &FlagRecord, context: &EvaluationContext) -> Option<bool>;

    fn reason(&self) -> DecisionReason {
        DecisionReason::CustomRule(self.name().to_string())
    }

    /// Drops anything the rule derived from `flag_name`'s record.
    fn invalidate(&self, _flag_name: &str) {}

    fn invalidate_all(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinRule {
    Authenticated,
    Superuser,
    Staff,
    Language,
    Group,
    User,
}

impl BuiltinRule {
    pub const ALL: [BuiltinRule; 6] = [
        BuiltinRule::Authenticated,
        BuiltinRule::Superuser,
        BuiltinRule::Staff,
        BuiltinRule::Language,
        BuiltinRule::Group,
        BuiltinRule::User,
    ];
}

impl FlagRule for BuiltinRule {
    fn name(&self) -> &str {
        match self {
            BuiltinRule::Authenticated => "authenticated",
            BuiltinRule::Superuser => "superusers",
            BuiltinRule::Staff => "staff",
            BuiltinRule::Language => "languages",
            BuiltinRule::Group => "group_ids",
            BuiltinRule::User => "user_ids",
        }
    }

    fn evaluate(&self, flag: &FlagRecord, context: &EvaluationContext) -> Option<bool> {
        let identity = &context.identity;
        match self {
            BuiltinRule::Authenticated => flag
                .authenticated
                .then(|| identity.has_attribute(Attribute::Authenticated)),
            BuiltinRule::Superuser => flag
                .superusers
                .then(|| identity.has_attribute(Attribute::Superuser)),
            BuiltinRule::Staff => flag
                .staff
                .then(|| identity.has_attribute(Attribute::Staff)),
            BuiltinRule::Language => (!flag.languages.is_empty()).then(|| {
                context
                    .language_code
                    .as_ref()
                    .is_some_and(|code| flag.languages.contains(code))
            }),
            BuiltinRule::Group => (!flag.group_ids.is_empty()).then(|| {
                identity
                    .groups()
                    .is_some_and(|groups| flag.group_ids.iter().any(|id| groups.contains(id)))
            }),
            BuiltinRule::User => (!flag.user_ids.is_empty()).then(|| {
                identity
                    .user_id()
                    .is_some_and(|id| flag.user_ids.iter().any(|user_id| user_id == id))
            }),
        }
    }

    fn reason(&self) -> DecisionReason {
        match self {
            BuiltinRule::Authenticated => DecisionReason::Authenticated,
            BuiltinRule::Superuser => DecisionReason::Superuser,
            BuiltinRule::Staff => DecisionReason::Staff,
            BuiltinRule::Language => DecisionReason::Language,
            BuiltinRule::Group => DecisionReason::Group,
            BuiltinRule::User => DecisionReason::User,
        }
    }
}

/// Ordered rules: the built-ins first, then custom rules in the order they
/// were added.
#[derive(Clone)]
pub struct RuleSet {
    rules: Vec<Arc<dyn FlagRule>>,
}

impl RuleSet {
    pub fn builtin() -> Self {
        let mut rules: Vec<Arc<dyn FlagRule>> = Vec::with_capacity(BuiltinRule::ALL.len());
        for rule in BuiltinRule::ALL {
            rules.push(Arc::new(rule));
        }
        RuleSet { rules }
    }

    pub fn with_rule(mut self, rule: impl FlagRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Reason of the first rule the caller matches.
    pub fn first_match(
        &self,
        flag: &FlagRecord,
        context: &EvaluationContext,
    ) -> Option<DecisionReason> {
        self.rules
            .iter()
            .find(|rule| rule.evaluate(flag, context) == Some(true))
            .map(|rule| rule.reason())
    }

    pub fn invalidate(&self, flag_name: &str) {
        for rule in &self.rules {
            rule.invalidate(flag_name);
        }
    }

    pub fn invalidate_all(&self) {
        for rule in &self.rules {
            rule.invalidate_all();
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Matches callers whose extension attribute (e.g. `company`) is listed in the
/// flag's `extensions[extension_key]` array.
///
/// The parsed member set is cached per flag name together with the raw value
/// it was parsed from, and is rebuilt as soon as the record carries a
/// different value.
pub struct AttributeMembershipRule {
    name: String,
    attribute: String,
    extension_key: String,
    members: Cache<String, Arc<MemberSet>>,
}

struct MemberSet {
    source: serde_json::Value,
    members: HashSet<String>,
}

impl AttributeMembershipRule {
    pub fn new(
        name: impl Into<String>,
        attribute: impl Into<String>,
        extension_key: impl Into<String>,
    ) -> Self {
        AttributeMembershipRule {
            name: name.into(),
            attribute: attribute.into(),
            extension_key: extension_key.into(),
            members: Cache::builder()
                .max_capacity(MEMBERSHIP_CACHE_CAPACITY)
                .build(),
        }
    }

    fn members(&self, flag: &FlagRecord, raw: &serde_json::Value) -> Arc<MemberSet> {
        if let Some(cached) = self.members.get(&flag.name) {
            if cached.source == *raw {
                return cached;
            }
        }

        let parsed = Arc::new(MemberSet {
            source: raw.clone(),
            members: parse_members(raw),
        });
        self.members.insert(flag.name.clone(), parsed.clone());
        parsed
    }
}

fn parse_members(raw: &serde_json::Value) -> HashSet<String> {
    let Some(values) = raw.as_array() else {
        tracing::warn!(value = %raw, "membership extension is not an array");
        return HashSet::new();
    };
    values
        .iter()
        .filter_map(|value| match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

impl FlagRule for AttributeMembershipRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, flag: &FlagRecord, context: &EvaluationContext) -> Option<bool> {
        let raw = flag.extension(&self.extension_key)?;
        let members = self.members(flag, raw);
        Some(
            context
                .identity
                .attribute_value(&self.attribute)
                .is_some_and(|value| members.members.contains(value)),
        )
    }

    fn invalidate(&self, flag_name: &str) {
        self.members.invalidate(flag_name);
    }

    fn invalidate_all(&self) {
        self.members.invalidate_all();
    }
}
