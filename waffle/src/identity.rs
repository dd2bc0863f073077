use std::collections::{HashMap, HashSet};

use rand::{distributions::Alphanumeric, Rng};

const ANONYMOUS_TOKEN_LENGTH: usize = 32;

/// Built-in capabilities that flag attribute rules ask an identity about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Authenticated,
    Superuser,
    Staff,
}

/// Capability queries answered by each identity variant, so rules never need
/// to know which concrete variant they are looking at.
pub trait HasAttributes {
    fn has_attribute(&self, attribute: Attribute) -> bool;

    /// Extension attributes, e.g. the company a user belongs to.
    fn attribute_value(&self, _key: &str) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub groups: HashSet<String>,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub attributes: HashMap<String, String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        User {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl HasAttributes for User {
    fn has_attribute(&self, attribute: Attribute) -> bool {
        match attribute {
            Attribute::Authenticated => true,
            Attribute::Superuser => self.is_superuser,
            Attribute::Staff => self.is_staff,
        }
    }

    fn attribute_value(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Stable random token for visitors without an account, carried by the
/// caller's own session or cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnonymousToken(String);

impl AnonymousToken {
    pub fn new(token: impl Into<String>) -> Self {
        AnonymousToken(token.into())
    }

    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(Alphanumeric)
            .take(ANONYMOUS_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        AnonymousToken(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl HasAttributes for AnonymousToken {
    fn has_attribute(&self, _attribute: Attribute) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    User(User),
    Anonymous(AnonymousToken),
    /// Nothing is known about the caller. Every attribute rule is false and
    /// bucketing uses the empty token.
    #[default]
    Unknown,
}

impl Identity {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::User(user) => Some(&user.id),
            _ => None,
        }
    }

    pub fn groups(&self) -> Option<&HashSet<String>> {
        match self {
            Identity::User(user) => Some(&user.groups),
            _ => None,
        }
    }

    /// Token fed to the bucketing function: the user id when authenticated,
    /// else the anonymous token.
    pub fn bucketing_token(&self) -> &str {
        match self {
            Identity::User(user) => &user.id,
            Identity::Anonymous(token) => token.as_str(),
            Identity::Unknown => "",
        }
    }
}

impl HasAttributes for Identity {
    fn has_attribute(&self, attribute: Attribute) -> bool {
        match self {
            Identity::User(user) => user.has_attribute(attribute),
            Identity::Anonymous(token) => token.has_attribute(attribute),
            Identity::Unknown => false,
        }
    }

    fn attribute_value(&self, key: &str) -> Option<&str> {
        match self {
            Identity::User(user) => user.attribute_value(key),
            Identity::Anonymous(token) => token.attribute_value(key),
            Identity::Unknown => None,
        }
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Identity::User(user)
    }
}

impl From<AnonymousToken> for Identity {
    fn from(token: AnonymousToken) -> Self {
        Identity::Anonymous(token)
    }
}
