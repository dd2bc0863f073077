use std::collections::HashMap;

use crate::cookie::CookieCodec;
use crate::identity::Identity;

/// Everything the caller knows about one request. Built fresh per request.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub identity: Identity,
    /// Site-wide override values, only honoured when override mode is on.
    pub query_overrides: HashMap<String, bool>,
    pub testing_overrides: HashMap<String, bool>,
    pub existing_cookies: HashMap<String, bool>,
    pub language_code: Option<String>,
}

impl EvaluationContext {
    pub fn new(identity: impl Into<Identity>) -> Self {
        EvaluationContext {
            identity: identity.into(),
            ..Default::default()
        }
    }

    pub fn with_query_override(mut self, flag_name: impl Into<String>, value: bool) -> Self {
        self.query_overrides.insert(flag_name.into(), value);
        self
    }

    pub fn with_testing_override(mut self, flag_name: impl Into<String>, value: bool) -> Self {
        self.testing_overrides.insert(flag_name.into(), value);
        self
    }

    pub fn with_cookie(mut self, flag_name: impl Into<String>, value: bool) -> Self {
        self.existing_cookies.insert(flag_name.into(), value);
        self
    }

    pub fn with_language(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = Some(language_code.into());
        self
    }

    /// Picks the flag cookies out of the raw request cookies. Cookies that are
    /// not flag cookies, or whose value does not decode, are skipped.
    pub fn with_request_cookies<'a, I>(mut self, codec: &CookieCodec, cookies: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (cookie_name, raw_value) in cookies {
            let Some(flag_name) = codec.flag_name(cookie_name) else {
                continue;
            };
            if let Some(value) = CookieCodec::decode(raw_value) {
                self.existing_cookies.insert(flag_name.to_string(), value);
            }
        }
        self
    }
}
