use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

pub const DEFAULT_COOKIE_TEMPLATE: &str = "dwf_%s";
const NAME_PLACEHOLDER: &str = "%s";

/// How long the transport should keep a flag cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieTtl {
    Persistent(Duration),
    /// No explicit expiry, the browser drops it with the session.
    Session,
}

/// What the transport layer needs to set a flag cookie on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieDirective {
    pub flag_name: String,
    pub value: bool,
    pub ttl: CookieTtl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    Lax,
    None,
    /// Attribute omitted from the header.
    #[default]
    Unset,
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" => Ok(SameSite::Unset),
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(format!("Invalid SameSite value: {}", s)),
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
            SameSite::Unset => "",
        };
        write!(f, "{}", value)
    }
}

/// Maps flag decisions to cookie names, values and `Set-Cookie` headers.
#[derive(Debug, Clone)]
pub struct CookieCodec {
    prefix: String,
    suffix: String,
    secure: bool,
    same_site: SameSite,
}

impl CookieCodec {
    /// `template` names the cookie, with `%s` standing in for the flag name.
    /// A template without the placeholder gets the flag name appended.
    pub fn new(template: &str, secure: bool, same_site: SameSite) -> Self {
        let (prefix, suffix) = template
            .split_once(NAME_PLACEHOLDER)
            .unwrap_or((template, ""));
        CookieCodec {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            secure,
            same_site,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.cookie_template,
            *config.cookie_secure,
            config.cookie_samesite,
        )
    }

    pub fn cookie_name(&self, flag_name: &str) -> String {
        format!("{}{}{}", self.prefix, flag_name, self.suffix)
    }

    /// Reverse of [`CookieCodec::cookie_name`]. `None` for cookies that are
    /// not flag cookies.
    pub fn flag_name<'a>(&self, cookie_name: &'a str) -> Option<&'a str> {
        let name = cookie_name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    pub fn encode(value: bool) -> &'static str {
        if value {
            "True"
        } else {
            "False"
        }
    }

    pub fn decode(raw: &str) -> Option<bool> {
        match raw.trim() {
            "True" | "true" | "1" => Some(true),
            "False" | "false" | "0" => Some(false),
            _ => None,
        }
    }

    pub fn set_cookie_header(&self, directive: &CookieDirective) -> String {
        let mut header = format!(
            "{}={}; Path=/",
            self.cookie_name(&directive.flag_name),
            Self::encode(directive.value)
        );
        if let CookieTtl::Persistent(max_age) = directive.ttl {
            header.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.same_site != SameSite::Unset {
            header.push_str(&format!("; SameSite={}", self.same_site));
        }
        header
    }
}

impl Default for CookieCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_TEMPLATE, true, SameSite::Unset)
    }
}
