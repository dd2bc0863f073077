pub mod cache;
pub mod config;
pub mod context;
pub mod cookie;
pub mod engine;
pub mod errors;
pub mod flags;
pub mod identity;
pub mod metrics_consts;
pub mod metrics_utils;
pub mod missing;
pub mod samples;
pub mod store;
pub mod switches;

// Kept public so the integration tests under tests/ can build fixtures with it.
pub mod test_utils;

pub use config::Config;
pub use context::EvaluationContext;
pub use engine::Waffle;
pub use errors::{InvalidDefinition, StoreError, WaffleError};
pub use flags::decision::{CookieAction, Decision, DecisionReason};
pub use flags::flag_models::{Everyone, FlagRecord};
pub use identity::{AnonymousToken, Attribute, HasAttributes, Identity, User};
