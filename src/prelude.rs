//! Convenience re-exports for easy importing
//!
//! Import everything you need with:
//! ```rust
//! use alert_relay_actix::prelude::*;
//! ```

pub use crate::alert::{Alert, Severity};
pub use crate::config::{
    BodyParseFailure, BodyReadFailure, ChannelConfig, ChannelSet, Config, ExceptionPolicy,
    MiddlewareConfig, ProviderKind,
};
pub use crate::error::{ConfigError, NotifyError};
pub use crate::middleware::AlertMiddleware;
pub use crate::notifier::Notifier;
pub use crate::provider::ChatProvider;
pub use crate::rate_limiter::{RateLimitKey, RateLimiter};
pub use crate::redact::Redactor;
