//! # Alert Relay for Actix-Web
//!
//! Middleware that watches an Actix-Web service for failed requests and
//! relays them to a team chat channel (Discord or Slack) as threaded alerts.
//!
//! - **Transparent**: the handler sees the untouched body and the client gets
//!   the handler's response; only a panic turns into a 500
//! - **Redacting**: `password` keys are stripped from JSON request bodies at
//!   any depth before they leave the process
//! - **Quiet**: one alert per client and URI per cooldown window (10 minutes
//!   by default)
//! - **Best-effort**: a broken chat integration is logged, never surfaced
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use actix_web::{web, App, HttpResponse, HttpServer};
//! use alert_relay_actix::{AlertMiddleware, Config};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = Config::from_file("alerts.toml").expect("invalid alert config");
//!     let alerts = AlertMiddleware::from_config(&config).expect("alert relay disabled");
//!
//!     HttpServer::new(move || {
//!         App::new()
//!             .wrap(alerts.clone())
//!             .service(web::resource("/").to(|| async { HttpResponse::Ok().body("Hello!") }))
//!     })
//!     .bind("0.0.0.0:8080")?
//!     .run()
//!     .await
//! }
//! ```
//!
//! ## How It Works
//!
//! 1. The request body is buffered and replayed to the handler
//! 2. The handler runs under a panic guard
//! 3. The response status and body are captured on the way out
//! 4. 5xx raises an error alert, 4xx a warn alert, if the cooldown allows
//! 5. The root message carries origin and description; response, request
//!    and URI follow as threaded replies
//!
//! ## Architecture
//!
//! - `middleware`: Actix-Web middleware implementation
//! - `notifier`: alert delivery (root message, file fallback, replies)
//! - `provider`, `discord`, `slack`: chat provider seam and its clients
//! - `alert`: alert construction and severities
//! - `rate_limiter`: per (client, URI) cooldown gate
//! - `redact`: sensitive key removal from JSON bodies
//! - `supervise`: panic capture for the wrapped handler
//! - `request_body_capture`, `response_body_capture`: body buffering
//! - `config`: TOML and environment configuration
//! - `error`: error types
//! - `utils`: timestamps, client ip, upload names

pub mod alert;
pub mod config;
pub mod discord;
pub mod error;
pub mod middleware;
pub mod notifier;
pub mod prelude;
pub mod provider;
pub mod rate_limiter;
pub mod redact;
pub mod request_body_capture;
pub mod response_body_capture;
pub mod slack;
pub mod supervise;
pub mod utils;

// Re-export main components for easy access
pub use alert::{Alert, DetailField, Severity};
pub use config::{ChannelConfig, Config};
pub use error::{ConfigError, NotifyError};
pub use middleware::AlertMiddleware;
pub use notifier::Notifier;
pub use rate_limiter::RateLimiter;
pub use redact::Redactor;
