//! Basic usage example for the alert relay middleware
//!
//! Run with a config file:
//! ```bash
//! ALERT_RELAY_CONFIG=alerts.toml cargo run --example basic_usage
//! ```
//!
//! or straight from the environment:
//! ```bash
//! ALERT_RELAY_TOKEN=xoxb-... \
//! ALERT_RELAY_PROVIDER=slack \
//! ALERT_RELAY_ERROR_CHANNEL=C0123 \
//! ALERT_RELAY_WARN_CHANNEL=C0456 \
//! cargo run --example basic_usage
//! ```

use actix_web::{web, App, HttpResponse, HttpServer};
use alert_relay_actix::{AlertMiddleware, Config, ConfigError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

async fn index() -> HttpResponse {
    HttpResponse::Ok().body("Hello!")
}

async fn echo(body: String) -> HttpResponse {
    HttpResponse::Ok().body(body)
}

async fn login(_body: String) -> HttpResponse {
    // The password in the request body is redacted before it is quoted
    HttpResponse::Unauthorized().json(serde_json::json!({ "error": "bad credentials" }))
}

async fn unavailable() -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(serde_json::json!({ "error": "db down" }))
}

async fn boom() -> HttpResponse {
    panic!("boom")
}

fn load_config() -> Result<Config, ConfigError> {
    match std::env::var("ALERT_RELAY_CONFIG") {
        Ok(path) => Config::from_file(path),
        Err(_) => Config::from_env(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config().map_err(std::io::Error::other)?;
    let alerts = match AlertMiddleware::from_config(&config) {
        Ok(alerts) => alerts,
        Err(e) => {
            error!(error = %e, "alert relay is not configured");
            return Err(std::io::Error::other(e));
        }
    };

    alerts
        .notifier()
        .notify_success("basic_usage", "example server started", "", &[])
        .await;

    info!("starting example server on http://0.0.0.0:8080");
    info!("try: GET /, POST /echo, POST /login, GET /unavailable, GET /boom");

    HttpServer::new(move || {
        App::new()
            .wrap(alerts.clone())
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/echo").route(web::post().to(echo)))
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/unavailable").route(web::get().to(unavailable)))
            .service(web::resource("/boom").route(web::get().to(boom)))
    })
    .bind("0.0.0.0:8080")?
    .run()
    .await
}
