//! Actix-Web middleware that reports failed requests to chat
//!
//! Per request: buffer the body, run the handler under a panic guard,
//! capture the response, then decide whether to alert. 5xx responses
//! raise an error alert and 4xx responses a warn alert, subject to the
//! per (client, URI) cooldown. A panic always alerts and is answered with
//! an internal server error. An `Err` from the inner service is observed
//! through its error response and passed on unchanged.
//!
//! Delivery runs inside the request task, so the response is released
//! only after the alert and its threaded replies were attempted. Nothing
//! that goes wrong on the notification side changes what the client gets.

use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::{to_bytes, BoxBody, MessageBody};
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::error::ErrorInternalServerError;
use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use actix_web::{Error, HttpResponse};
use futures::future::{ok, LocalBoxFuture, Ready};
use tracing::{debug, error};

use crate::alert::Severity;
use crate::config::{BodyParseFailure, BodyReadFailure, Config};
use crate::error::ConfigError;
use crate::notifier::Notifier;
use crate::rate_limiter::{RateLimitKey, RateLimiter};
use crate::redact::Redactor;
use crate::request_body_capture::buffer_request_body;
use crate::response_body_capture::{body_text, capture_response_body};
use crate::supervise::supervise;
use crate::utils::client_ip;

pub const RECOVERY_ORIGIN: &str = "Exception Handler Middleware Recovery";
pub const ERROR_ORIGIN: &str = "Exception Handler Middleware Error";
pub const WARN_ORIGIN: &str = "Exception Handler Middleware Warn";
pub const BODY_READ_ORIGIN: &str = "Exception Handler Middleware Body Read";
pub const BODY_PARSE_ORIGIN: &str = "Exception Handler Middleware Body Parse";

/// Status returned when the request body cannot be read
pub const BODY_READ_STATUS: StatusCode = StatusCode::IM_A_TEAPOT;

/// Body of the 500 sent when the handler panics
const PANIC_RESPONSE_BODY: &str = "internal server error";

/// Alerting middleware for Actix-Web
///
/// ```rust,no_run
/// use actix_web::App;
/// use alert_relay_actix::{AlertMiddleware, Config};
///
/// let config = Config::from_env().expect("config");
/// let middleware = AlertMiddleware::from_config(&config).expect("notifier");
/// let app = App::new().wrap(middleware);
/// ```
#[derive(Clone)]
pub struct AlertMiddleware {
    notifier: Arc<Notifier>,
    limiter: Arc<RateLimiter>,
    redactor: Redactor,
    on_body_read_error: BodyReadFailure,
    on_body_parse_error: BodyParseFailure,
}

impl AlertMiddleware {
    pub fn new(notifier: Arc<Notifier>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            notifier,
            limiter,
            redactor: Redactor::default(),
            on_body_read_error: BodyReadFailure::default(),
            on_body_parse_error: BodyParseFailure::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let notifier = Arc::new(Notifier::from_config(config)?);
        let limiter = Arc::new(RateLimiter::from_config(&config.middleware));

        Ok(Self::new(notifier, limiter)
            .with_redactor(Redactor::new(config.middleware.sensitive_keys.iter().cloned()))
            .on_body_read_error(config.middleware.on_body_read_error)
            .on_body_parse_error(config.middleware.on_body_parse_error))
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn on_body_read_error(mut self, policy: BodyReadFailure) -> Self {
        self.on_body_read_error = policy;
        self
    }

    pub fn on_body_parse_error(mut self, policy: BodyParseFailure) -> Self {
        self.on_body_parse_error = policy;
        self
    }

    /// The notifier, for reporting events outside the request path
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

impl<S, B> Transform<S, ServiceRequest> for AlertMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = AlertMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AlertMiddlewareService {
            service: Rc::new(service),
            relay: Rc::new(self.clone()),
        })
    }
}

/// The actual service that handles each request
pub struct AlertMiddlewareService<S> {
    service: Rc<S>,
    relay: Rc<AlertMiddleware>,
}

impl<S, B> Service<ServiceRequest> for AlertMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let relay = Rc::clone(&self.relay);

        Box::pin(async move {
            let uri = request_uri(&req);
            let peer_ip = req.peer_addr().map(|addr| addr.ip().to_string());
            let client = client_ip(req.headers(), peer_ip.as_deref());

            let request_body = match buffer_request_body(&mut req).await {
                Ok(body) => body,
                Err(e) => {
                    error!(%uri, %client, error = %e, "failed to read request body");
                    if relay.on_body_read_error == BodyReadFailure::Alert {
                        let description = format!("failed to read request body on *{uri}*");
                        relay
                            .notifier
                            .notify_error(BODY_READ_ORIGIN, &description, &e.to_string(), &["URI", uri.as_str()])
                            .await;
                    }
                    return Ok(req.into_response(HttpResponse::new(BODY_READ_STATUS)));
                }
            };

            let response = match supervise(async move { service.call(req).await }).await {
                Ok(Ok(res)) => res,
                Ok(Err(e)) => {
                    let error_response = e.error_response();
                    let status = error_response.status().as_u16();
                    let body = to_bytes(error_response.into_body()).await.unwrap_or_default();
                    relay.report(&client, &uri, &request_body, status, &body).await;
                    return Err(e);
                }
                Err(panic) => {
                    error!(
                        %uri,
                        %client,
                        panic = %panic.message,
                        backtrace = %panic.backtrace,
                        "handler panicked, responding with 500"
                    );
                    let description = format!("panic while serving *{uri}*");
                    let request_text = body_text(&request_body);
                    relay
                        .notifier
                        .notify_error(
                            RECOVERY_ORIGIN,
                            &description,
                            &panic.report(),
                            &["Request", request_text.as_str(), "URI", uri.as_str()],
                        )
                        .await;
                    return Err(ErrorInternalServerError(PANIC_RESPONSE_BODY));
                }
            };

            let captured = capture_response_body(response).await;
            relay
                .report(&client, &uri, &request_body, captured.status, &captured.body)
                .await;

            Ok(captured.response)
        })
    }
}

impl AlertMiddleware {
    /// Alert on a completed request if its status and the cooldown allow it
    async fn report(
        &self,
        client: &str,
        uri: &str,
        request_body: &Bytes,
        status: u16,
        response_body: &Bytes,
    ) {
        let severity = match status {
            500.. => Severity::Error,
            400..=499 => Severity::Warn,
            _ => return,
        };

        let key = RateLimitKey::new(client, uri);
        if !self.limiter.should_notify(&key) {
            debug!(%key, status, "alert suppressed by rate limiter");
            return;
        }

        let request_text = match self.redactor.redact_body(request_body) {
            Ok(redacted) => String::from_utf8_lossy(&redacted).into_owned(),
            Err(e) => {
                let raw = body_text(request_body);
                if self.on_body_parse_error == BodyParseFailure::Warn && !raw.is_empty() {
                    let description = format!("request body on *{uri}* is not a JSON object");
                    self.notifier
                        .notify_warn(BODY_PARSE_ORIGIN, &description, &e.to_string(), &["Request", raw.as_str(), "URI", uri])
                        .await;
                }
                raw
            }
        };

        let description = format!("failed request on *{uri}* with StatusCode: {status}");
        let response_text = body_text(response_body);
        let fields = ["Response", response_text.as_str(), "Request", request_text.as_str(), "URI", uri];

        match severity {
            Severity::Error => self.notifier.notify_error(ERROR_ORIGIN, &description, "", &fields).await,
            _ => self.notifier.notify_warn(WARN_ORIGIN, &description, "", &fields).await,
        }
    }
}

/// Path and query as sent by the client
fn request_uri(req: &ServiceRequest) -> String {
    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.path().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, ChannelSet, ExceptionPolicy};
    use crate::provider::testing::RecordingProvider;
    use crate::provider::Message;
    use actix_web::dev::{fn_service, Payload};
    use actix_web::error::PayloadError;
    use actix_web::{test, web, App};
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Harness {
        provider: Arc<RecordingProvider>,
        middleware: AlertMiddleware,
    }

    fn harness_with(limiter: RateLimiter) -> Harness {
        let provider = Arc::new(RecordingProvider::default());
        let channels = ChannelSet {
            success: None,
            error: Some(ChannelConfig::new("errors", vec!["oncall".into()])),
            warn: Some(ChannelConfig::new("warnings", vec![])),
        };
        let notifier = Arc::new(Notifier::new(provider.clone(), channels));
        let middleware = AlertMiddleware::new(notifier, Arc::new(limiter));
        Harness {
            provider,
            middleware,
        }
    }

    fn harness() -> Harness {
        harness_with(RateLimiter::new(Duration::from_secs(600)))
    }

    fn reply_value(provider: &RecordingProvider, title: &str) -> Option<String> {
        provider
            .replies()
            .into_iter()
            .find(|(message, _)| message.heading == title)
            .map(|(message, _)| message.text)
    }

    fn field<'a>(message: &'a Message, title: &str) -> &'a str {
        message
            .fields
            .iter()
            .find(|f| f.title == title)
            .map(|f| f.value.as_str())
            .unwrap_or_default()
    }

    async fn unavailable(body: Bytes) -> HttpResponse {
        HttpResponse::ServiceUnavailable().body(body)
    }

    async fn not_found() -> HttpResponse {
        HttpResponse::NotFound().body("no such user")
    }

    async fn echo(body: Bytes) -> HttpResponse {
        HttpResponse::Ok().body(body)
    }

    async fn user_by_id(path: web::Path<u32>) -> HttpResponse {
        HttpResponse::Ok().body(format!("user {}", path.into_inner()))
    }

    async fn explode() -> HttpResponse {
        panic!("kaboom")
    }

    async fn bad_gateway() -> Result<HttpResponse, Error> {
        Err(actix_web::error::ErrorBadGateway("upstream down"))
    }

    #[actix_rt::test]
    async fn test_server_error_raises_error_alert() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .wrap(h.middleware.clone())
                .route("/orders", web::post().to(unavailable)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header(("x-forwarded-for", "10.0.0.1"))
            .set_payload(r#"{"orderId":7}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(test::read_body(resp).await, Bytes::from_static(br#"{"orderId":7}"#));

        let roots = h.provider.root_messages();
        assert_eq!(roots.len(), 1);
        assert_eq!(field(&roots[0], "ErrorAt"), ERROR_ORIGIN);
        let description = field(&roots[0], "Description");
        assert!(description.contains("/orders"));
        assert!(description.contains("503"));
        assert_eq!(roots[0].heading, "@oncall ");

        assert_eq!(reply_value(&h.provider, "Request").as_deref(), Some(r#"{"orderId":7}"#));
        assert_eq!(reply_value(&h.provider, "Response").as_deref(), Some(r#"{"orderId":7}"#));
        assert_eq!(reply_value(&h.provider, "URI").as_deref(), Some("/orders"));
    }

    #[actix_rt::test]
    async fn test_client_error_redacts_password() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .wrap(h.middleware.clone())
                .route("/login", web::post().to(not_found)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/login")
            .set_payload(r#"{"password":"x","user":"bob"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let roots = h.provider.root_messages();
        assert_eq!(roots.len(), 1);
        assert_eq!(field(&roots[0], "WarnAt"), WARN_ORIGIN);
        assert_eq!(reply_value(&h.provider, "Request").as_deref(), Some(r#"{"user":"bob"}"#));
        assert_eq!(reply_value(&h.provider, "Response").as_deref(), Some("no such user"));
    }

    #[actix_rt::test]
    async fn test_cooldown_suppresses_repeat_alerts() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .wrap(h.middleware.clone())
                .route("/orders", web::post().to(unavailable)),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/orders")
                .insert_header(("x-forwarded-for", "10.0.0.1"))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        assert_eq!(h.provider.root_messages().len(), 1);

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header(("x-forwarded-for", "10.0.0.2"))
            .to_request();
        test::call_service(&app, req).await;
        assert_eq!(h.provider.root_messages().len(), 2);
    }

    #[actix_rt::test]
    async fn test_success_is_silent_and_body_reaches_handler() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .wrap(h.middleware.clone())
                .route("/echo", web::post().to(echo)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/echo")
            .set_payload("hello handler")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, Bytes::from_static(b"hello handler"));
        assert!(h.provider.calls().is_empty());
    }

    #[actix_rt::test]
    async fn test_panic_becomes_500_and_always_alerts() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .wrap(h.middleware.clone())
                .route("/explode", web::post().to(explode)),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/explode")
                .set_payload("payload")
                .to_request();
            let Err(err) = app.call(req).await else {
                panic!("a panicking handler must not produce a response");
            };
            assert_eq!(err.error_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        }

        let roots = h.provider.root_messages();
        assert_eq!(roots.len(), 2);
        assert_eq!(field(&roots[0], "ErrorAt"), RECOVERY_ORIGIN);
        assert!(roots[0].text.starts_with("kaboom\n"));
        assert_eq!(reply_value(&h.provider, "Request").as_deref(), Some("payload"));
        assert_eq!(reply_value(&h.provider, "URI").as_deref(), Some("/explode"));
    }

    #[actix_rt::test]
    async fn test_routed_success_keeps_handler_response() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .wrap(h.middleware.clone())
                .route("/users/{id}", web::get().to(user_by_id)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/users/42").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, Bytes::from_static(b"user 42"));
        assert!(h.provider.calls().is_empty());
    }

    #[actix_rt::test]
    async fn test_inner_service_error_is_observed_and_passed_on() {
        let h = harness();
        let inner = fn_service(|_req: ServiceRequest| async {
            Err::<ServiceResponse, _>(actix_web::error::ErrorBadGateway("upstream down"))
        });
        let service = h.middleware.new_transform(inner).await.unwrap();

        let req = test::TestRequest::get().uri("/proxy").to_srv_request();
        let Err(err) = service.call(req).await else {
            panic!("inner error must be passed on");
        };

        assert_eq!(err.error_response().status(), StatusCode::BAD_GATEWAY);
        let roots = h.provider.root_messages();
        assert_eq!(roots.len(), 1);
        assert_eq!(field(&roots[0], "ErrorAt"), ERROR_ORIGIN);
        assert!(field(&roots[0], "Description").contains("502"));
        assert_eq!(reply_value(&h.provider, "Response").as_deref(), Some("upstream down"));
    }

    #[actix_rt::test]
    async fn test_handler_error_is_observed() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .wrap(h.middleware.clone())
                .route("/proxy", web::get().to(bad_gateway)),
        )
        .await;

        let req = test::TestRequest::get().uri("/proxy?id=3").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let roots = h.provider.root_messages();
        assert_eq!(roots.len(), 1);
        assert!(field(&roots[0], "Description").contains("/proxy?id=3"));
        assert_eq!(reply_value(&h.provider, "Response").as_deref(), Some("upstream down"));
    }

    #[actix_rt::test]
    async fn test_exception_url_suppressed() {
        let limiter = RateLimiter::new(Duration::from_secs(600))
            .with_exceptions(["/health"], ExceptionPolicy::Suppress);
        let h = harness_with(limiter);
        let app = test::init_service(
            App::new()
                .wrap(h.middleware.clone())
                .route("/health", web::get().to(not_found)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(h.provider.calls().is_empty());
    }

    #[actix_rt::test]
    async fn test_exception_url_cooldown_exempt() {
        let limiter = RateLimiter::new(Duration::from_secs(600))
            .with_exceptions(["/pay"], ExceptionPolicy::CooldownExempt);
        let h = harness_with(limiter);
        let app = test::init_service(
            App::new()
                .wrap(h.middleware.clone())
                .route("/pay", web::post().to(unavailable)),
        )
        .await;

        for _ in 0..3 {
            let resp = test::call_service(&app, test::TestRequest::post().uri("/pay").to_request()).await;
            assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        let roots = h.provider.root_messages();
        assert_eq!(roots.len(), 3);
        assert!(roots.iter().all(|root| field(root, "ErrorAt") == ERROR_ORIGIN));
    }

    #[actix_rt::test]
    async fn test_parse_failure_warn_policy() {
        let h = harness();
        let middleware = h.middleware.clone().on_body_parse_error(BodyParseFailure::Warn);
        let app = test::init_service(
            App::new()
                .wrap(middleware)
                .route("/orders", web::post().to(unavailable)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/orders")
            .set_payload("orderId=7")
            .to_request();
        test::call_service(&app, req).await;

        let roots = h.provider.root_messages();
        assert_eq!(roots.len(), 2);
        assert_eq!(field(&roots[0], "WarnAt"), BODY_PARSE_ORIGIN);
        assert_eq!(field(&roots[1], "ErrorAt"), ERROR_ORIGIN);
        assert_eq!(reply_value(&h.provider, "Request").as_deref(), Some("orderId=7"));
    }

    #[actix_rt::test]
    async fn test_parse_failure_passthrough_policy() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .wrap(h.middleware.clone())
                .route("/orders", web::post().to(unavailable)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/orders")
            .set_payload("orderId=7")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let roots = h.provider.root_messages();
        assert_eq!(roots.len(), 1);
        assert_eq!(field(&roots[0], "ErrorAt"), ERROR_ORIGIN);
        assert_eq!(reply_value(&h.provider, "Request").as_deref(), Some("orderId=7"));
    }

    async fn call_with_broken_body(middleware: AlertMiddleware, handled: Rc<AtomicUsize>) -> StatusCode {
        let inner = fn_service(move |req: ServiceRequest| {
            let handled = handled.clone();
            async move {
                handled.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(req.into_response(HttpResponse::Ok().finish()))
            }
        });
        let service = middleware.new_transform(inner).await.unwrap();

        let mut req = test::TestRequest::post().uri("/upload").to_srv_request();
        req.set_payload(Payload::Stream {
            payload: Box::pin(stream::once(async {
                Err::<Bytes, _>(PayloadError::Incomplete(None))
            })),
        });

        service.call(req).await.unwrap().status()
    }

    #[actix_rt::test]
    async fn test_body_read_failure_sentinel() {
        let h = harness();
        let handled = Rc::new(AtomicUsize::new(0));

        let status = call_with_broken_body(h.middleware.clone(), handled.clone()).await;

        assert_eq!(status, BODY_READ_STATUS);
        assert_eq!(handled.load(Ordering::SeqCst), 0);
        assert!(h.provider.calls().is_empty());
    }

    #[actix_rt::test]
    async fn test_body_read_failure_alert() {
        let h = harness();
        let handled = Rc::new(AtomicUsize::new(0));
        let middleware = h.middleware.clone().on_body_read_error(BodyReadFailure::Alert);

        let status = call_with_broken_body(middleware, handled.clone()).await;

        assert_eq!(status, BODY_READ_STATUS);
        assert_eq!(handled.load(Ordering::SeqCst), 0);
        let roots = h.provider.root_messages();
        assert_eq!(roots.len(), 1);
        assert_eq!(field(&roots[0], "ErrorAt"), BODY_READ_ORIGIN);
    }

    #[actix_rt::test]
    async fn test_notifier_failure_does_not_change_response() {
        let provider = Arc::new(RecordingProvider {
            fail_root: true,
            ..Default::default()
        });
        let channels = ChannelSet {
            error: Some(ChannelConfig::new("errors", vec![])),
            ..Default::default()
        };
        let notifier = Arc::new(Notifier::new(provider.clone(), channels));
        let middleware = AlertMiddleware::new(notifier, Arc::new(RateLimiter::default()));
        let app = test::init_service(
            App::new()
                .wrap(middleware)
                .route("/orders", web::post().to(unavailable)),
        )
        .await;

        let req = test::TestRequest::post().uri("/orders").set_payload("x").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(test::read_body(resp).await, Bytes::from_static(b"x"));
        assert_eq!(provider.root_messages().len(), 1);
        assert!(provider.replies().is_empty());
    }

    #[actix_rt::test]
    async fn test_from_config_requires_token() {
        let result = AlertMiddleware::from_config(&Config::default());
        assert!(matches!(result, Err(ConfigError::MissingToken)));
    }
}
