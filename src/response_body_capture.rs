//! Response body capture for the alert middleware
//!
//! Buffers the whole response body, then rebuilds the response around the
//! same bytes so the client receives exactly what the handler produced.

use actix_web::body::{to_bytes, BoxBody, MessageBody};
use actix_web::dev::ServiceResponse;
use actix_web::web::Bytes;
use tracing::warn;

/// The rebuilt response plus what was observed on the way through
pub struct CapturedResponse {
    pub response: ServiceResponse<BoxBody>,
    pub status: u16,
    pub body: Bytes,
}

/// Buffer the response body and hand back an equivalent response
///
/// If the body stream fails, the response is rebuilt with an empty body
/// and the failure is logged.
pub async fn capture_response_body<B>(res: ServiceResponse<B>) -> CapturedResponse
where
    B: MessageBody + 'static,
{
    let status = res.status().as_u16();
    let (req, res) = res.into_parts();
    let (head, body) = res.into_parts();

    let body = match to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let e: Box<dyn std::error::Error> = e.into();
            warn!(status, error = %e, "failed to buffer response body");
            Bytes::new()
        }
    };

    let response = ServiceResponse::new(req, head.set_body(body.clone())).map_into_boxed_body();

    CapturedResponse {
        response,
        status,
        body,
    }
}

/// Response bytes as text for an alert field
pub fn body_text(body: &Bytes) -> String {
    String::from_utf8_lossy(body).into_owned()
}
