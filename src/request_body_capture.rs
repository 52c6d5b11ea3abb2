//! Request body buffering for the alert middleware
//!
//! The whole payload is read up front so it can be quoted in an alert,
//! then a fresh payload over the same bytes is put back on the request so
//! the handler still sees an unconsumed body.

use std::pin::Pin;

use actix_web::dev::{Payload, ServiceRequest};
use actix_web::error::PayloadError;
use actix_web::web::{Bytes, BytesMut};
use actix_web::HttpMessage;
use futures::stream::{self, Stream, StreamExt};

use crate::error::NotifyError;

/// Read the full request body and re-insert it for downstream handlers
///
/// On a stream error the request is left without a payload and the error
/// is returned; the caller must not run the handler in that case.
pub async fn buffer_request_body(req: &mut ServiceRequest) -> Result<Bytes, NotifyError> {
    let mut payload = req.take_payload();
    let mut buffer = BytesMut::new();

    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| NotifyError::BodyRead(e.to_string()))?;
        buffer.extend_from_slice(&chunk);
    }

    let bytes = buffer.freeze();
    req.set_payload(replay_payload(bytes.clone()));

    Ok(bytes)
}

/// A payload yielding `bytes` once
fn replay_payload(bytes: Bytes) -> Payload {
    let stream = stream::once(async move { Ok::<_, PayloadError>(bytes) });
    Payload::Stream {
        payload: Box::pin(stream) as Pin<Box<dyn Stream<Item = Result<Bytes, PayloadError>>>>,
    }
}
