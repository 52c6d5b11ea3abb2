//! Helper functions for the alert relay
//!
//! Timestamps, client identity and upload file names.

use actix_web::http::header::HeaderMap;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

/// Name for an uploaded alert body, unique per upload
pub fn upload_file_name() -> String {
    format!("alert-{}.txt", Uuid::new_v4())
}

/// Identify the client behind a request, honoring proxies
///
/// Checks headers in this order:
/// 1. X-Forwarded-For (first entry of the list)
/// 2. X-Real-IP
/// 3. Falls back to the connection peer address
///
/// Returns `"unknown"` when none of them is available.
pub fn client_ip(headers: &HeaderMap, peer_ip: Option<&str>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer_ip.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
