//! Audit middleware: records every administrative call as a log job
//!
//! The record is built once the response exists and handed to ingestion on
//! a separate task, so a saturated intake never delays the response.

use axum::{
    extract::{OriginalUri, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::domain::NewLogJob;
use crate::infrastructure::AppState;

pub const ORDER_ID_HEADER: &str = "x-order-id";
pub const ADMIN_ID_HEADER: &str = "x-admin-id";

/// Response extension a handler sets to describe what it did.
///
/// Without it the record message is derived from the method, url and status.
#[derive(Debug, Clone)]
pub struct AuditMessage(pub String);

pub async fn record_admin_call(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    // Nested routers only see the path below their prefix
    let url = request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.to_string())
        .unwrap_or_else(|| request.uri().to_string());
    let order_id = header_id(request.headers(), ORDER_ID_HEADER);
    let admin_id = header_id(request.headers(), ADMIN_ID_HEADER);

    let response = next.run(request).await;

    let status = response.status();
    let message = match response.extensions().get::<AuditMessage>() {
        Some(audit) => audit.0.clone(),
        None => format!("{} {} returned {}", method, url, status),
    };

    let record = NewLogJob {
        order_id,
        admin_id,
        message,
        url,
        method,
        http_status: i32::from(status.as_u16()),
    };

    let ingestor = state.ingestor.clone();
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        ingestor.submit(&shutdown, record).await;
    });

    response
}

/// Positive integer id from `name`, if present and well-formed.
fn header_id(headers: &HeaderMap, name: &str) -> Option<i32> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .filter(|id: &i32| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_id_rejects_malformed_values() {
        let mut headers = HeaderMap::new();
        headers.insert(ORDER_ID_HEADER, HeaderValue::from_static(" 42 "));
        headers.insert(ADMIN_ID_HEADER, HeaderValue::from_static("admin"));

        assert_eq!(header_id(&headers, ORDER_ID_HEADER), Some(42));
        assert_eq!(header_id(&headers, ADMIN_ID_HEADER), None);
        assert_eq!(header_id(&HeaderMap::new(), ORDER_ID_HEADER), None);

        headers.insert(ORDER_ID_HEADER, HeaderValue::from_static("-3"));
        assert_eq!(header_id(&headers, ORDER_ID_HEADER), None);
    }
}
