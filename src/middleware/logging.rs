use axum::http::{header, HeaderMap};
use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::request_id::RequestId;
use crate::config::LoggingConfig;
use crate::router::MatchedRoute;

/// Bodies longer than this are cut when logged.
const MAX_LOGGED_BODY: usize = 1024;

/// Logs each request and the response the router produced for it.
///
/// With a non-zero `max_content_length`, request bodies are only buffered
/// when their declared length fits the limit. Anything else passes through
/// untouched so the router can reject it.
pub async fn logging_middleware(
    config: Arc<LoggingConfig>,
    max_content_length: usize,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Incoming request"
    );

    if config.log_headers {
        debug!(request_id = %request_id, headers = ?request.headers(), "Request headers");
    }

    let body_limit = if config.log_request_body {
        request_body_limit(request.headers(), max_content_length)
    } else {
        None
    };

    let request = match body_limit {
        Some(limit) => {
            let (parts, body) = request.into_parts();
            let bytes = buffer(body, limit, &request_id).await;
            debug!(request_id = %request_id, body = %preview(&bytes), "Request body");
            Request::from_parts(parts, Body::from(bytes))
        }
        None => {
            if config.log_request_body {
                debug!(
                    request_id = %request_id,
                    "Request body not logged: length undeclared or over limit"
                );
            }
            request
        }
    };

    let response = next.run(request).await;

    let route = response
        .extensions()
        .get::<MatchedRoute>()
        .map(|r| r.0.as_str())
        .unwrap_or("-");

    info!(
        request_id = %request_id,
        status = response.status().as_u16(),
        route = %route,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Response sent"
    );

    if config.log_headers {
        debug!(request_id = %request_id, headers = ?response.headers(), "Response headers");
    }

    if config.log_response_body {
        let (parts, body) = response.into_parts();
        let bytes = buffer(body, usize::MAX, &request_id).await;
        debug!(request_id = %request_id, body = %preview(&bytes), "Response body");
        return Response::from_parts(parts, Body::from(bytes));
    }

    response
}

/// How much of a request body may be buffered for logging, or `None` when it
/// must not be touched.
fn request_body_limit(headers: &HeaderMap, max_content_length: usize) -> Option<usize> {
    if max_content_length == 0 {
        return Some(usize::MAX);
    }

    let declared = headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse::<usize>()
        .ok()?;
    (declared <= max_content_length).then_some(max_content_length)
}

async fn buffer(body: Body, limit: usize, request_id: &str) -> Bytes {
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "Failed to buffer body for logging");
            Bytes::new()
        }
    }
}

fn preview(bytes: &[u8]) -> String {
    let end = bytes.len().min(MAX_LOGGED_BODY);
    let mut text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    if bytes.len() > MAX_LOGGED_BODY {
        text.push_str("...");
    }
    text
}

/// Create logging middleware with config
pub fn create_logging_middleware(
    config: LoggingConfig,
    max_content_length: usize,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone {
    let config = Arc::new(config);
    move |request: Request, next: Next| {
        let config = config.clone();
        Box::pin(async move {
            logging_middleware(config, max_content_length, request, next).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Router};
    use tower::ServiceExt;

    #[test]
    fn test_preview_truncates_long_bodies() {
        assert_eq!(preview(b"short"), "short");

        let long = vec![b'a'; MAX_LOGGED_BODY + 10];
        let text = preview(&long);
        assert!(text.ends_with("..."));
        assert_eq!(text.len(), MAX_LOGGED_BODY + 3);
    }

    #[tokio::test]
    async fn test_body_logging_preserves_bodies() {
        let config = LoggingConfig {
            log_headers: true,
            log_request_body: true,
            log_response_body: true,
        };
        let app = Router::new()
            .route("/", post(|body: String| async move { format!("echo:{}", body) }))
            .layer(axum::middleware::from_fn(create_logging_middleware(config, 0)));

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from("payload"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"echo:payload");
    }

    #[test]
    fn test_request_body_limit_follows_max_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_body_limit(&headers, 0), Some(usize::MAX));
        assert_eq!(request_body_limit(&headers, 8), None);

        headers.insert(header::CONTENT_LENGTH, "8".parse().unwrap());
        assert_eq!(request_body_limit(&headers, 8), Some(8));

        headers.insert(header::CONTENT_LENGTH, "9".parse().unwrap());
        assert_eq!(request_body_limit(&headers, 8), None);

        headers.insert(header::CONTENT_LENGTH, "nine".parse().unwrap());
        assert_eq!(request_body_limit(&headers, 8), None);
    }

    #[tokio::test]
    async fn test_oversized_body_passes_through_unbuffered() {
        let config = LoggingConfig {
            log_headers: false,
            log_request_body: true,
            log_response_body: false,
        };
        let app = Router::new()
            .route(
                "/",
                post(|headers: HeaderMap, body: String| async move {
                    format!("{}:{}", headers[header::CONTENT_LENGTH].to_str().unwrap(), body.len())
                }),
            )
            .layer(axum::middleware::from_fn(create_logging_middleware(config, 4)));

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_LENGTH, "16")
            .body(Body::from("sixteen bytes!!!"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"16:16");
    }
}
