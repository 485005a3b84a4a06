//! Security headers middleware

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Headers set on every response.
const BASELINE_HEADERS: &[(HeaderName, &str)] = &[
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::REFERRER_POLICY, "no-referrer"),
    (header::CONTENT_SECURITY_POLICY, "default-src 'none'"),
    // Patient demographics must not land in shared or browser caches.
    (header::CACHE_CONTROL, "no-store"),
];

const HSTS: &str = "max-age=31536000; includeSubDomains";

/// Add baseline security headers; HSTS only when served over HTTPS (directly or behind a
/// TLS-terminating proxy).
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let is_https = forwarded_https(&req)
        || req
            .uri()
            .scheme_str()
            .is_some_and(|s| s.eq_ignore_ascii_case("https"));

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    for (name, value) in BASELINE_HEADERS {
        headers.insert(name.clone(), HeaderValue::from_static(*value));
    }
    if is_https {
        headers.insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
    }

    response
}

fn forwarded_https(req: &Request) -> bool {
    req.headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("https"))
}
