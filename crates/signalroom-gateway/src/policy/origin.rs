//! Origin allow-list and the CORS guard applied to every route.
//!
//! Production mode requires an explicit allow-list hit. Outside production
//! every origin is accepted unless an allow-list is configured. Requests
//! without an `Origin` header (non-browser clients) are never rejected here.

use std::collections::HashSet;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use signalroom_core::error::SignalError;

use crate::app_state::AppState;
use crate::config::OriginSection;
use crate::transport::ws::reject;

#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    production: bool,
    allowed: HashSet<String>,
}

impl OriginPolicy {
    pub fn new(cfg: &OriginSection) -> Self {
        Self {
            production: cfg.production,
            allowed: cfg
                .allowed
                .iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        let o = origin.trim();
        if self.production {
            return !o.is_empty() && self.allowed.contains(o);
        }
        self.allowed.is_empty() || self.allowed.contains(o)
    }
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: Option<&str>) {
    if let Some(v) = origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, v);
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
}

/// Middleware: reject disallowed browser origins, answer preflight, and
/// decorate allowed responses with CORS headers.
pub async fn cors_guard(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(o) = origin.as_deref() {
        if !app.origins().is_allowed(o) {
            app.metrics()
                .handshake_rejections
                .inc(&[("reason", "origin")]);
            tracing::debug!(origin = %o, "origin rejected");
            let mut resp = reject(&SignalError::NotAllowed("origin not allowed".into()));
            apply_cors_headers(resp.headers_mut(), None);
            return resp;
        }
    }

    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    apply_cors_headers(resp.headers_mut(), origin.as_deref());
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(production: bool, allowed: &[&str]) -> OriginPolicy {
        OriginPolicy::new(&OriginSection {
            production,
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn dev_without_list_allows_all() {
        let p = policy(false, &[]);
        assert!(p.is_allowed("https://anything.example"));
        assert!(p.is_allowed(""));
    }

    #[test]
    fn dev_with_list_is_strict() {
        let p = policy(false, &["https://app.example"]);
        assert!(p.is_allowed(" https://app.example "));
        assert!(!p.is_allowed("https://evil.example"));
    }

    #[test]
    fn production_requires_listed_origin() {
        let p = policy(true, &["https://app.example"]);
        assert!(p.is_allowed("https://app.example"));
        assert!(!p.is_allowed(""));
        assert!(!policy(true, &[]).is_allowed("https://app.example"));
    }
}
