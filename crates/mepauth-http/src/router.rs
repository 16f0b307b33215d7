//! mepauth request router.
//!
//! ```text
//! POST /token               token issuance
//! POST /mepauth/v1/token    token issuance
//! GET  /health              liveness
//! ```
//!
//! A trailing `/` is ignored.

/// Paths served by the token endpoint.
pub const TOKEN_PATHS: [&str; 2] = ["/token", "/mepauth/v1/token"];

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// A resolved endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Token issuance.
    Token,
    /// Liveness probe.
    Health,
}

/// Routing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The path exists but not for this method; carries the allowed method.
    MethodNotAllowed(http::Method),
    /// Unknown path.
    NotFound,
}

/// Resolve the endpoint of a request.
///
/// # Examples
///
/// ```
/// use mepauth_http::{Route, resolve_route};
///
/// assert_eq!(resolve_route(&http::Method::POST, "/token"), Ok(Route::Token));
/// assert_eq!(resolve_route(&http::Method::GET, "/health/"), Ok(Route::Health));
/// ```
pub fn resolve_route(method: &http::Method, path: &str) -> Result<Route, RouteError> {
    let path = match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    };

    let (route, allowed) = if TOKEN_PATHS.contains(&path) {
        (Route::Token, http::Method::POST)
    } else if path == HEALTH_PATH {
        (Route::Health, http::Method::GET)
    } else {
        return Err(RouteError::NotFound);
    };

    if *method == allowed {
        Ok(route)
    } else {
        Err(RouteError::MethodNotAllowed(allowed))
    }
}
