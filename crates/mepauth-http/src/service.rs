//! mepauth HTTP service implementing the hyper `Service` trait.

use std::convert::Infallible;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;

use hyper::body::Incoming;
use mepauth_token_core::{TokenError, TokenIssuer, TokenResponse};
use tracing::{debug, error};

use crate::body::MepAuthResponseBody;
use crate::response::{error_response, json_response, token_error_to_response};
use crate::router::{Route, RouteError, resolve_route};

/// Value of the `server` header on every response.
pub const SERVER_NAME: &str = "mepauth";

/// Hyper `Service` implementation for mepauth.
#[derive(Debug, Clone)]
pub struct MepAuthHttpService {
    issuer: Arc<TokenIssuer>,
}

impl MepAuthHttpService {
    /// Create a new `MepAuthHttpService`.
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }
}

impl hyper::service::Service<http::Request<Incoming>> for MepAuthHttpService {
    type Response = http::Response<MepAuthResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let issuer = Arc::clone(&self.issuer);
        let request_id = uuid::Uuid::new_v4().to_string();

        Box::pin(async move {
            let response = process_request(&req, &issuer, &request_id);
            Ok(add_common_headers(response, &request_id))
        })
    }
}

/// Route a request and produce its response. The request body is ignored.
pub fn process_request<B>(
    req: &http::Request<B>,
    issuer: &TokenIssuer,
    request_id: &str,
) -> http::Response<MepAuthResponseBody> {
    debug!(request_id, method = %req.method(), path = req.uri().path(), "handling request");

    match resolve_route(req.method(), req.uri().path()) {
        Ok(Route::Token) => issue_token(req, issuer, request_id),
        Ok(Route::Health) => json_response(
            http::StatusCode::OK,
            br#"{"status":"running","service":"mepauth"}"#.to_vec(),
        ),
        Err(RouteError::MethodNotAllowed(allowed)) => {
            let mut response = error_response(
                http::StatusCode::METHOD_NOT_ALLOWED,
                "MethodNotAllowed",
                &format!("method {} is not allowed", req.method()),
            );
            if let Ok(hv) = http::HeaderValue::from_str(allowed.as_str()) {
                response.headers_mut().insert(http::header::ALLOW, hv);
            }
            response
        }
        Err(RouteError::NotFound) => error_response(
            http::StatusCode::NOT_FOUND,
            "NotFound",
            &format!("no route for {}", req.uri().path()),
        ),
    }
}

/// Run the issuer behind the panic boundary and serialize its outcome.
fn issue_token<B>(
    req: &http::Request<B>,
    issuer: &TokenIssuer,
    request_id: &str,
) -> http::Response<MepAuthResponseBody> {
    let outcome = catch_unwind(AssertUnwindSafe(|| issuer.issue(req))).unwrap_or_else(|_| {
        error!(request_id, "token issuance panicked");
        Err(TokenError::internal())
    });

    let token = match outcome {
        Ok(token) => token,
        Err(err) => return token_error_to_response(&err),
    };

    match serde_json::to_vec(&TokenResponse::from(&token)) {
        Ok(json) => {
            let mut response = json_response(http::StatusCode::OK, json);
            response.headers_mut().insert(
                http::header::CACHE_CONTROL,
                http::HeaderValue::from_static("no-store"),
            );
            response
        }
        Err(e) => {
            error!(request_id, error = %e, "failed to serialize token response");
            token_error_to_response(&TokenError::internal())
        }
    }
}

/// Add common response headers to every mepauth response.
fn add_common_headers(
    mut response: http::Response<MepAuthResponseBody>,
    request_id: &str,
) -> http::Response<MepAuthResponseBody> {
    let headers = response.headers_mut();

    if let Ok(hv) = http::HeaderValue::from_str(request_id) {
        headers.entry("x-request-id").or_insert(hv);
    }
    headers.insert(
        http::header::SERVER,
        http::HeaderValue::from_static(SERVER_NAME),
    );

    response
}
