//! HTTP service layer for mepauth.
//!
//! - **Router**: maps method and path onto the token and health endpoints
//! - **Service**: hyper `Service` with the request panic boundary
//! - **Response helpers**: JSON success/error response formatting
//! - **Server**: accept loop with graceful shutdown

pub mod body;
pub mod response;
pub mod router;
pub mod server;
pub mod service;

pub use body::MepAuthResponseBody;
pub use router::{Route, RouteError, resolve_route};
pub use server::serve;
pub use service::MepAuthHttpService;
