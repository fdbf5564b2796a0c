//! # Server Module
//!
//! Minimal HTTP host for an [`Application`](crate::app::Application), built on `tiny_http`.
//!
//! Requests are handled one at a time on a single server thread: each inbound request is
//! converted into an [`HttpRequest`](crate::request::HttpRequest), dispatched into a
//! [`BufferedTransport`](crate::response::BufferedTransport) and written back as a
//! `tiny_http` response.
//!
//! ```rust,ignore
//! let handle = HttpServer::new(Arc::new(app)).start("127.0.0.1:8080")?;
//! handle.wait_ready()?;
//! handle.stopper().stop();
//! handle.join()?;
//! ```

mod http_server;
mod request;
mod response;

pub use http_server::{HttpServer, ServerHandle, Stopper};
pub use request::to_http_request;
pub use response::{into_response, plain_response, status_reason};
