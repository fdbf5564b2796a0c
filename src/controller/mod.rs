//! # Controller Module
//!
//! Business logic bound to a route.
//!
//! A controller is instantiated by the registry right before `prepare` and dropped once the
//! dispatch completes. The dispatcher drives the lifecycle:
//!
//! ```text
//! prepare ─▶ (access check) ─▶ pre_run ──Some(response)──▶ done (run/post_run skipped)
//!                                 │ None
//!                                 ▼
//!                                run ─▶ post_run ─▶ done
//! ```
//!
//! Any phase may return a [`DispatchError`]. The dispatcher first offers it to
//! [`Controller::handle_user_error`] or [`Controller::handle_system_error`]; when those
//! return `None`, a response is built from the route's output format.

pub mod builtin;
mod context;

pub use context::ControllerContext;

use crate::error::DispatchError;
use crate::response::{ErrorContext, Response};

pub trait Controller {
    /// Initialize from the request and route options.
    fn prepare(&mut self, _ctx: &mut ControllerContext<'_>) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Return a response to short-circuit `run` and `post_run`.
    fn pre_run(
        &mut self,
        _ctx: &mut ControllerContext<'_>,
    ) -> Result<Option<Response>, DispatchError> {
        Ok(None)
    }

    fn run(&mut self, ctx: &mut ControllerContext<'_>) -> Result<Response, DispatchError>;

    /// Adjust the response produced by `run`.
    fn post_run(
        &mut self,
        _ctx: &mut ControllerContext<'_>,
        _response: &mut Response,
    ) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Whether text printed through [`ControllerContext::print`] is attached to the response
    /// instead of being written to the transport ahead of it.
    fn captures_output(&self) -> bool {
        false
    }

    /// Whether the session is started before `prepare`. HTTP only.
    fn uses_session(&self) -> bool {
        true
    }

    /// Custom response for an expected error (user, not-found, forbidden).
    fn handle_user_error(&self, _err: &DispatchError, _ctx: &ErrorContext) -> Option<Response> {
        None
    }

    /// Custom response for a system error. The error has already been reported.
    fn handle_system_error(&self, _err: &DispatchError, _ctx: &ErrorContext) -> Option<Response> {
        None
    }
}
