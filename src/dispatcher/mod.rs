//! # Dispatcher Module
//!
//! Drives one request from route resolution to a sent response.
//!
//! ## Request Flow
//!
//! 1. The registry resolves the first matching route (first match wins); no match is a
//!    not-found condition
//! 2. The route name and path values are bound to the request
//! 3. The route's controller is instantiated and runs `prepare`
//! 4. Access restrictions are checked (when `check_access` is enabled)
//! 5. `pre_run` may short-circuit with a response; otherwise `run` and `post_run` execute
//! 6. The response is sent; incidental controller output is attached to it or written ahead
//!    of it, depending on [`Controller::captures_output`](crate::controller::Controller)
//!
//! ## Error Handling
//!
//! Errors never escape [`Dispatcher::dispatch`]. Each one is classified:
//!
//! - user-facing (not found, forbidden, user errors) is logged at `info` and converted
//! - system errors (including controller panics) go to the [`ErrorReporter`] exactly once
//!   and are then converted
//!
//! Conversion tries the controller's handler, then the route's output format, then the
//! surface's default controller. If sending the final response fails, the failure is
//! diverted once more through the default controller; if that send fails as well, the
//! transport receives [`FALLBACK_MESSAGE`] and the [`Outcome`] is marked fatal.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::new(&registry, &config).with_renderer(&renderer);
//! let mut transport = BufferedTransport::new();
//! let outcome = dispatcher.handle(&request, &mut transport);
//! assert!(!outcome.fatal);
//! ```

mod core;

pub use self::core::{
    Dispatched, Dispatcher, ErrorReporter, Outcome, Phase, TracingReporter, FALLBACK_MESSAGE,
    REQUEST_ID_HEADER,
};
