//! Unary RPC abstraction used by the service handlers
//!
//! Handlers never see HTTP. Each call receives a [`CallContext`] holding the
//! inbound metadata the transport lifted from the request and, when the call
//! runs inside a real request, an outbound metadata sink the transport lowers
//! back into response headers once the handler returns. Cookies travel through
//! these two side-channels under well-known keys:
//!
//! - inbound: [`INBOUND_COOKIE_KEY`], one `name=value` entry per cookie
//! - outbound: [`SET_COOKIE_KEY`], one `name=value` entry per cookie to set
//!
//! The HTTP half of the bridge lives in the gateway binary.

pub mod context;
pub mod cookie;
pub mod metadata;
pub mod status;

pub use context::{AuthenticatedSubject, CallContext};
pub use metadata::{INBOUND_COOKIE_KEY, Metadata, SET_COOKIE_KEY};
pub use status::{Code, Result, Status};
