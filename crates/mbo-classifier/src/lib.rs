//! Deny-by-default classifier for inbound forge webhook events.
//!
//! Verifies the HMAC signature on a raw payload and, separately, classifies
//! the event body into a normalized build request (or nothing at all).

mod event;
mod signature;

pub use event::{classify_event, BuildRequest};
pub use signature::{verify_signature, SignatureError};
