//! Outbound message model and inbound callback messages.

mod callback;
mod outbound;

pub use callback::{CallbackKind, CallbackMessage, EventKind};
pub use outbound::{Article, MessageResult, OutboundMessage, Recipients, SendRequest};
