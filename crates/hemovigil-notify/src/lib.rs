//! Notifier channels for hemovigil.
//!
//! Each channel knows how to format and transmit one event to one target and
//! report the outcome. Ordinary remote failures (HTTP error codes, malformed
//! responses) are mapped into [`SendOutcome`], never raised; the dispatch
//! engine owns retries and cancellation.

pub mod channel;
pub mod chat;
pub mod registry;
pub mod webhook;

pub use channel::{FailureKind, Notifier, SendOutcome};
pub use chat::ChatBotNotifier;
pub use registry::NotifierRegistry;
pub use webhook::WebhookNotifier;
