//! WhatsApp Bulk Media Sender Library
//!
//! This library provides tools to:
//! - Send a media message (video + caption) to a list of recipients through
//!   a Whatsify-style WhatsApp gateway
//! - Pace sends with a randomized 1-2 minute delay between messages
//! - Persist send state across restarts by replaying append-only logs
//! - Validate recipient numbers against the gateway before sending
//! - Check gateway account status for diagnostics

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod provider;
pub mod state;

// Re-export common types
pub use config::Config;
pub use dispatcher::{Dispatcher, TriggerOutcome};
pub use error::{Error, Result};
pub use provider::{normalize_number, WhatsifyClient, MAX_MEDIA_BYTES};
pub use state::{parse_identifiers, SendState, SUCCESS_MARKER};
