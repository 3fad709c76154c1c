//! Chat transports.
//!
//! The relay only needs two things from a chat service: post a message to a
//! destination, and read back a destination's recent messages (for seeding
//! the dedup ledger after a restart).

pub mod discord;
pub mod stdout;

use async_trait::async_trait;
use tracing::warn;

use crate::error::TransportError;
use crate::relay::Registration;

pub use discord::DiscordTransport;
pub use stdout::StdoutTransport;

/// Identifies a message the transport has posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    /// Destination the message went to.
    pub destination_id: String,
    /// Transport-assigned message ID.
    pub message_id: String,
}

/// A message read back from a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentMessage {
    /// Whether the relay itself posted it.
    pub author_is_self: bool,
    /// Message text.
    pub text: String,
}

/// Outbound chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post `text` to a destination.
    async fn send_message(
        &self,
        destination_id: &str,
        text: &str,
    ) -> Result<MessageHandle, TransportError>;

    /// Read up to `limit` recent messages of a destination, newest first.
    async fn fetch_recent_messages(
        &self,
        destination_id: &str,
        limit: usize,
    ) -> Result<Vec<RecentMessage>, TransportError>;
}

/// Post `text` once to every distinct destination of `registrations`.
///
/// Failures are logged and skipped. Returns the number of destinations the
/// message reached.
pub async fn broadcast(
    transport: &dyn ChatTransport,
    registrations: &[Registration],
    text: &str,
) -> usize {
    let mut destinations: Vec<&str> = Vec::new();
    for reg in registrations {
        if !destinations.contains(&reg.destination_id.as_str()) {
            destinations.push(&reg.destination_id);
        }
    }

    let mut reached = 0;
    for destination in destinations {
        match transport.send_message(destination, text).await {
            Ok(_) => reached += 1,
            Err(e) => warn!(destination, error = %e, "Broadcast failed"),
        }
    }
    reached
}
