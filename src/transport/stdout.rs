//! Dry-run transport that prints deliveries instead of posting them.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use super::{ChatTransport, MessageHandle, RecentMessage};
use crate::error::TransportError;

/// Prints every message to stdout.
#[derive(Default)]
pub struct StdoutTransport {
    next_id: AtomicU64,
}

impl StdoutTransport {
    /// Create a dry-run transport.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatTransport for StdoutTransport {
    async fn send_message(
        &self,
        destination_id: &str,
        text: &str,
    ) -> Result<MessageHandle, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!(destination = destination_id, message_id = id, "Dry-run delivery");
        println!("[{destination_id}] {text}");
        Ok(MessageHandle {
            destination_id: destination_id.to_string(),
            message_id: id.to_string(),
        })
    }

    // Nothing was ever posted, so there is no history.
    async fn fetch_recent_messages(
        &self,
        _destination_id: &str,
        _limit: usize,
    ) -> Result<Vec<RecentMessage>, TransportError> {
        Ok(Vec::new())
    }
}
