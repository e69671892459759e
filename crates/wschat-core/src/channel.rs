//! Transport-agnostic channel capability
//!
//! A channel is one bidirectional text transport. Instead of emitting raw
//! callbacks it reports everything that happens through a queue handed to
//! it on `open`, so the owner decides when notifications are applied.

use futures_util::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Notifications a channel delivers to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The transport is established and usable for sending
    Opened,
    /// One complete inbound text payload
    Payload(String),
    /// An inbound payload that was not text and was discarded
    Rejected { reason: String },
    /// The transport failed and a new attempt is scheduled after `delay`
    Retrying { attempt: u32, delay: Duration },
    /// The transport is gone for good. `None` means a local close.
    Closed { reason: Option<String> },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel has not been opened")]
    NotOpen,
    #[error("channel is closed")]
    Closed,
}

pub trait Channel: Send {
    /// Start establishing the transport. Events are delivered on `events`
    /// until the channel closes.
    fn open(&mut self, events: UnboundedSender<ChannelEvent>);

    /// Queue `text` for transmission without waiting for it to be written.
    fn send(&mut self, text: &str) -> Result<(), ChannelError>;

    /// Release the transport. Calling it more than once is harmless.
    fn close(&mut self);

    /// Close, then wait until the transport has finished its close
    /// handshake. Transports without background work resolve immediately.
    fn shutdown(&mut self) -> BoxFuture<'_, ()> {
        self.close();
        future::ready(()).boxed()
    }
}

/// Bounded exponential backoff between connection attempts.
///
/// `max_retries = 0` disables reconnection entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl ReconnectPolicy {
    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let delay = self
            .initial_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
