//! Connection manager: owns one channel and the session's message log.
//!
//! All mutation happens on the caller's task. Channel notifications sit in a
//! queue until the owner applies them with [`ConnectionManager::apply`] or
//! [`ConnectionManager::drain_events`], so log appends are never concurrent.

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelEvent, ChannelOptions};
use crate::state::{ChatMessage, MessageLog};
use crate::ws::WsChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
        }
    }
}

pub struct ConnectionManager {
    endpoint: String,
    channel: Box<dyn Channel>,
    events: UnboundedReceiver<ChannelEvent>,
    messages: MessageLog,
    state: ConnectionState,
    rejected_payloads: usize,
    last_error: Option<String>,
    closed: bool,
}

impl ConnectionManager {
    /// Open a WebSocket to `endpoint` with default options.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(endpoint: &str) -> Self {
        Self::connect_with(endpoint, ChannelOptions::default())
    }

    pub fn connect_with(endpoint: &str, options: ChannelOptions) -> Self {
        let channel = WsChannel::new(endpoint, options);
        Self::with_channel(endpoint, Box::new(channel))
    }

    /// Take ownership of `channel` and open it immediately.
    pub fn with_channel(endpoint: &str, mut channel: Box<dyn Channel>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        info!(endpoint, "opening channel");
        channel.open(tx);

        Self {
            endpoint: endpoint.to_string(),
            channel,
            events: rx,
            messages: MessageLog::new(),
            state: ConnectionState::Connecting,
            rejected_payloads: 0,
            last_error: None,
            closed: false,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn rejected_payloads(&self) -> usize {
        self.rejected_payloads
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Log `text` as a user message and hand it to the channel.
    ///
    /// Returns `false` without touching the log when not connected.
    pub fn send_message(&mut self, text: &str) -> bool {
        if !self.is_connected() {
            debug!("send ignored while {}", self.state.label());
            return false;
        }

        self.messages.push(ChatMessage::user(text));
        if let Err(e) = self.channel.send(text) {
            warn!(error = %e, "channel refused outbound message");
            self.state = ConnectionState::Disconnected;
            self.last_error = Some(e.to_string());
        }
        true
    }

    /// Wait for the next channel notification.
    ///
    /// Returns `None` once the channel has finished and the queue is empty.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Reconcile one channel notification with the state and the log.
    pub fn apply(&mut self, event: ChannelEvent) {
        if self.closed && matches!(event, ChannelEvent::Opened | ChannelEvent::Retrying { .. }) {
            return;
        }

        match event {
            ChannelEvent::Opened => {
                info!(endpoint = %self.endpoint, "connected");
                self.state = ConnectionState::Connected;
                self.last_error = None;
            }
            ChannelEvent::Payload(text) => {
                self.messages.push(ChatMessage::assistant(text));
            }
            ChannelEvent::Rejected { reason } => {
                warn!(%reason, "rejected inbound payload");
                self.rejected_payloads += 1;
            }
            ChannelEvent::Retrying { attempt, delay } => {
                info!(attempt, ?delay, "reconnecting");
                self.state = ConnectionState::Connecting;
            }
            ChannelEvent::Closed { reason } => {
                info!(endpoint = %self.endpoint, ?reason, "disconnected");
                self.state = ConnectionState::Disconnected;
                if reason.is_some() {
                    self.last_error = reason;
                }
            }
        }
    }

    /// Apply every notification already queued, without waiting.
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.apply(event);
                    applied += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        applied
    }

    /// Close the channel. The log stays readable.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.channel.close();
        self.state = ConnectionState::Disconnected;
    }

    /// Close the channel and wait for it to finish tearing down.
    ///
    /// Unlike [`close`](Self::close), the close handshake has been written
    /// by the time this returns, so it is safe to stop the runtime after.
    pub async fn shutdown(&mut self) {
        self.closed = true;
        self.state = ConnectionState::Disconnected;
        self.channel.shutdown().await;
        info!(endpoint = %self.endpoint, "connection shut down");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}
