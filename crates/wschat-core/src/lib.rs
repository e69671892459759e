pub mod channel;
pub mod config;
pub mod connection;
pub mod state;
pub mod ws;

// Re-export main types for convenience
pub use channel::{Channel, ChannelError, ChannelEvent, ChannelOptions, ReconnectPolicy};
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState};
pub use state::{ChatMessage, ChatRole, MessageLog};
pub use ws::WsChannel;
