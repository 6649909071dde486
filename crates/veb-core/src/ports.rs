use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::{LongPollSession, PeerId, PollReply},
    Result,
};

/// Transport half of the Bots Long Poll protocol.
///
/// VK HTTP is the first implementation; the shape keeps the polling loop
/// testable against a scripted in-memory transport.
#[async_trait]
pub trait LongPollTransport: Send + Sync {
    /// Request a fresh (server, key, cursor) triple from the platform.
    async fn acquire_session(&self) -> Result<LongPollSession>;

    /// Issue one poll against `session`, holding for up to `wait`.
    ///
    /// Protocol-level failure signals come back as `PollReply::Failed`, never
    /// as `Err`; `Err` is reserved for transport and decode problems.
    async fn poll(&self, session: &LongPollSession, wait: Duration) -> Result<PollReply>;
}

/// Outbound side of the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, peer: PeerId, text: &str) -> Result<()>;

    /// Display name for a peer; used to personalize the welcome reply.
    async fn first_name(&self, peer: PeerId) -> Result<String>;
}
