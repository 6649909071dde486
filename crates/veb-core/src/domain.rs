/// VK peer id (numeric). Direct chats carry the user id; group chats are offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerId(pub i64);

/// An inbound community message, already stripped down to what the bot reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub peer: PeerId,
    pub text: String,
}

/// One decoded entry of a long-poll batch.
///
/// Only `message_new` is interpreted; every other event type collapses into
/// `Other` so new VK event kinds never break the loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    MessageNew(IncomingMessage),
    Other,
}

/// The (server, key, cursor) triple one long-poll session is bound to.
///
/// `ts` is opaque to us: VK issues it and we echo the latest value back on
/// every poll. It is kept as a string because the wire sends it both as a
/// JSON number and as a JSON string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongPollSession {
    pub server: String,
    pub key: String,
    pub ts: String,
}

/// Decoded body of one poll call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollReply {
    /// Normal reply: a fresh cursor plus zero or more updates.
    Batch { ts: String, updates: Vec<Update> },
    /// Protocol-level failure signal. Code 1 may carry a fresh cursor.
    Failed { code: u8, ts: Option<String> },
}
