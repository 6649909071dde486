use std::time::Duration;

/// Core error type for the bot.
///
/// Adapter crates should map their specific errors into this type so the bot
/// core can handle failures consistently (retry with a short delay vs a long
/// cooldown).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Network-level failure: connect/read error or a non-success HTTP status.
    #[error("transport error: {0}")]
    Transport(String),

    /// Application-level error payload returned by the VK API.
    #[error("vk api error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("render wait timed out after {waited:?}: {what}")]
    RenderTimeout { what: String, waited: Duration },

    /// A listing card is missing a required field.
    #[error("extraction error: {0}")]
    Extraction(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
