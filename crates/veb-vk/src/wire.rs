//! Serde layer for VK method envelopes and Bots Long Poll payloads.

use serde::Deserialize;
use tracing::warn;

use veb_core::{
    domain::{IncomingMessage, PeerId, PollReply, Update},
    Error, Result,
};

/// Standard VK method envelope: exactly one of `response` / `error` is set.
#[derive(Debug, Deserialize)]
pub struct MethodEnvelope<T> {
    pub response: Option<T>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub error_code: i64,
    pub error_msg: String,
}

/// The `ts` cursor arrives either as a JSON string or as a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    Text(String),
    Num(i64),
}

impl From<Cursor> for String {
    fn from(c: Cursor) -> Self {
        match c {
            Cursor::Text(s) => s,
            Cursor::Num(n) => n.to_string(),
        }
    }
}

/// `groups.getLongPollServer` response body.
#[derive(Debug, Deserialize)]
pub struct LongPollServer {
    pub server: String,
    pub key: String,
    pub ts: Cursor,
}

/// Raw body of one poll response, before classification.
#[derive(Debug, Deserialize)]
pub struct PollPayload {
    pub ts: Option<Cursor>,
    pub failed: Option<u8>,
    #[serde(default)]
    pub updates: Vec<serde_json::Value>,
}

impl PollPayload {
    /// Classify the payload into the domain reply. An individual update that
    /// does not decode degrades to [`Update::Other`] instead of poisoning the
    /// whole batch.
    pub fn into_reply(self) -> Result<PollReply> {
        if let Some(code) = self.failed {
            return Ok(PollReply::Failed {
                code,
                ts: self.ts.map(String::from),
            });
        }
        let Some(ts) = self.ts else {
            return Err(Error::External(
                "poll reply carries neither ts nor failed".to_string(),
            ));
        };
        let updates = self.updates.into_iter().map(decode_update).collect();
        Ok(PollReply::Batch {
            ts: ts.into(),
            updates,
        })
    }
}

fn decode_update(raw: serde_json::Value) -> Update {
    match serde_json::from_value::<RawUpdate>(raw) {
        Ok(RawUpdate::MessageNew { object }) => Update::MessageNew(IncomingMessage {
            peer: PeerId(object.message.peer_id),
            text: object.message.text,
        }),
        Ok(RawUpdate::Other) => Update::Other,
        Err(e) => {
            warn!(error = %e, "undecodable update, skipping");
            Update::Other
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawUpdate {
    #[serde(rename = "message_new")]
    MessageNew { object: MessageNewObject },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageNewObject {
    message: MessageBody,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    peer_id: i64,
    #[serde(default)]
    text: String,
}

/// One entry of a `users.get` response.
#[derive(Debug, Deserialize)]
pub struct UserRecord {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}
