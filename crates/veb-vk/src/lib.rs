//! VK Bots API adapter: method calls, the long poll transport and messaging.

pub mod wire;

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use veb_core::{
    config::Config,
    domain::{LongPollSession, PeerId, PollReply},
    ports::{LongPollTransport, Messenger},
    utils::truncate_text,
    Error, Result,
};

use crate::wire::{LongPollServer, MethodEnvelope, PollPayload, UserRecord};

/// Thin client over the VK method API plus the group long poll endpoint.
pub struct VkApi {
    http: reqwest::Client,
    base: String,
    token: String,
    group_id: i64,
    version: String,
    message_limit: usize,
    nonce: AtomicI64,
}

impl VkApi {
    pub fn new(cfg: &Config) -> Self {
        // Read timeout must stay above the long poll hold time.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client build");
        // random_id seed; successive sends increment from here.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64 % 2_000_000_000)
            .unwrap_or(1);
        Self {
            http,
            base: cfg.api_base.clone(),
            token: cfg.access_token.clone(),
            group_id: cfg.group_id,
            version: cfg.api_version.clone(),
            message_limit: cfg.message_limit,
            nonce: AtomicI64::new(seed),
        }
    }

    /// One authorized VK method call, unwrapped from its envelope.
    async fn call_method<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base.trim_end_matches('/'), method);
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("access_token", self.token.clone()));
        query.push(("v", self.version.clone()));
        debug!(method, "vk api call");

        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{method} request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Transport(format!(
                "{method} returned HTTP {}",
                resp.status()
            )));
        }

        let envelope: MethodEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| Error::Transport(format!("{method} body error: {e}")))?;

        if let Some(err) = envelope.error {
            return Err(Error::Api {
                code: err.error_code,
                msg: err.error_msg,
            });
        }
        envelope.response.ok_or_else(|| {
            Error::External(format!("{method} reply has neither response nor error"))
        })
    }

    async fn long_poll_server(&self) -> Result<LongPollServer> {
        self.call_method(
            "groups.getLongPollServer",
            &[("group_id", self.group_id.to_string())],
        )
        .await
    }

    async fn raw_poll(&self, session: &LongPollSession, wait: Duration) -> Result<PollReply> {
        let url = poll_url(&session.server, &session.key, &session.ts, wait)?;
        debug!(ts = %session.ts, "long poll");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("long poll request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Transport(format!(
                "long poll returned HTTP {}",
                resp.status()
            )));
        }

        let payload: PollPayload = resp
            .json()
            .await
            .map_err(|e| Error::Transport(format!("long poll body error: {e}")))?;
        payload.into_reply()
    }

    async fn send(&self, peer: PeerId, text: &str) -> Result<()> {
        let body = truncate_text(text, self.message_limit);
        let random_id = self.nonce.fetch_add(1, Ordering::Relaxed);
        let _: serde_json::Value = self
            .call_method(
                "messages.send",
                &[
                    ("peer_id", peer.0.to_string()),
                    ("message", body),
                    ("random_id", random_id.to_string()),
                ],
            )
            .await?;
        debug!(peer = peer.0, "message sent");
        Ok(())
    }

    async fn fetch_first_name(&self, peer: PeerId) -> Result<String> {
        let users: Vec<UserRecord> = self
            .call_method(
                "users.get",
                &[
                    ("user_ids", peer.0.to_string()),
                    ("fields", "first_name,last_name".to_string()),
                ],
            )
            .await?;
        users
            .into_iter()
            .next()
            .map(|u| u.first_name)
            .ok_or_else(|| Error::External("users.get returned an empty list".to_string()))
    }
}

/// Build the poll URL. The poll goes straight at the issued server and never
/// carries the access token.
fn poll_url(server: &str, key: &str, ts: &str, wait: Duration) -> Result<reqwest::Url> {
    let wait_secs = wait.as_secs().to_string();
    reqwest::Url::parse_with_params(
        server,
        [
            ("act", "a_check"),
            ("key", key),
            ("ts", ts),
            ("wait", wait_secs.as_str()),
        ],
    )
    .map_err(|e| Error::External(format!("bad long poll server url: {e}")))
}

#[async_trait]
impl LongPollTransport for VkApi {
    async fn acquire_session(&self) -> Result<LongPollSession> {
        let issued = self.long_poll_server().await?;
        Ok(LongPollSession {
            server: issued.server,
            key: issued.key,
            ts: issued.ts.into(),
        })
    }

    async fn poll(&self, session: &LongPollSession, wait: Duration) -> Result<PollReply> {
        self.raw_poll(session, wait).await
    }
}

#[async_trait]
impl Messenger for VkApi {
    async fn send_message(&self, peer: PeerId, text: &str) -> Result<()> {
        self.send(peer, text).await
    }

    async fn first_name(&self, peer: PeerId) -> Result<String> {
        self.fetch_first_name(peer).await
    }
}
