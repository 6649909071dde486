use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    dispatch::UpdateDispatcher,
    domain::{LongPollSession, PollReply},
    errors::Error,
    ports::LongPollTransport,
    Result,
};

/// Delay before retrying a failed session acquisition.
const ACQUIRE_RETRY_DELAY: Duration = Duration::from_secs(15);
/// Delay before reacquiring after a transport or protocol failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Cooldown after an error nothing else classified.
const COOLDOWN_DELAY: Duration = Duration::from_secs(15);

/// Why the active session was abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReacquireReason {
    /// Connect/read failure or a non-success HTTP status.
    Transport,
    /// Server signalled the key expired (`failed: 2`).
    KeyExpired,
    /// Server signalled the server address is stale (`failed: 3`).
    ServerChanged,
    /// A `failed` code we do not interpret, including 1 without a cursor.
    Unknown(u8),
    /// An error nothing else classified.
    Unclassified,
}

/// Outcome of one poll turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollTurn {
    /// Keep polling on the current session.
    Continue,
    /// Drop the session and acquire a new one after `retry_delay(reason)`.
    Reacquire(ReacquireReason),
}

/// How long to back off before the next acquisition attempt.
pub fn retry_delay(reason: ReacquireReason) -> Duration {
    match reason {
        ReacquireReason::Unclassified => COOLDOWN_DELAY,
        _ => RECONNECT_DELAY,
    }
}

/// Drives the Bots Long Poll loop: acquire a session, poll with the latest
/// cursor, hand each batch to the dispatcher, recover per failure class.
pub struct PollSession {
    transport: Arc<dyn LongPollTransport>,
    wait: Duration,
    session: Option<LongPollSession>,
}

impl PollSession {
    pub fn new(transport: Arc<dyn LongPollTransport>, wait: Duration) -> Self {
        Self {
            transport,
            wait,
            session: None,
        }
    }

    /// The session currently polled against, if any.
    pub fn session(&self) -> Option<&LongPollSession> {
        self.session.as_ref()
    }

    /// Acquire a fresh (server, key, cursor) triple.
    pub async fn acquire(&mut self) -> Result<()> {
        let session = self.transport.acquire_session().await?;
        info!(server = %session.server, ts = %session.ts, "long poll session acquired");
        self.session = Some(session);
        Ok(())
    }

    /// One poll turn: call the server, adopt the newest cursor and dispatch
    /// the batch in arrival order.
    pub async fn poll_once(&mut self, dispatcher: &UpdateDispatcher) -> PollTurn {
        let Some(session) = self.session.clone() else {
            return PollTurn::Reacquire(ReacquireReason::Unclassified);
        };

        match self.transport.poll(&session, self.wait).await {
            Ok(PollReply::Batch { ts, updates }) => {
                self.adopt_cursor(ts);
                for update in updates {
                    dispatcher.dispatch(update).await;
                }
                PollTurn::Continue
            }
            Ok(PollReply::Failed {
                code: 1,
                ts: Some(ts),
            }) => {
                info!(ts = %ts, "cursor out of date, adopting the fresh one");
                self.adopt_cursor(ts);
                PollTurn::Continue
            }
            Ok(PollReply::Failed { code, .. }) => {
                let reason = match code {
                    2 => ReacquireReason::KeyExpired,
                    3 => ReacquireReason::ServerChanged,
                    other => ReacquireReason::Unknown(other),
                };
                warn!(code, ?reason, "long poll failure signal");
                self.session = None;
                PollTurn::Reacquire(reason)
            }
            Err(Error::Transport(e)) => {
                warn!(error = %e, "poll transport failure");
                self.session = None;
                PollTurn::Reacquire(ReacquireReason::Transport)
            }
            Err(e) => {
                error!(error = %e, "unclassified poll failure");
                self.session = None;
                PollTurn::Reacquire(ReacquireReason::Unclassified)
            }
        }
    }

    fn adopt_cursor(&mut self, ts: String) {
        if let Some(session) = self.session.as_mut() {
            session.ts = ts;
        }
    }

    /// Run until `cancel` fires. Every abnormal path ends in a delay and a
    /// fresh acquisition; the loop itself never returns an error.
    pub async fn run(mut self, dispatcher: &UpdateDispatcher, cancel: CancellationToken) {
        info!("long poll loop started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self.session.is_none() {
                if let Err(e) = self.acquire().await {
                    error!(error = %e, "session acquisition failed");
                    if !sleep_or_cancelled(ACQUIRE_RETRY_DELAY, &cancel).await {
                        break;
                    }
                }
                continue;
            }

            let turn = tokio::select! {
                _ = cancel.cancelled() => break,
                turn = self.poll_once(dispatcher) => turn,
            };
            if let PollTurn::Reacquire(reason) = turn {
                if !sleep_or_cancelled(retry_delay(reason), &cancel).await {
                    break;
                }
            }
        }
        info!("long poll loop stopped");
    }
}

/// Sleep for `delay` unless cancelled first; returns false on cancellation.
async fn sleep_or_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::Config;
    use crate::domain::{IncomingMessage, PeerId, Update};
    use crate::ports::Messenger;
    use crate::scraper::ScrapeConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeMessenger {
        sends: Mutex<Vec<(i64, String)>>,
    }

    impl FakeMessenger {
        fn sent_peers(&self) -> Vec<i64> {
            self.sends.lock().unwrap().iter().map(|(p, _)| *p).collect()
        }
    }

    #[async_trait]
    impl Messenger for FakeMessenger {
        async fn send_message(&self, peer: PeerId, text: &str) -> Result<()> {
            self.sends.lock().unwrap().push((peer.0, text.to_string()));
            Ok(())
        }

        async fn first_name(&self, _peer: PeerId) -> Result<String> {
            Ok("Тест".to_string())
        }
    }

    /// Transport scripted with queued acquire/poll results. When the poll
    /// script runs dry it fires `exhausted` so run() loops can be stopped.
    #[derive(Default)]
    struct FakeTransport {
        sessions: Mutex<VecDeque<Result<LongPollSession>>>,
        replies: Mutex<VecDeque<Result<PollReply>>>,
        calls: Mutex<Vec<String>>,
        exhausted: CancellationToken,
    }

    impl FakeTransport {
        fn push_session(&self, key: &str, ts: &str) {
            self.sessions.lock().unwrap().push_back(Ok(LongPollSession {
                server: "https://lp.example/whp/1".to_string(),
                key: key.to_string(),
                ts: ts.to_string(),
            }));
        }

        fn push_session_error(&self, e: Error) {
            self.sessions.lock().unwrap().push_back(Err(e));
        }

        fn push_reply(&self, reply: Result<PollReply>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LongPollTransport for FakeTransport {
        async fn acquire_session(&self) -> Result<LongPollSession> {
            self.calls.lock().unwrap().push("acquire".to_string());
            match self.sessions.lock().unwrap().pop_front() {
                Some(r) => r,
                None => {
                    self.exhausted.cancel();
                    Err(Error::External("no scripted session".to_string()))
                }
            }
        }

        async fn poll(&self, session: &LongPollSession, _wait: Duration) -> Result<PollReply> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("poll key={} ts={}", session.key, session.ts));
            match self.replies.lock().unwrap().pop_front() {
                Some(r) => r,
                None => {
                    self.exhausted.cancel();
                    Err(Error::Transport("no scripted reply".to_string()))
                }
            }
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            access_token: "token".to_string(),
            group_id: 1,
            api_base: "https://api.vk.com/method".to_string(),
            api_version: "5.199".to_string(),
            poll_wait: Duration::from_secs(25),
            message_limit: 4096,
            fallback_name: "Друг".to_string(),
            start_keyword: "начать".to_string(),
            search_prefix: "найди".to_string(),
            question_prefixes: vec!["можно ли".to_string()],
            blocked_words: vec![],
            search_workers: 3,
            webdriver_url: "http://localhost:9515".to_string(),
            scrape: ScrapeConfig::default(),
        })
    }

    fn dispatcher(messenger: Arc<FakeMessenger>) -> UpdateDispatcher {
        UpdateDispatcher::new(test_config(), messenger, Arc::new(Catalog::new()))
    }

    fn batch(ts: &str, updates: Vec<Update>) -> Result<PollReply> {
        Ok(PollReply::Batch {
            ts: ts.to_string(),
            updates,
        })
    }

    fn failed(code: u8, ts: Option<&str>) -> Result<PollReply> {
        Ok(PollReply::Failed {
            code,
            ts: ts.map(|s| s.to_string()),
        })
    }

    fn message(peer: i64) -> Update {
        Update::MessageNew(IncomingMessage {
            peer: PeerId(peer),
            text: "привет".to_string(),
        })
    }

    #[tokio::test]
    async fn cursor_tracks_every_successful_batch() {
        let transport = Arc::new(FakeTransport::default());
        transport.push_session("k1", "1");
        transport.push_reply(batch("2", vec![]));
        transport.push_reply(batch("5", vec![Update::Other]));

        let d = dispatcher(Arc::new(FakeMessenger::default()));
        let mut poller = PollSession::new(transport.clone(), Duration::from_secs(25));

        poller.acquire().await.unwrap();
        assert_eq!(poller.session().unwrap().ts, "1");

        assert_eq!(poller.poll_once(&d).await, PollTurn::Continue);
        assert_eq!(poller.session().unwrap().ts, "2");

        assert_eq!(poller.poll_once(&d).await, PollTurn::Continue);
        assert_eq!(poller.session().unwrap().ts, "5");

        assert_eq!(
            transport.calls(),
            vec!["acquire", "poll key=k1 ts=1", "poll key=k1 ts=2"]
        );
    }

    #[tokio::test]
    async fn stale_cursor_signal_keeps_the_session() {
        let transport = Arc::new(FakeTransport::default());
        transport.push_session("k1", "1");
        transport.push_reply(failed(1, Some("9")));
        transport.push_reply(batch("10", vec![]));

        let d = dispatcher(Arc::new(FakeMessenger::default()));
        let mut poller = PollSession::new(transport.clone(), Duration::from_secs(25));

        poller.acquire().await.unwrap();
        assert_eq!(poller.poll_once(&d).await, PollTurn::Continue);
        assert_eq!(poller.session().unwrap().key, "k1");
        assert_eq!(poller.session().unwrap().ts, "9");

        // Next poll reuses the same key with the adopted cursor.
        assert_eq!(poller.poll_once(&d).await, PollTurn::Continue);
        assert_eq!(
            transport.calls(),
            vec!["acquire", "poll key=k1 ts=1", "poll key=k1 ts=9"]
        );
    }

    #[tokio::test]
    async fn failure_codes_two_and_three_drop_the_session() {
        let cases = [
            (2u8, ReacquireReason::KeyExpired),
            (3u8, ReacquireReason::ServerChanged),
        ];
        for (code, reason) in cases {
            let transport = Arc::new(FakeTransport::default());
            transport.push_session("k1", "1");
            transport.push_reply(failed(code, None));

            let d = dispatcher(Arc::new(FakeMessenger::default()));
            let mut poller = PollSession::new(transport.clone(), Duration::from_secs(25));

            poller.acquire().await.unwrap();
            assert_eq!(poller.poll_once(&d).await, PollTurn::Reacquire(reason));
            assert!(poller.session().is_none());
        }
    }

    #[tokio::test]
    async fn unknown_failure_codes_reacquire() {
        let transport = Arc::new(FakeTransport::default());
        transport.push_session("k1", "1");
        // Code 1 without a cursor cannot be resumed; treat it as unknown.
        transport.push_reply(failed(1, None));

        let d = dispatcher(Arc::new(FakeMessenger::default()));
        let mut poller = PollSession::new(transport.clone(), Duration::from_secs(25));

        poller.acquire().await.unwrap();
        assert_eq!(
            poller.poll_once(&d).await,
            PollTurn::Reacquire(ReacquireReason::Unknown(1))
        );
        assert!(poller.session().is_none());
    }

    #[tokio::test]
    async fn error_classes_map_to_their_backoff() {
        let transport = Arc::new(FakeTransport::default());
        transport.push_session("k1", "1");
        transport.push_reply(Err(Error::Transport("connection reset".to_string())));
        transport.push_session("k2", "1");
        transport.push_reply(Err(Error::Api {
            code: 5,
            msg: "auth".to_string(),
        }));

        let d = dispatcher(Arc::new(FakeMessenger::default()));
        let mut poller = PollSession::new(transport.clone(), Duration::from_secs(25));

        poller.acquire().await.unwrap();
        assert_eq!(
            poller.poll_once(&d).await,
            PollTurn::Reacquire(ReacquireReason::Transport)
        );

        poller.acquire().await.unwrap();
        assert_eq!(
            poller.poll_once(&d).await,
            PollTurn::Reacquire(ReacquireReason::Unclassified)
        );

        assert_eq!(retry_delay(ReacquireReason::Transport), RECONNECT_DELAY);
        assert_eq!(retry_delay(ReacquireReason::KeyExpired), RECONNECT_DELAY);
        assert_eq!(retry_delay(ReacquireReason::Unclassified), COOLDOWN_DELAY);
    }

    #[tokio::test]
    async fn batch_updates_dispatch_in_arrival_order() {
        let transport = Arc::new(FakeTransport::default());
        transport.push_session("k1", "1");
        transport.push_reply(batch(
            "2",
            vec![message(1), Update::Other, message(2), message(3)],
        ));

        let messenger = Arc::new(FakeMessenger::default());
        let d = dispatcher(messenger.clone());
        let mut poller = PollSession::new(transport.clone(), Duration::from_secs(25));

        poller.acquire().await.unwrap();
        poller.poll_once(&d).await;

        assert_eq!(messenger.sent_peers(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_reacquires_after_failure_and_stops_on_cancel() {
        let transport = Arc::new(FakeTransport::default());
        transport.push_session("k1", "1");
        transport.push_reply(failed(2, None));
        transport.push_session("k2", "7");
        transport.push_reply(batch("8", vec![]));

        let d = dispatcher(Arc::new(FakeMessenger::default()));
        let poller = PollSession::new(transport.clone(), Duration::from_secs(25));

        let cancel = transport.exhausted.clone();
        poller.run(&d, cancel).await;

        assert_eq!(
            transport.calls(),
            vec![
                "acquire",
                "poll key=k1 ts=1",
                "acquire",
                "poll key=k2 ts=7",
                "poll key=k2 ts=8",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn acquisition_failure_backs_off_and_retries() {
        let transport = Arc::new(FakeTransport::default());
        transport.push_session_error(Error::Transport("dns".to_string()));
        transport.push_session("k1", "1");

        let d = dispatcher(Arc::new(FakeMessenger::default()));
        let poller = PollSession::new(transport.clone(), Duration::from_secs(25));

        let cancel = transport.exhausted.clone();
        poller.run(&d, cancel).await;

        let calls = transport.calls();
        assert_eq!(calls[..2], ["acquire", "acquire"]);
        assert_eq!(calls[2], "poll key=k1 ts=1");
    }
}
