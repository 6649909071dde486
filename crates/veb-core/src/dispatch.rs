use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    config::Config,
    domain::{PeerId, Update},
    ports::Messenger,
};

// ============== Command Routing ==============

/// What the bot decided to do with one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Welcome,
    Search { query: String },
    Affirm,
    Help,
}

#[derive(Clone, Debug)]
enum Matcher {
    /// Whole-message match, case-insensitive.
    Exact(String),
    /// Leading keyword; the trimmed remainder becomes the payload.
    Prefix(String),
    /// Any of several leading phrases.
    AnyPrefix(Vec<String>),
}

impl Matcher {
    /// Match `text` and return the captured remainder ("" for exact rules).
    fn capture(&self, text: &str) -> Option<String> {
        match self {
            Matcher::Exact(word) => {
                if text.to_lowercase() == *word {
                    Some(String::new())
                } else {
                    None
                }
            }
            Matcher::Prefix(prefix) => strip_prefix_ci(text, prefix),
            Matcher::AnyPrefix(prefixes) => {
                prefixes.iter().find_map(|p| strip_prefix_ci(text, p))
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Action {
    Welcome,
    Search,
    Affirm,
}

/// Ordered first-match routing table.
///
/// Adding a command is appending a `(Matcher, Action)` pair; anything no rule
/// claims falls through to the help reply.
pub struct RoutingTable {
    rules: Vec<(Matcher, Action)>,
}

impl RoutingTable {
    pub fn new(start_keyword: &str, search_prefix: &str, question_prefixes: &[String]) -> Self {
        let rules = vec![
            (Matcher::Exact(start_keyword.to_lowercase()), Action::Welcome),
            (Matcher::Prefix(search_prefix.to_lowercase()), Action::Search),
            (
                Matcher::AnyPrefix(question_prefixes.iter().map(|p| p.to_lowercase()).collect()),
                Action::Affirm,
            ),
        ];
        Self { rules }
    }

    /// Route one trimmed message.
    pub fn resolve(&self, text: &str) -> Command {
        for (matcher, action) in &self.rules {
            if let Some(remainder) = matcher.capture(text) {
                return match action {
                    Action::Welcome => Command::Welcome,
                    Action::Search => Command::Search { query: remainder },
                    Action::Affirm => Command::Affirm,
                };
            }
        }
        Command::Help
    }
}

/// Case-insensitive prefix strip; returns the trimmed remainder.
///
/// The remainder is sliced by char count, so a Cyrillic keyword strips
/// cleanly regardless of the byte widths involved.
fn strip_prefix_ci(text: &str, prefix: &str) -> Option<String> {
    if !text.to_lowercase().starts_with(prefix) {
        return None;
    }
    let rest: String = text.chars().skip(prefix.chars().count()).collect();
    Some(rest.trim().to_string())
}

// ============== Canned Replies ==============

/// Reply texts, built once from the configured keywords so the help screen
/// never drifts from what the router actually accepts.
struct Replies {
    help: String,
    affirm: String,
    empty_query: String,
    not_found: String,
    blocked: String,
}

impl Replies {
    fn new(cfg: &Config) -> Self {
        Self {
            help: format!(
                "Доступные команды:\n• \"{start}\" - приветственное сообщение\n• \"{search} [запрос]\" - поиск информации\n\nПример: \"{search} курсы по Java\"",
                start = cfg.start_keyword,
                search = cfg.search_prefix,
            ),
            affirm: "Да.".to_string(),
            empty_query: format!(
                "Пожалуйста, укажите поисковый запрос после команды \"{}\"",
                cfg.search_prefix
            ),
            not_found: format!(
                "Я не нашёл точного ответа на ваш вопрос. Попробуйте задать его иначе или воспользуйтесь поиском на сайте: {}",
                cfg.scrape.listing_url
            ),
            blocked: "⚠️ Ваше сообщение содержит некорректные выражения.".to_string(),
        }
    }

    fn welcome(&self, name: &str) -> String {
        format!("Привет, {name}! Я бот по поиску информации на VK Education Projects")
    }
}

// ============== Search Worker Pool ==============

/// Bounded pool for catalog lookups: at most `workers` run at once, the rest
/// queue on the semaphore.
pub struct SearchPool {
    limit: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl SearchPool {
    pub fn new(workers: usize) -> Self {
        Self {
            limit: Arc::new(Semaphore::new(workers)),
            tasks: TaskTracker::new(),
        }
    }

    /// Queue `work`; it runs once a worker permit frees up.
    pub fn spawn(&self, work: impl Future<Output = ()> + Send + 'static) {
        let limit = Arc::clone(&self.limit);
        self.tasks.spawn(async move {
            let Ok(_permit) = limit.acquire_owned().await else {
                return; // pool already shut down
            };
            work.await;
        });
    }

    /// Stop tracking new work and wait up to `grace` for queued lookups.
    /// Lookups still queued after the grace period are abandoned.
    pub async fn drain(&self, grace: Duration) {
        self.tasks.close();
        if tokio::time::timeout(grace, self.tasks.wait()).await.is_err() {
            self.limit.close();
            warn!("search pool drain timed out; abandoning queued lookups");
        }
    }
}

// ============== Dispatcher ==============

/// Routes decoded updates to handlers and sends the replies.
///
/// `dispatch` never fails: a handler error is logged and the loop moves on to
/// the next update.
pub struct UpdateDispatcher {
    cfg: Arc<Config>,
    messenger: Arc<dyn Messenger>,
    catalog: Arc<Catalog>,
    routes: RoutingTable,
    replies: Replies,
    pool: SearchPool,
}

impl UpdateDispatcher {
    pub fn new(cfg: Arc<Config>, messenger: Arc<dyn Messenger>, catalog: Arc<Catalog>) -> Self {
        let routes =
            RoutingTable::new(&cfg.start_keyword, &cfg.search_prefix, &cfg.question_prefixes);
        let replies = Replies::new(&cfg);
        let pool = SearchPool::new(cfg.search_workers);
        Self {
            cfg,
            messenger,
            catalog,
            routes,
            replies,
            pool,
        }
    }

    /// Handle one decoded update. Unknown update kinds are dropped.
    pub async fn dispatch(&self, update: Update) {
        let Update::MessageNew(msg) = update else {
            return;
        };
        let text = msg.text.trim();
        info!(peer = msg.peer.0, "message received");
        debug!(text, "inbound text");

        if let Some(word) = self.blocked_word(text) {
            warn!(peer = msg.peer.0, word = %word, "blocked word in message");
            self.send(msg.peer, &self.replies.blocked).await;
            return;
        }

        match self.routes.resolve(text) {
            Command::Welcome => self.handle_welcome(msg.peer).await,
            Command::Search { query } if query.is_empty() => {
                self.send(msg.peer, &self.replies.empty_query).await;
            }
            Command::Search { query } => self.queue_search(msg.peer, query),
            Command::Affirm => self.send(msg.peer, &self.replies.affirm).await,
            Command::Help => self.send(msg.peer, &self.replies.help).await,
        }
    }

    /// Stop accepting new searches and drain in-flight ones.
    pub async fn shutdown(&self, grace: Duration) {
        self.pool.drain(grace).await;
    }

    fn blocked_word(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        self.cfg
            .blocked_words
            .iter()
            .find(|w| lower.contains(w.as_str()))
            .cloned()
    }

    async fn handle_welcome(&self, peer: PeerId) {
        let name = match self.messenger.first_name(peer).await {
            Ok(name) => name,
            Err(e) => {
                warn!(peer = peer.0, error = %e, "name lookup failed, using fallback");
                self.cfg.fallback_name.clone()
            }
        };
        self.send(peer, &self.replies.welcome(&name)).await;
        self.send(peer, &self.replies.help).await;
    }

    fn queue_search(&self, peer: PeerId, query: String) {
        let messenger = Arc::clone(&self.messenger);
        let catalog = Arc::clone(&self.catalog);
        let not_found = self.replies.not_found.clone();
        self.pool.spawn(async move {
            debug!(peer = peer.0, query = %query, "catalog lookup");
            let reply = match catalog.search(&query) {
                Some(item) => format!(
                    "Нашёл проект:\n{}\n{}\n{}",
                    item.title, item.description, item.url
                ),
                None => not_found,
            };
            if let Err(e) = messenger.send_message(peer, &reply).await {
                warn!(peer = peer.0, error = %e, "search reply failed");
            }
        });
    }

    async fn send(&self, peer: PeerId, text: &str) {
        if let Err(e) = self.messenger.send_message(peer, text).await {
            warn!(peer = peer.0, error = %e, "send failed");
        }
    }
}
