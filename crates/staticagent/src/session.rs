//! Inbound transport exchanges that can carry replies.

use crate::error::{Error, Result};
use crate::message::{Message, ReturnRoute};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Writes a packed message back over the exchange a session belongs to.
pub type SessionSend = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`SessionSend`].
pub fn session_send<F, Fut>(f: F) -> SessionSend
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |packed: Vec<u8>| f(packed).boxed())
}

/// Which outbound messages a session returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ThreadScope {
    /// Nothing; replies need a new outbound request.
    #[default]
    None,
    /// Only messages in this thread.
    Thread(String),
    /// Everything.
    All,
}

/// One live inbound exchange, e.g. an HTTP request being answered or an
/// open websocket.
pub struct Session {
    id: String,
    send: SessionSend,
    scope: Mutex<ThreadScope>,
}

impl Session {
    /// New session with no return route.
    #[must_use]
    pub fn new(send: SessionSend) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            send,
            scope: Mutex::new(ThreadScope::None),
        }
    }

    /// Unique session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current thread scope.
    #[must_use]
    pub fn scope(&self) -> ThreadScope {
        self.scope.lock().clone()
    }

    /// Replace the thread scope.
    pub fn set_scope(&self, scope: ThreadScope) {
        *self.scope.lock() = scope;
    }

    /// `true` if the session may carry replies.
    #[must_use]
    pub fn returning(&self) -> bool {
        *self.scope.lock() != ThreadScope::None
    }

    /// `true` if every message may be returned.
    #[must_use]
    pub fn thread_all(&self) -> bool {
        *self.scope.lock() == ThreadScope::All
    }

    /// `true` if a message in thread `thid` should go through this session.
    #[must_use]
    pub fn serves(&self, thid: Option<&str>) -> bool {
        match &*self.scope.lock() {
            ThreadScope::None => false,
            ThreadScope::All => true,
            ThreadScope::Thread(t) => thid == Some(t.as_str()),
        }
    }

    /// Apply the message's `~transport` return route. Messages without the
    /// decorator leave the scope untouched.
    pub fn update_thread_from_message(&self, msg: &Message) {
        let Some(route) = msg.return_route() else {
            return;
        };
        let scope = match route {
            ReturnRoute::None => ThreadScope::None,
            ReturnRoute::All => ThreadScope::All,
            ReturnRoute::Thread(thid) => ThreadScope::Thread(thid),
        };
        debug!(session = %self.id, ?scope, "return route updated");
        self.set_scope(scope);
    }

    /// Send a packed message over this session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReturning`] if the session has no return route,
    /// otherwise whatever the send callback reports.
    pub async fn send(&self, packed: Vec<u8>) -> Result<()> {
        if !self.returning() {
            return Err(Error::NotReturning(self.id.clone()));
        }
        (self.send)(packed).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("scope", &*self.scope.lock())
            .finish_non_exhaustive()
    }
}

/// Concurrent set of open sessions, keyed by session id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session.
    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id().to_string(), session);
    }

    /// Remove a session by id.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    /// Look up a session by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Sessions that would carry a message in thread `thid`.
    ///
    /// The returned handles are detached from the map so callers may await
    /// on them without holding shard locks.
    #[must_use]
    pub fn serving(&self, thid: Option<&str>) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().serves(thid))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// `true` if no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
