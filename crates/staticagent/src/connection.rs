//! A pairwise connection to another agent.
//!
//! [`Connection`] owns the local keys, the [`Target`] describing the other
//! side, a [`Dispatcher`] and the set of open inbound [`Session`]s. Inbound
//! bytes go through [`Connection::handle`]; outbound messages through
//! [`Connection::send`], which prefers an open session able to carry the
//! message over a new request to the target endpoint.

use crate::config::AgentConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::keys::Keys;
use crate::message::{forward_message, Message, ReturnRoute};
use crate::message_type::MessageType;
use crate::module::ModuleRouter;
use crate::operators::{is_reply_to, match_all, Condition};
use crate::queue::SelectiveWaitQueue;
use crate::session::{Session, SessionRegistry, SessionSend};
use crate::target::{Target, TargetUpdate};
use crate::transport::{HttpTransport, SchemeTransport, Transport, WsTransport};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use staticagent_common::{envelope, CryptoError, PublicKey};
use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default time [`Connection::send_and_await_reply`] waits for a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Encryption mode used by [`Connection::pack`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackOptions {
    /// Encrypt without revealing the sender.
    pub anoncrypt: bool,
    /// Skip encryption entirely.
    pub plaintext: bool,
}

/// Options for [`Connection::send`] and the await helpers.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Reply path to request from the other side.
    pub return_route: Option<ReturnRoute>,
    /// Skip encryption entirely.
    pub plaintext: bool,
    /// Encrypt without revealing the sender.
    pub anoncrypt: bool,
    /// How long the await helpers wait; the connection default otherwise.
    pub timeout: Option<Duration>,
}

impl SendOptions {
    /// Request a reply path.
    #[must_use]
    pub fn return_route(mut self, route: ReturnRoute) -> Self {
        self.return_route = Some(route);
        self
    }

    /// Send without encryption.
    #[must_use]
    pub fn plaintext(mut self) -> Self {
        self.plaintext = true;
        self
    }

    /// Send anonymously.
    #[must_use]
    pub fn anoncrypt(mut self) -> Self {
        self.anoncrypt = true;
        self
    }

    /// Wait at most `timeout` for returned messages.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn pack_options(&self) -> PackOptions {
        PackOptions {
            anoncrypt: self.anoncrypt,
            plaintext: self.plaintext,
        }
    }

    fn expects_response(&self) -> bool {
        !matches!(self.return_route, None | Some(ReturnRoute::None))
    }
}

#[derive(Clone)]
struct QueueSlot {
    id: u64,
    condition: Condition,
    queue: Arc<SelectiveWaitQueue<Message>>,
}

struct Inner {
    keys: Keys,
    target: RwLock<Target>,
    dispatcher: Dispatcher<Connection>,
    transport: Arc<dyn Transport>,
    sessions: SessionRegistry,
    queues: Mutex<Vec<QueueSlot>>,
    next_queue_id: AtomicU64,
    reply_timeout: Duration,
}

/// Cheaply cloneable handle to a connection.
///
/// Clones share state: handlers receive a clone and may reply through it.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// Builder for [`Connection`] with injectable transport and dispatcher.
#[derive(Default)]
pub struct ConnectionBuilder {
    keys: Option<Keys>,
    target: Target,
    transport: Option<Arc<dyn Transport>>,
    dispatcher: Option<Dispatcher<Connection>>,
    reply_timeout: Option<Duration>,
}

impl ConnectionBuilder {
    /// Local keys. Fresh random keys are generated if not set.
    #[must_use]
    pub fn keys(mut self, keys: Keys) -> Self {
        self.keys = Some(keys);
        self
    }

    /// The other side.
    #[must_use]
    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Outbound transport. HTTP/websocket by endpoint scheme if not set.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Pre-populated dispatcher.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Dispatcher<Connection>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Default wait used by the await helpers.
    #[must_use]
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Finish the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the default HTTP client cannot be built.
    pub fn build(self) -> Result<Connection> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(SchemeTransport::new(
                HttpTransport::new()?,
                WsTransport::default(),
            )),
        };
        let keys = self.keys.unwrap_or_else(Keys::generate);
        debug!(verkey = %keys.verkey_b58(), "connection created");
        Ok(Connection {
            inner: Arc::new(Inner {
                keys,
                target: RwLock::new(self.target),
                dispatcher: self.dispatcher.unwrap_or_default(),
                transport,
                sessions: SessionRegistry::new(),
                queues: Mutex::new(Vec::new()),
                next_queue_id: AtomicU64::new(0),
                reply_timeout: self.reply_timeout.unwrap_or(DEFAULT_REPLY_TIMEOUT),
            }),
        })
    }
}

impl Connection {
    /// Start building a connection.
    #[must_use]
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// Connection with `keys` talking to `target`.
    ///
    /// # Errors
    ///
    /// See [`ConnectionBuilder::build`].
    pub fn new(keys: Keys, target: Target) -> Result<Self> {
        Self::builder().keys(keys).target(target).build()
    }

    /// Connection that only receives; it has no target yet.
    ///
    /// # Errors
    ///
    /// See [`ConnectionBuilder::build`].
    pub fn receiver(keys: Keys) -> Result<Self> {
        Self::builder().keys(keys).build()
    }

    /// Connection with freshly generated keys.
    ///
    /// # Errors
    ///
    /// See [`ConnectionBuilder::build`].
    pub fn random(target: Target) -> Result<Self> {
        Self::builder().target(target).build()
    }

    /// Connection with keys derived from `seed`.
    ///
    /// # Errors
    ///
    /// See [`ConnectionBuilder::build`].
    pub fn from_seed(seed: &[u8; 32], target: Target) -> Result<Self> {
        Self::new(Keys::from_seed(seed), target)
    }

    /// Connection described by `config`; random keys if none are configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] or [`Error::MutuallyExclusive`] for a
    /// bad key or target configuration, [`Error::Transport`] if the HTTP
    /// client cannot be built.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .target(config.target()?)
            .transport(config.transport()?)
            .reply_timeout(config.reply_timeout());
        if let Some(keys) = config.keys()? {
            builder = builder.keys(keys);
        }
        builder.build()
    }

    /// Local keys.
    #[must_use]
    pub fn keys(&self) -> &Keys {
        &self.inner.keys
    }

    /// Local verkey.
    #[must_use]
    pub fn verkey(&self) -> PublicKey {
        self.inner.keys.verkey()
    }

    /// Local verkey, base58.
    #[must_use]
    pub fn verkey_b58(&self) -> String {
        self.inner.keys.verkey_b58()
    }

    /// Local DID.
    #[must_use]
    pub fn did(&self) -> String {
        self.inner.keys.did()
    }

    /// Snapshot of the current target.
    #[must_use]
    pub fn target(&self) -> Target {
        self.inner.target.read().clone()
    }

    /// Rotate parts of the target.
    ///
    /// # Errors
    ///
    /// See [`Target::update`].
    pub fn update_target(&self, parts: TargetUpdate) -> Result<()> {
        self.inner.target.write().update(parts)
    }

    /// Register `handler` for the message type string `msg_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] if `msg_type` does not parse.
    pub fn route(&self, msg_type: &str, handler: Handler<Connection>) -> Result<()> {
        let msg_type = MessageType::parse(msg_type)?;
        self.inner.dispatcher.register(&msg_type, handler);
        Ok(())
    }

    /// Register every route collected by `module`.
    pub fn route_module(&self, module: ModuleRouter<Connection>) {
        info!(protocol = %module.protocol(), routes = module.len(), "routing module");
        self.inner.dispatcher.extend(module);
    }

    /// Remove the handler registered for `msg_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidType`] if `msg_type` does not parse, or
    /// [`Error::NotRegistered`] if nothing is registered for it.
    pub fn unroute(&self, msg_type: &str) -> Result<()> {
        self.inner
            .dispatcher
            .unregister(&MessageType::parse(msg_type)?)
    }

    /// Remove every route.
    pub fn clear_routes(&self) {
        self.inner.dispatcher.clear();
    }

    /// Route `msg` straight to its handler, bypassing queues.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn dispatch(&self, msg: Message) -> Result<()> {
        self.inner.dispatcher.dispatch(msg, self.clone()).await
    }

    /// Pack `msg` for the current target.
    ///
    /// With routing keys configured, the envelope is wrapped in a forward
    /// message for each mediator in turn, so the last routing key is the
    /// outermost layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutuallyExclusive`] if both flags are set,
    /// [`Error::NoRecipients`] if the target has no recipients, or
    /// [`Error::Crypto`] if encryption fails.
    pub fn pack(&self, msg: &Message, opts: PackOptions) -> Result<Vec<u8>> {
        if opts.plaintext && opts.anoncrypt {
            return Err(Error::MutuallyExclusive("plaintext and anoncrypt"));
        }
        if opts.plaintext {
            return msg.serialize();
        }

        let target = self.inner.target.read().clone();
        let Some(first) = target.recipients.first().copied() else {
            return Err(Error::NoRecipients);
        };

        let sender = if opts.anoncrypt {
            None
        } else {
            Some(self.inner.keys.signing_key())
        };
        let mut packed = envelope::pack(&msg.serialize()?, &target.recipients, sender)?;

        let mut forward_to = first;
        for routing_key in &target.routing_keys {
            let forward = forward_message(&forward_to, packed.to_value()?)?;
            packed = envelope::pack(&forward.serialize()?, &[*routing_key], None)?;
            forward_to = *routing_key;
        }

        Ok(packed.to_vec()?)
    }

    /// Unpack received bytes and record what was established in the
    /// message's trust context.
    ///
    /// Bytes that are not an envelope for this connection are parsed as a
    /// plaintext message. If that also fails the original error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] for an envelope that cannot be opened, or
    /// [`Error::InvalidMessage`]/[`Error::InvalidType`] for input that is
    /// neither an envelope nor a message.
    pub fn unpack(&self, packed: &[u8]) -> Result<Message> {
        let crypto_err = match envelope::unpack_slice(packed, self.inner.keys.signing_key()) {
            Ok(unpacked) => {
                let mut msg = Message::deserialize(&unpacked.plaintext)?;
                match unpacked.sender {
                    Some(sender) => msg.mtc_mut().set_authcrypted(sender, unpacked.recipient),
                    None => msg.mtc_mut().set_anoncrypted(unpacked.recipient),
                }
                return Ok(msg);
            }
            Err(err) => err,
        };

        match Message::deserialize(packed) {
            Ok(mut msg) => {
                msg.mtc_mut().set_plaintext();
                Ok(msg)
            }
            Err(parse_err) => match crypto_err {
                CryptoError::Malformed(_) => Err(parse_err),
                other => Err(other.into()),
            },
        }
    }

    /// [`unpack`](Self::unpack) for an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// See [`Connection::unpack`].
    pub fn unpack_value(&self, packed: &serde_json::Value) -> Result<Message> {
        self.unpack(&serde_json::to_vec(packed)?)
    }

    /// Unpack and deliver inbound bytes.
    ///
    /// If the bytes arrived over `session`, its return route follows the
    /// message's `~transport` decorator. The message then goes to the first
    /// open queue whose condition matches, or to the dispatcher.
    ///
    /// # Errors
    ///
    /// Unpack errors, [`Error::NoRegisteredHandler`], or handler errors.
    pub async fn handle(&self, packed: &[u8], session: Option<&Session>) -> Result<()> {
        let msg = self.unpack(packed)?;
        if let Some(session) = session {
            session.update_thread_from_message(&msg);
        }
        debug!(msg_type = %msg.msg_type(), msg_id = msg.id(), mtc = %msg.mtc(), "message received");
        self.deliver(msg).await
    }

    /// Conditions are evaluated on a snapshot of the open queues, outside
    /// the queue lock, so they may themselves use this connection.
    async fn deliver(&self, msg: Message) -> Result<()> {
        let slots: Vec<QueueSlot> = self.inner.queues.lock().clone();
        let Some(slot) = slots.into_iter().find(|slot| (slot.condition)(&msg)) else {
            return self.dispatch(msg).await;
        };

        let msg_id = msg.id().to_string();
        debug!(queue = slot.id, msg_id = %msg_id, "message queued");
        slot.queue.put(msg);

        // A queue closed since the snapshot has already been drained; take
        // the message back unless the close or a reader got it first.
        if !self.queue_attached(slot.id) {
            if let Some(msg) = slot.queue.get_now(|m| m.id() == msg_id) {
                debug!(queue = slot.id, msg_id = %msg_id, "queue closed, dispatching");
                return self.dispatch(msg).await;
            }
        }
        Ok(())
    }

    fn queue_attached(&self, id: u64) -> bool {
        self.inner.queues.lock().iter().any(|slot| slot.id == id)
    }

    /// Send `msg` to the other side.
    ///
    /// An open session serving the message's thread carries it if there is
    /// one. Otherwise it is posted to the target endpoint and any response
    /// body is handled as inbound traffic.
    ///
    /// # Errors
    ///
    /// Returns pack errors, [`Error::NoEndpoint`] if there is nowhere to
    /// send, [`Error::MessageDelivery`] if the transport fails, or
    /// [`Error::UnexpectedResponse`] if a response arrives without a
    /// return route having been requested.
    pub async fn send(&self, msg: &Message, opts: &SendOptions) -> Result<()> {
        let thid = msg.thread().map(str::to_string);
        let serving = self.inner.sessions.serving(thid.as_deref());

        let msg = match &opts.return_route {
            Some(route) if serving.is_empty() => Cow::Owned(msg.with_transport(route)),
            _ => Cow::Borrowed(msg),
        };
        let packed = self.pack(&msg, opts.pack_options())?;

        if !serving.is_empty() {
            debug!(sessions = serving.len(), msg_id = msg.id(), "sending over sessions");
            return send_over(&serving, &packed).await;
        }

        let endpoint = self
            .inner
            .target
            .read()
            .endpoint
            .clone()
            .ok_or(Error::NoEndpoint)?;
        debug!(endpoint = %endpoint, msg_type = %msg.msg_type(), msg_id = msg.id(), "sending");

        let response = self
            .inner
            .transport
            .send(packed, &endpoint)
            .await
            .map_err(|e| {
                warn!(endpoint = %endpoint, error = %e, "delivery failed");
                Error::MessageDelivery {
                    status: e.status(),
                    message: e.to_string(),
                }
            })?;

        match response {
            Some(body) if !body.is_empty() => {
                if !opts.expects_response() {
                    return Err(Error::UnexpectedResponse);
                }
                self.handle(&body, None).await
            }
            _ => Ok(()),
        }
    }

    /// `true` if any inbound session is open.
    #[must_use]
    pub fn session_open(&self) -> bool {
        !self.inner.sessions.is_empty()
    }

    /// Send already packed bytes over every session serving thread `thid`.
    ///
    /// Returns whether any session took the message.
    ///
    /// # Errors
    ///
    /// Returns whatever a session's send callback reports.
    pub async fn send_to_session(&self, packed: &[u8], thid: Option<&str>) -> Result<bool> {
        let serving = self.inner.sessions.serving(thid);
        if serving.is_empty() {
            return Ok(false);
        }
        send_over(&serving, packed).await?;
        Ok(true)
    }

    /// Open a session for one inbound exchange. The session closes when
    /// the guard is dropped.
    #[must_use]
    pub fn session(&self, send: SessionSend) -> SessionGuard {
        let session = Arc::new(Session::new(send));
        debug!(session = session.id(), "session opened");
        self.inner.sessions.insert(session.clone());
        SessionGuard {
            conn: self.clone(),
            session,
        }
    }

    /// Divert inbound messages matching `condition` into a queue until the
    /// returned scope is closed or dropped.
    #[must_use]
    pub fn queue(&self, condition: Condition) -> ScopedQueue {
        let id = self.inner.next_queue_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SelectiveWaitQueue::new());
        self.inner.queues.lock().push(QueueSlot {
            id,
            condition,
            queue: queue.clone(),
        });
        ScopedQueue {
            conn: self.clone(),
            id,
            queue,
            closed: false,
        }
    }

    /// Wait for the next inbound message matching `condition`.
    ///
    /// Messages that arrive before this call are not seen; use
    /// [`queue`](Self::queue) to start listening earlier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing matched within `timeout`.
    pub async fn await_message(&self, condition: Condition, timeout: Duration) -> Result<Message> {
        let queue = self.queue(condition);
        let msg = queue.next(timeout).await;
        queue.close_quietly().await;
        msg
    }

    /// Send `msg` and wait for a message matching `condition`.
    ///
    /// The return route defaults to [`ReturnRoute::All`].
    ///
    /// # Errors
    ///
    /// Errors from [`send`](Self::send), or [`Error::Timeout`].
    pub async fn send_and_await_returned(
        &self,
        msg: &Message,
        condition: Condition,
        opts: SendOptions,
    ) -> Result<Message> {
        let mut opts = opts;
        if opts.return_route.is_none() {
            opts.return_route = Some(ReturnRoute::All);
        }
        let timeout = opts.timeout.unwrap_or(self.inner.reply_timeout);

        let queue = self.queue(condition);
        let returned = match tokio::time::timeout(timeout, self.send(msg, &opts)).await {
            Ok(Ok(())) => queue.next(timeout).await,
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::Timeout),
        };
        queue.close_quietly().await;
        returned
    }

    /// Send `msg` and wait for a reply threaded to it.
    ///
    /// # Errors
    ///
    /// See [`send_and_await_returned`](Self::send_and_await_returned).
    pub async fn send_and_await_reply(&self, msg: &Message, opts: SendOptions) -> Result<Message> {
        self.send_and_await_returned(msg, is_reply_to(msg), opts)
            .await
    }

    /// Wait for any message; shorthand for [`await_message`](Self::await_message)
    /// with [`match_all`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing arrived within `timeout`.
    pub async fn await_any(&self, timeout: Duration) -> Result<Message> {
        self.await_message(match_all(), timeout).await
    }

    fn detach_queue(&self, id: u64) {
        self.inner.queues.lock().retain(|slot| slot.id != id);
    }
}

/// Send to every session at once. Each session gets the message even if
/// another fails; the first failure is returned.
async fn send_over(sessions: &[Arc<Session>], packed: &[u8]) -> Result<()> {
    join_all(sessions.iter().map(|session| {
        debug!(session = session.id(), "sending over session");
        session.send(packed.to_vec())
    }))
    .await
    .into_iter()
    .collect()
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("keys", &self.inner.keys)
            .field("target", &*self.inner.target.read())
            .field("routes", &self.inner.dispatcher.len())
            .field("sessions", &self.inner.sessions.len())
            .finish_non_exhaustive()
    }
}

/// An open inbound session; removed from its connection on drop.
pub struct SessionGuard {
    conn: Connection,
    session: Arc<Session>,
}

impl SessionGuard {
    /// Handle bytes that arrived over this session.
    ///
    /// # Errors
    ///
    /// See [`Connection::handle`].
    pub async fn handle(&self, packed: &[u8]) -> Result<()> {
        self.conn.handle(packed, Some(&self.session)).await
    }

    /// Shared handle to the session.
    #[must_use]
    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.conn.inner.sessions.remove(self.session.id());
        debug!(session = self.session.id(), "session closed");
    }
}

/// Inbound messages diverted from the dispatcher.
///
/// Closing the scope hands anything left in the queue to the dispatcher,
/// so no message is lost. Prefer [`close`](Self::close); on drop the
/// leftovers are dispatched on a spawned task.
pub struct ScopedQueue {
    conn: Connection,
    id: u64,
    queue: Arc<SelectiveWaitQueue<Message>>,
    closed: bool,
}

impl ScopedQueue {
    /// Next queued message, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing arrived in time.
    pub async fn next(&self, timeout: Duration) -> Result<Message> {
        self.queue.get(match_all(), timeout).await
    }

    /// Next queued message matching `condition`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing matched in time.
    pub async fn get(&self, condition: Condition, timeout: Duration) -> Result<Message> {
        self.queue.get(condition, timeout).await
    }

    /// Oldest queued message matching `condition`, without waiting.
    pub fn get_now(&self, condition: impl Fn(&Message) -> bool) -> Option<Message> {
        self.queue.get_now(condition)
    }

    /// Every queued message matching `condition`.
    pub fn get_all(&self, condition: impl Fn(&Message) -> bool) -> Vec<Message> {
        self.queue.get_all(condition)
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Stop diverting and dispatch whatever is still queued.
    ///
    /// Every leftover message is dispatched even if some fail.
    ///
    /// # Errors
    ///
    /// Returns the first dispatch error.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        self.conn.detach_queue(self.id);
        let mut first_err = None;
        for msg in self.queue.drain() {
            if let Err(err) = self.conn.dispatch(msg).await {
                warn!(queue = self.id, error = %err, "dispatch of queued message failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn close_quietly(self) {
        let id = self.id;
        if let Err(err) = self.close().await {
            debug!(queue = id, error = %err, "leftover dispatch failed");
        }
    }
}

impl Drop for ScopedQueue {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.conn.detach_queue(self.id);
        let leftover = self.queue.drain();
        if leftover.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(queue = self.id, dropped = leftover.len(), "queued messages dropped outside a runtime");
            return;
        };
        let conn = self.conn.clone();
        let id = self.id;
        runtime.spawn(async move {
            for msg in leftover {
                if let Err(err) = conn.dispatch(msg).await {
                    warn!(queue = id, error = %err, "dispatch of queued message failed");
                }
            }
        });
    }
}
