#![allow(dead_code)]

use dashmap::DashMap;
use parking_lot::Mutex;
use staticagent::transport::{transport_fn, TransportError};
use staticagent::{handler, session_send, Connection, Handler, Keys, Message, Target};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Endpoints that deliver straight into registered connections.
///
/// Each delivery opens a session on the receiving connection, handles the
/// packed bytes inside it and answers with the first message the receiver
/// returned over that session, like an HTTP exchange with a response body.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    agents: Arc<DashMap<String, Connection>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, endpoint: &str, conn: &Connection) {
        self.agents.insert(endpoint.to_string(), conn.clone());
    }

    pub fn connection(&self, keys: Keys, target: Target) -> Connection {
        let agents = self.agents.clone();
        Connection::builder()
            .keys(keys)
            .target(target)
            .transport(transport_fn(move |packed: Vec<u8>, endpoint: String| {
                let agents = agents.clone();
                async move {
                    let conn = agents
                        .get(&endpoint)
                        .map(|entry| entry.value().clone())
                        .ok_or(TransportError::Status(404))?;

                    let returned = Arc::new(Mutex::new(Vec::new()));
                    let sink = returned.clone();
                    let session = conn.session(session_send(move |packed| {
                        let sink = sink.clone();
                        async move {
                            sink.lock().push(packed);
                            Ok(())
                        }
                    }));
                    let handled = session.handle(&packed).await;
                    drop(session);
                    if let Err(e) = handled {
                        return Err(TransportError::Other(e.to_string()));
                    }

                    let mut returned = returned.lock();
                    Ok(if returned.is_empty() {
                        None
                    } else {
                        Some(returned.remove(0))
                    })
                }
            }))
            .build()
            .unwrap()
    }
}

/// Two connected agents on one in-memory network.
pub struct Pair {
    pub network: MemoryNetwork,
    pub alice: Connection,
    pub bob: Connection,
}

pub const ALICE_ENDPOINT: &str = "mem://alice";
pub const BOB_ENDPOINT: &str = "mem://bob";

/// Alice knows Bob's endpoint; Bob only knows Alice's key, so he can reply
/// to her only over a returning session.
pub fn pair() -> Pair {
    let network = MemoryNetwork::new();
    let alice_keys = Keys::generate();
    let bob_keys = Keys::generate();

    let alice = network.connection(
        alice_keys.clone(),
        Target::to(bob_keys.verkey(), Some(BOB_ENDPOINT.to_string())),
    );
    let bob = network.connection(bob_keys, Target::to(alice_keys.verkey(), None));

    network.register(ALICE_ENDPOINT, &alice);
    network.register(BOB_ENDPOINT, &bob);
    Pair {
        network,
        alice,
        bob,
    }
}

/// Handler counting its invocations.
pub fn counting() -> (Handler<Connection>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let h = handler(move |_msg: Message, _conn: Connection| {
        let seen = seen.clone();
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    (h, count)
}

/// Handler answering every message with a threaded `content: reply`.
pub fn replying(reply_type: &'static str) -> Handler<Connection> {
    handler(move |msg: Message, conn: Connection| async move {
        let reply = Message::typed(reply_type)?
            .with_field("content", "reply")?
            .with_thread(msg.id());
        conn.send(&reply, &Default::default()).await
    })
}
