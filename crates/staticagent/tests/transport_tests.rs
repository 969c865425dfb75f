mod common;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use common::replying;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use staticagent::transport::{HttpTransport, SchemeTransport, Transport, WsTransport};
use staticagent::{session_send, Connection, Error, Keys, Message, SendOptions, Target};
use staticagent_common::types::WIRE_CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const PING: &str = "https://didcomm.org/trust_ping/1.0/ping";
const PING_RESPONSE: &str = "https://didcomm.org/trust_ping/1.0/ping_response";

/// One request as seen by the test endpoint.
#[derive(Debug, Clone)]
struct Received {
    content_type: Option<String>,
    body: Vec<u8>,
}

#[derive(Clone)]
struct Canned {
    status: StatusCode,
    reply: Vec<u8>,
    received: Arc<Mutex<Vec<Received>>>,
}

async fn canned_reply(
    State(canned): State<Canned>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Vec<u8>) {
    canned.received.lock().push(Received {
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    });
    (canned.status, canned.reply.clone())
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

/// HTTP endpoint answering every POST with `status` and `reply`.
async fn start_http(status: StatusCode, reply: &[u8]) -> (String, Arc<Mutex<Vec<Received>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/", post(canned_reply))
        .with_state(Canned {
            status,
            reply: reply.to_vec(),
            received: received.clone(),
        });
    (serve(app).await, received)
}

/// HTTP endpoint handing inbound bodies to `agent` inside a session, and
/// answering with whatever the agent returned over it.
async fn start_agent(agent: Connection) -> String {
    async fn inbound(State(agent): State<Connection>, body: Bytes) -> (StatusCode, Vec<u8>) {
        let returned = Arc::new(Mutex::new(Vec::new()));
        let sink = returned.clone();
        let session = agent.session(session_send(move |packed| {
            let sink = sink.clone();
            async move {
                sink.lock().push(packed);
                Ok(())
            }
        }));
        let handled = session.handle(&body).await;
        drop(session);
        if handled.is_err() {
            return (StatusCode::BAD_REQUEST, Vec::new());
        }
        let mut returned = returned.lock();
        if returned.is_empty() {
            (StatusCode::ACCEPTED, Vec::new())
        } else {
            (StatusCode::OK, returned.remove(0))
        }
    }

    serve(Router::new().route("/", post(inbound)).with_state(agent)).await
}

enum Peer {
    Reply(Vec<u8>),
    Silent,
    Hangup,
}

/// Websocket endpoint that records the first binary frame, then behaves
/// as `peer` says.
async fn start_ws(peer: Peer) -> (String, Arc<Mutex<Vec<Vec<u8>>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(WsMessage::Binary(data))) = ws.next().await {
            sink.lock().push(data.to_vec());
        }
        match peer {
            Peer::Reply(reply) => ws.send(WsMessage::binary(reply)).await.unwrap(),
            Peer::Hangup => {
                let _ = ws.close(None).await;
                return;
            }
            Peer::Silent => {}
        }
        while let Some(Ok(_)) = ws.next().await {}
    });
    (format!("ws://{addr}"), received)
}

#[tokio::test]
async fn http_post_carries_wire_content_type() {
    let (endpoint, received) = start_http(StatusCode::ACCEPTED, b"").await;
    let t = HttpTransport::new().unwrap();

    let out = t.send(b"packed bytes".to_vec(), &endpoint).await.unwrap();
    assert!(out.is_none());

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].content_type.as_deref(), Some(WIRE_CONTENT_TYPE));
    assert_eq!(received[0].body, b"packed bytes");
}

#[tokio::test]
async fn http_accepted_and_empty_ok_carry_no_reply() {
    let t = HttpTransport::new().unwrap();

    let (accepted, _) = start_http(StatusCode::ACCEPTED, b"ignored").await;
    assert!(t.send(b"x".to_vec(), &accepted).await.unwrap().is_none());

    let (empty, _) = start_http(StatusCode::OK, b"").await;
    assert!(t.send(b"x".to_vec(), &empty).await.unwrap().is_none());
}

#[tokio::test]
async fn http_ok_body_is_the_reply() {
    let (endpoint, _) = start_http(StatusCode::OK, b"packed reply").await;
    let t = HttpTransport::new().unwrap();
    let out = t.send(b"x".to_vec(), &endpoint).await.unwrap();
    assert_eq!(out.as_deref(), Some(&b"packed reply"[..]));
}

#[tokio::test]
async fn http_error_status_surfaces_its_code() {
    let (endpoint, _) = start_http(StatusCode::SERVICE_UNAVAILABLE, b"busy").await;
    let t = HttpTransport::new().unwrap();
    let err = t.send(b"x".to_vec(), &endpoint).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn ws_binary_reply_is_returned() {
    let (endpoint, received) = start_ws(Peer::Reply(b"ws reply".to_vec())).await;
    let t = WsTransport::new(Duration::from_secs(2));
    let out = t.send(b"ws request".to_vec(), &endpoint).await.unwrap();
    assert_eq!(out.as_deref(), Some(&b"ws reply"[..]));
    assert_eq!(*received.lock(), vec![b"ws request".to_vec()]);
}

#[tokio::test]
async fn ws_silent_peer_means_no_reply() {
    let (endpoint, received) = start_ws(Peer::Silent).await;
    let t = WsTransport::new(Duration::from_millis(200));
    let out = t.send(b"one way".to_vec(), &endpoint).await.unwrap();
    assert!(out.is_none());
    assert_eq!(received.lock().len(), 1);
}

#[tokio::test]
async fn ws_peer_hanging_up_means_no_reply() {
    let (endpoint, _) = start_ws(Peer::Hangup).await;
    let t = WsTransport::new(Duration::from_secs(2));
    assert!(t.send(b"bye".to_vec(), &endpoint).await.unwrap().is_none());
}

#[tokio::test]
async fn scheme_transport_picks_websocket_for_ws_urls() {
    let (endpoint, _) = start_ws(Peer::Reply(b"via ws".to_vec())).await;
    let t = SchemeTransport::new(
        HttpTransport::new().unwrap(),
        WsTransport::new(Duration::from_secs(2)),
    );
    let out = t.send(b"x".to_vec(), &endpoint).await.unwrap();
    assert_eq!(out.as_deref(), Some(&b"via ws"[..]));
}

#[tokio::test]
async fn reply_returns_in_the_http_response() {
    let alice_keys = Keys::generate();
    let bob_keys = Keys::generate();
    let bob = Connection::new(bob_keys.clone(), Target::to(alice_keys.verkey(), None)).unwrap();
    bob.route(PING, replying(PING_RESPONSE)).unwrap();
    let endpoint = start_agent(bob.clone()).await;

    let alice = Connection::new(alice_keys, Target::to(bob_keys.verkey(), Some(endpoint))).unwrap();
    let ping = Message::typed(PING).unwrap();
    let reply = alice
        .send_and_await_reply(&ping, SendOptions::default().timeout(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(reply.msg_type().as_str(), PING_RESPONSE);
    assert_eq!(reply.thread(), Some(ping.id()));
    assert_eq!(reply.mtc().sender(), Some(&bob.verkey()));
}

#[tokio::test]
async fn one_way_send_over_http_is_accepted() {
    let (endpoint, received) = start_http(StatusCode::ACCEPTED, b"").await;
    let alice = Connection::new(Keys::generate(), Target::to(Keys::generate().verkey(), Some(endpoint)))
        .unwrap();
    alice
        .send(&Message::typed(PING).unwrap(), &SendOptions::default())
        .await
        .unwrap();
    assert_eq!(received.lock().len(), 1);
}

#[tokio::test]
async fn rejected_post_is_a_delivery_error_with_status() {
    let (endpoint, _) = start_http(StatusCode::NOT_FOUND, b"").await;
    let alice = Connection::new(Keys::generate(), Target::to(Keys::generate().verkey(), Some(endpoint)))
        .unwrap();
    let err = alice
        .send(&Message::typed(PING).unwrap(), &SendOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::MessageDelivery {
            status: Some(404),
            ..
        }
    ));
}
