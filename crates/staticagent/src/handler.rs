//! Message handlers and handler wrappers.

use crate::error::{Error, Result};
use crate::message::Message;
use crate::mtc::{Context, ANONCRYPT_AFFIRMED, ANONCRYPT_DENIED, AUTHCRYPT_AFFIRMED, AUTHCRYPT_DENIED};
use futures_util::future::{BoxFuture, FutureExt};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// A shareable async message handler.
///
/// `C` is the context handed to the handler alongside the message; for
/// connection routes it is the [`Connection`](crate::Connection) that
/// received the message, so handlers can reply through it.
pub type Handler<C> = Arc<dyn Fn(Message, C) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler<C, F, Fut>(f: F) -> Handler<C>
where
    F: Fn(Message, C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |msg: Message, ctx: C| f(msg, ctx).boxed())
}

/// Run `preprocessor` on every message before `inner` sees it.
///
/// The preprocessor may rewrite the message or reject it with an error,
/// in which case `inner` is not called.
pub fn preprocess<C, P>(preprocessor: P, inner: Handler<C>) -> Handler<C>
where
    C: Send + 'static,
    P: Fn(Message) -> Result<Message> + Send + Sync + 'static,
{
    Arc::new(move |msg: Message, ctx: C| match preprocessor(msg) {
        Ok(msg) => inner(msg, ctx),
        Err(err) => futures_util::future::ready(Err(err)).boxed(),
    })
}

/// Async form of [`preprocess`].
pub fn preprocess_async<C, P, Fut>(preprocessor: P, inner: Handler<C>) -> Handler<C>
where
    C: Send + 'static,
    P: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message>> + Send + 'static,
{
    Arc::new(move |msg: Message, ctx: C| {
        let pending = preprocessor(msg);
        let inner = inner.clone();
        async move { inner(pending.await?, ctx).await }.boxed()
    })
}

/// Check every message with `validator` before `inner` sees it.
///
/// The validator returns the message to hand on, possibly coerced into a
/// different shape. Any failure becomes [`Error::MessageValidation`].
pub fn validate<C, V, E>(validator: V, inner: Handler<C>) -> Handler<C>
where
    C: Send + 'static,
    V: Fn(Message) -> std::result::Result<Message, E> + Send + Sync + 'static,
    E: Display,
{
    preprocess(
        move |msg: Message| {
            let msg_type = msg.msg_type().to_string();
            validator(msg).map_err(|err| {
                tracing::debug!(msg_type = %msg_type, error = %err, "message rejected by validator");
                Error::MessageValidation(err.to_string())
            })
        },
        inner,
    )
}

/// Reject messages whose trust context is not exactly `affirmed`/`denied`.
pub fn require_trust<C: Send + 'static>(
    affirmed: Context,
    denied: Context,
    inner: Handler<C>,
) -> Handler<C> {
    preprocess(
        move |msg: Message| {
            let mtc = msg.mtc();
            if mtc.affirmed() != affirmed {
                return Err(Error::InsufficientTrust(format!(
                    "affirmed {:?} does not match expected {:?}",
                    mtc.affirmed(),
                    affirmed
                )));
            }
            if mtc.denied() != denied {
                return Err(Error::InsufficientTrust(format!(
                    "denied {:?} does not match expected {:?}",
                    mtc.denied(),
                    denied
                )));
            }
            Ok(msg)
        },
        inner,
    )
}

/// Only accept authcrypted messages.
pub fn authcrypted<C: Send + 'static>(inner: Handler<C>) -> Handler<C> {
    require_trust(AUTHCRYPT_AFFIRMED, AUTHCRYPT_DENIED, inner)
}

/// Only accept anoncrypted messages.
pub fn anoncrypted<C: Send + 'static>(inner: Handler<C>) -> Handler<C> {
    require_trust(ANONCRYPT_AFFIRMED, ANONCRYPT_DENIED, inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Handler<()>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let h = handler(move |_msg: Message, ()| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        (h, count)
    }

    fn basic() -> Message {
        Message::typed("https://didcomm.org/basicmessage/1.0/message").unwrap()
    }

    #[tokio::test]
    async fn authcrypted_guard_rejects_other_contexts() {
        let (inner, count) = counting();
        let guarded = authcrypted(inner);

        let err = guarded(basic(), ()).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientTrust(_)));

        let mut msg = basic();
        msg.mtc_mut().set_anoncrypted([1; 32]);
        assert!(guarded(msg, ()).await.is_err());

        let mut msg = basic();
        msg.mtc_mut().set_authcrypted([2; 32], [1; 32]);
        guarded(msg, ()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn anoncrypted_guard_accepts_anoncrypt_only() {
        let (inner, count) = counting();
        let guarded = anoncrypted(inner);

        let mut msg = basic();
        msg.mtc_mut().set_authcrypted([2; 32], [1; 32]);
        assert!(guarded(msg, ()).await.is_err());

        let mut msg = basic();
        msg.mtc_mut().set_anoncrypted([1; 32]);
        guarded(msg, ()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preprocess_can_rewrite() {
        let out = Arc::new(parking_lot::Mutex::new(None));
        let sink = out.clone();
        let inner = handler(move |msg: Message, ()| {
            let sink = sink.clone();
            async move {
                *sink.lock() = msg.get_str("content").map(str::to_string);
                Ok(())
            }
        });
        let h = preprocess(|msg: Message| msg.with_field("content", "rewritten"), inner);
        h(basic(), ()).await.unwrap();
        assert_eq!(out.lock().as_deref(), Some("rewritten"));
    }

    #[tokio::test]
    async fn async_preprocess_rewrites_or_stops() {
        let out = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = out.clone();
        let inner = handler(move |msg: Message, ()| {
            let sink = sink.clone();
            async move {
                sink.lock().push(msg.get_str("content").unwrap_or_default().to_string());
                Ok(())
            }
        });
        let h = preprocess_async(
            |msg: Message| async move {
                tokio::task::yield_now().await;
                if msg.get_str("content") == Some("stop") {
                    return Err(Error::InvalidMessage("stopped".into()));
                }
                msg.with_field("content", "looked up")
            },
            inner,
        );

        h(basic(), ()).await.unwrap();
        let stop = basic().with_field("content", "stop").unwrap();
        assert!(matches!(h(stop, ()).await, Err(Error::InvalidMessage(_))));
        assert_eq!(*out.lock(), vec!["looked up".to_string()]);
    }

    #[tokio::test]
    async fn validator_failure_is_a_validation_error() {
        let (inner, count) = counting();
        let h = validate(
            |msg: Message| match msg.get("count").and_then(serde_json::Value::as_u64) {
                Some(n) if n > 0 => Ok(msg),
                Some(_) => Err("count must be positive".to_string()),
                None => Err("count is required".to_string()),
            },
            inner,
        );

        let good = basic().with_field("count", 3).unwrap();
        h(good, ()).await.unwrap();

        match h(basic(), ()).await {
            Err(Error::MessageValidation(reason)) => assert_eq!(reason, "count is required"),
            other => panic!("expected validation error, got {other:?}"),
        }
        let zero = basic().with_field("count", 0).unwrap();
        assert!(matches!(h(zero, ()).await, Err(Error::MessageValidation(_))));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validator_may_coerce() {
        let out = Arc::new(parking_lot::Mutex::new(None));
        let sink = out.clone();
        let inner = handler(move |msg: Message, ()| {
            let sink = sink.clone();
            async move {
                *sink.lock() = msg.get("count").cloned();
                Ok(())
            }
        });
        let h = validate(
            |msg: Message| -> Result<Message> {
                let n: u64 = msg
                    .get_str("count")
                    .ok_or_else(|| Error::InvalidMessage("count missing".into()))?
                    .parse()
                    .map_err(|e| Error::InvalidMessage(format!("{e}")))?;
                msg.with_field("count", n)
            },
            inner,
        );
        h(basic().with_field("count", "12").unwrap(), ()).await.unwrap();
        assert_eq!(*out.lock(), Some(serde_json::json!(12)));

        let bad = basic().with_field("count", "twelve").unwrap();
        assert!(matches!(h(bad, ()).await, Err(Error::MessageValidation(_))));
    }
}
