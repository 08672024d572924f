//! Timeout enforcement.
//!
//! # Responsibilities
//! - Put a deadline on the rest of the chain
//! - Expose that deadline to handlers (`Context::deadline`, `cancelled()`)
//! - Answer 504 Gateway Timeout when the deadline wins and nothing was sent
//!
//! # Design Decisions
//! - The rest of the chain runs on its own task, forked from the context,
//!   and is raced against the deadline from here. A handler that blocks or
//!   never yields still loses the race
//! - Cancellation is cooperative: the losing task is aborted, which only
//!   takes effect at its next await point. Code that blocks keeps running
//!   until then, but its lease on the response is revoked first, so nothing
//!   it writes reaches the client
//! - Post-work of handlers after this one (code after their `next()`) is
//!   skipped when the deadline wins
//! - A panic in the forked chain is re-raised here for recovery to catch
//! - A nested timeout never extends an outer one: the earlier deadline wins
//! - The previous deadline is restored on the way out

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;

use crate::http::chain::{Handler, HandlerFn};
use crate::http::context::Context;
use crate::http::response::HttpError;
use crate::observability::metrics;

/// Timeout middleware.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Handler for Timeout {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let ours = Instant::now() + self.duration;
            let deadline = ctx.deadline().map_or(ours, |outer| outer.min(ours));
            let previous = ctx.replace_deadline(Some(deadline));

            let (mut forked, lease) = ctx.fork();
            let mut task = tokio::spawn(async move {
                forked.next().await;
                forked
            });

            let outcome = tokio::time::timeout_at(deadline, &mut task).await;
            ctx.replace_deadline(previous);
            match outcome {
                Ok(Ok(forked)) => {
                    ctx.rejoin(forked);
                    return;
                }
                Ok(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Forked chain was cancelled");
                    ctx.abort();
                    return;
                }
                Err(_) => {
                    ctx.retire(&lease);
                    task.abort();
                }
            }

            tracing::warn!(
                method = %ctx.method(),
                path = %ctx.path(),
                timeout_ms = self.duration.as_millis() as u64,
                wrote_header = ctx.wrote_header(),
                "Request timed out"
            );
            metrics::record_timeout();

            if ctx.wrote_header() {
                ctx.abort();
            } else {
                ctx.abort_with_error(&HttpError::gateway_timeout("timeout"));
            }
        })
    }
}

pub fn timeout(duration: Duration) -> HandlerFn {
    Arc::new(Timeout::new(duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::chain::handler;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures_util::FutureExt;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use std::panic::AssertUnwindSafe;

    fn context() -> Context {
        let request = Request::builder().uri("/slow").body(Body::empty()).unwrap();
        Context::new(request, None)
    }

    fn sleeper(delay: Duration, before: Option<&'static str>) -> HandlerFn {
        handler(move |ctx| {
            Box::pin(async move {
                if let Some(text) = before {
                    ctx.string(StatusCode::OK, text);
                }
                tokio::time::sleep(delay).await;
                ctx.string(StatusCode::OK, "late");
            })
        })
    }

    async fn body_of(ctx: Context) -> (StatusCode, String) {
        let response = ctx.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_first_writes_504() {
        let mut ctx = context();
        ctx.set_handlers(vec![
            timeout(Duration::from_millis(50)),
            sleeper(Duration::from_millis(200), None),
        ]);
        ctx.next().await;

        assert!(ctx.is_aborted());
        assert_eq!(ctx.deadline(), None);
        let (status, body) = body_of(ctx).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body, r#"{"error":"timeout"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_after_partial_write_only_aborts() {
        let mut ctx = context();
        ctx.set_handlers(vec![
            timeout(Duration::from_millis(50)),
            sleeper(Duration::from_millis(200), Some("partial")),
        ]);
        ctx.next().await;

        assert!(ctx.is_aborted());
        let (status, body) = body_of(ctx).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "partial");
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_first_returns_normally() {
        let mut ctx = context();
        ctx.set_handlers(vec![
            timeout(Duration::from_millis(200)),
            sleeper(Duration::from_millis(10), None),
        ]);
        ctx.next().await;

        assert!(!ctx.is_aborted());
        let (status, body) = body_of(ctx).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_timeout_keeps_earlier_deadline() {
        let seen = Arc::new(Mutex::new(None));
        let start = Instant::now();
        let probe = {
            let seen = seen.clone();
            handler(move |ctx| {
                let seen = seen.clone();
                Box::pin(async move {
                    *seen.lock() = ctx.deadline();
                })
            })
        };

        let mut ctx = context();
        ctx.set_handlers(vec![
            timeout(Duration::from_millis(100)),
            timeout(Duration::from_secs(10)),
            probe,
        ]);
        ctx.next().await;

        let deadline = (*seen.lock()).unwrap();
        assert_eq!(deadline, start + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_can_observe_cancellation() {
        let mut ctx = context();
        ctx.set_handlers(vec![
            timeout(Duration::from_millis(30)),
            handler(|ctx| {
                Box::pin(async move {
                    assert!(!ctx.is_cancelled());
                    let cancelled = ctx.cancelled();
                    tokio::select! {
                        _ = cancelled => ctx.string(StatusCode::OK, "stopped early"),
                        _ = tokio::time::sleep(Duration::from_millis(20)) => {
                            ctx.string(StatusCode::OK, "finished");
                        }
                    }
                })
            }),
        ]);
        ctx.next().await;

        let (_, body) = body_of(ctx).await;
        assert_eq!(body, "finished");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_handler_still_times_out() {
        let mut ctx = context();
        ctx.set_handlers(vec![
            timeout(Duration::from_millis(50)),
            handler(|ctx| {
                Box::pin(async move {
                    // never yields to the runtime
                    std::thread::sleep(Duration::from_millis(300));
                    ctx.string(StatusCode::OK, "late");
                })
            }),
        ]);
        ctx.next().await;
        assert!(ctx.is_aborted());

        // let the abandoned handler finish its blocking work and write
        tokio::time::sleep(Duration::from_millis(400)).await;

        let (status, body) = body_of(ctx).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body, r#"{"error":"timeout"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_post_work_is_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let wrapper = {
            let log = log.clone();
            handler(move |ctx| {
                let log = log.clone();
                Box::pin(async move {
                    log.lock().push("pre");
                    ctx.next().await;
                    log.lock().push("post");
                })
            })
        };

        let mut ctx = context();
        ctx.set_handlers(vec![
            timeout(Duration::from_millis(50)),
            wrapper,
            sleeper(Duration::from_millis(200), None),
        ]);
        ctx.next().await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(*log.lock(), vec!["pre"]);
        let (status, _) = body_of(ctx).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_finished_chain_hands_state_back() {
        let request = Request::builder()
            .method("POST")
            .uri("/items")
            .body(Body::from("payload"))
            .unwrap();
        let mut ctx = Context::new(request, None);
        ctx.set_handlers(vec![
            timeout(Duration::from_secs(5)),
            handler(|ctx| {
                Box::pin(async move {
                    let body = ctx.body_string().await.unwrap();
                    ctx.set("seen", body);
                    ctx.abort();
                })
            }),
        ]);
        ctx.next().await;

        assert!(ctx.is_aborted());
        assert_eq!(ctx.get::<String>("seen").map(String::as_str), Some("payload"));
        // the body came back with the rest of the state
        assert_eq!(ctx.body_string().await.unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_panic_in_forked_chain_resurfaces() {
        let mut ctx = context();
        ctx.set_handlers(vec![
            timeout(Duration::from_secs(5)),
            handler(|_ctx| {
                Box::pin(async move {
                    panic!("boom");
                })
            }),
        ]);

        let result = AssertUnwindSafe(ctx.next()).catch_unwind().await;
        assert!(result.is_err());
    }
}
