//! Panic recovery.
//!
//! The dispatcher itself never catches anything. Put [`Recover`] first in
//! the pre-chain so that a panic anywhere below it, in middleware, the
//! resolver or a handler, becomes a logged `500 Internal Server Error`
//! instead of a dropped connection.
//!
//! ```rust
//! use obi::middleware::Recover;
//! use obi::{Dispatcher, Router};
//!
//! let app = Dispatcher::new(Router::new()).pre(Recover::new());
//! ```

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use super::{never_skip, Middleware, Skipper};
use crate::handler::{handler, BoxedHandler};

/// Configuration for [`Recover`].
#[derive(Clone)]
pub struct RecoverConfig {
    /// Default: never skip.
    pub skipper: Skipper,
    /// Maximum number of backtrace bytes written to the log. Default: 4 KiB.
    pub stack_size: usize,
    /// Leave the backtrace out of the log entirely. Default: `false`.
    pub disable_print_stack: bool,
}

impl Default for RecoverConfig {
    fn default() -> Self {
        Self {
            skipper: never_skip(),
            stack_size: 4 << 10,
            disable_print_stack: false,
        }
    }
}

/// Panic recovery middleware. See the [module docs](self).
#[derive(Clone)]
pub struct Recover {
    config: Arc<RecoverConfig>,
}

impl Recover {
    pub fn new() -> Self {
        Self::with_config(RecoverConfig::default())
    }

    pub fn with_config(mut config: RecoverConfig) -> Self {
        if config.stack_size == 0 {
            config.stack_size = RecoverConfig::default().stack_size;
        }
        if !config.disable_print_stack {
            install_backtrace_hook();
        }
        Self { config: Arc::new(config) }
    }
}

thread_local! {
    /// Backtrace of the most recent panic on this thread, taken at the panic site.
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chains a panic hook in front of the existing one that records where the
/// panic happened. By the time `catch_unwind` returns the stack is gone, so
/// this is the only point where the panicking frames can be seen.
fn install_backtrace_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

/// Takes the backtrace recorded by the hook for the panic just caught.
fn take_panic_backtrace() -> Option<Backtrace> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

impl Default for Recover {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Recover {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let config = Arc::clone(&self.config);

        handler(move |ex| {
            let next = Arc::clone(&next);
            let config = Arc::clone(&config);
            Box::pin(async move {
                if (config.skipper)(ex) {
                    return next(ex).await;
                }

                // `next(ex)` itself may panic before returning a future
                // (resolution runs there), so the call goes inside the guard.
                let guarded = AssertUnwindSafe(async { next(ex).await });
                let Err(payload) = guarded.catch_unwind().await else {
                    return;
                };

                // The panic ran on this thread, inside this poll.
                let captured = take_panic_backtrace();
                let message = panic_message(payload.as_ref());
                let method = ex.request().method().clone();
                let path = ex.request().path().to_owned();
                match captured {
                    Some(backtrace) if !config.disable_print_stack => {
                        let backtrace = truncate(backtrace.to_string(), config.stack_size);
                        error!(%method, %path, panic = %message, %backtrace, "panic recovered");
                    }
                    _ => error!(%method, %path, panic = %message, "panic recovered"),
                }

                // Whatever was half-written below the panic is discarded.
                ex.response_mut()
                    .reset(StatusCode::INTERNAL_SERVER_ERROR)
                    .error(StatusCode::INTERNAL_SERVER_ERROR);
            })
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use bytes::Bytes;
    use http::header::{self, HeaderValue};

    use super::*;
    use crate::exchange::Exchange;
    use crate::middleware::skip_if;

    fn exchange() -> Exchange {
        Exchange::from(http::Request::new(Bytes::new()))
    }

    fn exploding() -> BoxedHandler {
        handler(|ex| Box::pin(async move {
            ex.response_mut()
                .set_header(header::ETAG, HeaderValue::from_static("\"half\""))
                .text("half written");
            panic!("boom");
        }))
    }

    #[tokio::test]
    async fn panic_becomes_500() {
        let h = Recover::new().wrap(exploding());
        let mut ex = exchange();
        h(&mut ex).await;

        assert_eq!(ex.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ex.response().body(), b"Internal Server Error");
        assert!(ex.response().headers().get(header::ETAG).is_none());
    }

    #[tokio::test]
    async fn panic_while_building_the_future_is_caught() {
        let h = Recover::new().wrap(handler(|_| panic!("no future for you")));
        let mut ex = exchange();
        h(&mut ex).await;
        assert_eq!(ex.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[derive(Clone, Default)]
    struct LogBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[inline(never)]
    fn reject_order_total() {
        panic!("order total overflowed");
    }

    #[tokio::test]
    async fn logged_backtrace_points_at_the_panic_site() {
        let logs = LogBuf::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let recover = Recover::with_config(RecoverConfig { stack_size: 1 << 20, ..Default::default() });
        let h = recover.wrap(handler(|_| Box::pin(async { reject_order_total() })));
        let mut ex = exchange();
        h(&mut ex).await;

        let logged = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("order total overflowed"), "{logged}");
        assert!(logged.contains("reject_order_total"), "{logged}");
    }

    #[tokio::test]
    async fn disabled_stack_logs_message_only() {
        let logs = LogBuf::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let recover = Recover::with_config(RecoverConfig { disable_print_stack: true, ..Default::default() });
        let h = recover.wrap(handler(|_| Box::pin(async { reject_order_total() })));
        let mut ex = exchange();
        h(&mut ex).await;

        let logged = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("order total overflowed"), "{logged}");
        assert!(!logged.contains("backtrace="), "{logged}");
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn skipped_recover_lets_the_panic_through() {
        let recover = Recover::with_config(RecoverConfig {
            skipper: skip_if(|_| true),
            ..Default::default()
        });
        let h = recover.wrap(exploding());
        let mut ex = exchange();
        h(&mut ex).await;
    }

    #[tokio::test]
    async fn no_panic_leaves_response_alone() {
        let ok = handler(|ex| Box::pin(async move {
            ex.response_mut().set_status(StatusCode::CREATED);
        }));
        let h = Recover::new().wrap(ok);
        let mut ex = exchange();
        h(&mut ex).await;
        assert_eq!(ex.response().status(), StatusCode::CREATED);
    }

    #[test]
    fn payload_messages() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(s.as_ref()), "non-string panic payload");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo".to_owned(), 2), "h");
        assert_eq!(truncate("short".to_owned(), 64), "short");
    }
}
