//! Ordered, append-only middleware chain.

use std::fmt;
use std::sync::Arc;

use crate::handler::BoxedHandler;
use crate::middleware::Middleware;

/// An ordered sequence of middleware.
///
/// The first unit appended is the outermost: it runs first, sees the
/// response last, and can short-circuit every unit appended after it by not
/// calling `next`.
#[derive(Clone, Default)]
pub struct Chain {
    units: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self { units: Vec::new() }
    }

    /// Adds `unit` as the innermost layer.
    pub fn append(&mut self, unit: impl Middleware) {
        self.units.push(Arc::new(unit));
    }

    /// Wraps `terminal` in every unit, returning
    /// `units[0](units[1](… units[n-1](terminal) …))`.
    ///
    /// Stores nothing. Each call builds a fresh handler from the current units.
    pub fn fold(&self, terminal: BoxedHandler) -> BoxedHandler {
        self.units
            .iter()
            .rev()
            .fold(terminal, |next, unit| unit.wrap(next))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("len", &self.units.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::exchange::Exchange;
    use crate::handler::handler;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn unit(log: &Log, name: &'static str) -> impl Middleware {
        let log = Arc::clone(log);
        move |next: BoxedHandler| -> BoxedHandler {
            let log = Arc::clone(&log);
            handler(move |ex| {
                let log = Arc::clone(&log);
                let next = Arc::clone(&next);
                Box::pin(async move {
                    log.lock().unwrap().push(name);
                    next(ex).await;
                })
            })
        }
    }

    fn terminal(log: &Log) -> BoxedHandler {
        let log = Arc::clone(log);
        handler(move |_| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push("T");
            })
        })
    }

    async fn run(h: BoxedHandler) {
        let mut ex = Exchange::from(http::Request::new(Bytes::new()));
        h(&mut ex).await;
    }

    #[tokio::test]
    async fn empty_chain_is_the_terminal() {
        let log = Log::default();
        run(Chain::new().fold(terminal(&log))).await;
        assert_eq!(*log.lock().unwrap(), ["T"]);
    }

    #[tokio::test]
    async fn first_appended_runs_first() {
        let log = Log::default();
        let mut chain = Chain::new();
        chain.append(unit(&log, "A"));
        run(chain.fold(terminal(&log))).await;
        assert_eq!(*log.lock().unwrap(), ["A", "T"]);

        log.lock().unwrap().clear();
        chain.append(unit(&log, "B"));
        run(chain.fold(terminal(&log))).await;
        assert_eq!(*log.lock().unwrap(), ["A", "B", "T"]);
    }

    #[tokio::test]
    async fn folding_twice_gives_equivalent_handlers() {
        let log = Log::default();
        let mut chain = Chain::new();
        chain.append(unit(&log, "A"));
        chain.append(unit(&log, "B"));

        let t = terminal(&log);
        let first = chain.fold(Arc::clone(&t));
        let second = chain.fold(t);

        run(first).await;
        let once = log.lock().unwrap().clone();
        run(second).await;
        let twice = log.lock().unwrap().clone();

        assert_eq!(once, ["A", "B", "T"]);
        assert_eq!(twice, ["A", "B", "T", "A", "B", "T"]);
        assert_eq!(chain.len(), 2);
    }

    #[tokio::test]
    async fn duplicates_are_kept() {
        let log = Log::default();
        let a = unit(&log, "A");
        let a = Arc::new(a);
        let mut chain = Chain::new();
        let (x, y) = (Arc::clone(&a), Arc::clone(&a));
        chain.append(move |next: BoxedHandler| x.wrap(next));
        chain.append(move |next: BoxedHandler| y.wrap(next));
        run(chain.fold(terminal(&log))).await;
        assert_eq!(*log.lock().unwrap(), ["A", "A", "T"]);
    }
}
