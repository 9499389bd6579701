//! Blocking convergence checks against externally observable state.

use crate::Error;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{sleep, Instant};

/// Cooperative interruption flag, set by the Ctrl-C listener and consulted by
/// the poller between iterations. An in-flight external call is never
/// preempted; the interruption is observed at the next iteration boundary.
#[derive(Clone, Default, Debug)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Error::Interrupted` once the flag is set.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_set() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    /// Spawns a task that sets the flag on the first Ctrl-C.
    pub fn listen(&self) {
        let flag = self.0.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        });
    }
}

/// Polls a side-effecting predicate at a fixed interval until it observes the
/// awaited condition.
///
/// Only the boolean outcome is retried: a predicate that fails to evaluate
/// (actor unreachable, record unreadable) propagates its error immediately.
/// By default the wait is unbounded; [`Poller::with_max_wait`] bounds it and
/// surfaces [`Error::ConvergenceTimeout`] instead of hanging, and
/// [`Poller::with_backoff`] stretches the interval multiplicatively.
#[derive(Clone, Debug)]
pub struct Poller {
    interval: Duration,
    max_wait: Option<Duration>,
    backoff: Option<f64>,
    interrupt: Interrupt,
}

impl Poller {
    pub fn new(interval: Duration, interrupt: Interrupt) -> Self {
        Self {
            interval,
            max_wait: None,
            backoff: None,
            interrupt,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn with_backoff(mut self, factor: f64) -> Self {
        self.backoff = Some(factor);
        self
    }

    /// Evaluates `predicate` until it returns `Ok(true)`.
    pub async fn await_condition<F, Fut>(&self, mut predicate: F) -> Result<(), Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, Error>>,
    {
        let started = Instant::now();
        let mut interval = self.interval;
        loop {
            self.interrupt.check()?;
            if predicate().await? {
                return Ok(());
            }
            if let Some(max_wait) = self.max_wait {
                if started.elapsed() >= max_wait {
                    return Err(Error::ConvergenceTimeout(max_wait));
                }
            }
            sleep(interval).await;
            if let Some(factor) = self.backoff {
                interval = interval.mul_f64(factor);
            }
        }
    }
}
