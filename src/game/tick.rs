//! Global tick scheduler
//!
//! One counter, one interval. Each tick the counter advances and every
//! registered handler runs in registration order. A failing or panicking
//! handler is logged and does not stop the others or later ticks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::util::time::Timer;

/// A subsystem callback, given the new tick number
pub type TickHandler = Box<dyn Fn(u64) -> anyhow::Result<()> + Send + Sync>;

struct Registered {
    name: &'static str,
    handler: TickHandler,
}

struct Inner {
    period_ms: u64,
    tick: AtomicU64,
    handlers: Mutex<Vec<Registered>>,
}

impl Inner {
    fn fire(&self) -> u64 {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
        let timer = Timer::new();
        let handlers = self.handlers.lock();
        for h in handlers.iter() {
            match catch_unwind(AssertUnwindSafe(|| (h.handler)(tick))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(tick, handler = h.name, error = %e, "Tick handler failed");
                }
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(tick, handler = h.name, panic = %msg, "Tick handler panicked");
                }
            }
        }
        let took_ms = timer.elapsed_ms();
        if took_ms > self.period_ms {
            warn!(tick, took_ms, period_ms = self.period_ms, "Tick overran its interval");
        }
        tick
    }
}

pub struct TickScheduler {
    period: Duration,
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TickScheduler {
    pub fn new(tick_interval_ms: u64) -> Self {
        let period_ms = tick_interval_ms.max(1);
        Self {
            period: Duration::from_millis(period_ms),
            inner: Arc::new(Inner {
                period_ms,
                tick: AtomicU64::new(0),
                handlers: Mutex::new(Vec::new()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Add a handler. Handlers run in the order they were registered.
    pub fn register<F>(&self, name: &'static str, handler: F)
    where
        F: Fn(u64) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        debug!(handler = name, "Tick handler registered");
        self.inner.handlers.lock().push(Registered {
            name,
            handler: Box::new(handler),
        });
    }

    pub fn current_tick(&self) -> u64 {
        self.inner.tick.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Start ticking on the tokio runtime. Calling it while running does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let inner = self.inner.clone();
        let period = self.period;
        info!(interval_ms = period.as_millis() as u64, "Tick scheduler started");
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // first tick of a tokio interval completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.fire();
            }
        }));
    }

    /// Stop ticking. Calling it while stopped does nothing.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!(tick = self.current_tick(), "Tick scheduler stopped");
        }
    }

    /// Handler names in the order they run
    #[cfg(test)]
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.inner.handlers.lock().iter().map(|h| h.name).collect()
    }

    /// Advance one tick synchronously
    pub fn fire(&self) -> u64 {
        self.inner.fire()
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
