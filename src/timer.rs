//! Timer channels used to fire scheduled freezes.
//!
//! The database never blocks or sleeps. It asks a [`TimerChannel`] to arm a
//! one-shot timer, and the owner of the channel feeds each [`FiredTimer`]
//! back through [`Database::on_freeze_timer`](crate::Database::on_freeze_timer)
//! from the same processing context that handles session requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::Stream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Identifier of one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Point a freeze timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FreezeTarget {
    Counter(u16),
    AnalogInput(u16),
}

/// A timer that expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub id: TimerId,
    pub target: FreezeTarget,
}

/// Timer scheduling primitive owned by the surrounding channel.
pub trait TimerChannel: Send {
    /// Arm a one-shot timer firing `target` after `delay`.
    fn arm(&mut self, delay: Duration, target: FreezeTarget) -> TimerId;

    /// Cancel an armed timer. Cancelling an expired or unknown timer is a no-op.
    fn cancel(&mut self, id: TimerId);
}

/// Timer channel backed by tokio tasks.
///
/// Fired timers are delivered on the receiver returned by [`TokioTimers::new`].
pub struct TokioTimers {
    handle: Handle,
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
    tx: mpsc::UnboundedSender<FiredTimer>,
}

impl TokioTimers {
    /// Create a channel on the current tokio runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FiredTimer>) {
        Self::with_handle(Handle::current())
    }

    /// Create a channel spawning its timers on `handle`.
    pub fn with_handle(handle: Handle) -> (Self, mpsc::UnboundedReceiver<FiredTimer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timers = Self {
            handle,
            next_id: 0,
            tasks: HashMap::new(),
            tx,
        };
        (timers, rx)
    }

    /// Number of timers still pending.
    pub fn pending(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_finished()).count()
    }
}

impl TimerChannel for TokioTimers {
    fn arm(&mut self, delay: Duration, target: FreezeTarget) -> TimerId {
        self.tasks.retain(|_, task| !task.is_finished());

        let id = TimerId(self.next_id);
        self.next_id += 1;

        let tx = self.tx.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver dropped means the channel is shutting down
            let _ = tx.send(FiredTimer { id, target });
        });
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        trace!(id = id.0, ?target, delay_ms, "timer armed");
        self.tasks.insert(id, task);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(&id) {
            trace!(id = id.0, "timer cancelled");
            task.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// Adapt a fired-timer receiver into a stream.
pub fn fired_stream(rx: mpsc::UnboundedReceiver<FiredTimer>) -> impl Stream<Item = FiredTimer> {
    futures::stream::unfold(rx, |mut rx| async move {
        let fired = rx.recv().await?;
        Some((fired, rx))
    })
}

/// A timer armed on a [`ManualTimers`] channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub id: TimerId,
    pub delay: Duration,
    pub target: FreezeTarget,
}

#[derive(Debug, Default)]
struct ManualInner {
    next_id: u64,
    armed: Vec<ArmedTimer>,
}

/// Deterministic timer channel for tests and conformance harnesses.
///
/// Clones share state: keep one clone to inspect and fire timers while the
/// database owns the other.
#[derive(Debug, Clone, Default)]
pub struct ManualTimers {
    inner: Arc<Mutex<ManualInner>>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Timers currently armed, in arming order.
    pub fn armed(&self) -> Vec<ArmedTimer> {
        self.lock().armed.clone()
    }

    /// Armed timer for `target`, if any.
    pub fn armed_for(&self, target: FreezeTarget) -> Option<ArmedTimer> {
        self.lock().armed.iter().find(|t| t.target == target).copied()
    }

    /// Expire one timer, removing it from the armed set.
    pub fn fire(&self, id: TimerId) -> Option<FiredTimer> {
        let mut inner = self.lock();
        let pos = inner.armed.iter().position(|t| t.id == id)?;
        let timer = inner.armed.remove(pos);
        Some(FiredTimer {
            id: timer.id,
            target: timer.target,
        })
    }

    /// Expire every armed timer.
    pub fn fire_all(&self) -> Vec<FiredTimer> {
        self.lock()
            .armed
            .drain(..)
            .map(|t| FiredTimer {
                id: t.id,
                target: t.target,
            })
            .collect()
    }
}

impl TimerChannel for ManualTimers {
    fn arm(&mut self, delay: Duration, target: FreezeTarget) -> TimerId {
        let mut inner = self.lock();
        let id = TimerId(inner.next_id);
        inner.next_id += 1;
        inner.armed.push(ArmedTimer { id, delay, target });
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.lock().armed.retain(|t| t.id != id);
    }
}
