use super::SessionId;
use core::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};
use dashmap::{mapref::entry::Entry, DashMap};
use std::{sync::Arc, time::Duration};
use tokio::task::AbortHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// End of the join phase.
    Join,
    /// End of the question at the given index.
    Question(usize),
    /// Overall time limit of the quiz.
    Total,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub session: SessionId,
    pub kind: TimerKind,
}

struct Pending {
    generation: u64,
    handle: AbortHandle,
}

/// Delayed callbacks of every session. A timer deregisters itself right before its callback runs,
/// so a callback may cancel its own session's timers without cancelling itself.
#[derive(Default)]
pub struct Timers {
    pending: Arc<DashMap<TimerKey, Pending>>,
    generation: AtomicU64,
}

impl Timers {
    pub fn schedule_join<F>(&self, session: SessionId, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule(TimerKey { session, kind: TimerKind::Join }, delay, on_fire);
    }

    /// Arming a question timer cancels any other question timer of the same session.
    pub fn schedule_question<F>(&self, session: SessionId, index: usize, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.retain(|key, pending| {
            let stale = key.session == session && matches!(key.kind, TimerKind::Question(other) if other != index);
            if stale {
                pending.handle.abort();
            }
            !stale
        });
        self.schedule(TimerKey { session, kind: TimerKind::Question(index) }, delay, on_fire);
    }

    pub fn schedule_total<F>(&self, session: SessionId, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule(TimerKey { session, kind: TimerKind::Total }, delay, on_fire);
    }

    fn schedule<F>(&self, key: TimerKey, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);

        // The entry guard is held until the handle is stored so that even a zero-delay timer
        // cannot look itself up before it has been registered.
        let entry = self.pending.entry(key);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if pending.remove_if(&key, |_, pending| pending.generation == generation).is_none() {
                return;
            }
            log::debug!("timer {:?} of session {} fired", key.kind, key.session);
            on_fire.await;
        });

        let pending = Pending { generation, handle: task.abort_handle() };
        match entry {
            Entry::Occupied(mut occupied) => occupied.insert(pending).handle.abort(),
            Entry::Vacant(vacant) => {
                vacant.insert(pending);
            }
        }
    }

    /// Cancels a single timer. Returns whether it was still pending.
    pub fn cancel(&self, key: TimerKey) -> bool {
        let Some((_, pending)) = self.pending.remove(&key) else {
            return false;
        };
        pending.handle.abort();
        true
    }

    /// Cancels every timer of the session. Idempotent.
    pub fn cancel_all(&self, session: SessionId) -> usize {
        let mut cancelled = 0;
        self.pending.retain(|key, pending| {
            if key.session != session {
                return true;
            }
            pending.handle.abort();
            cancelled += 1;
            false
        });
        cancelled
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.pending.contains_key(&key)
    }

    pub fn pending_for(&self, session: SessionId) -> usize {
        self.pending.iter().filter(|entry| entry.key().session == session).count()
    }
}
