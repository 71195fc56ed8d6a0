use super::{state::QuizSession, SessionId};
use crate::chat::ChannelId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One registered session. The destination is fixed at creation and readable without locking.
pub struct Slot {
    pub channel: ChannelId,
    pub state: Mutex<QuizSession>,
}

/// In-memory table of live sessions, at most one active session per channel.
#[derive(Default)]
pub struct Registry {
    sessions: DashMap<SessionId, Arc<Slot>>,
    /// Serializes the channel check with the insertion that follows it.
    admission: Mutex<()>,
}

impl Registry {
    /// Registers the session unless its channel already hosts an active one.
    pub async fn create(&self, session: QuizSession) -> Option<Arc<Slot>> {
        let _admission = self.admission.lock().await;
        if self.get_by_channel(session.channel).await.is_some() {
            return None;
        }
        let id = session.id;
        let slot = Arc::new(Slot { channel: session.channel, state: Mutex::new(session) });
        self.sessions.insert(id, Arc::clone(&slot));
        Some(slot)
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Slot>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// First still-active session bound to the channel.
    pub async fn get_by_channel(&self, channel: ChannelId) -> Option<(SessionId, Arc<Slot>)> {
        // Collected first so that no shard lock is held across an await.
        let candidates: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().channel == channel)
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        for (id, slot) in candidates {
            if slot.state.lock().await.active {
                return Some((id, slot));
            }
        }
        None
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<Slot>> {
        self.sessions.remove(&id).map(|(_, slot)| slot)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::Registry;
    use crate::session::state::QuizSession;
    use chrono::Utc;
    use model::Quiz;
    use twilight_model::id::Id;
    use uuid::Uuid;

    fn session(channel: u64) -> QuizSession {
        let quiz = Quiz {
            id: 1,
            title: String::from("Rivers"),
            description: None,
            is_active: true,
            private: false,
            time_limit: None,
            owner: None,
        };
        QuizSession::new(Uuid::new_v4(), quiz, Id::new(channel), Utc::now())
    }

    #[tokio::test]
    async fn lookup_by_channel_skips_inactive_sessions() {
        let registry = Registry::default();
        let finished = session(5);
        let finished_id = finished.id;
        let slot = registry.create(finished).await.unwrap();
        assert!(slot.state.lock().await.finish());
        assert!(registry.get_by_channel(Id::new(5)).await.is_none());

        let live = session(5);
        let live_id = live.id;
        registry.create(live).await.unwrap();
        registry.create(session(6)).await.unwrap();

        let (found, _) = registry.get_by_channel(Id::new(5)).await.unwrap();
        assert_eq!(found, live_id);
        assert!(registry.get(finished_id).is_some());
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn removed_sessions_are_gone() {
        let registry = Registry::default();
        let live = session(5);
        let id = live.id;
        registry.create(live).await.unwrap();
        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.get(id).is_none());
        assert!(registry.get_by_channel(Id::new(5)).await.is_none());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn one_active_session_per_channel() {
        let registry = Registry::default();
        let first = registry.create(session(5)).await.unwrap();
        assert!(registry.create(session(5)).await.is_none());
        assert_eq!(registry.len(), 1);

        // A finished session no longer holds its channel, even before it is removed.
        assert!(first.state.lock().await.finish());
        assert!(registry.create(session(5)).await.is_some());
        assert_eq!(registry.len(), 2);
    }
}
