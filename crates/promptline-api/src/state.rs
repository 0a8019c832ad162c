use chrono::{DateTime, Utc};
use promptline_chain::{ChatSession, ChatSessionBuilder, ConversationChain};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;

/// One browser conversation: its own history behind a lock held for a whole turn
pub struct SessionEntry {
    pub created_at: DateTime<Utc>,
    pub chat: Arc<Mutex<ChatSession<ConversationChain>>>,
    /// Unix milliseconds of the last request that touched this session
    last_active_ms: AtomicI64,
}

impl SessionEntry {
    fn new(chat: ChatSession<ConversationChain>) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            chat: Arc::new(Mutex::new(chat)),
            last_active_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Record activity so the idle sweeper leaves this session alone
    pub fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        let idle_ms = now.timestamp_millis() - self.last_active_ms.load(Ordering::Relaxed);
        Duration::from_millis(idle_ms.max(0) as u64)
    }

    /// A turn is streaming right now
    pub fn is_busy(&self) -> bool {
        self.chat.try_lock().is_err()
    }
}

pub type SharedSession = Arc<SessionEntry>;

/// Shared application state passed to all handlers
///
/// The chain is stateless and shared by every session; each session owns its
/// history, so conversations never see each other's messages.
pub struct AppState {
    pub config: Arc<Config>,
    pub chain: Arc<ConversationChain>,
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
}

impl AppState {
    pub fn new(config: Config, chain: ConversationChain) -> Self {
        Self {
            config: Arc::new(config),
            chain: Arc::new(chain),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_session(&self) -> anyhow::Result<(Uuid, SharedSession)> {
        let chat = ChatSessionBuilder::new()
            .shared_chain(Arc::clone(&self.chain))
            .history_limit(self.config.chat.history_limit)
            .build()?;
        let entry = Arc::new(SessionEntry::new(chat));

        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, Arc::clone(&entry));
        tracing::info!(session_id = %id, "Session created");

        Ok((id, entry))
    }

    /// Look up a session; a hit counts as activity
    pub async fn session(&self, id: &Uuid) -> Option<SharedSession> {
        let entry = self.sessions.read().await.get(id).cloned()?;
        entry.touch();
        Some(entry)
    }

    /// Forget a session; a turn still streaming for it runs to completion
    pub async fn remove_session(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Session deleted");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop every session idle for at least `max_idle`, skipping busy ones
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|id, entry| {
            let keep = entry.is_busy() || entry.idle_for(now) < max_idle;
            if !keep {
                tracing::debug!(session_id = %id, "Evicting idle session");
            }
            keep
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "Idle sessions evicted");
        }
        evicted
    }
}

/// Periodically evict idle sessions until the state is dropped
pub fn spawn_session_sweeper(
    state: Arc<AppState>,
    every: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    let state = Arc::downgrade(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(state) = state.upgrade() else {
                break;
            };
            state.evict_idle(max_idle).await;
        }
    })
}
