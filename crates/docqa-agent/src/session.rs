use crate::router::AgentKind;
use docqa_core::Message;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Oldest turns are evicted beyond this many.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Least recently used sessions are dropped beyond this many.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_turns() -> usize {
    10
}

fn default_max_sessions() -> usize {
    1_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub answer: String,
    pub agent: AgentKind,
}

/// Prior turns of one conversation, bounded FIFO.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: Uuid,
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl SessionContext {
    pub fn new(id: Uuid, max_turns: usize) -> Self {
        Self {
            id,
            turns: VecDeque::new(),
            max_turns,
        }
    }

    /// A context with no history, for single-shot calls.
    pub fn ephemeral() -> Self {
        Self::new(Uuid::new_v4(), 0)
    }

    pub fn push(&mut self, turn: Turn) {
        if self.max_turns == 0 {
            return;
        }
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_agent(&self) -> Option<AgentKind> {
        self.turns.back().map(|t| t.agent)
    }

    /// Prior turns as alternating user/assistant messages, oldest first.
    pub fn history_messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .flat_map(|t| [Message::user(&t.query), Message::assistant(&t.answer)])
            .collect()
    }
}

struct SessionEntry {
    context: SessionContext,
    last_used: u64,
}

#[derive(Default)]
struct Sessions {
    entries: HashMap<Uuid, SessionEntry>,
    clock: u64,
}

impl Sessions {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_lru(&mut self) -> Option<Uuid> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(id, _)| *id)?;
        self.entries.remove(&oldest);
        Some(oldest)
    }
}

/// In-memory conversations keyed by session id, bounded LRU.
pub struct SessionRegistry {
    sessions: Mutex<Sessions>,
    max_turns: usize,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            max_turns: config.max_turns,
            max_sessions: config.max_sessions.max(1),
        }
    }

    /// Snapshot of a session. A missing or unknown id starts an empty one,
    /// which is only stored once a turn is recorded.
    pub fn snapshot(&self, id: Option<Uuid>) -> SessionContext {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let mut sessions = self.sessions.lock();
        let now = sessions.tick();
        match sessions.entries.get_mut(&id) {
            Some(entry) => {
                entry.last_used = now;
                entry.context.clone()
            }
            None => SessionContext::new(id, self.max_turns),
        }
    }

    /// Append a finished turn, creating the session if needed. Creating one
    /// past `max_sessions` drops the least recently used session.
    pub fn record(&self, id: Uuid, turn: Turn) {
        let mut sessions = self.sessions.lock();
        let now = sessions.tick();
        if !sessions.entries.contains_key(&id) && sessions.entries.len() >= self.max_sessions {
            if let Some(evicted) = sessions.evict_lru() {
                debug!(session_id = %evicted, "Evicted least recently used session");
            }
        }
        let entry = sessions.entries.entry(id).or_insert_with(|| SessionEntry {
            context: SessionContext::new(id, self.max_turns),
            last_used: now,
        });
        entry.last_used = now;
        entry.context.push(turn);
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.sessions.lock().entries.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().entries.is_empty()
    }
}
