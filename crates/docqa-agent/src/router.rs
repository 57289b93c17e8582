use crate::session::SessionContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Downstream answering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Answers from the model alone, no passages, no sources.
    General,
    /// Answers grounded in retrieved passages.
    Retrieval,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::General => "general",
            AgentKind::Retrieval => "retrieval",
        }
    }

    pub fn needs_retrieval(self) -> bool {
        matches!(self, AgentKind::Retrieval)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing outcome for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentDecision {
    pub needs_retrieval: bool,
    pub agent: AgentKind,
    /// Which rule fired, for logs.
    pub reason: &'static str,
}

impl AgentDecision {
    fn new(agent: AgentKind, reason: &'static str) -> Self {
        Self {
            needs_retrieval: agent.needs_retrieval(),
            agent,
            reason,
        }
    }
}

/// Pure, deterministic message classifier.
///
/// Rules, first match wins:
/// 1. blank message -> general
/// 2. explicit "no sources" request anywhere -> general
/// 3. whole message is a greeting or small talk -> general
/// 4. whole message is a short follow-up -> agent of the previous turn
/// 5. anything else -> retrieval
pub struct AgentRouter {
    no_sources: Vec<Regex>,
    small_talk: Vec<Regex>,
    follow_up: Vec<Regex>,
}

impl AgentRouter {
    pub fn new() -> Self {
        let no_sources = [
            r"(?i)\bwithout\s+(any\s+)?(sources|retrieval|citations|searching)\b",
            r"(?i)\bno\s+(sources|retrieval|citations)\b",
            r"(?i)\bdon'?t\s+(search|look\s+up|use\s+(the\s+)?documents)\b",
            r"(?i)\bdo\s+not\s+(search|look\s+up|use\s+(the\s+)?documents)\b",
        ];
        let small_talk = [
            r"(?i)^(hi|hello|hey|hiya|howdy|greetings|yo)(\s+(there|everyone|all|bot))?$",
            r"(?i)^good\s+(morning|afternoon|evening|night)$",
            r"(?i)^(thanks|thank\s+you|thx|ty)(\s+(so\s+much|a\s+lot|very\s+much))?$",
            r"(?i)^(bye|goodbye|see\s+you|see\s+ya|cya)(\s+later)?$",
            r"(?i)^how\s+are\s+you(\s+doing)?(\s+today)?$",
            r"(?i)^(ok|okay|cool|great|nice|awesome)$",
            r"(?i)^(who|what)\s+are\s+you$",
        ];
        let follow_up = [
            r"(?i)^(tell\s+me\s+more|more|go\s+on|continue|elaborate|why|how\s+so|and)$",
            r"(?i)^(can\s+you\s+)?(elaborate|explain)(\s+(that|more|further))?$",
        ];

        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
        };

        Self {
            no_sources: compile(&no_sources),
            small_talk: compile(&small_talk),
            follow_up: compile(&follow_up),
        }
    }

    pub fn route(&self, message: &str, session: &SessionContext) -> AgentDecision {
        let normalized = normalize(message);
        if normalized.is_empty() {
            return AgentDecision::new(AgentKind::General, "empty message");
        }
        if self.no_sources.iter().any(|r| r.is_match(message)) {
            return AgentDecision::new(AgentKind::General, "sources declined");
        }
        if self.small_talk.iter().any(|r| r.is_match(&normalized)) {
            return AgentDecision::new(AgentKind::General, "small talk");
        }
        if self.follow_up.iter().any(|r| r.is_match(&normalized)) {
            let agent = session.last_agent().unwrap_or(AgentKind::Retrieval);
            return AgentDecision::new(agent, "follow-up");
        }
        AgentDecision::new(AgentKind::Retrieval, "information request")
    }
}

impl Default for AgentRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip surrounding punctuation; collapse commas and whitespace to single spaces.
fn normalize(message: &str) -> String {
    let trimmed = message
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    trimmed
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
