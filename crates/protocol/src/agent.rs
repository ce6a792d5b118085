//! The agent role table (spec §6.1, Design Notes §9).
//!
//! A dynamic dispatch-by-name table becomes a small tagged union: callers
//! match on [`AgentKind`] rather than comparing strings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Archivist,
    Writer,
    Editor,
    Extractor,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Archivist => "archivist",
            AgentKind::Writer => "writer",
            AgentKind::Editor => "editor",
            AgentKind::Extractor => "extractor",
        }
    }

    pub const ALL: [AgentKind; 4] = [
        AgentKind::Archivist,
        AgentKind::Writer,
        AgentKind::Editor,
        AgentKind::Extractor,
    ];
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
