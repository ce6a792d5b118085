//! Ephemeral session state and the orchestrator's state machine graph
//! (spec §3, §4.9).

use serde::{Deserialize, Serialize};

use crate::chapter_id::ChapterId;
use crate::project::ProjectId;

/// The complete transition set for the session state machine (spec §4.9).
/// Any transition not modeled by [`SessionStatus::can_transition_to`] is a
/// bug, per the "State machine" testable property in spec §8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    GeneratingBrief,
    WaitingUserInput,
    WritingDraft,
    WaitingFeedback,
    Editing,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, GeneratingBrief)
                | (GeneratingBrief, WaitingUserInput)
                | (GeneratingBrief, WritingDraft)
                | (WaitingUserInput, WritingDraft)
                | (WritingDraft, WaitingFeedback)
                | (WaitingFeedback, Editing)
                | (WaitingFeedback, WritingDraft)
                | (Editing, WaitingFeedback)
                | (WaitingFeedback, Completed)
                | (Completed, Idle)
                | (_, Idle) // cancellation from any state
                | (_, Error) // failure from any state
        )
    }
}

/// `{project_id, chapter, status, iteration, question_round, research_round,
/// stream_task?}`. The `stream_task` handle itself (a cancellable task) is
/// owned by the orchestrator crate, not serialized here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub project_id: ProjectId,
    pub chapter: ChapterId,
    pub status: SessionStatus,
    pub iteration: u32,
    pub question_round: u32,
    pub research_round: u32,
}

impl SessionState {
    pub fn new(project_id: ProjectId, chapter: ChapterId) -> Self {
        Self {
            project_id,
            chapter,
            status: SessionStatus::Idle,
            iteration: 0,
            question_round: 0,
            research_round: 0,
        }
    }
}

/// A read-model snapshot a caller can poll without subscribing to the
/// progress bus (SPEC_FULL.md §4, `GET /status`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub project_id: ProjectId,
    pub chapter: ChapterId,
    pub status: SessionStatus,
    pub iteration: u32,
    pub question_round: u32,
    pub research_round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_type: Option<String>,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(s: &SessionState) -> Self {
        Self {
            project_id: s.project_id.clone(),
            chapter: s.chapter,
            status: s.status,
            iteration: s.iteration,
            question_round: s.question_round,
            research_round: s.research_round,
            last_event_type: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_can_start_brief_generation() {
        assert!(SessionStatus::Idle.can_transition_to(SessionStatus::GeneratingBrief));
    }

    #[test]
    fn any_state_can_cancel_to_idle() {
        assert!(SessionStatus::Editing.can_transition_to(SessionStatus::Idle));
        assert!(SessionStatus::WritingDraft.can_transition_to(SessionStatus::Idle));
    }

    #[test]
    fn completed_cannot_go_directly_to_editing() {
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Editing));
    }

    #[test]
    fn waiting_feedback_can_revise_or_confirm() {
        assert!(SessionStatus::WaitingFeedback.can_transition_to(SessionStatus::Editing));
        assert!(SessionStatus::WaitingFeedback.can_transition_to(SessionStatus::WritingDraft));
        assert!(SessionStatus::WaitingFeedback.can_transition_to(SessionStatus::Completed));
    }
}
