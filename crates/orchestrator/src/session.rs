//! The session state machine (spec §4.9): drives a chapter from brief
//! generation through research/write/edit to a finalized draft, one
//! session per process (spec §5 "One active session per orchestrator
//! instance").

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use wenshape_llm::{ChatMessage, ChatRequest, LLMGateway};
use wenshape_protocol::draft::DraftVersion;
use wenshape_protocol::error::AgentError;
use wenshape_protocol::progress::ProgressEvent;
use wenshape_protocol::session::{SessionSnapshot, SessionState, SessionStatus};
use wenshape_protocol::{AgentKind, ChapterId, ProjectId, SceneBrief};
use wenshape_storage::Store;
use wenshape_trace::ProgressBus;

use crate::brief::generate_scene_brief;
use crate::confirmations::collect_pending_confirmations;
use crate::error::OrchestratorError;
use crate::writer_context::build_agent_context;

const MAX_ITERATIONS: u32 = 5;
const MAX_QUESTION_ROUNDS: u32 = 2;
/// Below this content length, a revise request is treated as "too small
/// to edit" and routed back through the writer instead of the editor
/// (spec §4.9 `process_feedback`).
const REWRITE_LENGTH_THRESHOLD: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackAction {
    Confirm,
    Revise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    Quick,
    Full,
}

pub struct EditSuggestion {
    pub revised_content: String,
    pub word_count: usize,
}

pub struct Orchestrator {
    store: Store,
    gateway: Arc<dyn LLMGateway>,
    progress: Arc<ProgressBus>,
    state: Arc<Mutex<Option<SessionState>>>,
    stream_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(store: Store, gateway: Arc<dyn LLMGateway>, progress: Arc<ProgressBus>) -> Self {
        Self { store, gateway, progress, state: Arc::new(Mutex::new(None)), stream_handle: Mutex::new(None) }
    }

    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        self.state.lock().await.as_ref().map(SessionSnapshot::from)
    }

    async fn set_status(&self, status: SessionStatus) -> Result<(), OrchestratorError> {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.as_mut() else { return Err(OrchestratorError::NoActiveSession) };
        if !state.status.can_transition_to(status) {
            return Err(OrchestratorError::Agent(AgentError::InvariantViolated(format!("{:?} -> {:?}", state.status, status))));
        }
        state.status = status;
        let event = ProgressEvent::new("status", state.project_id.clone(), Some(state.chapter)).with_status(format!("{status:?}"));
        drop(guard);
        self.progress.publish(event).await;
        Ok(())
    }

    /// Starts a new session, overwriting any previous in-process state
    /// (spec §5: "starting a new session on the same process while one
    /// runs simply overwrites state — callers are expected to call
    /// `cancel_session` first").
    pub async fn start_session(&self, project_id: ProjectId, chapter: ChapterId, goal: String) -> Result<SessionSnapshot, OrchestratorError> {
        {
            let mut guard = self.state.lock().await;
            *guard = Some(SessionState::new(project_id.clone(), chapter));
        }
        self.set_status(SessionStatus::GeneratingBrief).await?;

        let brief = generate_scene_brief(&self.store, Some(self.gateway.as_ref()), chapter, &goal).await?;

        let pack = wenshape_memory::ensure_memory_pack(
            &self.store,
            Some(self.gateway.as_ref()),
            Some(self.progress.as_ref()),
            wenshape_memory::EnsureMemoryPackInput {
                project_id: project_id.clone(),
                chapter,
                goal: Some(goal.clone()),
                scene_brief: Some(&brief),
                user_feedback: None,
                user_answers: Vec::new(),
                force_refresh: false,
                source: "start_session".to_string(),
            },
        )
        .await?;

        if !pack.payload.questions.is_empty() {
            let question_round = { self.state.lock().await.as_ref().map(|s| s.question_round).unwrap_or(0) };
            if question_round < MAX_QUESTION_ROUNDS {
                self.set_status(SessionStatus::WaitingUserInput).await?;
                return self.snapshot().await.ok_or(OrchestratorError::NoActiveSession);
            }
        }

        self.run_writer(&project_id, chapter, &brief, &pack, None).await
    }

    /// Answers outstanding questions and resumes toward draft generation.
    pub async fn answer_questions(&self, answers: Vec<String>) -> Result<SessionSnapshot, OrchestratorError> {
        let (project_id, chapter) = {
            let mut guard = self.state.lock().await;
            let state = guard.as_mut().ok_or(OrchestratorError::NoActiveSession)?;
            state.question_round += 1;
            (state.project_id.clone(), state.chapter)
        };

        let brief = self
            .store
            .read_scene_brief(&chapter)
            .await?
            .ok_or(OrchestratorError::Agent(AgentError::MissingSceneBrief))?;

        let pack = wenshape_memory::ensure_memory_pack(
            &self.store,
            Some(self.gateway.as_ref()),
            Some(self.progress.as_ref()),
            wenshape_memory::EnsureMemoryPackInput {
                project_id: project_id.clone(),
                chapter,
                goal: Some(brief.goal.clone()),
                scene_brief: Some(&brief),
                user_feedback: None,
                user_answers: answers,
                force_refresh: true,
                source: "answer_questions".to_string(),
            },
        )
        .await?;

        self.run_writer(&project_id, chapter, &brief, &pack, None).await
    }

    async fn run_writer(
        &self,
        project_id: &ProjectId,
        chapter: ChapterId,
        brief: &SceneBrief,
        pack: &wenshape_protocol::memory_pack::MemoryPack,
        seed_feedback: Option<&str>,
    ) -> Result<SessionSnapshot, OrchestratorError> {
        self.set_status(SessionStatus::WritingDraft).await?;

        let mut context = build_agent_context(&self.store, AgentKind::Writer, &chapter, brief, pack, None).await?;
        if let Some(feedback) = seed_feedback {
            context.prompt.push_str(&format!("\n\n# User feedback\n{feedback}\n"));
        }

        let project_id = project_id.clone();
        let store = self.store.clone();
        let gateway = Arc::clone(&self.gateway);
        let progress = Arc::clone(&self.progress);
        let state = Arc::clone(&self.state);
        let prompt = context.prompt;
        let gaps = pack.payload.unresolved_gaps.clone();
        let missing_entities = pack.payload.sufficiency_report.missing_entities.clone();

        progress.publish(ProgressEvent::new("stream_start", project_id.clone(), Some(chapter))).await;

        let handle = tokio::spawn(async move {
            let request = ChatRequest::new(vec![
                ChatMessage::system("You are the writer agent. Write the chapter prose directly, no preamble."),
                ChatMessage::user(prompt),
            ])
            .with_provider(gateway.get_provider_for_agent(AgentKind::Writer));

            let mut content = String::new();
            match gateway.stream_chat(request).await {
                Ok(mut stream) => {
                    while let Some(chunk) = stream.next().await {
                        match chunk {
                            Ok(piece) => {
                                content.push_str(&piece);
                                progress.publish(ProgressEvent::token_chunk(project_id.clone(), chapter, &piece)).await;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "writer stream chunk failed");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "writer stream_chat failed, draft not produced");
                }
            }

            if !content.is_empty() {
                if let Err(e) = store.save_draft(&chapter, content.clone()).await {
                    tracing::error!(error = %e, "failed to persist streamed draft");
                }
            }

            let confirmations = collect_pending_confirmations(&content, &gaps, &missing_entities);
            let payload = serde_json::json!({ "content": content, "pending_confirmations": confirmations });

            let mut guard = state.lock().await;
            if let Some(s) = guard.as_mut() {
                if s.status.can_transition_to(SessionStatus::WaitingFeedback) {
                    s.status = SessionStatus::WaitingFeedback;
                }
            }
            drop(guard);

            progress
                .publish(ProgressEvent::new("stream_end", project_id.clone(), Some(chapter)).with_payload(payload))
                .await;
        });

        *self.stream_handle.lock().await = Some(handle);
        self.snapshot().await.ok_or(OrchestratorError::NoActiveSession)
    }

    /// Cancels the active stream task if any, resets to `Idle`. Does not
    /// roll back already-persisted state (spec §4.9 "Cancellation").
    pub async fn cancel_session(&self) -> Result<(), OrchestratorError> {
        if let Some(handle) = self.stream_handle.lock().await.take() {
            handle.abort();
        }
        let (project_id, chapter) = {
            let mut guard = self.state.lock().await;
            let Some(state) = guard.as_mut() else { return Ok(()) };
            state.status = SessionStatus::Idle;
            (state.project_id.clone(), state.chapter)
        };
        self.progress.publish(ProgressEvent::new("status", project_id, Some(chapter)).with_status("idle")).await;
        Ok(())
    }

    /// `action=confirm` finalizes; otherwise increments `iteration` and
    /// routes through the editor, unless the current draft is short
    /// enough that a full rewrite makes more sense (spec §4.9).
    pub async fn process_feedback(
        &self,
        action: FeedbackAction,
        user_feedback: Option<String>,
        rejected_entities: Vec<String>,
    ) -> Result<SessionSnapshot, OrchestratorError> {
        let (project_id, chapter, iteration) = {
            let guard = self.state.lock().await;
            let state = guard.as_ref().ok_or(OrchestratorError::NoActiveSession)?;
            (state.project_id.clone(), state.chapter, state.iteration)
        };

        if action == FeedbackAction::Confirm {
            return self.finalize(&project_id, chapter).await;
        }

        if iteration >= MAX_ITERATIONS {
            return Err(OrchestratorError::Agent(AgentError::MaxIterationsReached));
        }
        {
            let mut guard = self.state.lock().await;
            if let Some(state) = guard.as_mut() {
                state.iteration += 1;
            }
        }

        let current = self
            .store
            .read_draft(&chapter, &latest_draft_version(&self.store, &chapter).await?)
            .await?
            .ok_or(OrchestratorError::Agent(AgentError::MissingDraft))?;

        let brief = self
            .store
            .read_scene_brief(&chapter)
            .await?
            .ok_or(OrchestratorError::Agent(AgentError::MissingSceneBrief))?;

        if current.content.len() <= REWRITE_LENGTH_THRESHOLD {
            let pack = wenshape_memory::ensure_memory_pack(
                &self.store,
                Some(self.gateway.as_ref()),
                Some(self.progress.as_ref()),
                wenshape_memory::EnsureMemoryPackInput {
                    project_id: project_id.clone(),
                    chapter,
                    goal: Some(brief.goal.clone()),
                    scene_brief: Some(&brief),
                    user_feedback: user_feedback.clone(),
                    user_answers: Vec::new(),
                    force_refresh: false,
                    source: "process_feedback_rewrite".to_string(),
                },
            )
            .await?;
            let _ = rejected_entities;

            // Short drafts are rewritten from scratch rather than edited in
            // place, so this runs the writer synchronously (not the
            // streaming `run_writer` helper) and blocks until a new v1
            // draft is persisted and the state is `WaitingFeedback`.
            self.set_status(SessionStatus::WritingDraft).await?;
            let mut context = build_agent_context(&self.store, AgentKind::Writer, &chapter, &brief, &pack, None).await?;
            if let Some(feedback) = &user_feedback {
                context.prompt.push_str(&format!("\n\n# User feedback\n{feedback}\n"));
            }

            let request = ChatRequest::new(vec![
                ChatMessage::system("You are the writer agent. Write the chapter prose directly, no preamble."),
                ChatMessage::user(context.prompt),
            ])
            .with_provider(self.gateway.get_provider_for_agent(AgentKind::Writer));

            let response = self.gateway.chat(request).await.map_err(AgentError::from)?;
            self.store.save_draft_as(&chapter, DraftVersion::v1(), response.content).await?;

            self.set_status(SessionStatus::WaitingFeedback).await?;
            return self.snapshot().await.ok_or(OrchestratorError::NoActiveSession);
        }

        self.set_status(SessionStatus::Editing).await?;
        let pack = self
            .store
            .read_memory_pack(&chapter)
            .await?
            .ok_or(OrchestratorError::Agent(AgentError::InvariantViolated("missing memory pack for revise".to_string())))?;

        let mut context = build_agent_context(&self.store, AgentKind::Editor, &chapter, &brief, &pack, Some(&current.content)).await?;
        if let Some(feedback) = &user_feedback {
            context.prompt.push_str(&format!("\n\n# User feedback\n{feedback}\n"));
        }
        if !rejected_entities.is_empty() {
            context.prompt.push_str(&format!("\n# Rejected entities\n{}\n", rejected_entities.join(", ")));
        }

        let request = ChatRequest::new(vec![
            ChatMessage::system("You are the editor agent. Revise the draft and return the full revised text."),
            ChatMessage::user(context.prompt),
        ])
        .with_provider(self.gateway.get_provider_for_agent(AgentKind::Editor));

        let response = self.gateway.chat(request).await.map_err(AgentError::from)?;
        self.store.save_draft(&chapter, response.content).await?;

        self.set_status(SessionStatus::WaitingFeedback).await?;
        self.snapshot().await.ok_or(OrchestratorError::NoActiveSession)
    }

    /// One-off revision suggestion outside the session state machine:
    /// reads but never writes session state, and never persists a draft
    /// (spec §4.9 "Out-of-band edit suggestions").
    pub async fn suggest_edit(
        &self,
        chapter: ChapterId,
        content: &str,
        instruction: &str,
        context_mode: ContextMode,
    ) -> Result<EditSuggestion, OrchestratorError> {
        let brief = self
            .store
            .read_scene_brief(&chapter)
            .await?
            .ok_or(OrchestratorError::Agent(AgentError::MissingSceneBrief))?;

        let project_id = self
            .state
            .lock()
            .await
            .as_ref()
            .map(|s| s.project_id.clone())
            .unwrap_or_else(|| ProjectId::new("ad-hoc").expect("static id is valid"));

        let pack = wenshape_memory::ensure_memory_pack(
            &self.store,
            Some(self.gateway.as_ref()),
            None,
            wenshape_memory::EnsureMemoryPackInput {
                project_id,
                chapter,
                goal: Some(brief.goal.clone()),
                scene_brief: Some(&brief),
                user_feedback: None,
                user_answers: Vec::new(),
                force_refresh: context_mode == ContextMode::Full,
                source: "suggest_edit".to_string(),
            },
        )
        .await?;

        let mut agent_context = build_agent_context(&self.store, AgentKind::Editor, &chapter, &brief, &pack, Some(content)).await?;
        agent_context.prompt.push_str(&format!("\n\n# Revision instruction\n{instruction}\n"));

        let request = ChatRequest::new(vec![
            ChatMessage::system("You are the editor agent. Apply the instruction and return the full revised text only."),
            ChatMessage::user(agent_context.prompt),
        ])
        .with_provider(self.gateway.get_provider_for_agent(AgentKind::Editor));

        let response = self.gateway.chat(request).await.map_err(AgentError::from)?;
        let word_count = response.content.split_whitespace().count();
        Ok(EditSuggestion { revised_content: response.content, word_count })
    }

    async fn finalize(&self, project_id: &ProjectId, chapter: ChapterId) -> Result<SessionSnapshot, OrchestratorError> {
        let draft = self
            .store
            .read_draft(&chapter, &latest_draft_version(&self.store, &chapter).await?)
            .await?
            .ok_or(OrchestratorError::Agent(AgentError::MissingDraft))?;
        self.store.finalize_draft(&chapter, draft.content).await?;

        if let Err(e) = wenshape_analysis::run_batch_sync(
            &self.store,
            Some(self.gateway.as_ref()),
            Some(self.progress.as_ref()),
            project_id.clone(),
            vec![chapter],
        )
        .await
        {
            tracing::warn!(chapter = %chapter, error = %e, "post-finalize analysis failed, chapter already finalized");
        }

        self.set_status(SessionStatus::Completed).await?;
        let result = self.snapshot().await.ok_or(OrchestratorError::NoActiveSession);
        self.set_status(SessionStatus::Idle).await.ok();
        {
            let mut guard = self.state.lock().await;
            *guard = None;
        }
        self.progress.publish(ProgressEvent::new("status", project_id.clone(), Some(chapter)).with_status("completed")).await;
        result
    }
}

async fn latest_draft_version(store: &Store, chapter: &ChapterId) -> Result<DraftVersion, OrchestratorError> {
    if store.read_draft(chapter, &DraftVersion::current()).await?.is_some() {
        return Ok(DraftVersion::current());
    }
    let mut version = DraftVersion::v1();
    let mut latest = version.clone();
    while let Some(_draft) = store.read_draft(chapter, &version).await? {
        latest = version.clone();
        version = version.increment();
        if version == latest {
            break;
        }
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wenshape_llm::MockGateway;
    use wenshape_protocol::ChapterKind;

    fn test_orchestrator(root: &std::path::Path) -> Orchestrator {
        let store = Store::new(root, ProjectId::new("proj").unwrap());
        Orchestrator::new(store, Arc::new(MockGateway::new()), Arc::new(ProgressBus::new()))
    }

    #[tokio::test]
    async fn fresh_orchestrator_has_no_session() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = test_orchestrator(tmp.path());
        assert!(orch.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn cancel_without_session_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = test_orchestrator(tmp.path());
        assert!(orch.cancel_session().await.is_ok());
    }

    #[tokio::test]
    async fn process_feedback_without_session_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = test_orchestrator(tmp.path());
        let result = orch.process_feedback(FeedbackAction::Confirm, None, Vec::new()).await;
        assert!(matches!(result, Err(OrchestratorError::NoActiveSession)));
    }

    #[tokio::test]
    async fn start_session_reaches_waiting_feedback_offline() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = test_orchestrator(tmp.path());
        let project = ProjectId::new("proj").unwrap();
        let chapter = ChapterId::new(1, 1, ChapterKind::Base, 0);
        let snapshot = orch.start_session(project, chapter, "Introduce Alice".to_string()).await.unwrap();
        assert!(matches!(
            snapshot.status,
            SessionStatus::WritingDraft | SessionStatus::WaitingFeedback | SessionStatus::WaitingUserInput
        ));
    }
}
