//! Project-scoped filesystem layout (spec §4.2).

use std::path::{Path, PathBuf};

use wenshape_protocol::error::ValidationError;
use wenshape_protocol::{project::sanitize_path_token, ChapterId, ProjectId};

/// Resolves every path a project's subtree can contain. Every method
/// returns a path already validated to stay under the data root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    data_root: PathBuf,
    project_id: ProjectId,
}

impl ProjectPaths {
    pub fn new(data_root: impl Into<PathBuf>, project_id: ProjectId) -> Self {
        Self {
            data_root: data_root.into(),
            project_id,
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn root(&self) -> PathBuf {
        self.data_root.join(self.project_id.as_str())
    }

    /// Validate that `path` resolves (lexically) under the project root.
    /// Resolution is lexical, not via `canonicalize`, so this also works
    /// for paths that don't exist yet (e.g. about to be created).
    fn under_root(&self, path: PathBuf) -> Result<PathBuf, ValidationError> {
        let root = self.root();
        let mut normalized = PathBuf::new();
        for component in path.components() {
            use std::path::Component;
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(ValidationError::PathEscapesRoot(path.display().to_string()));
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other.as_os_str()),
            }
        }
        if !normalized.starts_with(&root) {
            return Err(ValidationError::PathEscapesRoot(path.display().to_string()));
        }
        Ok(normalized)
    }

    fn chapter_dir_token(&self, chapter: &ChapterId) -> Result<String, ValidationError> {
        sanitize_path_token(&chapter.to_string())
    }

    pub fn cards_dir(&self) -> PathBuf {
        self.root().join("cards")
    }

    pub fn character_card_path(&self, name: &str) -> Result<PathBuf, ValidationError> {
        let token = sanitize_path_token(name)?;
        self.under_root(self.cards_dir().join("characters").join(format!("{token}.yaml")))
    }

    pub fn world_card_path(&self, name: &str) -> Result<PathBuf, ValidationError> {
        let token = sanitize_path_token(name)?;
        self.under_root(self.cards_dir().join("world").join(format!("{token}.yaml")))
    }

    pub fn style_card_path(&self) -> PathBuf {
        self.cards_dir().join("style.yaml")
    }

    pub fn canon_dir(&self) -> PathBuf {
        self.root().join("canon")
    }

    pub fn facts_path(&self) -> PathBuf {
        self.canon_dir().join("facts.jsonl")
    }

    pub fn timeline_path(&self) -> PathBuf {
        self.canon_dir().join("timeline.jsonl")
    }

    pub fn character_state_path(&self) -> PathBuf {
        self.canon_dir().join("character_state.jsonl")
    }

    pub fn drafts_chapter_dir(&self, chapter: &ChapterId) -> Result<PathBuf, ValidationError> {
        let token = self.chapter_dir_token(chapter)?;
        self.under_root(self.root().join("drafts").join(token))
    }

    pub fn scene_brief_path(&self, chapter: &ChapterId) -> Result<PathBuf, ValidationError> {
        Ok(self.drafts_chapter_dir(chapter)?.join("scene_brief.yaml"))
    }

    pub fn draft_path(&self, chapter: &ChapterId, version: &str) -> Result<PathBuf, ValidationError> {
        let version_token = sanitize_path_token(version)?;
        Ok(self
            .drafts_chapter_dir(chapter)?
            .join(format!("draft_{version_token}.md")))
    }

    pub fn draft_meta_path(&self, chapter: &ChapterId, version: &str) -> Result<PathBuf, ValidationError> {
        let draft = self.draft_path(chapter, version)?;
        Ok(draft.with_extension("md.meta.yaml"))
    }

    pub fn final_path(&self, chapter: &ChapterId) -> Result<PathBuf, ValidationError> {
        Ok(self.drafts_chapter_dir(chapter)?.join("final.md"))
    }

    pub fn final_meta_path(&self, chapter: &ChapterId) -> Result<PathBuf, ValidationError> {
        Ok(self.drafts_chapter_dir(chapter)?.join("final.md.meta.yaml"))
    }

    pub fn draft_history_dir(&self, chapter: &ChapterId) -> Result<PathBuf, ValidationError> {
        Ok(self.drafts_chapter_dir(chapter)?.join("history"))
    }

    pub fn review_path(&self, chapter: &ChapterId) -> Result<PathBuf, ValidationError> {
        Ok(self.drafts_chapter_dir(chapter)?.join("review.yaml"))
    }

    pub fn conflicts_path(&self, chapter: &ChapterId) -> Result<PathBuf, ValidationError> {
        Ok(self.drafts_chapter_dir(chapter)?.join("conflicts.yaml"))
    }

    pub fn summary_path(&self, chapter: &ChapterId) -> Result<PathBuf, ValidationError> {
        let token = self.chapter_dir_token(chapter)?;
        self.under_root(self.root().join("summaries").join(format!("{token}_summary.yaml")))
    }

    pub fn volume_path(&self, volume_id: &str) -> Result<PathBuf, ValidationError> {
        let token = sanitize_path_token(volume_id)?;
        self.under_root(self.root().join("volumes").join(format!("{token}.yaml")))
    }

    pub fn volume_summary_path(&self, volume_id: &str) -> Result<PathBuf, ValidationError> {
        let token = sanitize_path_token(volume_id)?;
        self.under_root(
            self.root()
                .join("volumes")
                .join(format!("{token}_summary.yaml")),
        )
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.root().join("summaries")
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.root().join("volumes")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root().join("index")
    }

    pub fn index_jsonl_path(&self, index_name: &str) -> PathBuf {
        self.index_dir().join(format!("{index_name}.jsonl"))
    }

    pub fn index_meta_path(&self, index_name: &str) -> PathBuf {
        self.index_dir().join(format!("{index_name}.meta.json"))
    }

    pub fn bindings_path(&self, chapter: &ChapterId) -> Result<PathBuf, ValidationError> {
        let token = self.chapter_dir_token(chapter)?;
        self.under_root(
            self.index_dir()
                .join("chapters")
                .join(token)
                .join("bindings.yaml"),
        )
    }

    pub fn memory_packs_dir(&self) -> PathBuf {
        self.root().join("memory_packs")
    }

    pub fn memory_pack_path(&self, chapter: &ChapterId) -> Result<PathBuf, ValidationError> {
        let token = self.chapter_dir_token(chapter)?;
        self.under_root(self.memory_packs_dir().join(format!("{token}.json")))
    }

    pub fn memory_pack_history_dir(&self) -> PathBuf {
        self.memory_packs_dir().join("history")
    }

    /// Walks `legacy_dir`, returning the directory name if it parses to the
    /// same canonical chapter id but isn't already in canonical form
    /// (spec §4.2 "Chapter id coercion").
    pub fn find_legacy_chapter_dir(base: &Path, canonical: &ChapterId) -> Option<PathBuf> {
        let entries = std::fs::read_dir(base).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = path.file_name()?.to_string_lossy().to_string();
            if name == canonical.to_string() {
                continue;
            }
            if let Ok(parsed) = ChapterId::parse(&name) {
                if parsed == *canonical {
                    return Some(path);
                }
            }
        }
        None
    }
}
