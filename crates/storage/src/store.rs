//! Typed project storage (spec §4.2): the one door every other crate
//! knocks on to read or write a project's on-disk state. Wraps path
//! resolution, per-path locking, atomic writes, and rotation behind
//! operations shaped around the data model rather than raw files.

use std::path::PathBuf;

use wenshape_protocol::canon::{normalize_fact_item, RawFactRow};
use wenshape_protocol::error::{StorageError, ValidationError};
use wenshape_protocol::{
    Card, ChapterBinding, ChapterId, ChapterSummary, CharacterCard, CharacterState, Draft,
    DraftVersion, Fact, MemoryPack, ProjectId, SceneBrief, StyleCard, TimelineEvent, Volume,
    VolumeSummary, WorldCard,
};

use crate::atomic::{atomic_write, rotate_into_history, DEFAULT_HISTORY_KEEP};
use crate::format::{append_jsonl, read_json, read_jsonl, read_yaml, write_json, write_jsonl, write_yaml};
use crate::lock::FileLockMap;
use crate::paths::ProjectPaths;

/// Live counts surfaced for operational visibility (not part of the
/// original interchange format, purely descriptive).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StorageStats {
    pub fact_count: usize,
    pub timeline_event_count: usize,
    pub character_state_count: usize,
    pub draft_chapter_count: usize,
    pub memory_pack_count: usize,
    pub tracked_locks: usize,
}

#[derive(Clone)]
pub struct Store {
    paths: ProjectPaths,
    locks: FileLockMap,
    history_keep: usize,
}

impl Store {
    pub fn new(data_root: impl Into<PathBuf>, project_id: ProjectId) -> Self {
        Self {
            paths: ProjectPaths::new(data_root, project_id),
            locks: FileLockMap::new(),
            history_keep: DEFAULT_HISTORY_KEEP,
        }
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn with_history_keep(mut self, keep: usize) -> Self {
        self.history_keep = keep;
        self
    }

    // ---- cards -----------------------------------------------------

    pub async fn read_character_card(&self, name: &str) -> Result<Option<CharacterCard>, StorageError> {
        let path = self.paths.character_card_path(name).map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        read_yaml(&path).await
    }

    pub async fn write_character_card(&self, card: &CharacterCard) -> Result<(), StorageError> {
        let path = self
            .paths
            .character_card_path(&card.name)
            .map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        write_yaml(&path, card).await
    }

    pub async fn read_world_card(&self, name: &str) -> Result<Option<WorldCard>, StorageError> {
        let path = self.paths.world_card_path(name).map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        read_yaml(&path).await
    }

    pub async fn write_world_card(&self, card: &WorldCard) -> Result<(), StorageError> {
        let path = self.paths.world_card_path(&card.name).map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        write_yaml(&path, card).await
    }

    pub async fn read_style_card(&self) -> Result<Option<StyleCard>, StorageError> {
        let path = self.paths.style_card_path();
        let _guard = self.locks.acquire(&path).await?;
        read_yaml(&path).await
    }

    pub async fn write_style_card(&self, card: &StyleCard) -> Result<(), StorageError> {
        let path = self.paths.style_card_path();
        let _guard = self.locks.acquire(&path).await?;
        write_yaml(&path, card).await
    }

    /// Lists all cards currently on disk as the tagged [`Card`] union,
    /// used by context selection when it needs to treat every card type
    /// uniformly.
    pub async fn list_cards(&self) -> Result<Vec<Card>, StorageError> {
        let mut cards = Vec::new();
        for (dir, ctor) in [
            (self.paths.cards_dir().join("characters"), CardCtor::Character),
            (self.paths.cards_dir().join("world"), CardCtor::World),
        ] {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StorageError::Io {
                        path: dir.display().to_string(),
                        source: e,
                    })
                }
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::Io { path: dir.display().to_string(), source: e })?
            {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                    continue;
                }
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| StorageError::Io { path: path.display().to_string(), source: e })?;
                match ctor {
                    CardCtor::Character => {
                        if let Ok(card) = serde_yaml::from_slice::<CharacterCard>(&bytes) {
                            cards.push(Card::Character(card));
                        }
                    }
                    CardCtor::World => {
                        if let Ok(card) = serde_yaml::from_slice::<WorldCard>(&bytes) {
                            cards.push(Card::World(card));
                        }
                    }
                }
            }
        }
        if let Some(style) = self.read_style_card().await? {
            cards.push(Card::Style(style));
        }
        Ok(cards)
    }

    // ---- canon -------------------------------------------------------

    pub async fn read_facts(&self) -> Result<Vec<Fact>, StorageError> {
        let path = self.paths.facts_path();
        let _guard = self.locks.acquire(&path).await?;
        let rows: Vec<RawFactRow> = read_jsonl(&path).await?;
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| normalize_fact_item(idx, row))
            .collect())
    }

    pub async fn append_fact(&self, fact: &Fact) -> Result<(), StorageError> {
        let path = self.paths.facts_path();
        let _guard = self.locks.acquire(&path).await?;
        append_jsonl(&path, fact).await
    }

    /// Rewrites `facts.jsonl` without any fact whose `source` is `chapter`,
    /// returning how many were removed.
    pub async fn delete_facts_by_chapter(&self, chapter: &ChapterId) -> Result<usize, StorageError> {
        let path = self.paths.facts_path();
        let _guard = self.locks.acquire(&path).await?;
        let rows: Vec<RawFactRow> = read_jsonl(&path).await?;
        let facts: Vec<Fact> = rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| normalize_fact_item(idx, row))
            .collect();
        let before = facts.len();
        let kept: Vec<Fact> = facts.into_iter().filter(|f| f.source != *chapter).collect();
        let removed = before - kept.len();
        write_jsonl(&path, &kept).await?;
        Ok(removed)
    }

    pub async fn read_timeline(&self) -> Result<Vec<TimelineEvent>, StorageError> {
        let path = self.paths.timeline_path();
        let _guard = self.locks.acquire(&path).await?;
        read_jsonl(&path).await
    }

    pub async fn append_timeline_event(&self, event: &TimelineEvent) -> Result<(), StorageError> {
        let path = self.paths.timeline_path();
        let _guard = self.locks.acquire(&path).await?;
        append_jsonl(&path, event).await
    }

    pub async fn read_character_states(&self) -> Result<Vec<CharacterState>, StorageError> {
        let path = self.paths.character_state_path();
        let _guard = self.locks.acquire(&path).await?;
        read_jsonl(&path).await
    }

    /// Upserts a character's state row by `character` name, rewriting the
    /// whole log (the log is small and read in full elsewhere anyway).
    pub async fn upsert_character_state(&self, state: CharacterState) -> Result<(), StorageError> {
        let path = self.paths.character_state_path();
        let _guard = self.locks.acquire(&path).await?;
        let mut states: Vec<CharacterState> = read_jsonl(&path).await?;
        if let Some(existing) = states.iter_mut().find(|s| s.character == state.character) {
            *existing = state;
        } else {
            states.push(state);
        }
        write_jsonl(&path, &states).await
    }

    // ---- drafts --------------------------------------------------------

    pub async fn read_scene_brief(&self, chapter: &ChapterId) -> Result<Option<SceneBrief>, StorageError> {
        let path = self.paths.scene_brief_path(chapter).map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        read_yaml(&path).await
    }

    pub async fn write_scene_brief(&self, brief: &SceneBrief) -> Result<(), StorageError> {
        let path = self
            .paths
            .scene_brief_path(&brief.chapter)
            .map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        write_yaml(&path, brief).await
    }

    pub async fn read_draft(&self, chapter: &ChapterId, version: &DraftVersion) -> Result<Option<Draft>, StorageError> {
        let content_path = self
            .paths
            .draft_path(chapter, version.as_str())
            .map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&content_path).await?;
        let content = match tokio::fs::read_to_string(&content_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::Io {
                    path: content_path.display().to_string(),
                    source: e,
                })
            }
        };
        Ok(Some(Draft::new(*chapter, version.clone(), content)))
    }

    /// Writes the next draft version for `chapter`, rotating the prior
    /// live version (if any) into `drafts/<chapter>/history/`.
    pub async fn save_draft(&self, chapter: &ChapterId, content: String) -> Result<Draft, StorageError> {
        let highest = self.list_draft_version_numbers(chapter).await?.into_iter().max().unwrap_or(0);
        let next_version = nth_draft_version(highest + 1);
        self.save_draft_as(chapter, next_version, content).await
    }

    /// Writes `content` at an explicit `version`, rotating whatever
    /// currently occupies that slot into history first. Unlike
    /// [`Store::save_draft`], this does not look at existing version
    /// numbers — callers that need to reset to a specific version (e.g.
    /// a full rewrite always landing on `"v1"`) use this directly.
    pub async fn save_draft_as(&self, chapter: &ChapterId, version: DraftVersion, content: String) -> Result<Draft, StorageError> {
        let history_dir = self.paths.draft_history_dir(chapter).map_err(validation_as_storage)?;
        let draft = Draft::new(*chapter, version.clone(), content);
        let draft_path = self
            .paths
            .draft_path(chapter, version.as_str())
            .map_err(validation_as_storage)?;
        let meta_path = self
            .paths
            .draft_meta_path(chapter, version.as_str())
            .map_err(validation_as_storage)?;

        let _guard = self.locks.acquire(&draft_path).await?;
        rotate_into_history(&draft_path, &history_dir, self.history_keep).await?;
        atomic_write(&draft_path, draft.content.as_bytes()).await?;
        write_yaml(&meta_path, &draft).await?;
        Ok(draft)
    }

    /// Scans `drafts/<chapter>/` for `draft_vN.md` files and returns the
    /// numeric versions present (`final.md` lives outside this naming
    /// scheme and isn't counted here).
    async fn list_draft_version_numbers(&self, chapter: &ChapterId) -> Result<Vec<u32>, StorageError> {
        let dir = self.paths.drafts_chapter_dir(chapter).map_err(validation_as_storage)?;
        let mut versions = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(StorageError::Io { path: dir.display().to_string(), source: e }),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Io { path: dir.display().to_string(), source: e })?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name.strip_prefix("draft_v").and_then(|s| s.strip_suffix(".md")) {
                if let Ok(n) = stem.parse::<u32>() {
                    versions.push(n);
                }
            }
        }
        Ok(versions)
    }

    /// Promotes `content` to the project's authoritative `final.md`,
    /// rotating any prior final into history first.
    pub async fn finalize_draft(&self, chapter: &ChapterId, content: String) -> Result<Draft, StorageError> {
        let final_path = self.paths.final_path(chapter).map_err(validation_as_storage)?;
        let final_meta_path = self.paths.final_meta_path(chapter).map_err(validation_as_storage)?;
        let history_dir = self.paths.draft_history_dir(chapter).map_err(validation_as_storage)?;

        let _guard = self.locks.acquire(&final_path).await?;
        rotate_into_history(&final_path, &history_dir, self.history_keep).await?;
        let draft = Draft::new(*chapter, DraftVersion::current(), content);
        atomic_write(&final_path, draft.content.as_bytes()).await?;
        write_yaml(&final_meta_path, &draft).await?;
        Ok(draft)
    }

    // ---- summaries / volumes -------------------------------------------

    pub async fn read_summary(&self, chapter: &ChapterId) -> Result<Option<ChapterSummary>, StorageError> {
        let path = self.paths.summary_path(chapter).map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        read_yaml(&path).await
    }

    pub async fn write_summary(&self, summary: &ChapterSummary) -> Result<(), StorageError> {
        let path = self
            .paths
            .summary_path(&summary.chapter)
            .map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        write_yaml(&path, summary).await
    }

    pub async fn read_volume(&self, volume_id: &str) -> Result<Option<Volume>, StorageError> {
        let path = self.paths.volume_path(volume_id).map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        read_yaml(&path).await
    }

    pub async fn write_volume(&self, volume: &Volume) -> Result<(), StorageError> {
        let path = self.paths.volume_path(&volume.id).map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        write_yaml(&path, volume).await
    }

    pub async fn read_volume_summary(&self, volume_id: &str) -> Result<Option<VolumeSummary>, StorageError> {
        let path = self.paths.volume_summary_path(volume_id).map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        read_yaml(&path).await
    }

    pub async fn write_volume_summary(&self, summary: &VolumeSummary) -> Result<(), StorageError> {
        let path = self
            .paths
            .volume_summary_path(&summary.volume_id)
            .map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        write_yaml(&path, summary).await
    }

    /// All chapter summaries on disk, in no particular order. Used by the
    /// dynamic context retriever to rank every previous chapter by
    /// distance without the caller having to know which chapters exist.
    pub async fn list_chapter_summaries(&self) -> Result<Vec<ChapterSummary>, StorageError> {
        let dir = self.paths.summaries_dir();
        let mut summaries = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summaries),
            Err(e) => return Err(StorageError::Io { path: dir.display().to_string(), source: e }),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Io { path: dir.display().to_string(), source: e })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| StorageError::Io { path: path.display().to_string(), source: e })?;
            if let Ok(summary) = serde_yaml::from_slice::<ChapterSummary>(&bytes) {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    /// All volumes on disk (not their summaries), ordered by `order`.
    pub async fn list_volumes(&self) -> Result<Vec<Volume>, StorageError> {
        let dir = self.paths.volumes_dir();
        let mut volumes = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(volumes),
            Err(e) => return Err(StorageError::Io { path: dir.display().to_string(), source: e }),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Io { path: dir.display().to_string(), source: e })?
        {
            let path = entry.path();
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if !name.ends_with(".yaml") || name.ends_with("_summary.yaml") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| StorageError::Io { path: path.display().to_string(), source: e })?;
            if let Ok(volume) = serde_yaml::from_slice::<Volume>(&bytes) {
                volumes.push(volume);
            }
        }
        volumes.sort_by_key(|v| v.order);
        Ok(volumes)
    }

    /// Every volume's summary, skipping volumes that don't have one yet
    /// (mirrors the original's "list volumes, fetch each summary, skip
    /// missing" shape).
    pub async fn list_volume_summaries(&self) -> Result<Vec<VolumeSummary>, StorageError> {
        let mut summaries = Vec::new();
        for volume in self.list_volumes().await? {
            if let Some(summary) = self.read_volume_summary(&volume.id).await? {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    // ---- bindings / memory packs ----------------------------------------

    pub async fn read_binding(&self, chapter: &ChapterId) -> Result<Option<ChapterBinding>, StorageError> {
        let path = self.paths.bindings_path(chapter).map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        read_yaml(&path).await
    }

    pub async fn write_binding(&self, binding: &ChapterBinding) -> Result<(), StorageError> {
        let path = self
            .paths
            .bindings_path(&binding.chapter)
            .map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        write_yaml(&path, binding).await
    }

    pub async fn read_memory_pack(&self, chapter: &ChapterId) -> Result<Option<MemoryPack>, StorageError> {
        let path = self.paths.memory_pack_path(chapter).map_err(validation_as_storage)?;
        let _guard = self.locks.acquire(&path).await?;
        read_json(&path).await
    }

    pub async fn write_memory_pack(&self, pack: &MemoryPack) -> Result<(), StorageError> {
        let path = self
            .paths
            .memory_pack_path(&pack.chapter)
            .map_err(validation_as_storage)?;
        let history_dir = self.paths.memory_pack_history_dir();
        let _guard = self.locks.acquire(&path).await?;
        rotate_into_history(&path, &history_dir, self.history_keep).await?;
        write_json(&path, pack).await
    }

    // ---- evidence indices (raw jsonl access; index crate owns ranking) -

    pub async fn read_index_jsonl<T: serde::de::DeserializeOwned>(
        &self,
        index_name: &str,
    ) -> Result<Vec<T>, StorageError> {
        let path = self.paths.index_jsonl_path(index_name);
        let _guard = self.locks.acquire(&path).await?;
        read_jsonl(&path).await
    }

    pub async fn write_index_jsonl<T: serde::Serialize>(
        &self,
        index_name: &str,
        items: &[T],
    ) -> Result<(), StorageError> {
        let path = self.paths.index_jsonl_path(index_name);
        let _guard = self.locks.acquire(&path).await?;
        write_jsonl(&path, items).await
    }

    pub async fn read_index_meta<T: serde::de::DeserializeOwned>(
        &self,
        index_name: &str,
    ) -> Result<Option<T>, StorageError> {
        let path = self.paths.index_meta_path(index_name);
        let _guard = self.locks.acquire(&path).await?;
        read_json(&path).await
    }

    pub async fn write_index_meta<T: serde::Serialize + Sync>(
        &self,
        index_name: &str,
        meta: &T,
    ) -> Result<(), StorageError> {
        let path = self.paths.index_meta_path(index_name);
        let _guard = self.locks.acquire(&path).await?;
        write_json(&path, meta).await
    }

    // ---- health / stats --------------------------------------------------

    pub async fn health(&self) -> Result<StorageStats, StorageError> {
        let facts = self.read_facts().await.unwrap_or_default();
        let timeline = self.read_timeline().await.unwrap_or_default();
        let states = self.read_character_states().await.unwrap_or_default();
        let drafts_dir = self.paths.root().join("drafts");
        let draft_chapter_count = count_dir_entries(&drafts_dir).await;
        let packs_dir = self.paths.memory_packs_dir();
        let memory_pack_count = count_dir_entries(&packs_dir).await;
        Ok(StorageStats {
            fact_count: facts.len(),
            timeline_event_count: timeline.len(),
            character_state_count: states.len(),
            draft_chapter_count,
            memory_pack_count,
            tracked_locks: self.locks.tracked_len(),
        })
    }
}

enum CardCtor {
    Character,
    World,
}

async fn count_dir_entries(dir: &std::path::Path) -> usize {
    let mut count = 0;
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
    }
    count
}

fn validation_as_storage(e: ValidationError) -> StorageError {
    StorageError::Io {
        path: e.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
    }
}

/// Builds the Nth draft version (`n=1` -> `v1`) using only `DraftVersion`'s
/// public constructor and its `increment` step, since its string
/// representation is private to `wenshape-protocol`.
fn nth_draft_version(n: u32) -> DraftVersion {
    let mut version = DraftVersion::v1();
    for _ in 1..n.max(1) {
        version = version.increment();
    }
    version
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;
    use wenshape_protocol::ChapterKind;

    fn chapter() -> ChapterId {
        ChapterId::new(1, 5, ChapterKind::Base, 0)
    }

    fn store(dir: &tempfile::TempDir) -> Store {
        Store::new(dir.path(), ProjectId::new("demo").unwrap())
    }

    #[tokio::test]
    async fn character_card_round_trips() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let card = CharacterCard {
            name: "Alice".into(),
            aliases: vec!["Al".into()],
            description: "A knight".into(),
            stars: 2,
        };
        store.write_character_card(&card).await.unwrap();
        let read = store.read_character_card("Alice").await.unwrap().unwrap();
        assert_eq!(read, card);
    }

    #[tokio::test]
    async fn facts_append_and_delete_by_chapter() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let c5 = chapter();
        let c6 = ChapterId::new(1, 6, ChapterKind::Base, 0);

        store
            .append_fact(&Fact {
                id: "F0000".into(),
                statement: "Alice is a knight".into(),
                source: c5,
                introduced_in: c5,
                confidence: 0.9,
                title: None,
                summary_ref: None,
            })
            .await
            .unwrap();
        store
            .append_fact(&Fact {
                id: "F0001".into(),
                statement: "Bob is a wizard".into(),
                source: c6,
                introduced_in: c6,
                confidence: 0.9,
                title: None,
                summary_ref: None,
            })
            .await
            .unwrap();

        let facts = store.read_facts().await.unwrap();
        assert_eq!(facts.len(), 2);

        let removed = store.delete_facts_by_chapter(&c5).await.unwrap();
        assert_eq!(removed, 1);
        let remaining = store.read_facts().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].source, c6);
    }

    #[tokio::test]
    async fn draft_save_increments_version_and_rotates_history() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let chapter = chapter();

        let v1 = store.save_draft(&chapter, "first pass".into()).await.unwrap();
        assert_eq!(v1.version.as_str(), "v1");

        let v2 = store.save_draft(&chapter, "second pass".into()).await.unwrap();
        assert_eq!(v2.version.as_str(), "v2");

        let history_dir = store.paths().draft_history_dir(&chapter).unwrap();
        let mut entries = tokio::fs::read_dir(&history_dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn finalize_draft_writes_final_md() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let chapter = chapter();
        let draft = store.finalize_draft(&chapter, "the end".into()).await.unwrap();
        assert!(draft.version.is_current());

        let read_back = store
            .read_draft(&chapter, &DraftVersion::current())
            .await
            .unwrap();
        assert!(read_back.is_none(), "read_draft looks at draft_<v>.md, not final.md");

        let final_path = store.paths().final_path(&chapter).unwrap();
        let content = tokio::fs::read_to_string(&final_path).await.unwrap();
        assert_eq!(content, "the end");
    }

    #[tokio::test]
    async fn list_chapter_summaries_skips_unparseable_and_missing_dir() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        assert!(store.list_chapter_summaries().await.unwrap().is_empty());

        let c1 = chapter();
        let c2 = ChapterId::new(1, 6, ChapterKind::Base, 0);
        for (c, title) in [(c1, "First"), (c2, "Second")] {
            store
                .write_summary(&ChapterSummary {
                    chapter: c,
                    volume_id: "V1".into(),
                    title: title.into(),
                    word_count: 10,
                    key_events: vec![],
                    new_facts: vec![],
                    character_state_changes: vec![],
                    open_loops: vec![],
                    brief_summary: "summary".into(),
                    order_index: None,
                })
                .await
                .unwrap();
        }
        let summaries = store.list_chapter_summaries().await.unwrap();
        assert_eq!(summaries.len(), 2);
    }

    #[tokio::test]
    async fn list_volumes_excludes_summary_files_and_sorts_by_order() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        store
            .write_volume(&Volume { id: "V2".into(), title: "Two".into(), summary: None, order: 2 })
            .await
            .unwrap();
        store
            .write_volume(&Volume { id: "V1".into(), title: "One".into(), summary: None, order: 1 })
            .await
            .unwrap();
        store
            .write_volume_summary(&VolumeSummary {
                volume_id: "V1".into(),
                brief_summary: "brief".into(),
                key_themes: vec![],
                major_events: vec![],
                chapter_count: 1,
                timestamps: Utc::now(),
            })
            .await
            .unwrap();

        let volumes = store.list_volumes().await.unwrap();
        assert_eq!(volumes.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(), vec!["V1", "V2"]);

        let summaries = store.list_volume_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].volume_id, "V1");
    }

    #[tokio::test]
    async fn memory_pack_round_trips_and_rotates() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let chapter = chapter();
        let pack = MemoryPack {
            chapter,
            built_at: Utc::now(),
            source: "session".into(),
            chapter_goal: "introduce the antagonist".into(),
            scene_brief: Default::default(),
            card_snapshot: Default::default(),
            payload: Default::default(),
        };
        store.write_memory_pack(&pack).await.unwrap();
        store.write_memory_pack(&pack).await.unwrap();
        let read = store.read_memory_pack(&chapter).await.unwrap().unwrap();
        assert_eq!(read.source, "session");

        let history_dir = store.paths().memory_pack_history_dir();
        let mut entries = tokio::fs::read_dir(&history_dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let chapter = chapter();
        store
            .append_fact(&Fact {
                id: "F0000".into(),
                statement: "x".into(),
                source: chapter,
                introduced_in: chapter,
                confidence: 0.5,
                title: None,
                summary_ref: None,
            })
            .await
            .unwrap();
        let stats = store.health().await.unwrap();
        assert_eq!(stats.fact_count, 1);
    }
}
