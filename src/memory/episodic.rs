//! Episodic memory: durable, similarity-searchable interaction store
//!
//! Memories live in an insertion-ordered arena with an id → slot index.
//! Nothing outside the store holds a reference into the arena; callers get
//! clones. Readers (search, lookups, stats) take a short synchronous lock
//! and never suspend; the only suspension points are the embedder call and
//! the serialized write path, which appends to the log before publishing.

use super::interaction::{Interaction, Memory};
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::storage::{self, JsonLog};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Inclusive time window on interaction timestamps.
pub type TimeRange = (DateTime<Utc>, DateTime<Utc>);

/// Options for similarity search
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of results
    pub limit: usize,
    /// Results below this similarity are dropped
    pub min_similarity: f32,
    /// Only consider memories stamped within this window
    pub time_range: Option<TimeRange>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            min_similarity: 0.0,
            time_range: None,
        }
    }
}

impl SearchOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.time_range = Some((start, end));
        self
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(Error::Validation(format!(
                "min_similarity must be within [0, 1], got {}",
                self.min_similarity
            )));
        }
        if let Some((start, end)) = self.time_range {
            if start > end {
                return Err(Error::Validation(format!(
                    "time range start {start} is after end {end}"
                )));
            }
        }
        Ok(())
    }
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub similarity: f32,
}

/// Options for export
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Include embedding vectors in each record
    pub include_embeddings: bool,
}

/// One exported record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    pub id: Uuid,
    pub user_msg: String,
    pub assistant_msg: String,
    pub timestamp: DateTime<Utc>,
    pub importance_score: f32,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ExportRecord {
    fn from_memory(memory: &Memory, options: &ExportOptions) -> Self {
        let i = &memory.interaction;
        Self {
            id: i.id(),
            user_msg: i.user_msg().to_string(),
            assistant_msg: i.assistant_msg().to_string(),
            timestamp: i.timestamp(),
            importance_score: i.importance_score(),
            tags: memory.tags.iter().cloned().collect(),
            embedding: options
                .include_embeddings
                .then(|| memory.embedding.clone()),
        }
    }
}

/// Point-in-time episodic statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodicStats {
    pub count: usize,
    pub tag_counts: BTreeMap<String, usize>,
    pub avg_importance: f32,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Consolidation edit: keep one memory, drop its duplicates, replace its tags.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub keep: Uuid,
    pub remove: Vec<Uuid>,
    pub tags: BTreeSet<String>,
}

#[derive(Default)]
struct Arena {
    memories: Vec<Memory>,
    index: HashMap<Uuid, usize>,
}

impl Arena {
    fn from_memories(memories: Vec<Memory>) -> Self {
        let mut arena = Self::default();
        for memory in memories {
            if arena.index.contains_key(&memory.id()) {
                tracing::warn!(id = %memory.id(), "Skipping duplicate episodic record");
                continue;
            }
            arena.push(memory);
        }
        arena
    }

    fn push(&mut self, memory: Memory) {
        self.index.insert(memory.id(), self.memories.len());
        self.memories.push(memory);
    }

    fn get(&self, id: &Uuid) -> Option<&Memory> {
        self.index.get(id).map(|&slot| &self.memories[slot])
    }
}

/// Durable episodic memory store
pub struct EpisodicStore {
    arena: RwLock<Arena>,
    write_gate: Mutex<()>,
    log: Option<JsonLog>,
    embedder: Arc<dyn Embedder>,
    promotion_threshold: f32,
}

impl EpisodicStore {
    /// Create a volatile store (nothing is written to disk).
    pub fn in_memory(embedder: Arc<dyn Embedder>, promotion_threshold: f32) -> Self {
        Self {
            arena: RwLock::new(Arena::default()),
            write_gate: Mutex::new(()),
            log: None,
            embedder,
            promotion_threshold,
        }
    }

    /// Open a store backed by `log`, loading existing memories.
    ///
    /// The log is compacted when records were re-embedded (dimension change),
    /// duplicated, or unreadable. Compaction drops a torn trailing line so the
    /// next append starts on a fresh line.
    pub async fn open(
        log: JsonLog,
        embedder: Arc<dyn Embedder>,
        promotion_threshold: f32,
    ) -> Result<Self> {
        let contents = log.load::<Memory>().await?;
        let mut memories = contents.records;
        let loaded = memories.len();

        let dims = embedder.dimensions();
        let mut reembedded = 0;
        for memory in memories.iter_mut() {
            if memory.embedding.len() != dims {
                memory.embedding = embed_checked(embedder.as_ref(), &memory.interaction.text()).await?;
                reembedded += 1;
            }
        }

        let arena = Arena::from_memories(memories);
        if reembedded > 0 || arena.memories.len() != loaded || contents.skipped > 0 {
            if contents.skipped > 0 {
                tracing::warn!(
                    path = %log.path().display(),
                    skipped = contents.skipped,
                    "Compacting episodic log without unreadable lines"
                );
            }
            log.rewrite(&arena.memories).await?;
        }

        tracing::debug!(
            path = %log.path().display(),
            count = arena.memories.len(),
            skipped = contents.skipped,
            reembedded = reembedded,
            "Episodic memory loaded"
        );

        Ok(Self {
            arena: RwLock::new(arena),
            write_gate: Mutex::new(()),
            log: Some(log),
            embedder,
            promotion_threshold,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether an interaction qualifies for storage.
    pub fn qualifies(&self, interaction: &Interaction, force: bool) -> bool {
        force || interaction.importance_score() > self.promotion_threshold
    }

    /// Store an interaction if forced or important enough.
    ///
    /// Returns `None` when the interaction was not promoted.
    pub async fn store(
        &self,
        interaction: Interaction,
        tags: BTreeSet<String>,
        force: bool,
    ) -> Result<Option<Memory>> {
        if !self.qualifies(&interaction, force) {
            tracing::debug!(
                id = %interaction.id(),
                score = interaction.importance_score(),
                "Interaction below promotion threshold"
            );
            return Ok(None);
        }

        let embedding = embed_checked(self.embedder.as_ref(), &interaction.text()).await?;
        let memory = Memory {
            interaction,
            tags,
            embedding,
        };

        let _gate = self.write_gate.lock().await;
        if let Some(existing) = self.get(&memory.id()) {
            return Ok(Some(existing));
        }
        if let Some(ref log) = self.log {
            log.append(&memory).await?;
        }
        self.arena
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(memory.clone());

        tracing::debug!(id = %memory.id(), forced = force, "Episodic memory stored");
        Ok(Some(memory))
    }

    /// Rank memories by similarity to `query`.
    ///
    /// Results are sorted by similarity descending, ties broken by more
    /// recent timestamp, then by later insertion. Every result satisfies
    /// `min_similarity` and the time range when one is given.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<ScoredMemory>> {
        options.validate()?;
        let query_embedding = embed_checked(self.embedder.as_ref(), query).await?;

        if options.limit == 0 {
            return Ok(Vec::new());
        }

        let arena = self.read();
        let mut scored: Vec<(usize, f32)> = Vec::new();
        for (slot, memory) in arena.memories.iter().enumerate() {
            if let Some((start, end)) = options.time_range {
                let ts = memory.timestamp();
                if ts < start || ts > end {
                    continue;
                }
            }
            let similarity = cosine_similarity(&query_embedding, &memory.embedding)?;
            if similarity >= options.min_similarity {
                scored.push((slot, similarity));
            }
        }

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| {
                    arena.memories[b.0]
                        .timestamp()
                        .cmp(&arena.memories[a.0].timestamp())
                })
                .then_with(|| b.0.cmp(&a.0))
        });
        scored.truncate(options.limit);

        Ok(scored
            .into_iter()
            .map(|(slot, similarity)| ScoredMemory {
                memory: arena.memories[slot].clone(),
                similarity,
            })
            .collect())
    }

    /// Look up a memory by id
    pub fn get(&self, id: &Uuid) -> Option<Memory> {
        self.read().get(id).cloned()
    }

    /// All memories carrying `tag`, most recent first
    pub fn find_by_tag(&self, tag: &str) -> Vec<Memory> {
        self.read()
            .memories
            .iter()
            .rev()
            .filter(|m| m.tags.contains(tag))
            .cloned()
            .collect()
    }

    /// Snapshot of every memory in insertion order
    pub fn all(&self) -> Vec<Memory> {
        self.read().memories.clone()
    }

    pub fn len(&self) -> usize {
        self.read().memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().memories.is_empty()
    }

    /// Delete a memory explicitly, compacting the log.
    pub async fn remove(&self, id: &Uuid) -> Result<Option<Memory>> {
        let _gate = self.write_gate.lock().await;

        let (removed, remaining) = {
            let arena = self.read();
            let Some(removed) = arena.get(id).cloned() else {
                return Ok(None);
            };
            let remaining: Vec<Memory> = arena
                .memories
                .iter()
                .filter(|m| m.id() != *id)
                .cloned()
                .collect();
            (removed, remaining)
        };

        self.publish(remaining).await?;
        Ok(Some(removed))
    }

    /// Apply consolidation folds as one durable rewrite.
    ///
    /// Folds naming ids that no longer exist are ignored. Returns the number
    /// of memories removed.
    pub async fn apply_folds(&self, folds: &[Fold]) -> Result<usize> {
        if folds.is_empty() {
            return Ok(0);
        }
        let _gate = self.write_gate.lock().await;

        let (next, removed) = {
            let arena = self.read();
            let mut drop_ids: BTreeSet<Uuid> = BTreeSet::new();
            let mut retag: HashMap<Uuid, &BTreeSet<String>> = HashMap::new();
            for fold in folds {
                if arena.get(&fold.keep).is_none() {
                    continue;
                }
                drop_ids.extend(fold.remove.iter().filter(|id| **id != fold.keep));
                retag.insert(fold.keep, &fold.tags);
            }

            let mut removed = 0;
            let mut next = Vec::with_capacity(arena.memories.len());
            for memory in &arena.memories {
                if drop_ids.contains(&memory.id()) {
                    removed += 1;
                    continue;
                }
                let mut memory = memory.clone();
                if let Some(tags) = retag.get(&memory.id()) {
                    memory.tags = (*tags).clone();
                }
                next.push(memory);
            }
            (next, removed)
        };

        self.publish(next).await?;
        Ok(removed)
    }

    /// Persist `memories` as the whole collection, then make it visible.
    async fn publish(&self, memories: Vec<Memory>) -> Result<()> {
        if let Some(ref log) = self.log {
            log.rewrite(&memories).await?;
        }
        *self.arena.write().unwrap_or_else(PoisonError::into_inner) =
            Arena::from_memories(memories);
        Ok(())
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> EpisodicStats {
        let arena = self.read();
        let count = arena.memories.len();
        let mut tag_counts = BTreeMap::new();
        let mut importance_sum = 0.0;
        for memory in &arena.memories {
            importance_sum += memory.interaction.importance_score();
            for tag in &memory.tags {
                *tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        EpisodicStats {
            count,
            tag_counts,
            avg_importance: if count == 0 {
                0.0
            } else {
                importance_sum / count as f32
            },
            oldest: arena.memories.iter().map(Memory::timestamp).min(),
            newest: arena.memories.iter().map(Memory::timestamp).max(),
        }
    }

    /// Serialize every memory to `path` as a JSON list, overwriting it.
    ///
    /// Returns the number of records written.
    pub async fn export(&self, path: &Path, options: &ExportOptions) -> Result<usize> {
        let records: Vec<ExportRecord> = self
            .read()
            .memories
            .iter()
            .map(|m| ExportRecord::from_memory(m, options))
            .collect();

        let json = serde_json::to_vec_pretty(&records)?;
        storage::write_atomic(path, &json).await?;

        tracing::info!(path = %path.display(), count = records.len(), "Episodic memory exported");
        Ok(records.len())
    }
}

/// Call the embedder and verify the vector it returns.
async fn embed_checked(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let vector = embedder.embed(text).await.map_err(|e| match e {
        Error::EmbeddingUnavailable(_) => e,
        other => Error::EmbeddingUnavailable(other.to_string()),
    })?;

    if vector.len() != embedder.dimensions() {
        return Err(Error::EmbeddingUnavailable(format!(
            "embedder returned {} dimensions, expected {}",
            vector.len(),
            embedder.dimensions()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::EmbeddingUnavailable(
            "embedder returned non-finite values".to_string(),
        ));
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LexiconEmbedder;
    use crate::memory::interaction::InteractionBuilder;
    use crate::memory::scorer::ImportanceScorer;
    use crate::memory::tagger::TagExtractor;
    use async_trait::async_trait;
    use chrono::Duration;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::EmbeddingUnavailable("backend offline".to_string()))
        }
    }

    /// Every text embeds to the same vector, so all similarities tie at 1.0.
    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn dimensions(&self) -> usize {
            3
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    fn lexicon_store() -> EpisodicStore {
        EpisodicStore::in_memory(Arc::new(LexiconEmbedder::default()), 0.5)
    }

    fn interaction_at(user: &str, assistant: &str, ts: DateTime<Utc>) -> Interaction {
        InteractionBuilder::new(user, assistant)
            .timestamp(ts)
            .build(&ImportanceScorer::new())
            .unwrap()
    }

    async fn put(store: &EpisodicStore, user: &str, assistant: &str, ts: DateTime<Utc>) -> Memory {
        let tags = TagExtractor::extract(user, assistant);
        store
            .store(interaction_at(user, assistant, ts), tags, true)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_respects_threshold() {
        let store = lexicon_store();
        let now = Utc::now();

        let low = interaction_at("ok", "sure", now);
        assert!(store.store(low, BTreeSet::new(), false).await.unwrap().is_none());
        assert!(store.is_empty());

        let high = interaction_at(
            "I feel so happy, I love my new apartment",
            "That's wonderful!",
            now,
        );
        assert!(high.importance_score() > 0.5);
        let stored = store.store(high, BTreeSet::new(), false).await.unwrap();
        assert!(stored.is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_force_overrides_threshold() {
        let store = lexicon_store();
        let low = interaction_at("ok", "sure", Utc::now());
        let memory = store.store(low, BTreeSet::new(), true).await.unwrap().unwrap();
        assert_eq!(memory.embedding.len(), LexiconEmbedder::default().dimensions());
        assert!(store.get(&memory.id()).is_some());
    }

    #[tokio::test]
    async fn test_search_ranks_related_first() {
        let store = lexicon_store();
        let now = Utc::now();
        put(
            &store,
            "Tell me about neural networks",
            "Neural networks are computing systems inspired by biological brains.",
            now - Duration::seconds(3),
        )
        .await;
        put(
            &store,
            "What is deep learning?",
            "Deep learning trains layered neural networks on large datasets.",
            now - Duration::seconds(2),
        )
        .await;
        put(
            &store,
            "What's the weather like today?",
            "It is sunny and warm with a light breeze.",
            now - Duration::seconds(1),
        )
        .await;

        let results = store
            .search(
                "artificial intelligence",
                &SearchOptions::default().limit(10).min_similarity(0.3),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| !r.memory.interaction.user_msg().contains("weather")));
        assert!(results[0].similarity >= results[1].similarity);

        let all = store
            .search("artificial intelligence", &SearchOptions::default().limit(10))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[2].memory.interaction.user_msg().contains("weather"));
        assert!(all.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn test_search_unrelated_query_ranks_low() {
        let store = lexicon_store();
        let now = Utc::now();
        put(&store, "How do robots learn?", "Robots learn with reinforcement learning algorithms.", now).await;
        put(&store, "Is AI dangerous?", "Artificial intelligence has risks and benefits.", now).await;

        let results = store
            .search("weather forecast", &SearchOptions::default().min_similarity(0.3))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_time_range() {
        let store = lexicon_store();
        let now = Utc::now();
        put(&store, "neural networks one", "about ai", now - Duration::hours(3)).await;
        let middle = put(&store, "neural networks two", "about ai", now - Duration::hours(2)).await;
        put(&store, "neural networks three", "about ai", now - Duration::hours(1)).await;

        let start = now - Duration::minutes(150);
        let end = now - Duration::minutes(90);
        let results = store
            .search("neural", &SearchOptions::default().time_range(start, end))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.id(), middle.id());
        assert!(results
            .iter()
            .all(|r| r.memory.timestamp() >= start && r.memory.timestamp() <= end));
    }

    #[tokio::test]
    async fn test_search_ties_prefer_recent() {
        let store = EpisodicStore::in_memory(Arc::new(ConstantEmbedder), 0.5);
        let now = Utc::now();
        let old = put(&store, "first", "one", now - Duration::seconds(10)).await;
        let new = put(&store, "second", "two", now).await;
        let mid = put(&store, "third", "three", now - Duration::seconds(5)).await;

        let results = store.search("anything", &SearchOptions::default()).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.memory.id()).collect();
        assert_eq!(ids, vec![new.id(), mid.id(), old.id()]);
    }

    #[tokio::test]
    async fn test_search_limit_and_empty() {
        let store = EpisodicStore::in_memory(Arc::new(ConstantEmbedder), 0.5);
        assert!(store.search("q", &SearchOptions::default()).await.unwrap().is_empty());

        let now = Utc::now();
        for n in 0..4 {
            put(&store, &format!("m{n}"), "r", now + Duration::seconds(n)).await;
        }
        let results = store
            .search("q", &SearchOptions::default().limit(2))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(store
            .search("q", &SearchOptions::default().limit(0))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_search_validation() {
        let store = lexicon_store();
        let now = Utc::now();
        assert!(matches!(
            store
                .search("q", &SearchOptions::default().min_similarity(1.5))
                .await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store
                .search("q", &SearchOptions::default().time_range(now, now - Duration::hours(1)))
                .await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_embedder_is_explicit() {
        let store = EpisodicStore::in_memory(Arc::new(FailingEmbedder), 0.5);
        let err = store.search("anything", &SearchOptions::default()).await;
        assert!(matches!(err, Err(Error::EmbeddingUnavailable(_))));

        let interaction = interaction_at("hello there", "hi", Utc::now());
        let err = store.store(interaction, BTreeSet::new(), true).await;
        assert!(matches!(err, Err(Error::EmbeddingUnavailable(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_dimension_embedder_is_explicit() {
        let store = EpisodicStore::in_memory(Arc::new(ShortEmbedder), 0.5);
        let interaction = interaction_at("hello there", "hi", Utc::now());
        assert!(matches!(
            store.store(interaction, BTreeSet::new(), true).await,
            Err(Error::EmbeddingUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_find_by_tag_and_stats() {
        let store = lexicon_store();
        let now = Utc::now();
        put(&store, "My project deadline is Friday", "Let's plan the tasks.", now - Duration::seconds(2)).await;
        let latest = put(&store, "The team meeting ran long", "Meetings can drag.", now).await;
        put(&store, "I love pizza", "Pizza is great.", now - Duration::seconds(1)).await;

        let work = store.find_by_tag("work");
        assert_eq!(work.len(), 2);
        assert_eq!(work[0].id(), latest.id());

        let stats = store.stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.tag_counts.get("work"), Some(&2));
        assert_eq!(stats.tag_counts.get("food"), Some(&1));
        assert_eq!(stats.newest, Some(latest.timestamp()));
        assert!(stats.oldest < stats.newest);
        assert!(stats.avg_importance > 0.0);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = lexicon_store();
        let memory = put(&store, "neural nets", "yes", Utc::now()).await;

        let removed = store.remove(&memory.id()).await.unwrap();
        assert_eq!(removed.map(|m| m.id()), Some(memory.id()));
        assert!(store.is_empty());
        assert!(store.remove(&memory.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_folds() {
        let store = lexicon_store();
        let now = Utc::now();
        let a = put(&store, "I like tea", "ok", now - Duration::seconds(2)).await;
        let b = put(&store, "I like tea", "ok", now - Duration::seconds(1)).await;
        let c = put(&store, "neural nets", "ai", now).await;

        let tags: BTreeSet<String> = ["preference", "food", "extra"]
            .into_iter()
            .map(String::from)
            .collect();
        let removed = store
            .apply_folds(&[Fold {
                keep: b.id(),
                remove: vec![a.id()],
                tags: tags.clone(),
            }])
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.get(&a.id()).is_none());
        assert_eq!(store.get(&b.id()).unwrap().tags, tags);
        assert!(store.get(&c.id()).is_some());
    }

    #[tokio::test]
    async fn test_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        let store = lexicon_store();
        let now = Utc::now();
        put(&store, "neural networks", "ai stuff", now).await;
        put(&store, "I love jazz", "great", now + Duration::seconds(1)).await;

        let written = store.export(&path, &ExportOptions::default()).await.unwrap();
        assert_eq!(written, 2);

        let parsed: Vec<ExportRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), store.len());
        assert!(parsed.iter().all(|r| r.embedding.is_none()));
        assert_eq!(parsed[1].user_msg, "I love jazz");

        store
            .export(
                &path,
                &ExportOptions {
                    include_embeddings: true,
                },
            )
            .await
            .unwrap();
        let parsed: Vec<ExportRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(parsed.iter().all(|r| r.embedding.is_some()));
    }

    #[tokio::test]
    async fn test_durable_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodic.jsonl");
        let embedder: Arc<dyn Embedder> = Arc::new(LexiconEmbedder::default());

        let id = {
            let store = EpisodicStore::open(JsonLog::new(&path), embedder.clone(), 0.5)
                .await
                .unwrap();
            let memory = put(&store, "neural networks", "ai", Utc::now()).await;
            put(&store, "deep learning", "ai", Utc::now()).await;
            memory.id()
        };

        let reopened = EpisodicStore::open(JsonLog::new(&path), embedder, 0.5)
            .await
            .unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.get(&id).unwrap().interaction.user_msg(),
            "neural networks"
        );
    }

    #[tokio::test]
    async fn test_reload_reembeds_on_dimension_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodic.jsonl");

        {
            let store = EpisodicStore::open(
                JsonLog::new(&path),
                Arc::new(LexiconEmbedder::new(8)),
                0.5,
            )
            .await
            .unwrap();
            put(&store, "neural networks", "ai", Utc::now()).await;
        }

        let bigger = LexiconEmbedder::new(32);
        let dims = bigger.dimensions();
        let reopened = EpisodicStore::open(JsonLog::new(&path), Arc::new(bigger), 0.5)
            .await
            .unwrap();
        assert_eq!(reopened.all()[0].embedding.len(), dims);
    }

    #[tokio::test]
    async fn test_torn_trailing_line_does_not_swallow_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodic.jsonl");
        let embedder: Arc<dyn Embedder> = Arc::new(LexiconEmbedder::default());

        {
            let store = EpisodicStore::open(JsonLog::new(&path), embedder.clone(), 0.5)
                .await
                .unwrap();
            put(&store, "neural networks", "ai", Utc::now()).await;
        }
        // Simulate a crash midway through an append.
        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(br#"{"interaction":{"id":"abc"#);
        std::fs::write(&path, data).unwrap();

        {
            let store = EpisodicStore::open(JsonLog::new(&path), embedder.clone(), 0.5)
                .await
                .unwrap();
            assert_eq!(store.len(), 1);
            put(&store, "deep learning", "ai", Utc::now()).await;
        }

        let reopened = EpisodicStore::open(JsonLog::new(&path), embedder, 0.5)
            .await
            .unwrap();
        assert_eq!(reopened.len(), 2);
        let contents = JsonLog::new(&path).load::<Memory>().await.unwrap();
        assert_eq!(contents.skipped, 0);
    }
}
