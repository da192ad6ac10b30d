//! `MemoryStore`: the tiered memory facade
//!
//! Every inbound exchange is scored and tagged once, stored in episodic
//! memory when it qualifies, and always appended to working memory.
//! Recall reads episodic memory; context reads working memory; facts live
//! in core memory. Consolidation runs on a background worker and reads
//! episodic memory to write core memory.
//!
//! `open` acquires the data directory lock and `close` releases it. The lock
//! guard is owned by the store, so dropping the store on any path releases
//! it as well.

use crate::config::{ConsolidationConfig, MemoryConfig};
use crate::embedding::{Embedder, LexiconEmbedder};
use crate::error::{Error, Result};
use crate::memory::consolidation::{ConsolidationReport, Consolidator};
use crate::memory::core::{CoreMemory, FactValue};
use crate::memory::episodic::{
    EpisodicStats, EpisodicStore, ExportOptions, ScoredMemory, SearchOptions,
};
use crate::memory::interaction::{Interaction, InteractionBuilder, Memory};
use crate::memory::scorer::ImportanceScorer;
use crate::memory::tagger::TagExtractor;
use crate::memory::working::WorkingMemory;
use crate::storage::{JsonDocument, JsonLog, StoreLock};
use crate::worker::{Consolidate, ConsolidationWorker};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// Working memory counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingStats {
    pub count: usize,
    pub capacity: usize,
}

/// Core memory counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreStats {
    /// Number of leaf facts
    pub count: usize,
}

/// Consolidation history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationStats {
    pub runs: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_report: Option<ConsolidationReport>,
}

/// Point-in-time statistics across all tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub working_memory: WorkingStats,
    pub episodic_memory: EpisodicStats,
    pub core_memory: CoreStats,
    pub consolidation: ConsolidationStats,
}

/// The durable tiers, shared with the consolidation worker.
struct Tiers {
    episodic: EpisodicStore,
    core: CoreMemory,
    consolidation: ConsolidationConfig,
    /// Serializes passes started outside the worker
    pass_gate: tokio::sync::Mutex<()>,
    history: Mutex<ConsolidationStats>,
}

#[async_trait]
impl Consolidate for Tiers {
    async fn consolidate(&self) -> Result<ConsolidationReport> {
        let _gate = self.pass_gate.lock().await;

        let memories = self.episodic.all();
        let plan = Consolidator::plan(&memories, &self.core.snapshot(), &self.consolidation);

        // Folds first: facts are only promoted once the collection they were
        // derived from is durable.
        let folded = self.episodic.apply_folds(&plan.folds).await?;
        let facts_written = self.core.set_many(plan.facts).await?;

        let report = ConsolidationReport {
            scanned: memories.len(),
            folded,
            facts_written,
            finished_at: Some(Utc::now()),
        };

        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.runs += 1;
            history.last_run = report.finished_at;
            history.last_report = Some(report.clone());
        }

        tracing::info!(
            scanned = report.scanned,
            folded = report.folded,
            facts = report.facts_written,
            "Consolidation pass complete"
        );
        Ok(report)
    }
}

/// Tiered conversational memory store
pub struct MemoryStore {
    config: MemoryConfig,
    working: WorkingMemory,
    tiers: Arc<Tiers>,
    scorer: ImportanceScorer,
    /// Last timestamp handed out
    clock: Mutex<Option<DateTime<Utc>>>,
    worker: tokio::sync::Mutex<Option<ConsolidationWorker>>,
    lock: Mutex<Option<StoreLock>>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Open a store with the built-in lexicon embedder.
    pub async fn open_default(config: MemoryConfig) -> Result<Self> {
        let embedder = Arc::new(LexiconEmbedder::new(config.embedding.dimensions));
        Self::open(config, embedder).await
    }

    /// Open the store under `config.storage.base_dir`.
    ///
    /// Fails with `Error::Locked` if another store holds the directory.
    pub async fn open(config: MemoryConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        if embedder.dimensions() == 0 {
            return Err(Error::Config("embedder reports zero dimensions".to_string()));
        }

        let storage = &config.storage;
        let lock = StoreLock::acquire(storage.lock_path())?;

        let episodic = EpisodicStore::open(
            JsonLog::new(storage.episodic_path()),
            embedder,
            config.episodic.promotion_threshold,
        )
        .await?;
        let core = CoreMemory::open(JsonDocument::new(storage.core_path())).await?;

        let tiers = Arc::new(Tiers {
            episodic,
            core,
            consolidation: config.consolidation.clone(),
            pass_gate: tokio::sync::Mutex::new(()),
            history: Mutex::new(ConsolidationStats::default()),
        });

        let worker = config.consolidation.enabled.then(|| {
            let interval = (config.consolidation.interval_secs > 0)
                .then(|| Duration::from_secs(config.consolidation.interval_secs));
            ConsolidationWorker::spawn(tiers.clone(), interval)
        });

        tracing::info!(
            base_dir = %storage.base_dir.display(),
            episodic = tiers.episodic.len(),
            facts = tiers.core.count(),
            "Memory store opened"
        );

        Ok(Self {
            working: WorkingMemory::new(config.working.max_size),
            config,
            tiers,
            scorer: ImportanceScorer::new(),
            clock: Mutex::new(None),
            worker: tokio::sync::Mutex::new(worker),
            lock: Mutex::new(Some(lock)),
            closed: AtomicBool::new(false),
        })
    }

    /// Stop the worker and release the data directory.
    ///
    /// Closing twice is a no-op. The lock is released even when the worker
    /// fails to stop cleanly.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let worker = self.worker.lock().await.take();
        let stopped = match worker {
            Some(worker) => worker.shutdown().await,
            None => Ok(()),
        };

        self.working.clear();
        drop(self.lock.lock().unwrap_or_else(PoisonError::into_inner).take());
        tracing::info!(base_dir = %self.config.storage.base_dir.display(), "Memory store closed");
        stopped
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Strictly increasing timestamps, even if the wall clock stalls or steps back.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let ts = match *last {
            Some(prev) if now <= prev => prev + ChronoDuration::microseconds(1),
            _ => now,
        };
        *last = Some(ts);
        ts
    }

    /// Ingest one exchange and return its id.
    ///
    /// The exchange always enters working memory; it is stored in episodic
    /// memory when `force` is set or its importance clears the threshold.
    /// Nothing is mutated if validation, embedding or the episodic write fails.
    pub async fn remember(&self, user_msg: &str, assistant_msg: &str, force: bool) -> Result<Uuid> {
        self.ensure_open()?;

        let interaction = InteractionBuilder::new(user_msg, assistant_msg)
            .timestamp(self.next_timestamp())
            .build(&self.scorer)?;
        let id = interaction.id();
        let tags = TagExtractor::extract(interaction.user_msg(), interaction.assistant_msg());

        let stored = self
            .tiers
            .episodic
            .store(interaction.clone(), tags, force)
            .await?;
        self.working.append(interaction);

        tracing::debug!(id = %id, stored = stored.is_some(), "Interaction remembered");
        Ok(id)
    }

    /// Search options seeded from the configured default limit
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions::default().limit(self.config.episodic.default_limit)
    }

    /// Rank episodic memories by similarity to `query`.
    pub async fn recall(&self, query: &str, options: &SearchOptions) -> Result<Vec<ScoredMemory>> {
        self.ensure_open()?;
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }
        self.tiers.episodic.search(query, options).await
    }

    /// Episodic memories carrying `tag`, most recent first
    pub fn recall_by_tag(&self, tag: &str) -> Result<Vec<Memory>> {
        self.ensure_open()?;
        Ok(self.tiers.episodic.find_by_tag(tag))
    }

    /// Working memory, most recent first
    pub fn context(&self) -> Result<Vec<Interaction>> {
        self.ensure_open()?;
        Ok(self.working.context())
    }

    /// Working memory rendered as conversation turns, oldest first
    pub fn context_prompt(&self) -> Result<String> {
        self.ensure_open()?;
        Ok(self.working.render())
    }

    /// Empty working memory.
    pub fn clear_context(&self) -> Result<()> {
        self.ensure_open()?;
        self.working.clear();
        Ok(())
    }

    /// Read a fact, or the whole tree when `key` is `None`.
    pub fn know(&self, key: Option<&str>) -> Result<Option<FactValue>> {
        self.ensure_open()?;
        Ok(self.tiers.core.get(key))
    }

    /// Write a fact through to disk.
    pub async fn set_fact(&self, key: &str, value: FactValue) -> Result<()> {
        self.ensure_open()?;
        self.tiers.core.set(key, value).await
    }

    /// Delete a fact or sub-tree. Returns whether anything was removed.
    pub async fn forget(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        self.tiers.core.delete(key).await
    }

    /// Delete one episodic memory by id.
    pub async fn forget_memory(&self, id: &Uuid) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.tiers.episodic.remove(id).await?.is_some())
    }

    pub fn stats(&self) -> Result<MemoryStats> {
        self.ensure_open()?;
        Ok(MemoryStats {
            working_memory: WorkingStats {
                count: self.working.len(),
                capacity: self.working.capacity(),
            },
            episodic_memory: self.tiers.episodic.stats(),
            core_memory: CoreStats {
                count: self.tiers.core.count(),
            },
            consolidation: self
                .tiers
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        })
    }

    /// Run one consolidation pass and wait for it.
    ///
    /// The pass runs on its own task, so dropping this future does not
    /// interrupt it halfway.
    pub async fn consolidate(&self) -> Result<ConsolidationReport> {
        self.ensure_open()?;

        if let Some(worker) = self.worker.lock().await.as_ref() {
            return worker.run_now().await;
        }

        let tiers = Arc::clone(&self.tiers);
        tokio::spawn(async move { tiers.consolidate().await })
            .await
            .map_err(|e| Error::Worker(format!("consolidation task failed: {e}")))?
    }

    /// Write every episodic memory to `path` as a JSON list.
    pub async fn export(&self, path: &Path) -> Result<usize> {
        self.export_with(path, &ExportOptions::default()).await
    }

    pub async fn export_with(&self, path: &Path, options: &ExportOptions) -> Result<usize> {
        self.ensure_open()?;
        self.tiers.episodic.export(path, options).await
    }
}
