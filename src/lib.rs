//! SafeClaw Memory - tiered conversational memory store
//!
//! Retains, scores, searches and consolidates the interaction history and
//! long-term facts of a conversational agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          MemoryStore                             │
//! │                                                                  │
//! │  remember(user, assistant, force)                                │
//! │     │                                                            │
//! │     ▼                                                            │
//! │  ImportanceScorer + TagExtractor (once per interaction)          │
//! │     │                                                            │
//! │     ├──────────────► WorkingMemory   (bounded FIFO, always)      │
//! │     │                                                            │
//! │     └── score > threshold or force                               │
//! │                 └──► EpisodicStore   (embedded, searchable,      │
//! │                          │            episodic.jsonl)            │
//! │                          │                                       │
//! │            ConsolidationWorker (interval + on demand)            │
//! │                          │                                       │
//! │                          ▼                                       │
//! │                      CoreMemory      (dotted-path facts,         │
//! │                                       core.json)                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`store`]: The `MemoryStore` facade and its lifecycle
//! - [`memory`]: Working, episodic and core tiers, scoring, tagging, consolidation
//! - [`embedding`]: Embedding capability and the built-in lexicon embedder
//! - [`worker`]: Background consolidation task
//! - [`storage`]: Atomic documents, append-only logs and the directory lock
//! - [`config`]: Configuration management

pub mod config;
pub mod embedding;
pub mod error;
pub mod lexicon;
pub mod memory;
pub mod storage;
pub mod store;
pub mod worker;

pub use config::MemoryConfig;
pub use embedding::{Embedder, LexiconEmbedder};
pub use error::{Error, Result};
pub use store::{MemoryStats, MemoryStore};
