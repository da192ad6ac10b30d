//! Memory system: three tiers plus consolidation
//!
//! Working (recent turns, bounded) → Episodic (important turns, searchable)
//! → Core (durable facts). Consolidation reads Episodic and writes Core.

pub mod consolidation;
pub mod core;
pub mod episodic;
pub mod interaction;
pub mod scorer;
pub mod tagger;
pub mod working;

pub use self::core::{CoreMemory, FactTree, FactValue};
pub use consolidation::{ConsolidationPlan, ConsolidationReport, Consolidator};
pub use episodic::{
    EpisodicStats, EpisodicStore, ExportOptions, ExportRecord, Fold, ScoredMemory, SearchOptions,
    TimeRange,
};
pub use interaction::{Interaction, InteractionBuilder, Memory};
pub use scorer::{ImportanceScorer, ImportanceWeights};
pub use tagger::TagExtractor;
pub use working::WorkingMemory;
