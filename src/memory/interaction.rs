//! Interaction and episodic memory record types
//!
//! An `Interaction` is one immutable user/assistant exchange. Its importance
//! score is computed exactly once, by `InteractionBuilder::build`, and there
//! is no API that changes it afterwards. A `Memory` wraps an interaction
//! promoted into episodic storage together with its tags and embedding.

use super::scorer::ImportanceScorer;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;
use zeroize::Zeroize;

/// One user/assistant exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    id: Uuid,
    user_msg: String,
    assistant_msg: String,
    timestamp: DateTime<Utc>,
    importance_score: f32,
}

impl Interaction {
    /// Unique interaction identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// What the user said
    pub fn user_msg(&self) -> &str {
        &self.user_msg
    }

    /// What the assistant replied
    pub fn assistant_msg(&self) -> &str {
        &self.assistant_msg
    }

    /// When the exchange was ingested
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Importance in [0, 1], fixed at creation
    pub fn importance_score(&self) -> f32 {
        self.importance_score
    }

    /// Text used for embedding and similarity.
    pub fn text(&self) -> String {
        format!("{}\n{}", self.user_msg, self.assistant_msg)
    }

    /// Zeroize message text before the value is dropped.
    pub(crate) fn erase(&mut self) {
        self.user_msg.zeroize();
        self.assistant_msg.zeroize();
    }
}

/// Builder for constructing `Interaction` instances
pub struct InteractionBuilder {
    user_msg: String,
    assistant_msg: String,
    timestamp: Option<DateTime<Utc>>,
}

impl InteractionBuilder {
    /// Create a new builder with the two sides of the exchange
    pub fn new(user_msg: impl Into<String>, assistant_msg: impl Into<String>) -> Self {
        Self {
            user_msg: user_msg.into(),
            assistant_msg: assistant_msg.into(),
            timestamp: None,
        }
    }

    /// Set the ingestion timestamp (defaults to now)
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validate and score the interaction.
    ///
    /// Fails with `Error::Validation` if either side is blank.
    pub fn build(self, scorer: &ImportanceScorer) -> Result<Interaction> {
        if self.user_msg.trim().is_empty() {
            return Err(Error::Validation("user message is empty".to_string()));
        }
        if self.assistant_msg.trim().is_empty() {
            return Err(Error::Validation("assistant message is empty".to_string()));
        }

        let importance_score = scorer.score(&self.user_msg, &self.assistant_msg);

        Ok(Interaction {
            id: Uuid::new_v4(),
            user_msg: self.user_msg,
            assistant_msg: self.assistant_msg,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            importance_score,
        })
    }
}

/// An interaction promoted into episodic memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// The stored exchange
    pub interaction: Interaction,
    /// Category tags
    pub tags: BTreeSet<String>,
    /// Similarity embedding; opaque to callers
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl Memory {
    /// Shortcut for the wrapped interaction's id
    pub fn id(&self) -> Uuid {
        self.interaction.id
    }

    /// Shortcut for the wrapped interaction's timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.interaction.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let ts = Utc::now() - chrono::Duration::minutes(5);
        let interaction = InteractionBuilder::new("I love jazz", "Great taste!")
            .timestamp(ts)
            .build(&ImportanceScorer::new())
            .unwrap();

        assert_eq!(interaction.user_msg(), "I love jazz");
        assert_eq!(interaction.assistant_msg(), "Great taste!");
        assert_eq!(interaction.timestamp(), ts);
        assert!(interaction.importance_score() > 0.3);
        assert_eq!(interaction.text(), "I love jazz\nGreat taste!");
    }

    #[test]
    fn test_builder_rejects_blank() {
        let scorer = ImportanceScorer::new();
        assert!(matches!(
            InteractionBuilder::new("", "reply").build(&scorer),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            InteractionBuilder::new("hello", "   ").build(&scorer),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let scorer = ImportanceScorer::new();
        let a = InteractionBuilder::new("same", "text").build(&scorer).unwrap();
        let b = InteractionBuilder::new("same", "text").build(&scorer).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.importance_score(), b.importance_score());
    }

    #[test]
    fn test_erase() {
        let mut interaction = InteractionBuilder::new("secret", "reply")
            .build(&ImportanceScorer::new())
            .unwrap();
        interaction.erase();
        assert!(interaction.user_msg().is_empty());
        assert!(interaction.assistant_msg().is_empty());
    }

    #[test]
    fn test_memory_serialization_shape() {
        let interaction = InteractionBuilder::new("hi there", "hello")
            .build(&ImportanceScorer::new())
            .unwrap();
        let memory = Memory {
            interaction,
            tags: ["work".to_string()].into_iter().collect(),
            embedding: vec![0.5, 0.5],
        };

        let json = serde_json::to_value(&memory).unwrap();
        assert_eq!(json["interaction"]["user_msg"], "hi there");
        assert_eq!(json["tags"][0], "work");

        let back: Memory = serde_json::from_value(json).unwrap();
        assert_eq!(back.interaction, memory.interaction);
    }
}
