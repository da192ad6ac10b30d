//! Heuristic importance scoring
//!
//! An interaction's importance is computed once, from its text, as:
//!
//! ```text
//! base + Σ(signal family weights, each family counted once) + length bonus
//! ```
//!
//! The length bonus saturates (`max_length_bonus * (1 - e^(-chars / length_scale))`),
//! and generic acknowledgements ("ok", "sure", "thanks") are capped low
//! regardless of what the assistant said back. The result is clamped to [0, 1].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Tunable weights for importance scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceWeights {
    /// Score every interaction starts with
    pub base: f32,
    /// First-person emotional language ("I feel", "I'm excited")
    pub emotional: f32,
    /// Stated preferences ("I prefer", "my favorite")
    pub preference: f32,
    /// Personal or biographical disclosure ("my sister", "I live in")
    pub personal: f32,
    /// Decisions and commitments ("I've decided", "I'm going to")
    pub decision: f32,
    /// Upper bound of the length bonus
    pub max_length_bonus: f32,
    /// Characters at which the length bonus reaches ~63% of its maximum
    pub length_scale: f32,
    /// Ceiling for generic acknowledgements
    pub generic_cap: f32,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            base: 0.1,
            emotional: 0.3,
            preference: 0.25,
            personal: 0.2,
            decision: 0.2,
            max_length_bonus: 0.2,
            length_scale: 200.0,
            generic_cap: 0.15,
        }
    }
}

/// Which signal families fired for a piece of text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub emotional: bool,
    pub preference: bool,
    pub personal: bool,
    pub decision: bool,
}

struct Patterns {
    emotional: Regex,
    preference: Regex,
    personal: Regex,
    decision: Regex,
    generic: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        emotional: Regex::new(
            r"(?i)\bi\s+(?:really\s+)?(?:feel|felt|love|hate|miss|adore)\b|\bi(?:'m|\s+am)\s+(?:so\s+|really\s+|very\s+|feeling\s+)?(?:excited|happy|sad|anxious|worried|nervous|thrilled|scared|upset|stressed|grateful|frustrated|lonely|proud|overwhelmed|depressed)\b",
        )
        .expect("emotional pattern is valid"),
        preference: Regex::new(
            r"(?i)\bi\s+(?:really\s+|much\s+|generally\s+)?(?:prefer|like|love|enjoy|dislike)\b|\bmy\s+favou?rite\b|\bi(?:'d|\s+would)\s+rather\b",
        )
        .expect("preference pattern is valid"),
        personal: Regex::new(
            r"(?i)\bmy\s+(?:\w+\s+)?(?:name|birthday|wife|husband|partner|son|daughter|kids?|children|mom|mother|dad|father|sister|brother|family|job|home|dog|cat|friend|hometown)\b|\bi\s+(?:live|work|grew\s+up|was\s+born|study)\b|\bi(?:'m|\s+am)\s+\d+\s+years?\s+old\b",
        )
        .expect("personal pattern is valid"),
        decision: Regex::new(
            r"(?i)\bi(?:'ve|\s+have)?\s+decided\b|\bi(?:'m|\s+am)\s+going\s+to\b|\bi(?:'ll|\s+will)\b|\bi\s+(?:promise|plan\s+to|commit\s+to)\b|\bmy\s+goal\b",
        )
        .expect("decision pattern is valid"),
        generic: Regex::new(
            r"(?i)^\s*(?:ok(?:ay)?|sure|yes|yeah|yep|no|nope|thanks?(?:\s+you)?|hi|hello|hey|cool|nice|got\s+it|fine|k)\s*[.!?]*\s*$",
        )
        .expect("generic pattern is valid"),
    })
}

/// Deterministic importance scorer.
#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    weights: ImportanceWeights,
}

impl ImportanceScorer {
    /// Create a scorer with default weights
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scorer with custom weights
    pub fn with_weights(weights: ImportanceWeights) -> Self {
        Self { weights }
    }

    /// Detect signal families in the user's side of an exchange.
    pub fn signals(&self, text: &str) -> Signals {
        let p = patterns();
        Signals {
            emotional: p.emotional.is_match(text),
            preference: p.preference.is_match(text),
            personal: p.personal.is_match(text),
            decision: p.decision.is_match(text),
        }
    }

    /// Score an exchange. Pure and total: always returns a value in [0, 1].
    pub fn score(&self, user_msg: &str, assistant_msg: &str) -> f32 {
        let w = &self.weights;
        let signals = self.signals(user_msg);

        let mut score = w.base;
        if signals.emotional {
            score += w.emotional;
        }
        if signals.preference {
            score += w.preference;
        }
        if signals.personal {
            score += w.personal;
        }
        if signals.decision {
            score += w.decision;
        }

        let chars = (user_msg.chars().count() + assistant_msg.chars().count()) as f32;
        if w.length_scale > 0.0 {
            score += w.max_length_bonus * (1.0 - (-chars / w.length_scale).exp());
        }

        if patterns().generic.is_match(user_msg) {
            score = score.min(w.generic_cap);
        }

        if score.is_nan() {
            return 0.0;
        }
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_exchange_scores_low() {
        let scorer = ImportanceScorer::new();
        assert!(scorer.score("ok", "sure") < 0.3);
        assert!(scorer.score("Sure!", "Great, let me know if you need anything else.") < 0.3);
        assert!(scorer.score("thanks", "You're welcome.") < 0.3);
    }

    #[test]
    fn test_emotional_preference_scores_high() {
        let scorer = ImportanceScorer::new();
        let score = scorer.score(
            "I'm so excited about my new job! I really prefer working on AI projects.",
            "That's wonderful news, congratulations on the new role!",
        );
        assert!(score > 0.5, "score {score} should exceed 0.5");
    }

    #[test]
    fn test_score_is_clamped() {
        let scorer = ImportanceScorer::with_weights(ImportanceWeights {
            base: 0.9,
            emotional: 0.9,
            ..ImportanceWeights::default()
        });
        let long = "I feel great. ".repeat(200);
        let score = scorer.score(&long, &long);
        assert!((score - 1.0).abs() < f32::EPSILON);

        let scorer = ImportanceScorer::with_weights(ImportanceWeights {
            base: -5.0,
            ..ImportanceWeights::default()
        });
        assert_eq!(scorer.score("hello there", ""), 0.0);
    }

    #[test]
    fn test_length_bonus_saturates() {
        let scorer = ImportanceScorer::new();
        let short = scorer.score("Tell me about tides", "They follow the moon.");
        let long = scorer.score(&"Tell me about tides ".repeat(50), "They follow the moon.");
        let longer = scorer.score(&"Tell me about tides ".repeat(500), "They follow the moon.");

        assert!(long > short);
        assert!(longer >= long);
        assert!(longer <= 0.1 + 0.2 + f32::EPSILON);
    }

    #[test]
    fn test_signals() {
        let scorer = ImportanceScorer::new();
        let s = scorer.signals("I've decided to move. My sister lives nearby.");
        assert!(s.decision);
        assert!(s.personal);
        assert!(!s.preference);

        let s = scorer.signals("my favorite color is green");
        assert!(s.preference);

        let s = scorer.signals("I feel anxious today");
        assert!(s.emotional);
    }

    #[test]
    fn test_deterministic() {
        let scorer = ImportanceScorer::new();
        let a = scorer.score("I love hiking in the mountains", "Sounds fun");
        let b = scorer.score("I love hiking in the mountains", "Sounds fun");
        assert_eq!(a, b);
    }
}
