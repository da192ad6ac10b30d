//! Rule-based consolidation of episodic memory
//!
//! The Consolidator examines the episodic collection and produces a
//! `ConsolidationPlan`. Rules are deterministic (no LLM):
//!
//! 1. **Duplicate folding**: memories whose normalized text fingerprints
//!    match are folded into the most recent copy; tags are unioned.
//! 2. **Preference promotion**: "I like/love/prefer/enjoy X" stated in
//!    ≥`min_occurrences` distinct memories becomes
//!    `preferences.likes.<x>`; "my favorite T is V" becomes
//!    `preferences.favorite.<t>` with the most recent V.
//! 3. **Tag frequency**: tags carried by ≥`min_occurrences` distinct
//!    memories become `insights.topics.<tag>`.
//!
//! Planning never mutates anything. Facts whose value is already present in
//! core memory are left out of the plan, so consolidating unchanged data
//! twice produces an empty second plan.

use super::core::{split_key, FactTree, FactValue};
use super::episodic::Fold;
use super::interaction::Memory;
use crate::config::ConsolidationConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;
use uuid::Uuid;

/// Words that make a poor preference object on their own.
const VAGUE_OBJECTS: &[&str] = &[
    "it", "that", "this", "them", "you", "him", "her", "those", "these", "one", "so",
];

/// What a consolidation pass intends to change.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationPlan {
    /// Duplicate groups to fold in episodic memory
    pub folds: Vec<Fold>,
    /// Facts to write into core memory, in key order
    pub facts: Vec<(String, FactValue)>,
}

impl ConsolidationPlan {
    pub fn is_empty(&self) -> bool {
        self.folds.is_empty() && self.facts.is_empty()
    }
}

/// Outcome of an applied consolidation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Memories scanned
    pub scanned: usize,
    /// Duplicate memories removed
    pub folded: usize,
    /// Core facts that changed
    pub facts_written: usize,
    /// When the pass finished
    pub finished_at: Option<DateTime<Utc>>,
}

struct Patterns {
    likes: Regex,
    favorite: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        likes: Regex::new(
            r"(?i)\bi\s+(?:really\s+|also\s+|just\s+|absolutely\s+)?(?:like|love|prefer|enjoy)\s+([a-z][a-z' -]{0,40}?)(?:[.!?,;]|\s+(?:over|more|than|because|and|but|when|so|a\s+lot)\b|$)",
        )
        .expect("likes pattern is valid"),
        favorite: Regex::new(
            r"(?i)\bmy\s+favou?rite\s+([a-z]+(?:\s+[a-z]+)?)\s+is\s+([a-z0-9][a-z0-9' -]{0,40}?)(?:[.!?,;]|\s+(?:because|and|but)\b|$)",
        )
        .expect("favorite pattern is valid"),
    })
}

/// Rule-based consolidation planner.
pub struct Consolidator;

impl Consolidator {
    /// Build a plan from the episodic collection and the current fact tree.
    pub fn plan(
        memories: &[Memory],
        core: &FactTree,
        config: &ConsolidationConfig,
    ) -> ConsolidationPlan {
        let (folds, representatives) = if config.dedupe {
            Self::fold_duplicates(memories)
        } else {
            let reps = memories
                .iter()
                .filter(|m| !fingerprint_source(m).is_empty())
                .map(|m| (m, m.tags.clone()))
                .collect();
            (Vec::new(), reps)
        };

        let min = config.min_occurrences.max(2);
        let mut candidates: BTreeMap<String, FactValue> = BTreeMap::new();
        candidates.extend(Self::preference_facts(&representatives, min));
        candidates.extend(Self::topic_facts(&representatives, min));

        let facts = candidates
            .into_iter()
            .filter(|(key, value)| current_value(core, key) != Some(value))
            .collect();

        ConsolidationPlan { folds, facts }
    }

    /// Rule 1: group by normalized fingerprint, keep the most recent copy.
    ///
    /// Returns the folds plus every surviving memory with its merged tags.
    fn fold_duplicates(memories: &[Memory]) -> (Vec<Fold>, Vec<(&Memory, BTreeSet<String>)>) {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<&Memory>> = HashMap::new();

        for memory in memories {
            let source = fingerprint_source(memory);
            if source.is_empty() {
                tracing::debug!(id = %memory.id(), "Skipping memory with empty text");
                continue;
            }
            let fp = format!("{:x}", Sha256::digest(source.as_bytes()));
            let group = groups.entry(fp.clone()).or_default();
            if group.is_empty() {
                order.push(fp);
            }
            group.push(memory);
        }

        let mut folds = Vec::new();
        let mut representatives = Vec::new();
        for fp in order {
            let Some(group) = groups.get(&fp) else {
                continue;
            };
            // Later entries win ties, matching insertion order.
            let Some(keep) = group
                .iter()
                .copied()
                .reduce(|best, m| if m.timestamp() >= best.timestamp() { m } else { best })
            else {
                continue;
            };
            let tags: BTreeSet<String> = group.iter().flat_map(|m| m.tags.iter().cloned()).collect();

            if group.len() > 1 {
                let remove: Vec<Uuid> = group
                    .iter()
                    .map(|m| m.id())
                    .filter(|id| *id != keep.id())
                    .collect();
                folds.push(Fold {
                    keep: keep.id(),
                    remove,
                    tags: tags.clone(),
                });
            }
            representatives.push((keep, tags));
        }

        (folds, representatives)
    }

    /// Rule 2: repeated preference statements.
    fn preference_facts(
        memories: &[(&Memory, BTreeSet<String>)],
        min: usize,
    ) -> Vec<(String, FactValue)> {
        let p = patterns();

        // slug -> (mentions, last_seen, phrase)
        let mut likes: BTreeMap<String, (usize, DateTime<Utc>, String)> = BTreeMap::new();
        // thing -> (mentions, (timestamp, value) of latest statement)
        let mut favorites: BTreeMap<String, (usize, DateTime<Utc>, String)> = BTreeMap::new();

        for (memory, _) in memories {
            let text = memory.interaction.user_msg();
            let ts = memory.timestamp();

            let mut seen: BTreeSet<String> = BTreeSet::new();
            for caps in p.likes.captures_iter(text) {
                let Some(phrase) = caps.get(1).map(|m| clean_phrase(m.as_str())) else {
                    continue;
                };
                let slug = slugify(&phrase);
                if slug.is_empty() || VAGUE_OBJECTS.contains(&slug.as_str()) || !seen.insert(slug.clone()) {
                    continue;
                }
                let entry = likes.entry(slug).or_insert((0, ts, phrase.clone()));
                entry.0 += 1;
                if ts >= entry.1 {
                    entry.1 = ts;
                    entry.2 = phrase;
                }
            }

            let mut seen: BTreeSet<String> = BTreeSet::new();
            for caps in p.favorite.captures_iter(text) {
                let (Some(thing), Some(value)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                let thing = slugify(thing.as_str());
                let value = clean_phrase(value.as_str());
                if thing.is_empty() || value.is_empty() || !seen.insert(thing.clone()) {
                    continue;
                }
                let entry = favorites.entry(thing).or_insert((0, ts, value.clone()));
                entry.0 += 1;
                if ts >= entry.1 {
                    entry.1 = ts;
                    entry.2 = value;
                }
            }
        }

        let mut facts = Vec::new();
        for (slug, (mentions, last_seen, phrase)) in likes {
            if mentions >= min {
                facts.push((
                    format!("preferences.likes.{slug}"),
                    json!({
                        "value": phrase,
                        "mentions": mentions,
                        "last_seen": rfc3339(last_seen),
                    }),
                ));
            }
        }
        for (thing, (mentions, _, value)) in favorites {
            if mentions >= min {
                facts.push((format!("preferences.favorite.{thing}"), json!(value)));
            }
        }
        facts
    }

    /// Rule 3: frequently occurring tags.
    fn topic_facts(
        memories: &[(&Memory, BTreeSet<String>)],
        min: usize,
    ) -> Vec<(String, FactValue)> {
        let mut counts: BTreeMap<&str, (usize, DateTime<Utc>)> = BTreeMap::new();
        for (memory, tags) in memories {
            for tag in tags {
                let entry = counts.entry(tag.as_str()).or_insert((0, memory.timestamp()));
                entry.0 += 1;
                entry.1 = entry.1.max(memory.timestamp());
            }
        }

        counts
            .into_iter()
            .filter(|(tag, (count, _))| *count >= min && !slugify(tag).is_empty())
            .map(|(tag, (count, last_seen))| {
                (
                    format!("insights.topics.{}", slugify(tag)),
                    json!({ "count": count, "last_seen": rfc3339(last_seen) }),
                )
            })
            .collect()
    }
}

fn fingerprint_source(memory: &Memory) -> String {
    let user = normalize_whitespace(memory.interaction.user_msg());
    let assistant = normalize_whitespace(memory.interaction.assistant_msg());
    if user.is_empty() && assistant.is_empty() {
        return String::new();
    }
    format!("{user}\n{assistant}")
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn clean_phrase(phrase: &str) -> String {
    let mut phrase = phrase.trim().to_lowercase();
    for prefix in ["to ", "the ", "a ", "an "] {
        if let Some(rest) = phrase.strip_prefix(prefix) {
            phrase = rest.to_string();
        }
    }
    phrase.trim().to_string()
}

/// Lowercase key segment: alphanumerics joined by single underscores.
fn slugify(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn current_value<'a>(core: &'a FactTree, key: &str) -> Option<&'a FactValue> {
    let segments = split_key(key).ok()?;
    let (last, parents) = segments.split_last()?;
    let mut node = core;
    for segment in parents {
        node = node.get(*segment)?.as_object()?;
    }
    node.get(*last)
}
