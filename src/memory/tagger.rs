//! Keyword-based tag extraction
//!
//! Tags are category labels drawn from four families: work/task, emotional,
//! preference and topical. Both sides of the exchange are scanned; any number
//! of tags (including none) may apply.

use crate::lexicon::{self, Family};
use std::collections::BTreeSet;

/// Deterministic tag extractor.
pub struct TagExtractor;

impl TagExtractor {
    /// Extract category tags from an exchange.
    pub fn extract(user_msg: &str, assistant_msg: &str) -> BTreeSet<String> {
        let mut tokens = lexicon::tokenize(user_msg);
        tokens.extend(lexicon::tokenize(assistant_msg));

        let families: [&Family; 2] = [&lexicon::EMOTIONAL, &lexicon::PREFERENCE];
        families
            .into_iter()
            .chain(lexicon::TOPICS.iter())
            .filter(|family| family.hits(&tokens) > 0)
            .map(|family| family.name.to_string())
            .collect()
    }
}
