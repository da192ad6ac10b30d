//! Embedding capability
//!
//! The store never generates vectors itself; it calls an injected
//! [`Embedder`]. `LexiconEmbedder` is the built-in default: a deterministic,
//! dependency-free embedder that places text in a space of topic concept
//! dimensions followed by hashed token buckets. All components are
//! non-negative, so cosine similarity between two lexicon embeddings already
//! lies in [0, 1].

use crate::error::{Error, Result};
use crate::lexicon;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Weight of one concept hit relative to one hashed token.
const CONCEPT_WEIGHT: f32 = 3.0;

/// Text → vector capability used by episodic memory.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns
    fn dimensions(&self) -> usize;

    /// Embed a piece of text.
    ///
    /// Implementations report backend failures as `Error::EmbeddingUnavailable`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic topic-lexicon embedder.
#[derive(Debug, Clone)]
pub struct LexiconEmbedder {
    buckets: usize,
}

impl LexiconEmbedder {
    /// Create an embedder with `buckets` hashed token dimensions.
    pub fn new(buckets: usize) -> Self {
        Self {
            buckets: buckets.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) % self.buckets as u64) as usize
    }

    /// Synchronous embedding, exposed for tests and batch tools.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let concepts = lexicon::TOPICS.len();
        let mut vector = vec![0.0f32; concepts + self.buckets];

        let tokens = lexicon::tokenize(text);
        for token in &tokens {
            for (i, family) in lexicon::TOPICS.iter().enumerate() {
                if family.contains(token) {
                    vector[i] += CONCEPT_WEIGHT;
                }
            }
            vector[concepts + self.bucket(token)] += 1.0;
        }

        normalize(&mut vector);
        vector
    }
}

impl Default for LexiconEmbedder {
    fn default() -> Self {
        Self::new(128)
    }
}

#[async_trait]
impl Embedder for LexiconEmbedder {
    fn dimensions(&self) -> usize {
        lexicon::TOPICS.len() + self.buckets
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity clamped to [0, 1].
///
/// Opposed or orthogonal vectors score 0, as do zero-norm vectors.
/// Mismatched lengths are an error rather than a silent zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::EmbeddingUnavailable(format!(
            "dimension mismatch: expected {}, got {}",
            a.len(),
            b.len()
        )));
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let similarity = dot / (norm_a * norm_b);
    if similarity.is_nan() {
        return Ok(0.0);
    }
    Ok(similarity.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_clamps_negative() {
        let a = [1.0, 0.0];
        let b = [-1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        assert!(matches!(
            cosine_similarity(&[1.0], &[1.0, 2.0]),
            Err(Error::EmbeddingUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_lexicon_dimensions() {
        let embedder = LexiconEmbedder::new(16);
        let v = embedder.embed("neural networks").await.unwrap();
        assert_eq!(v.len(), embedder.dimensions());
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_lexicon_empty_text_is_zero_vector() {
        let embedder = LexiconEmbedder::default();
        let v = embedder.embed_text("the a of");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_lexicon_topics_cluster() {
        let embedder = LexiconEmbedder::default();
        let query = embedder.embed_text("artificial intelligence");
        let neural = embedder.embed_text(
            "Tell me about neural networks\nNeural networks are computing systems inspired by biological brains.",
        );
        let weather = embedder.embed_text(
            "What's the weather like today?\nIt is sunny and warm with a light breeze.",
        );

        let related = cosine_similarity(&query, &neural).unwrap();
        let unrelated = cosine_similarity(&query, &weather).unwrap();
        assert!(related > 0.3, "related similarity {related}");
        assert!(unrelated < 0.3, "unrelated similarity {unrelated}");
        assert!(related > unrelated);
    }

    #[test]
    fn test_lexicon_is_deterministic() {
        let a = LexiconEmbedder::default().embed_text("deep learning");
        let b = LexiconEmbedder::default().embed_text("deep learning");
        assert_eq!(a, b);
    }
}
