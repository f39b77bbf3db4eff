//! Pluggable embeddings with a deterministic bag-of-words fallback.
//!
//! When no real embedding function is configured, [`BagOfWordsEmbedder`]
//! provides approximate semantic scoring: token term-frequency, L2-normalized,
//! over a capped vocabulary learned on first use.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Anything that can turn text into fixed-dimension vectors.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Vec<Vec<f32>>;
    fn dim(&self) -> usize;
}

/// Cosine similarity between two vectors of equal length. Returns 0.0 for
/// zero-length or mismatched vectors (callers must match dimensions first).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_ascii_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_owned())
        .collect()
}

/// Deterministic TF bag-of-words embedder with a capped, growing vocabulary.
///
/// Not a real semantic embedder — it degrades `search`'s semantic term to
/// "shares vocabulary with", which spec §4.B documents as the expected
/// fallback behavior when no real embedding function is plugged in.
pub struct BagOfWordsEmbedder {
    max_vocab: usize,
    vocab: RwLock<HashMap<String, usize>>,
}

impl BagOfWordsEmbedder {
    pub fn new(max_vocab: usize) -> Self {
        Self {
            max_vocab,
            vocab: RwLock::new(HashMap::new()),
        }
    }

    fn token_index(&self, token: &str) -> Option<usize> {
        {
            let vocab = self.vocab.read();
            if let Some(&idx) = vocab.get(token) {
                return Some(idx);
            }
        }
        let mut vocab = self.vocab.write();
        if let Some(&idx) = vocab.get(token) {
            return Some(idx);
        }
        if vocab.len() >= self.max_vocab {
            return None;
        }
        let idx = vocab.len();
        vocab.insert(token.to_owned(), idx);
        Some(idx)
    }
}

impl Embedder for BagOfWordsEmbedder {
    fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|text| {
                let mut vec = vec![0.0f32; self.max_vocab];
                for token in tokenize(text) {
                    if let Some(idx) = self.token_index(&token) {
                        vec[idx] += 1.0;
                    }
                }
                let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for v in vec.iter_mut() {
                        *v /= norm;
                    }
                }
                vec
            })
            .collect()
    }

    fn dim(&self) -> usize {
        self.max_vocab
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn bow_embeds_are_l2_normalized() {
        let e = BagOfWordsEmbedder::new(64);
        let vecs = e.embed(&["the cat sat on the mat".to_owned()]);
        let norm: f32 = vecs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5 || norm == 0.0);
    }

    #[test]
    fn bow_similar_texts_score_higher_than_unrelated() {
        let e = BagOfWordsEmbedder::new(64);
        let vecs = e.embed(&[
            "user lives in Beijing".to_owned(),
            "user is based in Beijing".to_owned(),
            "the stock market fell today".to_owned(),
        ]);
        let sim_related = cosine_similarity(&vecs[0], &vecs[1]);
        let sim_unrelated = cosine_similarity(&vecs[0], &vecs[2]);
        assert!(sim_related > sim_unrelated);
    }

    #[test]
    fn bow_respects_vocab_cap() {
        let e = BagOfWordsEmbedder::new(2);
        let vecs = e.embed(&["alpha beta gamma delta".to_owned()]);
        assert_eq!(vecs[0].len(), 2);
    }
}
