use anyhow::{Context, Result};
use serde::Serialize;

use crate::encoder::Embedder;

pub const DEFAULT_THRESHOLD: f32 = 0.55;

/// The interest phrase that accepted a text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InterestMatch {
    pub index: usize,
    pub score: f32,
}

/// Semantic relevance check of free text against a persona's interest phrases.
pub struct RelevanceFilter {
    embedder: Box<dyn Embedder>,
    threshold: f32,
}

impl RelevanceFilter {
    pub fn new(embedder: Box<dyn Embedder>, threshold: f32) -> Self {
        Self { embedder, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_relevant(&mut self, text: &str, interests: &[&str]) -> Result<bool> {
        Ok(self.first_match(text, interests)?.is_some())
    }

    /// Walks the phrases in declared order and stops at the first one whose
    /// similarity strictly exceeds the threshold. Not necessarily the best match.
    pub fn first_match(&mut self, text: &str, interests: &[&str]) -> Result<Option<InterestMatch>> {
        if interests.is_empty() { return Ok(None); }
        let text_vec = self.embedder
            .embed_passage(&text.to_lowercase())
            .context("embed article text")?;

        for (index, phrase) in interests.iter().enumerate() {
            let phrase_vec = self.embedder
                .embed_query(&phrase.to_lowercase())
                .with_context(|| format!("embed interest phrase {phrase:?}"))?;
            let score = cosine(&text_vec, &phrase_vec);
            tracing::debug!(phrase = %phrase, score, "similarity");
            if exceeds(score, self.threshold) {
                return Ok(Some(InterestMatch { index, score }));
            }
        }
        Ok(None)
    }
}

pub fn exceeds(score: f32, threshold: f32) -> bool {
    score > threshold
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let na = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 { return 0.0; }
    (dot / (na * nb)) as f32
}
