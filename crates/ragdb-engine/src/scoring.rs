//! Relevance scoring applied to raw index distances. Higher is better.

use ragdb_core::{Document, ScorerKind};

pub trait RelevanceScorer: Send + Sync {
    fn score(&self, query: &str, document: &Document, distance: f32) -> f32;
}

/// `1 / (1 + distance)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceScorer;

impl RelevanceScorer for DistanceScorer {
    fn score(&self, _query: &str, _document: &Document, distance: f32) -> f32 {
        1.0 / (1.0 + distance.max(0.0))
    }
}

/// Vector score blended with the share of query terms found in the content.
#[derive(Debug, Clone, Copy)]
pub struct KeywordBlendScorer {
    pub vector_weight: f32,
    pub term_weight: f32,
}

impl Default for KeywordBlendScorer {
    fn default() -> Self {
        Self { vector_weight: 0.7, term_weight: 0.3 }
    }
}

impl RelevanceScorer for KeywordBlendScorer {
    fn score(&self, query: &str, document: &Document, distance: f32) -> f32 {
        let vector = DistanceScorer.score(query, document, distance);
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return vector * self.vector_weight;
        }
        let content = document.content.to_lowercase();
        let hits = terms.iter().filter(|t| content.contains(**t)).count();
        #[allow(clippy::cast_precision_loss)]
        let overlap = hits as f32 / terms.len() as f32;
        vector * self.vector_weight + overlap * self.term_weight
    }
}

pub fn scorer_for(kind: ScorerKind) -> Box<dyn RelevanceScorer> {
    match kind {
        ScorerKind::Distance => Box::new(DistanceScorer),
        ScorerKind::KeywordBlend => Box::new(KeywordBlendScorer::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_scorer_is_monotonic() {
        let d = Document::new("a", "x");
        assert!((DistanceScorer.score("q", &d, 0.0) - 1.0).abs() < 1e-6);
        assert!(DistanceScorer.score("q", &d, 0.5) > DistanceScorer.score("q", &d, 2.0));
    }

    #[test]
    fn keyword_blend_rewards_term_overlap() {
        let s = KeywordBlendScorer::default();
        let spa = Document::new("a", "The spa opens at 9am.");
        let pool = Document::new("b", "The pool closes at 10pm.");
        assert!(s.score("spa opens", &spa, 1.0) > s.score("spa opens", &pool, 1.0));
    }
}
