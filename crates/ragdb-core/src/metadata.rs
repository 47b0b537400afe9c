//! Rule-based metadata extraction for chunks.
//!
//! Extraction is best-effort and deterministic: it always yields a usable
//! `category` and `sentiment`, falling back to `"general"` / `"neutral"`.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{Metadata, MetadataValue, DEFAULT_CATEGORY};

pub const NEUTRAL: &str = "neutral";

/// Derives metadata from a single chunk of cleaned text.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, chunk: &str) -> Metadata;
}

/// Keyword-table categorizer with coarse lexicon sentiment.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    categories: Vec<(String, Vec<String>)>,
    positive: Vec<String>,
    negative: Vec<String>,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| (*w).to_string()).collect()
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        let categories = vec![
            ("policies", &["check-in", "checkin", "check-out", "checkout", "policy", "cancellation", "cancel", "refund", "deposit", "pets", "smoking", "id"][..]),
            ("amenities", &["spa", "pool", "gym", "fitness", "sauna", "wifi", "parking", "laundry", "massage"][..]),
            ("dining", &["restaurant", "breakfast", "lunch", "dinner", "bar", "menu", "room service", "cafe"][..]),
            ("rooms", &["room", "suite", "bed", "bathroom", "balcony", "view", "minibar"][..]),
            ("location", &["airport", "downtown", "station", "beach", "distance", "nearby", "shuttle"][..]),
            ("events", &["wedding", "conference", "meeting", "event", "banquet"][..]),
        ];
        Self {
            categories: categories.into_iter().map(|(c, words)| (c.to_string(), owned(words))).collect(),
            positive: owned(&["great", "excellent", "amazing", "wonderful", "friendly", "clean", "comfortable", "love", "lovely", "perfect", "best", "complimentary", "free", "welcome"]),
            negative: owned(&["bad", "poor", "dirty", "rude", "noisy", "terrible", "awful", "broken", "worst", "prohibited", "fee", "penalty", "not allowed"]),
        }
    }
}

impl KeywordExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the category table. Order is the tie-break order.
    #[must_use]
    pub fn with_categories<C, W>(mut self, categories: impl IntoIterator<Item = (C, Vec<W>)>) -> Self
    where
        C: Into<String>,
        W: Into<String>,
    {
        self.categories = categories
            .into_iter()
            .map(|(c, words)| (c.into(), words.into_iter().map(|w| w.into().to_lowercase()).collect()))
            .collect();
        self
    }

    pub fn categorize(&self, lower: &str, tokens: &[&str]) -> String {
        let mut best: Option<(&str, usize)> = None;
        for (category, keywords) in &self.categories {
            let hits = keywords.iter().filter(|k| contains_term(lower, tokens, k)).count();
            if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
                best = Some((category, hits));
            }
        }
        best.map_or_else(|| DEFAULT_CATEGORY.to_string(), |(c, _)| c.to_string())
    }

    pub fn sentiment(&self, lower: &str, tokens: &[&str]) -> &'static str {
        let pos = self.positive.iter().filter(|w| contains_term(lower, tokens, w)).count();
        let neg = self.negative.iter().filter(|w| contains_term(lower, tokens, w)).count();
        match pos.cmp(&neg) {
            std::cmp::Ordering::Greater => "positive",
            std::cmp::Ordering::Less => "negative",
            std::cmp::Ordering::Equal => NEUTRAL,
        }
    }
}

/// Multi-word keywords match as substrings, single words as whole tokens.
fn contains_term(lower: &str, tokens: &[&str], term: &str) -> bool {
    if term.contains(' ') {
        lower.contains(term)
    } else {
        tokens.iter().any(|t| *t == term)
    }
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:\d{1,2}(?::\d{2})?\s?(?:am|pm|AM|PM)|\d{1,2}:\d{2}|[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)\b")
            .expect("entity pattern")
    })
}

/// Clock times and capitalized terms, excluding sentence-initial words.
pub fn extract_entities(chunk: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in entity_re().find_iter(chunk) {
        let before = chunk[..m.start()].trim_end();
        let sentence_start = before.is_empty() || before.ends_with(['.', '!', '?']);
        let is_time = m.as_str().starts_with(|c: char| c.is_ascii_digit());
        if (is_time || !sentence_start) && !out.iter().any(|e| e == m.as_str()) {
            out.push(m.as_str().to_string());
        }
    }
    out
}

impl MetadataExtractor for KeywordExtractor {
    fn extract(&self, chunk: &str) -> Metadata {
        let lower = chunk.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '-'))
            .filter(|t| !t.is_empty())
            .collect();
        let mut metadata = Metadata::new();
        metadata.insert("category".into(), MetadataValue::from(self.categorize(&lower, &tokens)));
        metadata.insert("sentiment".into(), MetadataValue::from(self.sentiment(&lower, &tokens)));
        let entities = extract_entities(chunk);
        if !entities.is_empty() {
            metadata.insert("entities".into(), MetadataValue::from(entities.join(", ")));
        }
        metadata.insert("word_count".into(), MetadataValue::from(chunk.split_whitespace().count()));
        metadata
    }
}

/// Convenience wrapper over the default [`KeywordExtractor`].
pub fn extract_metadata(chunk: &str) -> Metadata {
    KeywordExtractor::default().extract(chunk)
}
