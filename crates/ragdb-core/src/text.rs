//! Text cleaning and overlapping chunking.
//!
//! Chunks are measured in words or sentences. Consecutive chunks share exactly
//! `overlap` units, so dropping the leading `overlap` units of every chunk but
//! the first and joining the rest with single spaces reproduces the cleaned
//! input.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    #[default]
    Word,
    Sentence,
}

impl fmt::Display for ChunkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Word => "word",
            Self::Sentence => "sentence",
        })
    }
}

impl FromStr for ChunkUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "word" | "words" => Ok(Self::Word),
            "sentence" | "sentences" => Ok(Self::Sentence),
            other => Err(Error::Config(format!("unknown chunk unit '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
    pub unit: ChunkUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { size: 200, overlap: 40, unit: ChunkUnit::Word }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::Config("chunk size must be greater than zero".into()));
        }
        if self.overlap >= self.size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

/// Cleans and splits raw text with a validated [`ChunkingConfig`].
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// `clean` followed by `chunk`. Empty input yields one empty chunk.
    pub fn split(&self, raw: &str) -> Vec<String> {
        let cleaned = clean(raw);
        let units = split_units(&cleaned, self.config.unit);
        window(&units, self.config.size, self.config.size - self.config.overlap)
    }
}

fn noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[^\p{L}\p{N}\s.,;:!?'"()/&%$@#+\-]"#).expect("noise pattern"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern"))
}

/// Strip control and noise characters and collapse whitespace.
pub fn clean(text: &str) -> String {
    let denoised = noise_re().replace_all(text, "");
    whitespace_re().replace_all(&denoised, " ").trim().to_string()
}

/// Split `text` into chunks of at most `size` units sharing `overlap` units.
///
/// Empty input yields exactly one empty chunk. `size == 0` and
/// `overlap >= size` are configuration errors.
pub fn chunk(text: &str, size: usize, overlap: usize, unit: ChunkUnit) -> Result<Vec<String>> {
    ChunkingConfig { size, overlap, unit }.validate()?;
    let units = split_units(text, unit);
    Ok(window(&units, size, size - overlap))
}

fn window(units: &[&str], size: usize, step: usize) -> Vec<String> {
    if units.is_empty() {
        return vec![String::new()];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(units.len());
        chunks.push(units[start..end].join(" "));
        if end >= units.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Split into the units `chunk` counts.
pub fn split_units(text: &str, unit: ChunkUnit) -> Vec<&str> {
    match unit {
        ChunkUnit::Word => text.split_whitespace().collect(),
        ChunkUnit::Sentence => split_sentences(text),
    }
}

/// Sentences end at `.`, `!` or `?` followed by whitespace or end of input,
/// so decimals such as `3.5` stay intact.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if at_boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_whitespace_and_strips_noise() {
        let raw = "  Check-in\tis at **3pm**.\n\nThe spa\u{0007} opens | at 9am!  ";
        assert_eq!(clean(raw), "Check-in is at 3pm. The spa opens at 9am!");
    }

    #[test]
    fn clean_empty_is_empty() {
        assert_eq!(clean(""), "");
        assert_eq!(clean(" \n\t "), "");
    }

    #[test]
    fn sentences_keep_decimals() {
        let s = split_sentences("Rated 4.5 stars. Pool opens at 7. Great!");
        assert_eq!(s, vec!["Rated 4.5 stars.", "Pool opens at 7.", "Great!"]);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(matches!(chunk("a b c", 3, 3, ChunkUnit::Word), Err(Error::Config(_))));
        assert!(matches!(chunk("a b c", 0, 0, ChunkUnit::Word), Err(Error::Config(_))));
    }
}
