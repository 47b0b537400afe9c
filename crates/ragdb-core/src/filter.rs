//! Metadata filters applied alongside similarity ranking.
//!
//! A filter maps a field name to a [`Matcher`]. A document passes only when
//! every field is present and satisfies its matcher; a missing field never
//! matches. In JSON a matcher is written as a scalar (exact), an array
//! (membership) or an object with optional `min`/`max` (inclusive range):
//!
//! ```json
//! { "category": "amenities", "source": ["policies", "faq"], "chunk_id": { "max": 3 } }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Metadata, MetadataValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Matcher {
    Exact(MetadataValue),
    OneOf(Vec<MetadataValue>),
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
}

impl Matcher {
    pub fn matches(&self, value: &MetadataValue) -> bool {
        match self {
            Self::Exact(expected) => expected.matches(value),
            Self::OneOf(options) => options.iter().any(|o| o.matches(value)),
            Self::Range { min, max } => {
                let Some(v) = value.as_f64() else { return false };
                min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter {
    fields: BTreeMap<String, Matcher>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.fields.insert(field.into(), Matcher::Exact(value.into()));
        self
    }

    #[must_use]
    pub fn one_of<V: Into<MetadataValue>>(mut self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.fields.insert(field.into(), Matcher::OneOf(values.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn range(mut self, field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        self.fields.insert(field.into(), Matcher::Range { min, max });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.fields
            .iter()
            .all(|(field, matcher)| metadata.get(field).is_some_and(|v| matcher.matches(v)))
    }

    /// Parse the JSON form used by the CLI.
    pub fn from_json(s: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
