//! Core data models: analysis categories, score fields, and history records.
//!
//! Records are serialized in camelCase so a persisted partition reads the
//! same whether it was written by the CLI, the relay server, or a browser
//! client sharing the same storage keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classify::{self, ScoreField, Verdict};

/// Number of characters of the analyzed text kept on a misinformation record.
pub const SOURCE_EXCERPT_CHARS: usize = 60;

/// One of the four fixed analysis domains.
///
/// Each category owns an independent history partition; nothing is shared
/// between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Video deepfake detection.
    Deepfake,
    /// Synthetic voice detection.
    Audio,
    /// Synthetic image detection.
    Image,
    /// Text misinformation detection.
    Misinfo,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Deepfake,
        Category::Audio,
        Category::Image,
        Category::Misinfo,
    ];

    /// Parse a category name, ignoring ASCII case.
    ///
    /// Returns `None` for anything outside the closed set; callers decide
    /// whether that is an error or a silent no-op.
    pub fn parse(name: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Deepfake => "deepfake",
            Category::Audio => "audio",
            Category::Image => "image",
            Category::Misinfo => "misinfo",
        }
    }

    /// Position in [`Category::ALL`], used to index per-partition state.
    pub(crate) fn index(&self) -> usize {
        match self {
            Category::Deepfake => 0,
            Category::Audio => 1,
            Category::Image => 2,
            Category::Misinfo => 3,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence percentages carried by a record, each in `[0, 100]`.
///
/// Which field is meaningful depends on the category; see
/// [`CategoryProfile`](crate::classify::CategoryProfile).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deepfake_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticity_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misinfo_confidence: Option<f64>,
}

impl Scores {
    /// Copy with every present field clamped to `[0, 100]`. NaN becomes 0.
    pub fn clamped(&self) -> Scores {
        Scores {
            deepfake_probability: self.deepfake_probability.map(clamp_percent),
            authenticity_confidence: self.authenticity_confidence.map(clamp_percent),
            misinfo_confidence: self.misinfo_confidence.map(clamp_percent),
        }
    }

    pub fn get(&self, field: ScoreField) -> Option<f64> {
        match field {
            ScoreField::DeepfakeProbability => self.deepfake_probability,
            ScoreField::AuthenticityConfidence => self.authenticity_confidence,
            ScoreField::MisinfoConfidence => self.misinfo_confidence,
        }
    }
}

/// Clamp a percentage into `[0, 100]`, mapping NaN to 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// The caller-supplied part of an analysis record.
///
/// `id` and `timestamp` are never accepted from callers; the history store
/// assigns them at insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFields {
    #[serde(flatten)]
    pub scores: Scores,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub media_ref: Option<String>,
    /// Full analyzed text. Only misinformation records keep it, and only as
    /// a truncated excerpt.
    #[serde(default)]
    pub source_text: Option<String>,
}

/// One completed analysis, as stored in a history partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: Category,
    #[serde(flatten)]
    pub scores: Scores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_excerpt: Option<String>,
}

impl AnalysisRecord {
    /// The score the category's classification reads, or 0 when absent.
    pub fn primary_score(&self) -> f64 {
        let profile = classify::profile(self.category);
        profile.score_of(&self.scores)
    }

    /// History-card verdict for this record.
    pub fn verdict(&self) -> Verdict {
        classify::classify(self.category, self.primary_score())
    }

    /// First 12 characters of the id, as shown in history card headers.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(12) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }

    /// Description line for display, falling back to the category default.
    pub fn display_description(&self) -> String {
        let profile = classify::profile(self.category);
        if self.category == Category::Misinfo {
            return match &self.source_excerpt {
                Some(excerpt) => format!("\"{}...\"", excerpt),
                None => format!("\"{}\"", profile.default_description),
            };
        }
        self.description
            .clone()
            .unwrap_or_else(|| profile.default_description.to_string())
    }
}

/// First [`SOURCE_EXCERPT_CHARS`] characters of `text`.
pub fn excerpt(text: &str) -> String {
    text.chars().take(SOURCE_EXCERPT_CHARS).collect()
}
