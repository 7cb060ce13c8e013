//! Category registry and deterministic score classification.
//!
//! Every per-category constant lives in one static [`CategoryProfile`]:
//! storage key, which score field is read, threshold direction, tier
//! labels, fusion weights, and the rule for the verdict shown right after
//! an analysis completes. Nothing else in the workspace branches on the
//! category name.
//!
//! # History card thresholds
//!
//! | Category | Score read | Danger | Warning | Safe |
//! |----------|-----------|--------|---------|------|
//! | deepfake | `deepfakeProbability` | ≥ 70 | [30, 70) | < 30 |
//! | audio | `authenticityConfidence` | < 30 | [30, 70) | ≥ 70 |
//! | image | `100 - authenticityConfidence` | ≥ 75 | [50, 75) | < 50 |
//! | misinfo | `misinfoConfidence` | ≥ 75 | [50, 75) | < 50 |
//!
//! All comparisons are `>=` against the threshold, so a score equal to a
//! threshold falls into the higher band.

use serde::Serialize;

use crate::models::{clamp_percent, Category, Scores};

/// Visual severity of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Safe,
    Warning,
    Danger,
}

impl Severity {
    /// Confidence-bar class used by the web UI.
    pub fn css_class(&self) -> &'static str {
        match self {
            Severity::Safe => "confidence-low",
            Severity::Warning => "confidence-medium",
            Severity::Danger => "confidence-high",
        }
    }
}

/// A classified result: severity plus the human-readable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub severity: Severity,
    pub label: &'static str,
}

/// Score fields a record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreField {
    DeepfakeProbability,
    AuthenticityConfidence,
    MisinfoConfidence,
}

/// How the classified score is derived from the stored fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    /// Read the field as-is.
    Field(ScoreField),
    /// Read `100 - field`.
    Complement(ScoreField),
}

/// Whether a high score means fake or genuine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HighIsFake,
    HighIsGenuine,
}

/// Labels for the safe, review, and danger tiers.
#[derive(Debug, Clone, Copy)]
pub struct TierLabels {
    pub safe: &'static str,
    pub review: &'static str,
    pub danger: &'static str,
}

/// Two-threshold banding: `review` opens the middle band, `decisive` the
/// top band.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub review: f64,
    pub decisive: f64,
}

/// Weights for combining two sub-model fake probabilities.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub primary: (&'static str, f64),
    pub secondary: (&'static str, f64),
}

/// Rule for the verdict shown immediately after an analysis.
#[derive(Debug, Clone, Copy)]
pub enum SummaryRule {
    /// Band the overall fake percentage.
    Tiered {
        thresholds: Thresholds,
        labels: TierLabels,
    },
    /// Decide on the model's own label.
    ByLabel {
        fake_label: &'static str,
        fake: &'static str,
        genuine: &'static str,
    },
}

/// All constants describing one category.
#[derive(Debug)]
pub struct CategoryProfile {
    pub category: Category,
    /// Key of the durable partition holding this category's history.
    pub storage_key: &'static str,
    pub score_source: ScoreSource,
    pub direction: Direction,
    pub thresholds: Thresholds,
    pub labels: TierLabels,
    /// Shown on a history card when a record has no description.
    pub default_description: &'static str,
    /// Written on records produced by [`interpret`](crate::fusion::interpret).
    pub record_description: &'static str,
    pub fusion: Option<FusionWeights>,
    pub summary: SummaryRule,
}

impl CategoryProfile {
    /// The score this category classifies on; a missing field reads as 0.
    pub fn score_of(&self, scores: &Scores) -> f64 {
        match self.score_source {
            ScoreSource::Field(f) => scores.get(f).unwrap_or(0.0),
            ScoreSource::Complement(f) => 100.0 - scores.get(f).unwrap_or(0.0),
        }
    }

    /// History-card verdict for `score`.
    pub fn classify(&self, score: f64) -> Verdict {
        let score = clamp_percent(score);
        let (severity, label) = match self.direction {
            Direction::HighIsFake => {
                if score >= self.thresholds.decisive {
                    (Severity::Danger, self.labels.danger)
                } else if score >= self.thresholds.review {
                    (Severity::Warning, self.labels.review)
                } else {
                    (Severity::Safe, self.labels.safe)
                }
            }
            Direction::HighIsGenuine => {
                if score >= self.thresholds.decisive {
                    (Severity::Safe, self.labels.safe)
                } else if score >= self.thresholds.review {
                    (Severity::Warning, self.labels.review)
                } else {
                    (Severity::Danger, self.labels.danger)
                }
            }
        };
        Verdict { severity, label }
    }
}

const REVIEW: &str = "Requires Manual Review";

static PROFILES: [CategoryProfile; 4] = [
    CategoryProfile {
        category: Category::Deepfake,
        storage_key: "deepfake_analysis_history",
        score_source: ScoreSource::Field(ScoreField::DeepfakeProbability),
        direction: Direction::HighIsFake,
        thresholds: Thresholds {
            review: 30.0,
            decisive: 70.0,
        },
        labels: TierLabels {
            safe: "Authentic Content",
            review: REVIEW,
            danger: "Deepfake Detected",
        },
        default_description: "Video analysis",
        record_description: "Video analysis for identity verification",
        fusion: Some(FusionWeights {
            primary: ("rppg", 0.6),
            secondary: ("lipsync", 0.4),
        }),
        summary: SummaryRule::Tiered {
            thresholds: Thresholds {
                review: 50.0,
                decisive: 75.0,
            },
            labels: TierLabels {
                safe: "Authentic Video",
                review: REVIEW,
                danger: "Deepfake Detected",
            },
        },
    },
    CategoryProfile {
        category: Category::Audio,
        storage_key: "audio_analysis_history",
        score_source: ScoreSource::Field(ScoreField::AuthenticityConfidence),
        direction: Direction::HighIsGenuine,
        thresholds: Thresholds {
            review: 30.0,
            decisive: 70.0,
        },
        labels: TierLabels {
            safe: "Authentic Audio",
            review: REVIEW,
            danger: "Synthetic Audio Detected",
        },
        default_description: "Audio analysis",
        record_description: "Audio analysis for voice verification",
        fusion: None,
        summary: SummaryRule::ByLabel {
            fake_label: "synthetic",
            fake: "Synthetic Audio Detected",
            genuine: "Authentic Audio",
        },
    },
    CategoryProfile {
        category: Category::Image,
        storage_key: "image_analysis_history",
        score_source: ScoreSource::Complement(ScoreField::AuthenticityConfidence),
        direction: Direction::HighIsFake,
        thresholds: Thresholds {
            review: 50.0,
            decisive: 75.0,
        },
        labels: TierLabels {
            safe: "Authentic Image",
            review: REVIEW,
            danger: "Synthetic Image Detected",
        },
        default_description: "Image analysis",
        record_description: "Image analysis for identity verification",
        fusion: Some(FusionWeights {
            primary: ("zeroshot", 0.7),
            secondary: ("cnn", 0.3),
        }),
        summary: SummaryRule::Tiered {
            thresholds: Thresholds {
                review: 50.0,
                decisive: 75.0,
            },
            labels: TierLabels {
                safe: "Authentic Image",
                review: REVIEW,
                danger: "Synthetic Image Detected",
            },
        },
    },
    CategoryProfile {
        category: Category::Misinfo,
        storage_key: "misinfo_analysis_history",
        score_source: ScoreSource::Field(ScoreField::MisinfoConfidence),
        direction: Direction::HighIsFake,
        thresholds: Thresholds {
            review: 50.0,
            decisive: 75.0,
        },
        // The two upper tiers share one label and differ only in severity.
        labels: TierLabels {
            safe: "Likely Authentic",
            review: "Likely Misinformation",
            danger: "Likely Misinformation",
        },
        default_description: "Text analysis",
        record_description: "Misinformation analysis for news verification",
        fusion: None,
        summary: SummaryRule::ByLabel {
            fake_label: "fake",
            fake: "Likely Misinformation",
            genuine: "Likely Authentic",
        },
    },
];

/// Look up the profile for a category.
pub fn profile(category: Category) -> &'static CategoryProfile {
    &PROFILES[category.index()]
}

/// History-card verdict for a category's primary score.
pub fn classify(category: Category, score: f64) -> Verdict {
    profile(category).classify(score)
}

/// Verdict shown right after an analysis completes.
///
/// `fake_percent` is the overall fake probability in `[0, 100]`; `label` is
/// the model's own label. Each category's [`SummaryRule`] reads one of them.
pub fn summarize(category: Category, fake_percent: f64, label: &str) -> Verdict {
    match profile(category).summary {
        SummaryRule::Tiered { thresholds, labels } => {
            let score = clamp_percent(fake_percent);
            if score >= thresholds.decisive {
                Verdict {
                    severity: Severity::Danger,
                    label: labels.danger,
                }
            } else if score >= thresholds.review {
                Verdict {
                    severity: Severity::Warning,
                    label: labels.review,
                }
            } else {
                Verdict {
                    severity: Severity::Safe,
                    label: labels.safe,
                }
            }
        }
        SummaryRule::ByLabel {
            fake_label,
            fake,
            genuine,
        } => {
            if label.trim().eq_ignore_ascii_case(fake_label) {
                Verdict {
                    severity: Severity::Danger,
                    label: fake,
                }
            } else {
                Verdict {
                    severity: Severity::Safe,
                    label: genuine,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_indexed_by_category() {
        for c in Category::ALL {
            assert_eq!(profile(c).category, c);
        }
    }

    #[test]
    fn test_deepfake_threshold_is_inclusive() {
        assert_eq!(classify(Category::Deepfake, 70.0).label, "Deepfake Detected");
        assert_eq!(
            classify(Category::Deepfake, 69.999).label,
            "Requires Manual Review"
        );
        assert_eq!(
            classify(Category::Deepfake, 30.0).label,
            "Requires Manual Review"
        );
        assert_eq!(classify(Category::Deepfake, 29.99).label, "Authentic Content");
    }

    #[test]
    fn test_audio_bands_are_inverted() {
        let v = classify(Category::Audio, 29.9);
        assert_eq!(v.label, "Synthetic Audio Detected");
        assert_eq!(v.severity, Severity::Danger);
        assert_eq!(classify(Category::Audio, 30.0).severity, Severity::Warning);
        assert_eq!(classify(Category::Audio, 69.9).severity, Severity::Warning);
        assert_eq!(classify(Category::Audio, 70.0).label, "Authentic Audio");
    }

    #[test]
    fn test_image_classifies_on_complement() {
        let p = profile(Category::Image);
        let scores = Scores {
            authenticity_confidence: Some(25.0),
            ..Scores::default()
        };
        let fake = p.score_of(&scores);
        assert_eq!(fake, 75.0);
        assert_eq!(p.classify(fake).label, "Synthetic Image Detected");
        assert_eq!(p.classify(50.0).label, "Requires Manual Review");
        assert_eq!(p.classify(49.0).label, "Authentic Image");
    }

    #[test]
    fn test_misinfo_upper_tiers_share_label() {
        let high = classify(Category::Misinfo, 80.0);
        let mid = classify(Category::Misinfo, 60.0);
        assert_eq!(high.label, mid.label);
        assert_eq!(high.severity, Severity::Danger);
        assert_eq!(mid.severity, Severity::Warning);
        assert_eq!(classify(Category::Misinfo, 49.0).label, "Likely Authentic");
    }

    #[test]
    fn test_missing_score_reads_as_zero() {
        let empty = Scores::default();
        assert_eq!(profile(Category::Deepfake).score_of(&empty), 0.0);
        // Image complements a missing authenticity into 100% fake.
        assert_eq!(profile(Category::Image).score_of(&empty), 100.0);
    }

    #[test]
    fn test_summary_rules() {
        assert_eq!(summarize(Category::Deepfake, 48.0, "").label, "Authentic Video");
        assert_eq!(
            summarize(Category::Image, 66.0, "").label,
            "Requires Manual Review"
        );
        assert_eq!(
            summarize(Category::Audio, 0.0, "synthetic").label,
            "Synthetic Audio Detected"
        );
        assert_eq!(summarize(Category::Misinfo, 99.0, "real").label, "Likely Authentic");
        assert_eq!(
            summarize(Category::Misinfo, 10.0, "FAKE").severity,
            Severity::Danger
        );
    }
}
