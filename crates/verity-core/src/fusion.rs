//! Detection-API response interpretation and sub-model fusion.
//!
//! The detection API answers each category with a different JSON shape.
//! [`interpret`] validates the shape, turns every sub-model output into a
//! "probability the artifact is fake", fuses image and video sub-models
//! with fixed weights, and produces the [`ResultFields`] that go into the
//! history store.
//!
//! # Fusion
//!
//! ```text
//! image:  overall = 0.7 × zeroshot_fake + 0.3 × cnn_fake
//! video:  overall = 0.6 × rppg_fake     + 0.4 × lipsync_fake
//! ```
//!
//! Each sub-model reports a label and its confidence in that label. A
//! "real"-side label (`real`, `authentic`, `match`) inverts the confidence.
//! The overall value is scaled to a percentage and clamped to `[0, 100]`.
//! A sub-model missing from the response contributes 0.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::classify::{profile, summarize, FusionWeights, Verdict};
use crate::models::{clamp_percent, Category, ResultFields, Scores};

/// Added to the zero-shot denominator so all-zero scores do not divide by zero.
pub const ZEROSHOT_EPSILON: f64 = 0.0001;

const ZEROSHOT_DEEPFAKE: &str = "a computer-generated deepfake";
const ZEROSHOT_SYNTHETIC: &str = "an AI-generated synthetic image";
const ZEROSHOT_REAL: &str = "a real human photo";

/// Labels meaning "genuine" for image sub-models.
pub const IMAGE_REAL_LABELS: &[&str] = &["real", "authentic"];
/// Label meaning "genuine" for the rPPG video model.
pub const RPPG_REAL_LABELS: &[&str] = &["real"];
/// Label meaning "genuine" for the lip-sync video model.
pub const LIPSYNC_REAL_LABELS: &[&str] = &["match"];

/// The detection API returned a body missing the fields a category needs.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidResponse {
    pub category: Category,
    pub message: String,
}

impl fmt::Display for InvalidResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for InvalidResponse {}

fn invalid(category: Category, expected: &str) -> InvalidResponse {
    InvalidResponse {
        category,
        message: format!("Invalid API response format. Expected {}.", expected),
    }
}

/// One sub-model's output: its label and its confidence in that label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubModelResult {
    pub label: String,
    /// Confidence in `label`, in `[0, 1]`.
    pub confidence: f64,
    /// Free-form explanation; a string, or an object carrying
    /// `classification_scores` for the zero-shot model.
    pub reason: Value,
}

impl SubModelResult {
    /// Read a sub-model object. Returns `None` unless it has a string
    /// `label` and a numeric `confidence`.
    pub fn from_value(value: &Value) -> Option<SubModelResult> {
        let label = value.get("label")?.as_str()?.to_string();
        let confidence = value.get("confidence")?.as_f64()?;
        Some(SubModelResult {
            label,
            confidence,
            reason: value.get("reason").cloned().unwrap_or(Value::Null),
        })
    }

    fn has_label(&self, labels: &[&str]) -> bool {
        labels
            .iter()
            .any(|l| self.label.trim().eq_ignore_ascii_case(l))
    }
}

/// A supporting source returned with a misinformation verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub link: String,
    pub snippet: Option<String>,
}

/// Probability in `[0, 1]` that the artifact is fake, given a sub-model
/// result and the labels that mean "genuine".
pub fn fake_probability(result: &SubModelResult, real_labels: &[&str]) -> f64 {
    if result.has_label(real_labels) {
        1.0 - result.confidence
    } else {
        result.confidence
    }
}

/// Zero-shot fake probability.
///
/// Prefers the raw per-label classification scores when the model reports
/// them; otherwise a `fake` label keeps the confidence and anything else
/// inverts it.
pub fn zeroshot_fake_probability(result: &SubModelResult) -> f64 {
    if let Some(scores) = result
        .reason
        .get("classification_scores")
        .and_then(|s| s.as_object())
    {
        let score = |key: &str| scores.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);
        let fake = score(ZEROSHOT_DEEPFAKE) + score(ZEROSHOT_SYNTHETIC);
        let real = score(ZEROSHOT_REAL);
        return fake / (fake + real + ZEROSHOT_EPSILON);
    }
    if result.label.trim().eq_ignore_ascii_case("fake") {
        result.confidence
    } else {
        1.0 - result.confidence
    }
}

/// Weighted fusion of two fake probabilities, as a clamped percentage.
pub fn fuse(weights: FusionWeights, primary: f64, secondary: f64) -> f64 {
    let overall = primary * weights.primary.1 + secondary * weights.secondary.1;
    clamp_percent(overall * 100.0)
}

/// Everything derived from one detection-API response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpretation {
    pub category: Category,
    /// Overall probability the artifact is fake, in `[0, 100]`.
    pub fake_percent: f64,
    /// Verdict shown immediately after the analysis.
    pub summary: Verdict,
    /// Fields to store in the category's history partition.
    pub fields: ResultFields,
    pub sub_models: Vec<(String, SubModelResult)>,
    pub sources: Vec<Source>,
}

/// Interpret a detection-API response for `category`.
///
/// `media_ref` points at the analyzed artifact (media categories);
/// `source_text` is the analyzed text (misinformation). Missing or
/// malformed fields yield [`InvalidResponse`]; this never panics.
pub fn interpret(
    category: Category,
    response: &Value,
    media_ref: Option<String>,
    source_text: Option<&str>,
) -> Result<Interpretation, InvalidResponse> {
    match category {
        Category::Image => interpret_image(response, media_ref),
        Category::Deepfake => interpret_video(response, media_ref),
        Category::Audio => interpret_audio(response, media_ref),
        Category::Misinfo => interpret_misinfo(response, source_text),
    }
}

/// Read an optional named sub-model from a model map. A present but
/// malformed entry is an error rather than silently ignored.
fn sub_model(
    category: Category,
    models: &Value,
    name: &str,
) -> Result<Option<SubModelResult>, InvalidResponse> {
    match models.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => SubModelResult::from_value(v)
            .map(Some)
            .ok_or_else(|| invalid(category, &format!("{} with label and confidence", name))),
    }
}

fn fused_fields(category: Category, fake_percent: f64, media_ref: Option<String>) -> ResultFields {
    ResultFields {
        scores: Scores {
            deepfake_probability: Some(fake_percent),
            authenticity_confidence: Some(100.0 - fake_percent),
            misinfo_confidence: None,
        },
        description: Some(profile(category).record_description.to_string()),
        media_ref,
        source_text: None,
    }
}

fn weights(category: Category) -> FusionWeights {
    // Image and video profiles always carry weights.
    profile(category).fusion.unwrap_or(FusionWeights {
        primary: ("", 0.0),
        secondary: ("", 0.0),
    })
}

fn interpret_image(
    response: &Value,
    media_ref: Option<String>,
) -> Result<Interpretation, InvalidResponse> {
    let category = Category::Image;
    let models = response
        .get("image_models")
        .filter(|m| m.is_object())
        .ok_or_else(|| invalid(category, "image_models field"))?;

    let zeroshot = sub_model(category, models, "zeroshot")?;
    let cnn = sub_model(category, models, "cnn")?;

    let zeroshot_fake = zeroshot.as_ref().map(zeroshot_fake_probability).unwrap_or(0.0);
    let cnn_fake = cnn
        .as_ref()
        .map(|r| fake_probability(r, IMAGE_REAL_LABELS))
        .unwrap_or(0.0);
    let fake_percent = fuse(weights(category), zeroshot_fake, cnn_fake);

    let mut sub_models = Vec::new();
    if let Some(r) = zeroshot {
        sub_models.push(("zeroshot".to_string(), r));
    }
    if let Some(r) = cnn {
        sub_models.push(("cnn".to_string(), r));
    }

    Ok(Interpretation {
        category,
        fake_percent,
        summary: summarize(category, fake_percent, ""),
        fields: fused_fields(category, fake_percent, media_ref),
        sub_models,
        sources: Vec::new(),
    })
}

fn interpret_video(
    response: &Value,
    media_ref: Option<String>,
) -> Result<Interpretation, InvalidResponse> {
    let category = Category::Deepfake;
    let models = response
        .get("video_models")
        .filter(|m| m.is_object())
        .ok_or_else(|| invalid(category, "video_models field"))?;

    let rppg = sub_model(category, models, "rppg")?;
    let lipsync = sub_model(category, models, "lipsync")?;

    let rppg_fake = rppg
        .as_ref()
        .map(|r| fake_probability(r, RPPG_REAL_LABELS))
        .unwrap_or(0.0);
    // A lip-sync result labelled "error" still contributes its confidence.
    let lipsync_fake = lipsync
        .as_ref()
        .map(|r| fake_probability(r, LIPSYNC_REAL_LABELS))
        .unwrap_or(0.0);
    let fake_percent = fuse(weights(category), rppg_fake, lipsync_fake);

    let mut sub_models = Vec::new();
    if let Some(r) = rppg {
        sub_models.push(("rppg".to_string(), r));
    }
    if let Some(r) = lipsync {
        sub_models.push(("lipsync".to_string(), r));
    }

    Ok(Interpretation {
        category,
        fake_percent,
        summary: summarize(category, fake_percent, ""),
        fields: fused_fields(category, fake_percent, media_ref),
        sub_models,
        sources: Vec::new(),
    })
}

/// Audio reports one model whose confidence is in its own label: a
/// `synthetic` label keeps it as the fake probability, anything else
/// inverts it. Authenticity is the complement, in whole percent.
fn interpret_audio(
    response: &Value,
    media_ref: Option<String>,
) -> Result<Interpretation, InvalidResponse> {
    let category = Category::Audio;
    let expected = "audio_models with voice_analysis";
    let model = response
        .get("audio_models")
        .and_then(|m| m.get("voice_analysis"))
        .filter(|m| m.is_object())
        .ok_or_else(|| invalid(category, expected))?;
    let result = SubModelResult::from_value(model).ok_or_else(|| invalid(category, expected))?;

    let confidence_percent = (result.confidence * 100.0).round();
    let fake_percent = clamp_percent(if result.has_label(&["synthetic"]) {
        confidence_percent
    } else {
        100.0 - confidence_percent
    });
    let authenticity = 100.0 - fake_percent;

    Ok(Interpretation {
        category,
        fake_percent,
        summary: summarize(category, fake_percent, &result.label),
        fields: ResultFields {
            scores: Scores {
                deepfake_probability: Some(fake_percent),
                authenticity_confidence: Some(authenticity),
                misinfo_confidence: None,
            },
            description: Some(profile(category).record_description.to_string()),
            media_ref,
            source_text: None,
        },
        sub_models: vec![("voice_analysis".to_string(), result)],
        sources: Vec::new(),
    })
}

fn interpret_misinfo(
    response: &Value,
    source_text: Option<&str>,
) -> Result<Interpretation, InvalidResponse> {
    let category = Category::Misinfo;
    let expected = "text_model with confidence, label, and sources";
    let model = response
        .get("text_model")
        .filter(|m| m.is_object())
        .ok_or_else(|| invalid(category, expected))?;

    // A zero confidence or empty label is as unusable as a missing one.
    let confidence = model
        .get("confidence")
        .and_then(|c| c.as_f64())
        .filter(|c| *c != 0.0)
        .ok_or_else(|| invalid(category, expected))?;
    let label = model
        .get("label")
        .and_then(|l| l.as_str())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| invalid(category, expected))?;
    let sources = model
        .get("sources")
        .and_then(|s| s.as_array())
        .ok_or_else(|| invalid(category, expected))?
        .iter()
        .filter_map(|s| {
            let link = s.get("link").and_then(|l| l.as_str())?.trim().to_string();
            Some(Source {
                link,
                snippet: s.get("snippet").and_then(|v| v.as_str()).map(String::from),
            })
        })
        .collect();

    let confidence_percent = clamp_percent((confidence * 100.0).round());
    let result = SubModelResult {
        label: label.to_string(),
        confidence,
        reason: model.get("reason").cloned().unwrap_or(Value::Null),
    };

    Ok(Interpretation {
        category,
        fake_percent: confidence_percent,
        summary: summarize(category, confidence_percent, label),
        fields: ResultFields {
            scores: Scores {
                misinfo_confidence: Some(confidence_percent),
                ..Scores::default()
            },
            description: Some(profile(category).record_description.to_string()),
            media_ref: None,
            source_text: source_text.map(String::from),
        },
        sub_models: vec![("text_model".to_string(), result)],
        sources,
    })
}
