//! Detection-API relay.
//!
//! Defines the [`DetectionApi`] seam the server and CLI call, and two
//! implementations:
//! - **[`HttpDetectionApi`]** forwards uploads and text to the configured
//!   external detection service.
//! - **[`SimulatedDetectionApi`]** answers locally with placeholder scores.
//!   It is not a model; it exists for offline demos and tests.
//!
//! # Request shapes
//!
//! | Category | Upstream body |
//! |----------|---------------|
//! | deepfake | multipart, file field `video` |
//! | audio | multipart, file field `audio` |
//! | image | multipart, file field `image` |
//! | misinfo | JSON `{"text": "..."}` |
//!
//! The audio service answers `{confidence, label, reason}`; the relay wraps
//! that into `{audio_models: {voice_analysis: {...}}}` because response
//! interpretation expects the wrapped shape. Every other body is relayed
//! unmodified.
//!
//! # Errors
//!
//! Failures are never retried. Each maps to a fixed code:
//!
//! | Failure | Status | Code (deepfake / audio / image / misinfo) |
//! |---------|--------|------------------------------------------|
//! | nothing to analyze | 400 | `NO_VIDEO_FILE` / `NO_AUDIO_FILE` / `NO_IMAGE_FILE` / `NO_TEXT` |
//! | upstream non-2xx | upstream's | `API_ERROR` / `AUDIO_API_ERROR` / `IMAGE_API_ERROR` / `MISINFO_API_ERROR` |
//! | timeout | 504 | `API_TIMEOUT` / `AUDIO_API_TIMEOUT` / … |
//! | unreachable | 502 | `API_TIMEOUT` / `AUDIO_API_TIMEOUT` / … |
//! | request setup | 500 | `REQUEST_ERROR` / `AUDIO_REQUEST_ERROR` / … |

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Bytes;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use verity_core::Category;

use crate::config::UpstreamConfig;

/// Something to analyze.
#[derive(Debug, Clone)]
pub enum AnalysisInput {
    /// An uploaded media file for the deepfake, audio, or image detector.
    Media {
        category: Category,
        file_name: String,
        content_type: String,
        /// Shared with the request body that received it; never copied.
        bytes: Bytes,
    },
    /// Text for the misinformation detector.
    Text(String),
}

impl AnalysisInput {
    pub fn category(&self) -> Category {
        match self {
            AnalysisInput::Media { category, .. } => *category,
            AnalysisInput::Text(_) => Category::Misinfo,
        }
    }

    /// Reject input with nothing to analyze before any network call.
    pub fn validate(&self) -> Result<(), RelayError> {
        let category = self.category();
        let empty = match self {
            AnalysisInput::Media {
                category, bytes, ..
            } => *category == Category::Misinfo || bytes.is_empty(),
            AnalysisInput::Text(text) => text.trim().is_empty(),
        };
        if empty {
            Err(RelayError::new(category, RelayErrorKind::NoInput))
        } else {
            Ok(())
        }
    }
}

/// Multipart field name the detection API expects for a category.
pub fn upload_field(category: Category) -> Option<&'static str> {
    match category {
        Category::Deepfake => Some("video"),
        Category::Audio => Some("audio"),
        Category::Image => Some("image"),
        Category::Misinfo => None,
    }
}

/// What went wrong while relaying.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayErrorKind {
    /// No file or text was supplied.
    NoInput,
    /// The detection API answered with a non-success status.
    Upstream { status: u16, body: Value },
    /// The detection API did not answer within the timeout.
    Timeout(String),
    /// The detection API could not be reached.
    Unreachable(String),
    /// The request could not be built.
    Request(String),
}

/// A relay failure for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayError {
    pub category: Category,
    pub kind: RelayErrorKind,
}

impl RelayError {
    pub fn new(category: Category, kind: RelayErrorKind) -> Self {
        Self { category, kind }
    }

    fn code_prefix(&self) -> &'static str {
        match self.category {
            Category::Deepfake => "",
            Category::Audio => "AUDIO_",
            Category::Image => "IMAGE_",
            Category::Misinfo => "MISINFO_",
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> String {
        match &self.kind {
            RelayErrorKind::NoInput => match self.category {
                Category::Deepfake => "NO_VIDEO_FILE".to_string(),
                Category::Audio => "NO_AUDIO_FILE".to_string(),
                Category::Image => "NO_IMAGE_FILE".to_string(),
                Category::Misinfo => "NO_TEXT".to_string(),
            },
            RelayErrorKind::Upstream { .. } => format!("{}API_ERROR", self.code_prefix()),
            RelayErrorKind::Timeout(_) | RelayErrorKind::Unreachable(_) => {
                format!("{}API_TIMEOUT", self.code_prefix())
            }
            RelayErrorKind::Request(_) => format!("{}REQUEST_ERROR", self.code_prefix()),
        }
    }

    /// HTTP status to answer with.
    pub fn status(&self) -> u16 {
        match &self.kind {
            RelayErrorKind::NoInput => 400,
            RelayErrorKind::Upstream { status, .. } => *status,
            RelayErrorKind::Timeout(_) => 504,
            RelayErrorKind::Unreachable(_) => 502,
            RelayErrorKind::Request(_) => 500,
        }
    }

    /// Upstream status, present only when the detection API answered.
    pub fn upstream_status(&self) -> Option<u16> {
        match &self.kind {
            RelayErrorKind::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Extra detail: the upstream body, or the transport error text.
    pub fn details(&self) -> Option<Value> {
        match &self.kind {
            RelayErrorKind::NoInput => None,
            RelayErrorKind::Upstream { body, .. } => Some(body.clone()),
            RelayErrorKind::Timeout(msg)
            | RelayErrorKind::Unreachable(msg)
            | RelayErrorKind::Request(msg) => Some(Value::String(msg.clone())),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, RelayErrorKind::Timeout(_))
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (title, noun) = match self.category {
            Category::Deepfake => ("", "deepfake"),
            Category::Audio => ("Audio ", "audio"),
            Category::Image => ("Image ", "image"),
            Category::Misinfo => ("Misinformation ", "misinformation"),
        };
        match &self.kind {
            RelayErrorKind::NoInput => match upload_field(self.category) {
                Some(field) => write!(f, "No {} file provided", field),
                None => f.write_str("No text provided"),
            },
            RelayErrorKind::Upstream { .. } => write!(f, "{}API request failed", title),
            RelayErrorKind::Timeout(_) => {
                write!(f, "Timed out waiting for {} detection API", noun)
            }
            RelayErrorKind::Unreachable(_) => {
                write!(f, "No response from {} detection API", noun)
            }
            RelayErrorKind::Request(_) => {
                let lower = title.to_lowercase();
                write!(f, "Error setting up {}API request", lower)
            }
        }
    }
}

impl std::error::Error for RelayError {}

/// The external detection service, as seen by the server and CLI.
///
/// Implementations return the response body in the shape
/// [`verity_core::interpret`] expects.
#[async_trait]
pub trait DetectionApi: Send + Sync {
    /// Short name for logs and the health endpoint.
    fn name(&self) -> &str;

    /// Analyze one input.
    async fn analyze(&self, input: AnalysisInput) -> Result<Value, RelayError>;
}

/// Bring a raw detection-API body into the shape interpretation expects.
///
/// Only audio changes: `{confidence, label, reason}` is wrapped into
/// `{audio_models: {voice_analysis: {...}}}`.
pub fn normalize_response(category: Category, raw: Value) -> Value {
    match category {
        Category::Audio => json!({
            "audio_models": {
                "voice_analysis": {
                    "confidence": raw.get("confidence").cloned().unwrap_or(Value::Null),
                    "label": raw.get("label").cloned().unwrap_or(Value::Null),
                    "reason": raw.get("reason").cloned().unwrap_or(Value::Null),
                }
            }
        }),
        _ => raw,
    }
}

// ============ HTTP relay ============

/// Forwards analysis requests to the configured detection API over HTTP.
pub struct HttpDetectionApi {
    upstream: UpstreamConfig,
    client: reqwest::Client,
}

impl HttpDetectionApi {
    pub fn new(upstream: UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { upstream, client })
    }

    fn classify_send_error(category: Category, err: reqwest::Error) -> RelayError {
        let kind = if err.is_timeout() {
            RelayErrorKind::Timeout(err.to_string())
        } else if err.is_builder() {
            RelayErrorKind::Request(err.to_string())
        } else {
            RelayErrorKind::Unreachable(err.to_string())
        };
        RelayError::new(category, kind)
    }
}

#[async_trait]
impl DetectionApi for HttpDetectionApi {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(&self, input: AnalysisInput) -> Result<Value, RelayError> {
        input.validate()?;
        let category = input.category();
        let url = self.upstream.endpoint(category);
        let timeout = Duration::from_secs(self.upstream.timeout_secs(category));

        let request = match input {
            AnalysisInput::Media {
                file_name,
                content_type,
                bytes,
                ..
            } => {
                let field = upload_field(category).unwrap_or("file");
                log::info!(
                    "forwarding {} ({} bytes) to {}",
                    file_name,
                    bytes.len(),
                    url
                );
                let length = bytes.len() as u64;
                let part = reqwest::multipart::Part::stream_with_length(bytes, length)
                    .file_name(file_name)
                    .mime_str(&content_type)
                    .map_err(|e| {
                        RelayError::new(category, RelayErrorKind::Request(e.to_string()))
                    })?;
                let form = reqwest::multipart::Form::new().part(field, part);
                self.client.post(&url).multipart(form)
            }
            AnalysisInput::Text(text) => {
                let preview: String = text.chars().take(50).collect();
                log::info!("forwarding text \"{}...\" to {}", preview, url);
                self.client.post(&url).json(&json!({ "text": text }))
            }
        };

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify_send_error(category, e))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| Self::classify_send_error(category, e))?;

        if !status.is_success() {
            log::warn!("{} detection API responded with {}", category, status);
            let body = serde_json::from_str(&body_text).unwrap_or(Value::String(body_text));
            return Err(RelayError::new(
                category,
                RelayErrorKind::Upstream {
                    status: status.as_u16(),
                    body,
                },
            ));
        }

        let raw: Value = serde_json::from_str(&body_text).map_err(|_| {
            RelayError::new(
                category,
                RelayErrorKind::Upstream {
                    status: 502,
                    body: Value::String(body_text.clone()),
                },
            )
        })?;
        log::debug!("{} detection API response: {}", category, raw);

        Ok(normalize_response(category, raw))
    }
}

// ============ Simulated relay ============

/// Placeholder detector returning random, well-formed responses.
///
/// Scores mean nothing. Use it to exercise the UI and history without a
/// detection service.
pub struct SimulatedDetectionApi;

/// Uniform sample in `[0, 1)` from the random bits of a v4 UUID.
fn unit_random() -> f64 {
    let bits = Uuid::new_v4().as_u128() & ((1u128 << 53) - 1);
    bits as f64 / (1u64 << 53) as f64
}

fn simulated_model(fake_label: &str, real_label: &str) -> Value {
    let label = if unit_random() < 0.5 {
        fake_label
    } else {
        real_label
    };
    json!({
        "label": label,
        "confidence": 0.5 + unit_random() / 2.0,
        "reason": "Simulated result",
    })
}

#[async_trait]
impl DetectionApi for SimulatedDetectionApi {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn analyze(&self, input: AnalysisInput) -> Result<Value, RelayError> {
        input.validate()?;
        let category = input.category();
        let raw = match category {
            Category::Deepfake => json!({
                "video_models": {
                    "rppg": simulated_model("fake", "real"),
                    "lipsync": simulated_model("mismatch", "match"),
                }
            }),
            Category::Image => json!({
                "image_models": {
                    "zeroshot": simulated_model("fake", "real"),
                    "cnn": simulated_model("fake", "real"),
                }
            }),
            Category::Audio => simulated_model("synthetic", "real"),
            Category::Misinfo => {
                let model = simulated_model("fake", "real");
                json!({
                    "text_model": {
                        "label": model["label"].clone(),
                        "confidence": model["confidence"].clone(),
                        "sources": [],
                    }
                })
            }
        };
        Ok(normalize_response(category, raw))
    }
}

/// Build the detection API selected by `upstream.mode`.
pub fn create_api(upstream: &UpstreamConfig) -> Result<Box<dyn DetectionApi>> {
    if upstream.is_simulated() {
        log::warn!("using simulated detection results; scores are placeholders");
        Ok(Box::new(SimulatedDetectionApi))
    } else {
        Ok(Box::new(HttpDetectionApi::new(upstream.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let no_video = RelayError::new(Category::Deepfake, RelayErrorKind::NoInput);
        assert_eq!(no_video.code(), "NO_VIDEO_FILE");
        assert_eq!(no_video.to_string(), "No video file provided");
        assert_eq!(no_video.status(), 400);

        let no_text = RelayError::new(Category::Misinfo, RelayErrorKind::NoInput);
        assert_eq!(no_text.code(), "NO_TEXT");

        let upstream = RelayError::new(
            Category::Audio,
            RelayErrorKind::Upstream {
                status: 422,
                body: json!({"error": "bad audio"}),
            },
        );
        assert_eq!(upstream.code(), "AUDIO_API_ERROR");
        assert_eq!(upstream.status(), 422);
        assert_eq!(upstream.upstream_status(), Some(422));
        assert_eq!(upstream.details(), Some(json!({"error": "bad audio"})));
        assert_eq!(upstream.to_string(), "Audio API request failed");

        let timeout = RelayError::new(Category::Image, RelayErrorKind::Timeout("t".into()));
        assert_eq!(timeout.code(), "IMAGE_API_TIMEOUT");
        assert_eq!(timeout.status(), 504);
        assert!(timeout.is_timeout());

        let setup = RelayError::new(Category::Misinfo, RelayErrorKind::Request("x".into()));
        assert_eq!(setup.code(), "MISINFO_REQUEST_ERROR");
        assert_eq!(
            setup.to_string(),
            "Error setting up misinformation API request"
        );

        let deepfake = RelayError::new(Category::Deepfake, RelayErrorKind::Unreachable("x".into()));
        assert_eq!(deepfake.code(), "API_TIMEOUT");
        assert_eq!(deepfake.status(), 502);
    }

    #[test]
    fn test_audio_response_is_wrapped() {
        let raw = json!({"confidence": 0.93, "label": "synthetic", "reason": "flat prosody"});
        let wrapped = normalize_response(Category::Audio, raw);
        assert_eq!(
            wrapped["audio_models"]["voice_analysis"]["label"],
            "synthetic"
        );
        assert_eq!(wrapped["audio_models"]["voice_analysis"]["confidence"], 0.93);

        let image = json!({"image_models": {}});
        assert_eq!(normalize_response(Category::Image, image.clone()), image);
    }

    #[test]
    fn test_validate_rejects_empty_input() {
        let empty = AnalysisInput::Media {
            category: Category::Image,
            file_name: "a.png".into(),
            content_type: "image/png".into(),
            bytes: Bytes::new(),
        };
        assert_eq!(empty.validate().unwrap_err().code(), "NO_IMAGE_FILE");
        assert!(AnalysisInput::Text("   ".into()).validate().is_err());
        assert!(AnalysisInput::Text("claim".into()).validate().is_ok());
    }

    #[test]
    fn test_media_input_shares_upload_buffer() {
        let upload = Bytes::from(vec![7u8; 1024]);
        let input = AnalysisInput::Media {
            category: Category::Deepfake,
            file_name: "clip.mp4".into(),
            content_type: "video/mp4".into(),
            bytes: upload.clone(),
        };
        let forwarded = input.clone();
        match forwarded {
            AnalysisInput::Media { bytes, .. } => assert_eq!(bytes.as_ptr(), upload.as_ptr()),
            AnalysisInput::Text(_) => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_simulated_responses_interpret() {
        let api = SimulatedDetectionApi;
        for category in [Category::Deepfake, Category::Image, Category::Audio] {
            let input = AnalysisInput::Media {
                category,
                file_name: "sample.bin".into(),
                content_type: "application/octet-stream".into(),
                bytes: Bytes::from_static(&[1, 2, 3]),
            };
            let body = api.analyze(input).await.unwrap();
            let out = verity_core::interpret(category, &body, None, None).unwrap();
            assert!((0.0..=100.0).contains(&out.fake_percent));
        }
        let body = api
            .analyze(AnalysisInput::Text("The earth is flat".into()))
            .await
            .unwrap();
        assert!(verity_core::interpret(Category::Misinfo, &body, None, Some("x")).is_ok());
    }

    #[test]
    fn test_unit_random_range() {
        for _ in 0..100 {
            let r = unit_random();
            assert!((0.0..1.0).contains(&r));
        }
    }
}
