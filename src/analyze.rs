//! One-shot analysis from the command line.
//!
//! Runs the same flow as the web UI: check the input, call the detection
//! API, interpret the response, record the result in the category's
//! history, and print the verdict. Used by `verity analyze`.

use anyhow::{bail, Context, Result};
use axum::body::Bytes;
use std::path::Path;

use verity_core::{interpret, Category, Interpretation};

use crate::config::Config;
use crate::relay::{create_api, AnalysisInput};
use crate::sqlite_store::open_history;

/// Best-effort MIME type from a file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "webm" => "video/webm",
        "mkv" => "video/mkv",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Build the relay input for `category` from a file path or inline text.
fn build_input(category: Category, path: Option<&Path>, text: Option<&str>) -> Result<AnalysisInput> {
    if category == Category::Misinfo {
        let text = match (text, path) {
            (Some(t), _) => t.to_string(),
            (None, Some(p)) => std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read text file: {}", p.display()))?,
            (None, None) => String::new(),
        };
        return Ok(AnalysisInput::Text(text));
    }

    let path = match path {
        Some(p) => p,
        None => bail!("a file path is required for {} analysis", category),
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    Ok(AnalysisInput::Media {
        category,
        file_name,
        content_type: content_type_for(path).to_string(),
        bytes: Bytes::from(bytes),
    })
}

/// Run the analyze command.
pub async fn run_analyze(
    config: &Config,
    category: &str,
    path: Option<&Path>,
    text: Option<&str>,
) -> Result<()> {
    let category = match Category::parse(category) {
        Some(c) => c,
        None => bail!(
            "Unknown category: '{}'. Must be deepfake, audio, image, or misinfo.",
            category
        ),
    };

    let input = build_input(category, path, text)?;
    input.validate()?;
    let source_text = match &input {
        AnalysisInput::Text(t) => Some(t.clone()),
        AnalysisInput::Media { .. } => None,
    };
    let media_ref = path.map(|p| p.display().to_string());

    let api = create_api(&config.upstream)?;
    let response = api.analyze(input).await?;
    let outcome = interpret(category, &response, media_ref, source_text.as_deref())?;

    let history = open_history(config).await?;
    let records = history.save_to(category, outcome.fields.clone()).await?;

    print_outcome(&outcome);
    println!();
    println!(
        "Saved to {} history ({} record{}).",
        category,
        records.len(),
        if records.len() == 1 { "" } else { "s" }
    );

    Ok(())
}

fn print_outcome(outcome: &Interpretation) {
    println!("{}", outcome.summary.label);
    println!("  fake probability: {:.0}%", outcome.fake_percent);

    if !outcome.sub_models.is_empty() {
        println!();
        for (name, result) in &outcome.sub_models {
            println!(
                "  {:<16} {:<12} {:>5.1}%",
                name,
                result.label,
                result.confidence * 100.0
            );
        }
    }

    if !outcome.sources.is_empty() {
        println!();
        println!("  Sources:");
        for source in &outcome.sources {
            println!("    {}", source.link);
            if let Some(snippet) = &source.snippet {
                println!("      {}", snippet);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(content_type_for(Path::new("voice.mp3")), "audio/mpeg");
        assert_eq!(
            content_type_for(Path::new("blob")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_misinfo_input_prefers_inline_text() {
        let input = build_input(Category::Misinfo, None, Some("claim")).unwrap();
        assert!(matches!(input, AnalysisInput::Text(ref t) if t == "claim"));
    }

    #[test]
    fn test_media_input_requires_path() {
        assert!(build_input(Category::Image, None, None).is_err());
    }
}
