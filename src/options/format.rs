//! Output format negotiation based on the Accept header
//!
//! Only formats the client names explicitly count: `image/*` says nothing
//! about AVIF support, so a wildcard never selects a modern format.
//! Preference is AVIF, then WebP; otherwise the configured default stands.

use super::OutputFormat;

/// Parsed Accept header entry
#[derive(Debug, Clone)]
struct FormatPreference {
    format: OutputFormat,
    quality: f32,
}

/// Pick the best modern format the client accepts, if any
pub fn negotiate_format(accept_header: Option<&str>) -> Option<OutputFormat> {
    let preferences = parse_accept_header(accept_header?);

    [OutputFormat::Avif, OutputFormat::Webp]
        .into_iter()
        .find(|candidate| is_format_acceptable(&preferences, *candidate))
}

/// Parse Accept header into format preferences with quality values
fn parse_accept_header(accept: &str) -> Vec<FormatPreference> {
    let mut preferences = Vec::new();

    for part in accept.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (media_type, quality) = match part.split_once(';') {
            Some((mt, params)) => (mt.trim(), parse_quality(params)),
            None => (part, 1.0),
        };

        if let Some(format) = parse_image_media_type(media_type) {
            preferences.push(FormatPreference { format, quality });
        }
    }

    preferences
}

/// Parse quality value from parameters (e.g., "q=0.8")
fn parse_quality(params: &str) -> f32 {
    for param in params.split(';') {
        if let Some(q) = param.trim().strip_prefix("q=") {
            if let Ok(quality) = q.trim().parse::<f32>() {
                return quality.clamp(0.0, 1.0);
            }
        }
    }
    1.0
}

fn parse_image_media_type(media_type: &str) -> Option<OutputFormat> {
    match media_type.to_ascii_lowercase().as_str() {
        "image/avif" => Some(OutputFormat::Avif),
        "image/webp" => Some(OutputFormat::Webp),
        "image/jpeg" | "image/jpg" => Some(OutputFormat::Jpeg),
        "image/png" => Some(OutputFormat::Png),
        "image/gif" => Some(OutputFormat::Gif),
        _ => None,
    }
}

fn is_format_acceptable(preferences: &[FormatPreference], format: OutputFormat) -> bool {
    preferences
        .iter()
        .any(|pref| pref.format == format && pref.quality > 0.0)
}

/// Vary header value for negotiated responses
pub fn vary_header() -> &'static str {
    "Accept"
}
