//! Transformation options
//!
//! [`TransformOptions`] is what the resolver produces for a request. It may
//! carry `width: auto` and the diagnostic-only `source`/`derivative` tags.
//! [`TransformDirective`] is what crosses the boundary to the managed
//! resizing service: concrete width, no diagnostics, `None` fields omitted.
//!
//! Query parameters use the long names the resizing service understands:
//! `?width=800&height=600&fit=cover&quality=80&format=webp`

pub mod derivative;
pub mod format;
pub mod resolver;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::{MAX_QUALITY, MIN_QUALITY};
use crate::error::ImageServiceError;

pub use derivative::DerivativeRegistry;
pub use format::{negotiate_format, vary_header};
pub use resolver::{DefaultOptions, OptionResolver, ResolvedOptions};

/// Query parameters that switch the resolver into explicit mode
pub const EXPLICIT_PARAMS: &[&str] = &[
    "width",
    "height",
    "fit",
    "quality",
    "format",
    "gravity",
    "dpr",
    "sharpen",
    "brightness",
    "contrast",
    "background",
    "compression",
    "upscale",
];

/// How the image is fitted into the requested box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Fit {
    ScaleDown,
    Contain,
    Cover,
    Crop,
    Pad,
}

impl Fit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fit::ScaleDown => "scale-down",
            Fit::Contain => "contain",
            Fit::Cover => "cover",
            Fit::Crop => "crop",
            Fit::Pad => "pad",
        }
    }
}

impl FromStr for Fit {
    type Err = ImageServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scale-down" => Ok(Fit::ScaleDown),
            "contain" => Ok(Fit::Contain),
            "cover" => Ok(Fit::Cover),
            "crop" => Ok(Fit::Crop),
            "pad" => Ok(Fit::Pad),
            _ => Err(ImageServiceError::Validation(format!(
                "unknown fit mode: {}",
                s
            ))),
        }
    }
}

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Let the resizing service pick based on the client
    Auto,
    Avif,
    Webp,
    Jpeg,
    Png,
    Gif,
    /// Image metadata as JSON instead of pixels
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Auto => "auto",
            OutputFormat::Avif => "avif",
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ImageServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(OutputFormat::Auto),
            "avif" => Ok(OutputFormat::Avif),
            "webp" => Ok(OutputFormat::Webp),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "gif" => Ok(OutputFormat::Gif),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ImageServiceError::Validation(format!(
                "unknown format: {}",
                s
            ))),
        }
    }
}

/// Crop anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gravity {
    Auto,
    Center,
    Face,
    Top,
    Left,
    Bottom,
    Right,
}

impl Gravity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gravity::Auto => "auto",
            Gravity::Center => "center",
            Gravity::Face => "face",
            Gravity::Top => "top",
            Gravity::Left => "left",
            Gravity::Bottom => "bottom",
            Gravity::Right => "right",
        }
    }
}

impl FromStr for Gravity {
    type Err = ImageServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Gravity::Auto),
            "center" | "centre" => Ok(Gravity::Center),
            "face" => Ok(Gravity::Face),
            "top" => Ok(Gravity::Top),
            "left" => Ok(Gravity::Left),
            "bottom" => Ok(Gravity::Bottom),
            "right" => Ok(Gravity::Right),
            _ => Err(ImageServiceError::Validation(format!(
                "unknown gravity: {}",
                s
            ))),
        }
    }
}

/// Which source metadata (EXIF etc.) survives the transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataPolicy {
    Keep,
    Copyright,
    None,
}

impl MetadataPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataPolicy::Keep => "keep",
            MetadataPolicy::Copyright => "copyright",
            MetadataPolicy::None => "none",
        }
    }
}

impl FromStr for MetadataPolicy {
    type Err = ImageServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(MetadataPolicy::Keep),
            "copyright" => Ok(MetadataPolicy::Copyright),
            "none" => Ok(MetadataPolicy::None),
            _ => Err(ImageServiceError::Validation(format!(
                "unknown metadata policy: {}",
                s
            ))),
        }
    }
}

/// Requested width: pixels, or `auto` until the responsive detector runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Pixels(u32),
    Auto,
}

impl Width {
    pub fn pixels(&self) -> Option<u32> {
        match self {
            Width::Pixels(px) => Some(*px),
            Width::Auto => None,
        }
    }

    /// Parse a query value; `None` for anything that is not `auto` or a positive number
    pub fn parse(value: &str) -> Option<Width> {
        if value.trim().eq_ignore_ascii_case("auto") {
            return Some(Width::Auto);
        }
        parse_dimension(value).map(Width::Pixels)
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::Pixels(px) => write!(f, "{}", px),
            Width::Auto => write!(f, "auto"),
        }
    }
}

impl Serialize for Width {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Width::Pixels(px) => serializer.serialize_u32(*px),
            Width::Auto => serializer.serialize_str("auto"),
        }
    }
}

impl<'de> Deserialize<'de> for Width {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WidthVisitor;

        impl<'de> Visitor<'de> for WidthVisitor {
            type Value = Width;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a positive pixel width or \"auto\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Width, E> {
                match u32::try_from(v) {
                    Ok(px) if px > 0 => Ok(Width::Pixels(px)),
                    _ => Err(E::custom(format!("width out of range: {}", v))),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Width, E> {
                match u64::try_from(v) {
                    Ok(v) => self.visit_u64(v),
                    Err(_) => Err(E::custom(format!("width must be positive: {}", v))),
                }
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Width, E> {
                if v.is_finite() && v >= 1.0 && v <= u32::MAX as f64 {
                    Ok(Width::Pixels(v.round() as u32))
                } else {
                    Err(E::custom(format!("width out of range: {}", v)))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Width, E> {
                Width::parse(v).ok_or_else(|| E::custom(format!("invalid width: {}", v)))
            }
        }

        deserializer.deserialize_any(WidthVisitor)
    }
}

/// Parse a numeric query value the lenient way: float parsing, rounded,
/// positive only
fn parse_dimension(value: &str) -> Option<u32> {
    let n = parse_number(value)?;
    if n >= 1.0 && n <= u32::MAX as f64 {
        Some(n.round() as u32)
    } else {
        None
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_quality(value: &str) -> Option<u8> {
    let n = parse_number(value)?.round();
    if n >= MIN_QUALITY as f64 && n <= MAX_QUALITY as f64 {
        Some(n as u8)
    } else {
        None
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// The canonical transformation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<Width>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<Fit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<Gravity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpen: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    /// Provenance tag, diagnostics only
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Derivative applied, diagnostics only
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub derivative: Option<String>,
}

impl TransformOptions {
    /// True if any explicit transformation parameter is present in the query
    pub fn has_explicit_params(params: &HashMap<String, String>) -> bool {
        EXPLICIT_PARAMS.iter().any(|p| params.contains_key(*p))
    }

    /// Build options from query parameters.
    ///
    /// Values that do not parse, or fall outside what the resizing service
    /// accepts, are dropped without error.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |name: &str| params.get(name).map(String::as_str);

        let mut options = TransformOptions {
            width: get("width").and_then(Width::parse),
            height: get("height").and_then(parse_dimension),
            fit: get("fit").and_then(|v| v.parse().ok()),
            quality: get("quality").and_then(parse_quality),
            format: get("format").and_then(|v| v.parse().ok()),
            gravity: get("gravity").and_then(|v| v.parse().ok()),
            metadata: get("metadata").and_then(|v| v.parse().ok()),
            sharpen: get("sharpen").and_then(parse_number),
            brightness: get("brightness").and_then(parse_number),
            contrast: get("contrast").and_then(parse_number),
            dpr: get("dpr").and_then(parse_number).filter(|d| *d > 0.0),
            background: get("background").and_then(non_empty),
            compression: get("compression").and_then(non_empty),
            source: None,
            derivative: None,
        };

        // upscale=false without an explicit fit means "never enlarge"
        if options.fit.is_none()
            && matches!(get("upscale"), Some(v) if v == "false" || v == "0")
        {
            options.fit = Some(Fit::ScaleDown);
        }

        options
    }

    /// Copy every field set in `overrides` onto `self`
    pub fn apply_overrides(&mut self, overrides: &TransformOptions) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if overrides.$field.is_some() {
                    self.$field = overrides.$field.clone();
                })*
            };
        }
        take!(
            width, height, fit, quality, format, gravity, metadata, sharpen, brightness,
            contrast, dpr, background, compression
        );
    }

    /// True if any field the resizing service acts on is set
    pub fn has_transformations(&self) -> bool {
        self.width.is_some()
            || self.height.is_some()
            || self.fit.is_some()
            || self.quality.is_some()
            || self.format.is_some()
            || self.gravity.is_some()
            || self.metadata.is_some()
            || self.sharpen.is_some()
            || self.brightness.is_some()
            || self.contrast.is_some()
            || self.dpr.is_some()
            || self.background.is_some()
            || self.compression.is_some()
    }
}

/// Options in the form the managed resizing service accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformDirective {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<Fit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<Gravity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpen: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

impl TryFrom<&TransformOptions> for TransformDirective {
    type Error = ImageServiceError;

    fn try_from(options: &TransformOptions) -> Result<Self, Self::Error> {
        let width = match options.width {
            Some(Width::Auto) => {
                return Err(ImageServiceError::Validation(
                    "width \"auto\" must be resolved before calling the resizing service"
                        .to_string(),
                ))
            }
            Some(Width::Pixels(px)) => Some(px),
            None => None,
        };

        Ok(TransformDirective {
            width,
            height: options.height,
            fit: options.fit,
            quality: options.quality,
            format: options.format,
            gravity: options.gravity,
            metadata: options.metadata,
            sharpen: options.sharpen,
            brightness: options.brightness,
            contrast: options.contrast,
            dpr: options.dpr,
            background: options.background.clone(),
            compression: options.compression.clone(),
        })
    }
}

impl TransformDirective {
    pub fn is_empty(&self) -> bool {
        *self == TransformDirective::default()
    }

    /// Comma-separated `key=value` list for URL-embedded directives
    /// (`width=320,height=150,fit=scale-down`)
    pub fn to_url_options(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut push = |key: &str, value: String| parts.push(format!("{}={}", key, value));

        if let Some(v) = self.width {
            push("width", v.to_string());
        }
        if let Some(v) = self.height {
            push("height", v.to_string());
        }
        if let Some(v) = self.fit {
            push("fit", v.as_str().to_string());
        }
        if let Some(v) = self.quality {
            push("quality", v.to_string());
        }
        if let Some(v) = self.format {
            push("format", v.as_str().to_string());
        }
        if let Some(v) = self.gravity {
            push("gravity", v.as_str().to_string());
        }
        if let Some(v) = self.metadata {
            push("metadata", v.as_str().to_string());
        }
        if let Some(v) = self.sharpen {
            push("sharpen", v.to_string());
        }
        if let Some(v) = self.brightness {
            push("brightness", v.to_string());
        }
        if let Some(v) = self.contrast {
            push("contrast", v.to_string());
        }
        if let Some(v) = self.dpr {
            push("dpr", v.to_string());
        }
        if let Some(v) = &self.background {
            push("background", urlencoding::encode(v).into_owned());
        }
        if let Some(v) = &self.compression {
            push("compression", urlencoding::encode(v).into_owned());
        }

        parts.join(",")
    }
}
