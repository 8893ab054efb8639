//! Responsive width detection
//!
//! Turns `width=auto` (or a request with no sizing at all) into a concrete
//! pixel width. Signals are tried in order and the first one present wins:
//!
//! 1. Client hints: viewport width times DPR, snapped to a breakpoint
//! 2. Edge device-type header (`cf-device-type`)
//! 3. User-Agent sniffing
//!
//! The cascade always produces a width.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    DEFAULT_BREAKPOINTS, DEFAULT_DESKTOP_WIDTH, DEFAULT_DEVICE_TYPE_HEADER, DEFAULT_MOBILE_WIDTH,
    DEFAULT_TABLET_WIDTH, DPR_HEADERS, VIEWPORT_WIDTH_HEADERS,
};
use crate::pipeline::ImageRequest;

/// Responsive detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsiveConfig {
    #[serde(default = "default_breakpoints")]
    pub breakpoints: Vec<u32>,
    #[serde(default)]
    pub device_widths: DeviceWidths,
    #[serde(default = "default_device_type_header")]
    pub device_type_header: String,
    #[serde(default = "default_viewport_width_headers")]
    pub viewport_width_headers: Vec<String>,
    #[serde(default = "default_dpr_headers")]
    pub dpr_headers: Vec<String>,
}

fn default_breakpoints() -> Vec<u32> {
    DEFAULT_BREAKPOINTS.to_vec()
}

fn default_device_type_header() -> String {
    DEFAULT_DEVICE_TYPE_HEADER.to_string()
}

fn default_viewport_width_headers() -> Vec<String> {
    VIEWPORT_WIDTH_HEADERS.iter().map(|h| h.to_string()).collect()
}

fn default_dpr_headers() -> Vec<String> {
    DPR_HEADERS.iter().map(|h| h.to_string()).collect()
}

impl Default for ResponsiveConfig {
    fn default() -> Self {
        Self {
            breakpoints: default_breakpoints(),
            device_widths: DeviceWidths::default(),
            device_type_header: default_device_type_header(),
            viewport_width_headers: default_viewport_width_headers(),
            dpr_headers: default_dpr_headers(),
        }
    }
}

impl ResponsiveConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.breakpoints.is_empty() {
            return Err("responsive.breakpoints must not be empty".to_string());
        }
        if self.breakpoints.contains(&0) {
            return Err("responsive.breakpoints must be positive".to_string());
        }
        let widths = &self.device_widths;
        if widths.mobile == 0 || widths.tablet == 0 || widths.desktop == 0 {
            return Err("responsive.device_widths must be positive".to_string());
        }
        Ok(())
    }
}

/// Width served per device class when client hints are missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceWidths {
    #[serde(default = "default_mobile_width")]
    pub mobile: u32,
    #[serde(default = "default_tablet_width")]
    pub tablet: u32,
    #[serde(default = "default_desktop_width")]
    pub desktop: u32,
}

fn default_mobile_width() -> u32 {
    DEFAULT_MOBILE_WIDTH
}

fn default_tablet_width() -> u32 {
    DEFAULT_TABLET_WIDTH
}

fn default_desktop_width() -> u32 {
    DEFAULT_DESKTOP_WIDTH
}

impl Default for DeviceWidths {
    fn default() -> Self {
        Self {
            mobile: DEFAULT_MOBILE_WIDTH,
            tablet: DEFAULT_TABLET_WIDTH,
            desktop: DEFAULT_DESKTOP_WIDTH,
        }
    }
}

impl DeviceWidths {
    pub fn for_device(&self, device: DeviceType) -> u32 {
        match device {
            DeviceType::Mobile => self.mobile,
            DeviceType::Tablet => self.tablet,
            DeviceType::Desktop => self.desktop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
        }
    }

    /// Parse an edge device-type header value; unknown values yield `None`
    pub fn from_header(value: &str) -> Option<DeviceType> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mobile" => Some(DeviceType::Mobile),
            "tablet" => Some(DeviceType::Tablet),
            "desktop" => Some(DeviceType::Desktop),
            _ => None,
        }
    }
}

/// Which signal decided the width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthSource {
    ClientHints,
    DeviceType,
    UserAgent,
}

impl WidthSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidthSource::ClientHints => "client-hints-responsive",
            WidthSource::DeviceType => "cf-device-responsive",
            WidthSource::UserAgent => "user-agent-responsive",
        }
    }
}

impl fmt::Display for WidthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsiveWidth {
    pub width: u32,
    pub source: WidthSource,
}

/// Device signals found on a request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientSignals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent_class: Option<DeviceType>,
}

impl ClientSignals {
    pub fn from_request(request: &ImageRequest, config: &ResponsiveConfig) -> Self {
        Self {
            viewport_width: first_positive(request, &config.viewport_width_headers),
            dpr: first_positive(request, &config.dpr_headers),
            device_type: request
                .header(&config.device_type_header)
                .and_then(DeviceType::from_header),
            user_agent_class: request.header("user-agent").map(classify_user_agent),
        }
    }

    /// Compact `key=value` rendering for debug headers
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(vw) = self.viewport_width {
            parts.push(format!("viewport-width={}", vw));
        }
        if let Some(dpr) = self.dpr {
            parts.push(format!("dpr={}", dpr));
        }
        if let Some(device) = self.device_type {
            parts.push(format!("device-type={}", device.as_str()));
        }
        if let Some(class) = self.user_agent_class {
            parts.push(format!("user-agent={}", class.as_str()));
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(",")
        }
    }
}

/// First header in `names` holding a positive finite number
fn first_positive(request: &ImageRequest, names: &[String]) -> Option<f64> {
    names.iter().find_map(|name| {
        request
            .header(name)
            .and_then(|v| v.trim().trim_matches('"').parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
    })
}

/// Compute a concrete width for a request
pub fn resolve_auto_width(request: &ImageRequest, config: &ResponsiveConfig) -> ResponsiveWidth {
    let signals = ClientSignals::from_request(request, config);

    if let Some(viewport) = signals.viewport_width {
        let dpr = signals.dpr.unwrap_or(1.0);
        let scaled = (viewport * dpr).round().min(u32::MAX as f64) as u32;
        return ResponsiveWidth {
            width: snap_to_breakpoint(scaled, &config.breakpoints),
            source: WidthSource::ClientHints,
        };
    }

    if let Some(device) = signals.device_type {
        return ResponsiveWidth {
            width: config.device_widths.for_device(device),
            source: WidthSource::DeviceType,
        };
    }

    let device = signals.user_agent_class.unwrap_or(DeviceType::Desktop);
    ResponsiveWidth {
        width: config.device_widths.for_device(device),
        source: WidthSource::UserAgent,
    }
}

/// Snap `width` to the nearest breakpoint.
///
/// Equidistant neighbours resolve to the smaller breakpoint. With no
/// breakpoints the width is returned as-is (at least 1).
pub fn snap_to_breakpoint(width: u32, breakpoints: &[u32]) -> u32 {
    breakpoints
        .iter()
        .copied()
        .min_by_key(|bp| (bp.abs_diff(width), *bp))
        .unwrap_or_else(|| width.max(1))
}

/// Classify a User-Agent string by substring heuristics
pub fn classify_user_agent(user_agent: &str) -> DeviceType {
    let ua = user_agent.to_ascii_lowercase();
    let has = |needle: &str| ua.contains(needle);

    if has("ipad")
        || has("tablet")
        || has("kindle")
        || has("silk")
        || (has("android") && !has("mobile"))
    {
        DeviceType::Tablet
    } else if has("mobile")
        || has("iphone")
        || has("ipod")
        || has("android")
        || has("blackberry")
        || has("opera mini")
        || has("iemobile")
    {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const BREAKPOINTS: &[u32] = &[320, 768, 960, 1440, 1920, 2048];

    fn request() -> ImageRequest {
        ImageRequest::get("https://images.example.com/cat.jpg").unwrap()
    }

    fn config() -> ResponsiveConfig {
        ResponsiveConfig {
            breakpoints: BREAKPOINTS.to_vec(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(300, 320)]
    #[case(800, 768)]
    #[case(1200, 960)]
    #[case(1201, 1440)]
    #[case(2400, 2048)]
    #[case(1, 320)]
    fn test_snap_to_breakpoint(#[case] width: u32, #[case] expected: u32) {
        assert_eq!(snap_to_breakpoint(width, BREAKPOINTS), expected);
    }

    #[test]
    fn test_snap_without_breakpoints() {
        assert_eq!(snap_to_breakpoint(1234, &[]), 1234);
        assert_eq!(snap_to_breakpoint(0, &[]), 1);
    }

    #[test]
    fn test_client_hints_scaled_by_dpr() {
        let req = request()
            .with_header("sec-ch-viewport-width", "1200")
            .with_header("sec-ch-dpr", "2");
        let width = resolve_auto_width(&req, &config());
        assert_eq!(width.width, 2048);
        assert_eq!(width.source.as_str(), "client-hints-responsive");
    }

    #[test]
    fn test_client_hints_are_deterministic() {
        let req = request().with_header("viewport-width", "1200");
        let first = resolve_auto_width(&req, &config());
        for _ in 0..10 {
            assert_eq!(resolve_auto_width(&req, &config()), first);
        }
        assert_eq!(first.width, 960);
    }

    #[test]
    fn test_invalid_hint_falls_through() {
        let req = request()
            .with_header("sec-ch-viewport-width", "wide")
            .with_header("cf-device-type", "tablet");
        let width = resolve_auto_width(&req, &config());
        assert_eq!(width.width, 768);
        assert_eq!(width.source, WidthSource::DeviceType);
    }

    #[test]
    fn test_unknown_device_type_falls_back_to_user_agent() {
        let req = request()
            .with_header("cf-device-type", "toaster")
            .with_header("user-agent", "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile/15E148");
        let width = resolve_auto_width(&req, &config());
        assert_eq!(width.width, 480);
        assert_eq!(width.source, WidthSource::UserAgent);
    }

    #[test]
    fn test_no_signals_defaults_to_desktop() {
        let width = resolve_auto_width(&request(), &config());
        assert_eq!(width.width, 1440);
        assert_eq!(width.source.as_str(), "user-agent-responsive");
    }

    #[rstest]
    #[case("Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X)", DeviceType::Tablet)]
    #[case("Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36", DeviceType::Tablet)]
    #[case("Mozilla/5.0 (Linux; Android 13; Pixel 7) Mobile Safari/537.36", DeviceType::Mobile)]
    #[case("Opera/9.80 (J2ME/MIDP; Opera Mini/9.80)", DeviceType::Mobile)]
    #[case("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0", DeviceType::Desktop)]
    fn test_classify_user_agent(#[case] ua: &str, #[case] expected: DeviceType) {
        assert_eq!(classify_user_agent(ua), expected);
    }

    #[test]
    fn test_signals_summary() {
        let req = request()
            .with_header("sec-ch-viewport-width", "390")
            .with_header("sec-ch-dpr", "3");
        let signals = ClientSignals::from_request(&req, &config());
        assert_eq!(signals.summary(), "viewport-width=390,dpr=3");
        assert_eq!(ClientSignals::default().summary(), "none");
    }

    #[test]
    fn test_config_validation() {
        assert!(ResponsiveConfig::default().validate().is_ok());
        let empty = ResponsiveConfig {
            breakpoints: vec![],
            ..Default::default()
        };
        assert!(empty.validate().is_err());
    }
}
