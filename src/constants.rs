// Constants module - centralized default values for configuration
//
// Every default the config layer falls back to lives here so that the
// resolver, detector and strategy code never carry magic numbers.

// =============================================================================
// Server defaults
// =============================================================================

/// Default number of worker threads
pub const DEFAULT_THREADS: usize = 4;

/// Default environment name when none is configured
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Environment name in which error bodies omit internal detail
pub const PRODUCTION_ENVIRONMENT: &str = "production";

// =============================================================================
// Transformation defaults
// =============================================================================

/// Default output quality for the responsive tier
pub const DEFAULT_QUALITY: u8 = 85;

/// Lower bound accepted by the managed resizing service
pub const MIN_QUALITY: u8 = 1;

/// Upper bound accepted by the managed resizing service
pub const MAX_QUALITY: u8 = 100;

// =============================================================================
// Responsive defaults
// =============================================================================

/// Breakpoints computed widths are snapped to
pub const DEFAULT_BREAKPOINTS: &[u32] = &[320, 640, 768, 960, 1024, 1440, 1920, 2048];

/// Width served to phones when no client hints are available
pub const DEFAULT_MOBILE_WIDTH: u32 = 480;

/// Width served to tablets when no client hints are available
pub const DEFAULT_TABLET_WIDTH: u32 = 768;

/// Width served to desktops when no client hints are available
pub const DEFAULT_DESKTOP_WIDTH: u32 = 1440;

/// Client hint headers carrying the viewport width, in lookup order
pub const VIEWPORT_WIDTH_HEADERS: &[&str] = &["sec-ch-viewport-width", "viewport-width"];

/// Client hint headers carrying the device pixel ratio, in lookup order
pub const DPR_HEADERS: &[&str] = &["sec-ch-dpr", "dpr"];

/// Edge-provided device classification header
pub const DEFAULT_DEVICE_TYPE_HEADER: &str = "cf-device-type";

// =============================================================================
// Managed resizing defaults
// =============================================================================

/// Token the resizing layer puts in `Via` when it re-enters this service
pub const DEFAULT_RESIZING_MARKER: &str = "image-resizing";

/// Header carrying the JSON directive in metadata mode
pub const DEFAULT_OPTIONS_HEADER: &str = "x-resize-options";

/// Header carrying the source URL in metadata mode
pub const DEFAULT_SOURCE_HEADER: &str = "x-resize-source";

/// Outbound request timeout in seconds (resizing service and remote origins)
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Host suffixes that belong to the hosting platform rather than a custom domain
pub const DEFAULT_PLATFORM_DOMAINS: &[&str] = &["workers.dev"];

// =============================================================================
// Cache defaults
// =============================================================================

/// Default number of transformed responses kept in memory
pub const DEFAULT_RESPONSE_CACHE_ENTRIES: u64 = 1000;

/// Cache-Control value attached to every error response
pub const NO_STORE: &str = "no-store";

// =============================================================================
// Debug defaults
// =============================================================================

/// Prefix for diagnostic response headers
pub const DEFAULT_DEBUG_PREFIX: &str = "debug-";

/// Header echoing the request id on every response
pub const REQUEST_ID_HEADER: &str = "x-request-id";
