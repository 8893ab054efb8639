//! Option resolution
//!
//! Three tiers, first match wins:
//!
//! 1. Explicit query parameters (without `derivative=`)
//! 2. A derivative template: `derivative=` param, then path segment, then
//!    route. Explicit parameters are layered on top.
//! 3. Responsive defaults with a detected width
//!
//! Format negotiation and `width=auto` resolution run after every tier.
//! Resolution never fails: errors are logged and yield empty options.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    negotiate_format, DerivativeRegistry, Fit, MetadataPolicy, OutputFormat, TransformOptions,
    Width,
};
use crate::constants::{DEFAULT_QUALITY, MAX_QUALITY, MIN_QUALITY};
use crate::error::ImageServiceError;
use crate::pipeline::ImageRequest;
use crate::responsive::{resolve_auto_width, ResponsiveConfig};
use crate::router::Router;

pub const SOURCE_EXPLICIT: &str = "explicit-params";
pub const SOURCE_DERIVATIVE_PREFIX: &str = "derivative-";

/// Baseline option values for the responsive tier and format fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultOptions {
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_fit")]
    pub fit: Fit,
    #[serde(default = "default_metadata")]
    pub metadata: MetadataPolicy,
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_fit() -> Fit {
    Fit::ScaleDown
}

fn default_metadata() -> MetadataPolicy {
    MetadataPolicy::Copyright
}

fn default_format() -> OutputFormat {
    OutputFormat::Auto
}

impl Default for DefaultOptions {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            fit: default_fit(),
            metadata: default_metadata(),
            format: default_format(),
        }
    }
}

impl DefaultOptions {
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(format!(
                "defaults.quality must be between {} and {}, got {}",
                MIN_QUALITY, MAX_QUALITY, self.quality
            ));
        }
        Ok(())
    }
}

/// Resolved options plus whether the output format was negotiated from `Accept`
#[derive(Debug, Clone, Default)]
pub struct ResolvedOptions {
    pub options: TransformOptions,
    /// No valid explicit `format`; the response varies on `Accept`
    pub format_negotiated: bool,
}

/// Resolves [`TransformOptions`] for a request
pub struct OptionResolver {
    derivatives: Arc<DerivativeRegistry>,
    router: Arc<Router>,
    defaults: DefaultOptions,
    responsive: ResponsiveConfig,
}

impl OptionResolver {
    pub fn new(
        derivatives: Arc<DerivativeRegistry>,
        router: Arc<Router>,
        defaults: DefaultOptions,
        responsive: ResponsiveConfig,
    ) -> Self {
        Self {
            derivatives,
            router,
            defaults,
            responsive,
        }
    }

    /// Resolve options for a request. Never fails; see module docs.
    pub fn determine_image_options(
        &self,
        request: &ImageRequest,
        params: &HashMap<String, String>,
        pathname: &str,
    ) -> TransformOptions {
        self.resolve(request, params, pathname).options
    }

    /// Like [`determine_image_options`](Self::determine_image_options), also
    /// reporting whether the format came from content negotiation
    pub fn resolve(
        &self,
        request: &ImageRequest,
        params: &HashMap<String, String>,
        pathname: &str,
    ) -> ResolvedOptions {
        match self.try_resolve(request, params, pathname) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(
                    path = %pathname,
                    error = %e,
                    "Option resolution failed, continuing with empty options"
                );
                ResolvedOptions::default()
            }
        }
    }

    fn try_resolve(
        &self,
        request: &ImageRequest,
        params: &HashMap<String, String>,
        pathname: &str,
    ) -> Result<ResolvedOptions, ImageServiceError> {
        let explicit = TransformOptions::from_params(params);
        let explicit_derivative = params
            .get("derivative")
            .map(|d| d.trim())
            .filter(|d| !d.is_empty());

        let mut options = if explicit_derivative.is_none()
            && TransformOptions::has_explicit_params(params)
        {
            let mut options = explicit.clone();
            options.source = Some(SOURCE_EXPLICIT.to_string());
            options
        } else if let Some(name) = explicit_derivative
            .or_else(|| self.derivatives.derivative_for_path(pathname))
            .or_else(|| self.router.resolve(request.hostname()).derivative)
        {
            let template = self.derivatives.get(name).ok_or_else(|| {
                ImageServiceError::Validation(format!("unknown derivative '{}'", name))
            })?;
            let mut options = template.clone();
            options.apply_overrides(&explicit);
            options.source = Some(format!("{}{}", SOURCE_DERIVATIVE_PREFIX, name));
            options.derivative = Some(name.to_string());
            options
        } else {
            let detected = resolve_auto_width(request, &self.responsive);
            TransformOptions {
                width: Some(Width::Pixels(detected.width)),
                quality: Some(self.defaults.quality),
                fit: Some(self.defaults.fit),
                metadata: explicit.metadata.or(Some(self.defaults.metadata)),
                source: Some(detected.source.as_str().to_string()),
                ..Default::default()
            }
        };

        let format_negotiated = explicit.format.is_none();
        if format_negotiated {
            match negotiate_format(request.header("accept")) {
                Some(format) => options.format = Some(format),
                None => {
                    options.format.get_or_insert(self.defaults.format);
                }
            }
        }

        if options.width == Some(Width::Auto) {
            let detected = resolve_auto_width(request, &self.responsive);
            options.width = Some(Width::Pixels(detected.width));
        }

        Ok(ResolvedOptions {
            options,
            format_negotiated,
        })
    }
}
