//! Shared constants for the pipeline and providers
//!

use std::time::Duration;

/// Longest side, in pixels, an upload is shrunk to before it goes to a provider.
pub const DEFAULT_MAX_DIMENSION: u32 = 512;

/// JPEG quality used when re-compressing uploads.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Fraction of the base image width the logo is scaled to.
pub const LOGO_WIDTH_FRACTION: f64 = 0.30;

/// Gap between the logo's right edge and the image's right edge.
pub const LOGO_MARGIN_RIGHT: u32 = 20;

/// Gap between the logo's bottom edge and the image's bottom edge.
pub const LOGO_MARGIN_BOTTOM: u32 = 40;

/// Output size requested from providers.
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

/// Default Supabase bucket for finished images.
pub const DEFAULT_BUCKET: &str = "dog-ai-images";

/// Timeout for plain request/response calls to upstream APIs.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Overall budget for a Flux request, including polling.
pub const FLUX_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between Flux result polls.
pub const FLUX_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default upload size limit (20 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 20 * 1024 * 1024;

#[cfg(test)]
/// Storage base used in tests
pub const TEST_STORAGE_BASE: &str = "https://project.supabase.co";
