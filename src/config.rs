//! Config handling

use tracing::log::LevelFilter;
use url::Url;

use crate::cli::CliOptions;
use crate::constants::DEFAULT_IMAGE_SIZE;
use crate::imaging::OptimizeSettings;
use crate::pipeline::GenerationSettings;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Warn)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Startup configuration that can't be served with.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An endpoint isn't an absolute http(s) URL
    #[error("{option} is not a usable URL ({value}): {reason}")]
    BadUrl {
        /// Option name
        option: &'static str,
        /// What was supplied
        value: String,
        /// Why it was refused
        reason: String,
    },
    /// A numeric option is outside its range
    #[error("{option} must be {expected}, got {value}")]
    OutOfRange {
        /// Option name
        option: &'static str,
        /// Accepted range
        expected: &'static str,
        /// What was supplied
        value: String,
    },
}

fn check_url(option: &'static str, value: &str) -> Result<(), ConfigError> {
    let bad = |reason: String| ConfigError::BadUrl {
        option,
        value: value.to_string(),
        reason,
    };
    let parsed = Url::parse(value).map_err(|err| bad(err.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(bad(format!("unsupported scheme {other}"))),
    }
    if parsed.host_str().is_none() {
        return Err(bad("missing host".to_string()));
    }
    Ok(())
}

impl CliOptions {
    /// Checks the options that clap can't, before anything is built from them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("supabase-url", &self.supabase_url)?;
        check_url("openai-base-url", &self.openai_base_url)?;
        check_url("flux-api-url", &self.flux_api_url)?;
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::OutOfRange {
                option: "jpeg-quality",
                expected: "between 1 and 100",
                value: self.jpeg_quality.to_string(),
            });
        }
        if self.max_dimension == 0 {
            return Err(ConfigError::OutOfRange {
                option: "max-dimension",
                expected: "greater than 0",
                value: self.max_dimension.to_string(),
            });
        }
        Ok(())
    }

    /// Optimizer settings for uploads.
    pub fn optimize_settings(&self) -> OptimizeSettings {
        OptimizeSettings {
            max_dimension: self.max_dimension,
            quality: self.jpeg_quality,
        }
    }

    /// Provider call settings.
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            size: DEFAULT_IMAGE_SIZE.to_string(),
            quality: self.openai_image_quality.clone(),
        }
    }
}
