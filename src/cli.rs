//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::constants::{DEFAULT_BODY_LIMIT, DEFAULT_BUCKET, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION};

#[derive(Parser, Debug, Clone)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "PETSTYLE_DEBUG")]
    /// Enable debug logging. Env: PETSTYLE_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "8000", env = "PETSTYLE_PORT")]
    /// http listener, defaults to `8000`.
    /// Env: PETSTYLE_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "PETSTYLE_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: PETSTYLE_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, env = "SUPABASE_URL")]
    /// Supabase project URL, eg `https://abc.supabase.co`.
    /// Env: SUPABASE_URL
    pub supabase_url: String,
    #[clap(long, env = "SUPABASE_API_KEY", hide_env_values = true)]
    /// Supabase service key used for uploads.
    /// Env: SUPABASE_API_KEY
    pub supabase_api_key: String,
    #[clap(long, default_value = DEFAULT_BUCKET, env = "SUPABASE_BUCKET")]
    /// Bucket that finished images are written to.
    /// Env: SUPABASE_BUCKET
    pub supabase_bucket: String,

    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    /// OpenAI API key, the OpenAI routes report an error without it.
    /// Env: OPENAI_API_KEY
    pub openai_api_key: Option<String>,
    #[clap(long, default_value = "https://api.openai.com", env = "OPENAI_BASE_URL")]
    /// OpenAI API base URL.
    /// Env: OPENAI_BASE_URL
    pub openai_base_url: String,
    #[clap(long, default_value = "gpt-image-1", env = "OPENAI_IMAGE_MODEL")]
    /// Model used for photo edits.
    /// Env: OPENAI_IMAGE_MODEL
    pub openai_image_model: String,
    #[clap(long, default_value = "medium", env = "OPENAI_IMAGE_QUALITY")]
    /// Quality tier requested for photo edits (`low`, `medium`, `high`, `auto`).
    /// Env: OPENAI_IMAGE_QUALITY
    pub openai_image_quality: String,

    #[clap(long, env = "VERTEX_PROJECT_ID")]
    /// Google Cloud project hosting Vertex AI.
    /// Env: VERTEX_PROJECT_ID
    pub vertex_project_id: Option<String>,
    #[clap(long, default_value = "us-central1", env = "VERTEX_LOCATION")]
    /// Vertex AI region.
    /// Env: VERTEX_LOCATION
    pub vertex_location: String,
    #[clap(long, env = "VERTEX_ACCESS_TOKEN", hide_env_values = true)]
    /// OAuth access token for Vertex AI, eg from `gcloud auth print-access-token`.
    /// Env: VERTEX_ACCESS_TOKEN
    pub vertex_access_token: Option<String>,

    #[clap(long, env = "FLUX_API_KEY", hide_env_values = true)]
    /// Black Forest Labs API key.
    /// Env: FLUX_API_KEY
    pub flux_api_key: Option<String>,
    #[clap(
        long,
        default_value = "https://api.bfl.ai/v1/flux-kontext-pro",
        env = "FLUX_API_URL"
    )]
    /// Flux endpoint that accepts edit requests.
    /// Env: FLUX_API_URL
    pub flux_api_url: String,

    #[clap(long, default_value = "./assets/logo.png", env = "PETSTYLE_LOGO_PATH")]
    /// Watermark composited onto finished images.
    /// Env: PETSTYLE_LOGO_PATH
    pub logo_path: PathBuf,
    #[clap(long, default_value_t = DEFAULT_MAX_DIMENSION, env = "PETSTYLE_MAX_DIMENSION")]
    /// Longest side uploads are shrunk to before generation.
    /// Env: PETSTYLE_MAX_DIMENSION
    pub max_dimension: u32,
    #[clap(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "PETSTYLE_JPEG_QUALITY")]
    /// JPEG quality (1-100) used when compressing uploads.
    /// Env: PETSTYLE_JPEG_QUALITY
    pub jpeg_quality: u8,
    #[clap(long, default_value_t = DEFAULT_BODY_LIMIT, env = "PETSTYLE_BODY_LIMIT")]
    /// Largest accepted request body in bytes.
    /// Env: PETSTYLE_BODY_LIMIT
    pub body_limit: usize,
}
