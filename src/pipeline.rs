//! The image request pipeline
//!
//! An upload moves through normalize → optimize → generate → composite →
//! upload. Each stage takes one asset and yields one new asset; the first
//! failure ends the run and is reported together with the stage it happened
//! in. Optimizer failures are not failures, see [`crate::imaging::optimize`].

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_IMAGE_SIZE;
use crate::imaging::{
    CompositeError, DecodeError, ImageAsset, LogoCompositor, OptimizeOutcome, OptimizeSettings,
    normalize, optimize,
};
use crate::providers::{EditRequest, GenerateRequest, ImageProvider, ProviderError};
use crate::storage::{ImageStore, UploadError};

/// Pipeline states, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Upload read from the request
    ReceivedUpload,
    /// Upload in an accepted format
    Normalized,
    /// Upload resized and compressed, or passed through
    Optimized,
    /// Provider returned an image
    Generated,
    /// Logo stamped on
    Composited,
    /// Stored, URL known
    Uploaded,
    /// Finished
    Done,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::ReceivedUpload => "received upload",
            Stage::Normalized => "normalize",
            Stage::Optimized => "optimize",
            Stage::Generated => "generate",
            Stage::Composited => "composite",
            Stage::Uploaded => "upload",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Anything that can stop a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Upload isn't an image
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Provider call failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Logo overlay failed
    #[error(transparent)]
    Composite(#[from] CompositeError),
    /// Storage rejected the image
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// A failed run: the stage that was being entered, and why.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error}")]
pub struct PipelineFailure {
    /// Stage that didn't complete
    pub stage: Stage,
    /// Underlying error
    #[source]
    pub error: PipelineError,
}

impl PipelineFailure {
    fn new(stage: Stage, error: impl Into<PipelineError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

/// A photo from the caller.
#[derive(Clone, Debug)]
pub struct Upload {
    /// Name the client sent, used to decide whether conversion is needed
    pub filename: String,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Optional stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stages {
    /// Shrink and compress the upload before generation
    pub optimize: bool,
    /// Stamp the logo onto the generated image
    pub overlay_logo: bool,
}

impl Stages {
    /// Every stage.
    pub const FULL: Stages = Stages {
        optimize: true,
        overlay_logo: true,
    };

    /// Only the provider call and upload.
    pub const GENERATE_ONLY: Stages = Stages {
        optimize: false,
        overlay_logo: false,
    };
}

/// One pipeline run.
#[derive(Clone, Debug)]
pub struct Job {
    /// The photo to restyle; `None` asks for text-to-image generation
    pub upload: Option<Upload>,
    /// Prompt text
    pub prompt: String,
    /// Which optional stages run
    pub stages: Stages,
}

/// How the optimizer stage went.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerResult {
    /// Not run
    #[default]
    Skipped,
    /// Upload was re-encoded
    Optimized,
    /// Upload was sent as-is
    PassThrough,
}

/// Timings and sizes for one run. Times are in seconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Performance {
    /// Provider that generated the image
    pub provider: &'static str,
    /// Format conversion
    pub normalize_time: f64,
    /// Whole optimizer stage
    pub compression_time: f64,
    /// Optimizer resize step
    pub resize_time: f64,
    /// Optimizer color conversion step
    pub convert_time: f64,
    /// Optimizer JPEG encode step
    pub compress_time: f64,
    /// Percentage saved by the optimizer
    pub compression_ratio: f64,
    /// Upload size after normalization
    pub original_size: usize,
    /// Size sent to the provider
    pub compressed_size: usize,
    /// Optimizer result
    pub optimizer: OptimizerResult,
    /// Why the optimizer passed the upload through
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimizer_error: Option<String>,
    /// Provider call
    pub generation_time: f64,
    /// Logo overlay
    pub overlay_time: f64,
    /// Storage upload
    pub upload_time: f64,
    /// Whole run
    pub total_time: f64,
}

impl Performance {
    fn record_optimizer(&mut self, outcome: &OptimizeOutcome) {
        let stats = outcome.stats();
        self.compression_time = stats.compression_time;
        self.resize_time = stats.resize_time;
        self.convert_time = stats.convert_time;
        self.compress_time = stats.compress_time;
        self.compression_ratio = stats.compression_ratio;
        self.original_size = stats.original_size;
        self.compressed_size = stats.compressed_size;
        match outcome.reason() {
            None => self.optimizer = OptimizerResult::Optimized,
            Some(reason) => {
                self.optimizer = OptimizerResult::PassThrough;
                self.optimizer_error = Some(reason.to_string());
            }
        }
    }
}

/// Result of a successful run.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    /// Public URL of the stored image
    pub url: String,
    /// Stage timings
    pub performance: Performance,
}

/// Settings for provider calls.
#[derive(Clone, Debug)]
pub struct GenerationSettings {
    /// Output size, eg `1024x1024`
    pub size: String,
    /// Quality tier passed to edits
    pub quality: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_IMAGE_SIZE.to_string(),
            quality: "medium".to_string(),
        }
    }
}

fn seconds(started: Instant) -> f64 {
    started.elapsed().as_secs_f64()
}

/// Runs jobs against a provider, stamping and storing the results.
pub struct Pipeline {
    store: Arc<dyn ImageStore>,
    compositor: Arc<LogoCompositor>,
    optimize: OptimizeSettings,
    generation: GenerationSettings,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("compositor", &self.compositor)
            .field("optimize", &self.optimize)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Wires the pipeline to its collaborators.
    pub fn new(
        store: Arc<dyn ImageStore>,
        compositor: Arc<LogoCompositor>,
        optimize: OptimizeSettings,
        generation: GenerationSettings,
    ) -> Self {
        Self {
            store,
            compositor,
            optimize,
            generation,
        }
    }

    fn advance(stage: &mut Stage, next: Stage) {
        debug!("Pipeline {:?} -> {:?}", stage, next);
        *stage = next;
    }

    /// Runs `job` through every stage it asks for.
    pub async fn run(
        &self,
        provider: &dyn ImageProvider,
        job: Job,
    ) -> Result<PipelineOutput, PipelineFailure> {
        let started = Instant::now();
        let mut stage = Stage::ReceivedUpload;
        let mut performance = Performance {
            provider: provider.name(),
            ..Performance::default()
        };

        let generated = match job.upload {
            Some(upload) => {
                let step = Instant::now();
                let asset = normalize(&upload.filename, upload.bytes)
                    .map_err(|err| PipelineFailure::new(Stage::Normalized, err))?;
                performance.normalize_time = seconds(step);
                performance.original_size = asset.len();
                performance.compressed_size = asset.len();
                Self::advance(&mut stage, Stage::Normalized);

                let asset = if job.stages.optimize {
                    let outcome = optimize(&asset, self.optimize);
                    performance.record_optimizer(&outcome);
                    outcome.into_asset()
                } else {
                    asset
                };
                Self::advance(&mut stage, Stage::Optimized);

                let request = EditRequest {
                    prompt: job.prompt,
                    size: self.generation.size.clone(),
                    quality: self.generation.quality.clone(),
                };
                let step = Instant::now();
                let generated = provider
                    .edit(&asset, &request)
                    .await
                    .map_err(|err| PipelineFailure::new(Stage::Generated, err))?;
                performance.generation_time = seconds(step);
                generated
            }
            None => {
                Self::advance(&mut stage, Stage::Optimized);
                let request = GenerateRequest {
                    prompt: job.prompt,
                    size: self.generation.size.clone(),
                };
                let step = Instant::now();
                let generated = provider
                    .generate(&request)
                    .await
                    .map_err(|err| PipelineFailure::new(Stage::Generated, err))?;
                performance.generation_time = seconds(step);
                generated
            }
        };
        Self::advance(&mut stage, Stage::Generated);
        info!(
            "{} returned {} bytes in {:.3}s",
            provider.name(),
            generated.len(),
            performance.generation_time
        );

        let final_image: ImageAsset = if job.stages.overlay_logo {
            let step = Instant::now();
            let composited = self
                .compositor
                .overlay(generated.bytes())
                .map_err(|err| PipelineFailure::new(Stage::Composited, err))?;
            performance.overlay_time = seconds(step);
            composited
        } else {
            generated
        };
        Self::advance(&mut stage, Stage::Composited);

        let step = Instant::now();
        let extension = final_image.extension();
        let url = self
            .store
            .upload(final_image.into_bytes(), extension)
            .await
            .map_err(|err| PipelineFailure::new(Stage::Uploaded, err))?;
        performance.upload_time = seconds(step);
        Self::advance(&mut stage, Stage::Uploaded);

        performance.total_time = seconds(started);
        Self::advance(&mut stage, Stage::Done);
        if performance.optimizer == OptimizerResult::PassThrough {
            warn!("Request finished with an unoptimized upload");
        }
        info!("Pipeline finished in {:.3}s: {}", performance.total_time, url);

        Ok(PipelineOutput { url, performance })
    }
}
