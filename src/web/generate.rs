//! The image generation routes
//!
//! Pipeline failures are reported as `{"error": ...}` with a 200 status, so
//! the frontend only has to look at the body. Malformed requests, including
//! bodies that aren't multipart at all, are the only thing that gets a 4xx.

use std::sync::Arc;

use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use super::AppState;
use super::form::GenerateForm;
use crate::error::{PetstyleError, failure_body};
use crate::pipeline::{Job, Stages};
use crate::prompts::{Clothing, PromptSelection, Scenario, build_prompt};
use crate::providers::{ImageProvider, ProviderError};

/// How a route reports a stored image.
#[derive(Clone, Copy, Debug)]
enum Reply {
    /// `{"image_url", "performance"}`
    WithPerformance,
    /// `{"url"}`
    UrlOnly,
}

fn not_configured(name: &'static str) -> Json<Value> {
    let err = ProviderError::NotConfigured(name);
    warn!("Request for an unconfigured provider: {}", err);
    Json(json!({ "error": err.to_string() }))
}

async fn run_job(
    state: &AppState,
    provider: Option<&Arc<dyn ImageProvider>>,
    name: &'static str,
    job: Job,
    reply: Reply,
) -> Json<Value> {
    let Some(provider) = provider else {
        return not_configured(name);
    };
    match state.pipeline.run(provider.as_ref(), job).await {
        Ok(output) => Json(match reply {
            Reply::WithPerformance => json!({
                "image_url": output.url,
                "performance": output.performance,
            }),
            Reply::UrlOnly => json!({ "url": output.url }),
        }),
        Err(failure) => Json(failure_body(&failure)),
    }
}

/// Restyles a pet photo with OpenAI, then stamps the logo on it.
#[instrument(skip_all)]
pub(crate) async fn generate_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, PetstyleError> {
    let mut form = GenerateForm::read(multipart?).await?;
    let upload = form.take_file()?;
    let selection = form.selection();
    info!("OpenAI edit of {:?} ({})", upload.filename, selection);

    let job = Job {
        upload: Some(upload),
        prompt: build_prompt(&selection),
        stages: Stages::FULL,
    };
    Ok(run_job(&state, state.providers.openai.as_ref(), "openai", job, Reply::WithPerformance).await)
}

/// Generates a pet image from the base prompt alone with DALL·E.
#[instrument(skip_all)]
pub(crate) async fn generate_dalle_handler(State(state): State<AppState>) -> Json<Value> {
    let job = Job {
        upload: None,
        prompt: build_prompt(&PromptSelection::default()),
        stages: Stages::GENERATE_ONLY,
    };
    run_job(&state, state.providers.openai.as_ref(), "openai", job, Reply::UrlOnly).await
}

/// Restyles a pet photo with Imagen. No optimizing and no logo.
#[instrument(skip_all)]
pub(crate) async fn generate_imagen_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, PetstyleError> {
    let mut form = GenerateForm::read(multipart?).await?;
    let upload = form.take_file()?;

    let job = Job {
        upload: Some(upload),
        prompt: build_prompt(&PromptSelection::default()),
        stages: Stages::GENERATE_ONLY,
    };
    Ok(run_job(&state, state.providers.imagen.as_ref(), "imagen", job, Reply::UrlOnly).await)
}

/// Restyles a pet photo with Flux, same stages as the OpenAI route.
#[instrument(skip_all)]
pub(crate) async fn generate_flux_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, PetstyleError> {
    let mut form = GenerateForm::read(multipart?).await?;
    let upload = form.take_file()?;
    let selection = form.selection();
    info!("Flux edit of {:?} ({})", upload.filename, selection);

    let job = Job {
        upload: Some(upload),
        prompt: build_prompt(&selection),
        stages: Stages::FULL,
    };
    Ok(run_job(&state, state.providers.flux.as_ref(), "flux", job, Reply::WithPerformance).await)
}

#[derive(Serialize)]
struct OptionList {
    scenarios: Vec<&'static str>,
    clothing: Vec<&'static str>,
}

/// The scenario and clothing keys the form accepts.
pub(crate) async fn options_handler() -> Json<impl Serialize> {
    Json(OptionList {
        scenarios: Scenario::ALL.iter().map(|s| s.label()).collect(),
        clothing: Clothing::ALL.iter().map(|c| c.label()).collect(),
    })
}
