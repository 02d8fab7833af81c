//! Google Vertex AI Imagen, via the `:predict` endpoint.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{EditRequest, GeneratedImage, ImageProvider, ProviderError, decode_image, read_json};
use crate::imaging::ImageAsset;

const PROVIDER: &str = "imagen";

/// Imagen model the predictions are sent to.
pub const MODEL: &str = "imagen-3.0-generate-002";

/// Regional Vertex AI endpoint.
pub fn vertex_base_url(location: &str) -> String {
    format!("https://{location}-aiplatform.googleapis.com")
}

#[derive(Serialize, Debug)]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
    parameters: Parameters,
}

#[derive(Serialize, Debug)]
struct Instance<'a> {
    prompt: &'a str,
    image: InlineImage,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineImage {
    bytes_base64_encoded: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    sample_count: u8,
    aspect_ratio: &'static str,
    guidance_scale: u8,
    seed: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            sample_count: 1,
            aspect_ratio: "1:1",
            guidance_scale: 12,
            seed: 42,
        }
    }
}

#[derive(Deserialize, Debug)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    rai_filtered_reason: Option<String>,
}

/// Client for Imagen predictions in one Vertex AI project.
#[derive(Clone, Debug)]
pub struct ImagenClient {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl ImagenClient {
    /// New client; `base_url` is normally [`vertex_base_url`].
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        project: &str,
        location: &str,
        access_token: &str,
    ) -> Self {
        let endpoint = format!(
            "{}/v1/projects/{project}/locations/{location}/publishers/google/models/{MODEL}:predict",
            base_url.trim_end_matches('/')
        );
        Self {
            client,
            endpoint,
            access_token: access_token.to_string(),
        }
    }

    /// Full `:predict` URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ImageProvider for ImagenClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip_all, fields(model = MODEL))]
    async fn edit(
        &self,
        image: &ImageAsset,
        request: &EditRequest,
    ) -> Result<GeneratedImage, ProviderError> {
        let body = PredictRequest {
            instances: [Instance {
                prompt: &request.prompt,
                image: InlineImage {
                    bytes_base64_encoded: general_purpose::STANDARD.encode(image.bytes()),
                },
            }],
            parameters: Parameters::default(),
        };

        info!("Sending {} byte image to Imagen", image.len());
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;

        let parsed: PredictResponse = read_json(PROVIDER, response).await?;
        let prediction = parsed
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed {
                provider: PROVIDER,
                message: "no predictions returned".to_string(),
            })?;
        match (prediction.bytes_base64_encoded, prediction.rai_filtered_reason) {
            (Some(b64), _) => decode_image(PROVIDER, &b64),
            (None, Some(reason)) => Err(ProviderError::Rejected {
                provider: PROVIDER,
                status: reason,
            }),
            (None, None) => Err(ProviderError::Malformed {
                provider: PROVIDER,
                message: "prediction has no image bytes".to_string(),
            }),
        }
    }
}
