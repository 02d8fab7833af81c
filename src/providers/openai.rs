//! OpenAI Images API
//!
//! Docs: https://platform.openai.com/docs/api-reference/images

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{
    EditRequest, GenerateRequest, GeneratedImage, ImageProvider, ProviderError, decode_image,
    download_image, read_json,
};
use crate::imaging::ImageAsset;

const PROVIDER: &str = "openai";

/// Model used for text-to-image requests.
pub const GENERATION_MODEL: &str = "dall-e-3";

/// Request body for POST /v1/images/generations
#[derive(Serialize, Debug)]
struct ImagesGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
    response_format: &'a str,
}

#[derive(Deserialize, Debug)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize, Debug)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
    revised_prompt: Option<String>,
}

/// Client for the OpenAI image endpoints.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    edit_model: String,
}

impl OpenAiClient {
    /// New client. `base_url` is usually `https://api.openai.com`.
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, edit_model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            edit_model: edit_model.to_string(),
        }
    }

    async fn first_image(&self, parsed: ImagesResponse) -> Result<GeneratedImage, ProviderError> {
        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed {
                provider: PROVIDER,
                message: "no image data returned".to_string(),
            })?;

        if let Some(revised_prompt) = first.revised_prompt {
            debug!("Revised prompt from OpenAI: {revised_prompt}");
        }

        if let Some(b64_json) = first.b64_json {
            decode_image(PROVIDER, &b64_json)
        } else if let Some(url) = first.url {
            download_image(PROVIDER, &self.client, &url).await
        } else {
            Err(ProviderError::Malformed {
                provider: PROVIDER,
                message: "image response missing b64_json and url fields".to_string(),
            })
        }
    }
}

#[async_trait]
impl ImageProvider for OpenAiClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip_all, fields(model = %self.edit_model, size = %request.size))]
    async fn edit(
        &self,
        image: &ImageAsset,
        request: &EditRequest,
    ) -> Result<GeneratedImage, ProviderError> {
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(format!("pet.{}", image.extension()))
            .mime_str(image.mime_type())
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;
        let form = Form::new()
            .text("model", self.edit_model.clone())
            .text("prompt", request.prompt.clone())
            .text("size", request.size.clone())
            .text("quality", request.quality.clone())
            .text("n", "1")
            .part("image", part);

        info!("Sending {} byte image to OpenAI", image.len());
        let response = self
            .client
            .post(format!("{}/v1/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;

        let parsed: ImagesResponse = read_json(PROVIDER, response).await?;
        self.first_image(parsed).await
    }

    #[instrument(skip_all, fields(model = GENERATION_MODEL, size = %request.size))]
    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, ProviderError> {
        let body = ImagesGenerateRequest {
            model: GENERATION_MODEL,
            prompt: &request.prompt,
            n: 1,
            size: &request.size,
            quality: "standard",
            response_format: "b64_json",
        };

        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;

        let parsed: ImagesResponse = read_json(PROVIDER, response).await?;
        self.first_image(parsed).await
    }
}
