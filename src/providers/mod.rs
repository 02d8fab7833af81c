//! Image generation providers
//!
//! Each provider is an opaque network call: image and prompt in, image out.
//! There are no retries, one failed call fails the request.

pub mod flux;
pub mod imagen;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::cli::CliOptions;
use crate::constants::HTTP_TIMEOUT;
use crate::imaging::ImageAsset;

pub use flux::FluxClient;
pub use imagen::ImagenClient;
pub use openai::OpenAiClient;

/// Bytes returned by a provider. Lives for one request.
pub type GeneratedImage = ImageAsset;

/// Longest upstream error body we keep in messages.
const MAX_ERROR_BODY: usize = 512;

/// Errors from a provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Credentials for this provider weren't supplied at startup
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    /// The provider can't do this kind of request
    #[error("{provider} does not support {operation}")]
    Unsupported {
        /// Provider name
        provider: &'static str,
        /// What was asked for
        operation: &'static str,
    },
    /// Transport failure
    #[error("{provider} request failed: {source}")]
    Http {
        /// Provider name
        provider: &'static str,
        /// Underlying client error
        source: reqwest::Error,
    },
    /// Non-2xx response
    #[error("{provider} returned {status}: {body}")]
    Status {
        /// Provider name
        provider: &'static str,
        /// HTTP status
        status: StatusCode,
        /// Response body, truncated
        body: String,
    },
    /// The response didn't have the shape we expected
    #[error("{provider} returned an unexpected response: {message}")]
    Malformed {
        /// Provider name
        provider: &'static str,
        /// What was wrong
        message: String,
    },
    /// The image payload wasn't valid base64
    #[error("{provider} returned invalid base64 image data: {source}")]
    Base64 {
        /// Provider name
        provider: &'static str,
        /// Decoder error
        source: base64::DecodeError,
    },
    /// The provider reported that it gave up on the job
    #[error("{provider} rejected the request: {status}")]
    Rejected {
        /// Provider name
        provider: &'static str,
        /// Status reported by the provider
        status: String,
    },
    /// The provider took too long
    #[error("{provider} did not finish within {seconds}s")]
    Timeout {
        /// Provider name
        provider: &'static str,
        /// Budget that ran out
        seconds: u64,
    },
}

/// Photo edit parameters.
#[derive(Clone, Debug)]
pub struct EditRequest {
    /// Full prompt text
    pub prompt: String,
    /// Output size, eg `1024x1024`
    pub size: String,
    /// Provider specific quality tier
    pub quality: String,
}

/// Text-to-image parameters.
#[derive(Clone, Debug)]
pub struct GenerateRequest {
    /// Full prompt text
    pub prompt: String,
    /// Output size, eg `1024x1024`
    pub size: String,
}

/// An external image generation API.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Short name used in logs and performance reports.
    fn name(&self) -> &'static str;

    /// Restyles `image` according to the prompt.
    async fn edit(
        &self,
        image: &ImageAsset,
        request: &EditRequest,
    ) -> Result<GeneratedImage, ProviderError>;

    /// Generates an image from the prompt alone.
    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, ProviderError> {
        let _ = request;
        Err(ProviderError::Unsupported {
            provider: self.name(),
            operation: "text-to-image generation",
        })
    }
}

/// The providers the server was configured with.
#[derive(Clone, Default)]
pub struct Providers {
    /// OpenAI, used by `/generate` and `/generate-dalle`
    pub openai: Option<Arc<dyn ImageProvider>>,
    /// Vertex Imagen, used by `/generate-imagen`
    pub imagen: Option<Arc<dyn ImageProvider>>,
    /// Flux, used by `/generate-flux`
    pub flux: Option<Arc<dyn ImageProvider>>,
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("openai", &self.openai.as_ref().map(|p| p.name()))
            .field("imagen", &self.imagen.as_ref().map(|p| p.name()))
            .field("flux", &self.flux.as_ref().map(|p| p.name()))
            .finish()
    }
}

impl Providers {
    /// Builds every provider whose credentials are present.
    pub fn from_cli(cli: &CliOptions, client: &reqwest::Client) -> Self {
        let openai = cli.openai_api_key.as_ref().map(|key| {
            Arc::new(OpenAiClient::new(
                client.clone(),
                &cli.openai_base_url,
                key,
                &cli.openai_image_model,
            )) as Arc<dyn ImageProvider>
        });
        let imagen = match (&cli.vertex_project_id, &cli.vertex_access_token) {
            (Some(project), Some(token)) => Some(Arc::new(ImagenClient::new(
                client.clone(),
                &imagen::vertex_base_url(&cli.vertex_location),
                project,
                &cli.vertex_location,
                token,
            )) as Arc<dyn ImageProvider>),
            _ => None,
        };
        let flux = cli.flux_api_key.as_ref().map(|key| {
            Arc::new(FluxClient::new(client.clone(), &cli.flux_api_url, key))
                as Arc<dyn ImageProvider>
        });

        for (name, configured) in [
            ("openai", openai.is_some()),
            ("imagen", imagen.is_some()),
            ("flux", flux.is_some()),
        ] {
            if !configured {
                warn!("{name} credentials not set, its route will report an error");
            }
        }

        Self {
            openai,
            imagen,
            flux,
        }
    }
}

/// HTTP client shared by every provider.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Reads a response body, failing on non-2xx statuses.
pub(crate) async fn read_body(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<Vec<u8>, ProviderError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|source| ProviderError::Http { provider, source })?;
    if !status.is_success() {
        let mut body = String::from_utf8_lossy(&bytes).into_owned();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(ProviderError::Status {
            provider,
            status,
            body,
        });
    }
    Ok(bytes.to_vec())
}

/// Reads and parses a JSON response body, failing on non-2xx statuses.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let bytes = read_body(provider, response).await?;
    serde_json::from_slice(&bytes).map_err(|err| ProviderError::Malformed {
        provider,
        message: err.to_string(),
    })
}

/// Decodes a base64 image payload.
pub(crate) fn decode_image(
    provider: &'static str,
    b64: &str,
) -> Result<GeneratedImage, ProviderError> {
    let bytes = general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|source| ProviderError::Base64 { provider, source })?;
    if bytes.is_empty() {
        return Err(ProviderError::Malformed {
            provider,
            message: "empty image payload".to_string(),
        });
    }
    Ok(ImageAsset::sniffed(bytes))
}

/// Downloads an image the provider left at `url`.
pub(crate) async fn download_image(
    provider: &'static str,
    client: &reqwest::Client,
    url: &str,
) -> Result<GeneratedImage, ProviderError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| ProviderError::Http { provider, source })?;
    let bytes = read_body(provider, response).await?;
    Ok(ImageAsset::sniffed(bytes))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_image_rejects_bad_payloads() {
        assert!(matches!(
            decode_image("test", "%%%"),
            Err(ProviderError::Base64 { .. })
        ));
        assert!(matches!(
            decode_image("test", ""),
            Err(ProviderError::Malformed { .. })
        ));
        let image = decode_image("test", &general_purpose::STANDARD.encode(b"ai-image"))
            .expect("decode");
        assert_eq!(image.bytes(), b"ai-image");
    }

    #[tokio::test]
    async fn error_statuses_keep_a_short_body() {
        use axum::http::StatusCode as AxumStatus;
        let router = axum::Router::new().route(
            "/boom",
            axum::routing::get(|| async { (AxumStatus::BAD_GATEWAY, "x".repeat(2000)) }),
        );
        let base = test_server::spawn(router).await;
        let response = http_client()
            .expect("client")
            .get(format!("{base}/boom"))
            .send()
            .await
            .expect("send");

        let err = read_body("test", response).await.expect_err("should fail");
        match err {
            ProviderError::Status { status, body, .. } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn default_generate_is_unsupported() {
        struct EditOnly;

        #[async_trait]
        impl ImageProvider for EditOnly {
            fn name(&self) -> &'static str {
                "edit-only"
            }

            async fn edit(
                &self,
                image: &ImageAsset,
                _request: &EditRequest,
            ) -> Result<GeneratedImage, ProviderError> {
                Ok(image.clone())
            }
        }

        let err = EditOnly
            .generate(&GenerateRequest {
                prompt: "p".to_string(),
                size: "1024x1024".to_string(),
            })
            .await
            .expect_err("unsupported");
        assert!(matches!(err, ProviderError::Unsupported { .. }));
    }
}
