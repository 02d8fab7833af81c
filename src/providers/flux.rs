//! Black Forest Labs Flux API
//!
//! Flux is asynchronous: the edit request returns a polling URL, and the
//! finished image is downloaded from a signed URL once the job is `Ready`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{
    EditRequest, GeneratedImage, ImageProvider, ProviderError, download_image, read_json,
};
use crate::constants::{FLUX_POLL_INTERVAL, FLUX_TIMEOUT};
use crate::imaging::ImageAsset;

const PROVIDER: &str = "flux";

#[derive(Serialize, Debug)]
struct SubmitRequest<'a> {
    prompt: &'a str,
    input_image: String,
    output_format: &'a str,
}

#[derive(Deserialize, Debug)]
struct SubmitResponse {
    id: String,
    polling_url: String,
}

#[derive(Deserialize, Debug)]
struct PollResponse {
    status: String,
    #[serde(default)]
    result: Option<PollResult>,
}

#[derive(Deserialize, Debug)]
struct PollResult {
    sample: String,
}

/// Where a Flux job is at.
#[derive(Debug, PartialEq, Eq)]
enum JobState {
    Ready(String),
    Waiting,
    Failed(String),
}

impl PollResponse {
    fn state(self) -> Result<JobState, ProviderError> {
        match self.status.as_str() {
            "Ready" => self
                .result
                .map(|result| JobState::Ready(result.sample))
                .ok_or_else(|| ProviderError::Malformed {
                    provider: PROVIDER,
                    message: "Ready without a result sample".to_string(),
                }),
            "Pending" | "Queued" | "Processing" | "Task not found" => Ok(JobState::Waiting),
            _ => Ok(JobState::Failed(self.status)),
        }
    }
}

/// Client for one Flux edit endpoint, eg `flux-kontext-pro`.
#[derive(Clone, Debug)]
pub struct FluxClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl FluxClient {
    /// New client with the default 60s budget.
    pub fn new(client: reqwest::Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            timeout: FLUX_TIMEOUT,
            poll_interval: FLUX_POLL_INTERVAL,
        }
    }

    /// Overrides the overall timeout and poll interval.
    pub fn with_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    async fn submit(&self, image: &ImageAsset, prompt: &str) -> Result<SubmitResponse, ProviderError> {
        let body = SubmitRequest {
            prompt,
            input_image: general_purpose::STANDARD.encode(image.bytes()),
            output_format: "png",
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;
        read_json(PROVIDER, response).await
    }

    async fn poll(&self, polling_url: &str) -> Result<String, ProviderError> {
        loop {
            let response = self
                .client
                .get(polling_url)
                .header("x-key", &self.api_key)
                .send()
                .await
                .map_err(|source| ProviderError::Http {
                    provider: PROVIDER,
                    source,
                })?;
            let parsed: PollResponse = read_json(PROVIDER, response).await?;
            match parsed.state()? {
                JobState::Ready(sample) => return Ok(sample),
                JobState::Failed(status) => {
                    return Err(ProviderError::Rejected {
                        provider: PROVIDER,
                        status,
                    });
                }
                JobState::Waiting => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    async fn run(&self, image: &ImageAsset, prompt: &str) -> Result<GeneratedImage, ProviderError> {
        let submitted = self.submit(image, prompt).await?;
        debug!(id = %submitted.id, "Flux job submitted");
        let sample = self.poll(&submitted.polling_url).await?;
        download_image(PROVIDER, &self.client, &sample).await
    }
}

#[async_trait]
impl ImageProvider for FluxClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn edit(
        &self,
        image: &ImageAsset,
        request: &EditRequest,
    ) -> Result<GeneratedImage, ProviderError> {
        info!("Sending {} byte image to Flux", image.len());
        tokio::time::timeout(self.timeout, self.run(image, &request.prompt))
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: PROVIDER,
                seconds: self.timeout.as_secs(),
            })?
    }
}
