//! HTTP server

use std::num::NonZeroU16;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::cli::CliOptions;
use crate::imaging::LogoCompositor;
use crate::pipeline::Pipeline;
use crate::providers::{Providers, http_client};
use crate::storage::SupabaseStorage;

mod form;
mod generate;

use generate::{
    generate_dalle_handler, generate_flux_handler, generate_handler, generate_imagen_handler,
    options_handler,
};

/// Shared state for every request.
#[derive(Clone, Debug)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    providers: Providers,
}

impl AppState {
    /// State from already-built parts.
    pub fn new(pipeline: Pipeline, providers: Providers) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            providers,
        }
    }

    /// Builds the storage client, providers and pipeline from the command line.
    pub fn from_cli(cli: &CliOptions) -> Result<Self, anyhow::Error> {
        cli.validate()?;
        let client = http_client()?;

        let store = SupabaseStorage::new(
            client.clone(),
            &cli.supabase_url,
            &cli.supabase_api_key,
            &cli.supabase_bucket,
        );
        let compositor = LogoCompositor::from_path(&cli.logo_path);
        match compositor.watermark() {
            Ok(logo) => info!(
                "Loaded {}x{} logo from {}",
                logo.width(),
                logo.height(),
                compositor.path().display()
            ),
            Err(err) => warn!("{}, branded routes will fail until it exists", err),
        }

        let pipeline = Pipeline::new(
            Arc::new(store),
            Arc::new(compositor),
            cli.optimize_settings(),
            cli.generation_settings(),
        );
        Ok(Self::new(pipeline, Providers::from_cli(cli, &client)))
    }
}

fn create_router(body_limit: usize) -> Router<AppState> {
    let api = Router::new()
        .route("/generate", post(generate_handler))
        .route("/generate-dalle", post(generate_dalle_handler))
        .route("/generate-imagen", post(generate_imagen_handler))
        .route("/generate-flux", post(generate_flux_handler))
        .route("/options", get(options_handler));

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        return;
    }
    info!("Shutting down");
}

/// Serves the API until ctrl-c.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    body_limit: usize,
    state: AppState,
) -> Result<(), anyhow::Error> {
    let app = create_router(body_limit).with_state(state);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
    use http_body_util::BodyExt;
    use image::{Rgba, RgbaImage};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::constants::{DEFAULT_BODY_LIMIT, TEST_STORAGE_BASE};
    use crate::imaging::OptimizeSettings;
    use crate::imaging::test_images::{encode, jpeg, solid_rgba};
    use crate::pipeline::GenerationSettings;
    use crate::pipeline::testing::{FakeProvider, MemoryStore, fake_output};
    use crate::prompts::{Clothing, PROMPT_BASE, Scenario};
    use crate::providers::ImageProvider;

    const BOUNDARY: &str = "petstyle-test-boundary";

    enum Part<'a> {
        File(&'a str, Vec<u8>),
        Text(&'a str, &'a str),
    }

    fn multipart(parts: Vec<Part<'_>>) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(filename, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&bytes);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .expect("build request")
    }

    fn post_to(uri: &str, parts: Vec<Part<'_>>) -> Request<Body> {
        let mut request = multipart(parts);
        *request.uri_mut() = uri.parse().expect("uri");
        request
    }

    struct Harness {
        provider: Arc<FakeProvider>,
        store: Arc<MemoryStore>,
        app: Router,
    }

    fn harness(provider: FakeProvider, store: MemoryStore) -> Harness {
        build_harness(provider, store, false)
    }

    fn harness_with_imagen(provider: FakeProvider, store: MemoryStore) -> Harness {
        build_harness(provider, store, true)
    }

    fn build_harness(provider: FakeProvider, store: MemoryStore, with_imagen: bool) -> Harness {
        let provider = Arc::new(provider);
        let store = Arc::new(store);
        let logo = RgbaImage::from_pixel(60, 20, Rgba([255, 255, 255, 255]));
        let pipeline = Pipeline::new(
            store.clone(),
            Arc::new(LogoCompositor::from_image(logo)),
            OptimizeSettings::default(),
            GenerationSettings::default(),
        );
        let shared: Arc<dyn ImageProvider> = provider.clone();
        let providers = Providers {
            openai: Some(shared.clone()),
            imagen: with_imagen.then(|| shared.clone()),
            flux: Some(shared),
        };
        let app = create_router(DEFAULT_BODY_LIMIT).with_state(AppState::new(pipeline, providers));
        Harness {
            provider,
            store,
            app,
        }
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn generate_returns_url_and_performance() {
        let h = harness(FakeProvider::ok(), MemoryStore::default());
        let request = post_to(
            "/api/generate",
            vec![
                Part::File("dog.jpg", jpeg(1024, 768)),
                Part::Text("scenario", "Lavender Chill"),
                Part::Text("clothing", "Poncho"),
            ],
        );

        let response = h.app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;

        let url = body["image_url"].as_str().expect("image_url");
        assert!(url.starts_with(TEST_STORAGE_BASE));
        let performance = body["performance"].as_object().expect("performance");
        for key in ["compression_time", "generation_time", "overlay_time", "upload_time", "total_time"] {
            assert!(performance[key].as_f64().expect(key) >= 0.0, "{key}");
        }

        let prompt = h.provider.prompts.lock().expect("lock")[0].clone();
        assert!(prompt.contains(Clothing::Poncho.description()));
        // only "Lavender Chill Evening" is a known scenario
        assert!(!prompt.contains("Scene:"));
        assert_eq!(h.store.objects.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_reported_in_the_body() {
        let h = harness(FakeProvider::failing("OpenAI failed"), MemoryStore::default());
        let request = post_to(
            "/api/generate",
            vec![
                Part::File("dog.jpg", jpeg(64, 64)),
                Part::Text("scenario", "Failure test"),
                Part::Text("clothing", "Failure test"),
            ],
        );

        let response = h.app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert!(body["error"].as_str().expect("error").contains("OpenAI failed"));
        assert!(body.get("image_url").is_none());
        assert!(h.store.objects.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_unprocessable() {
        let h = harness(FakeProvider::ok(), MemoryStore::default());
        let request = post_to("/api/generate", vec![Part::Text("scenario", "Lemon Fresh Morning")]);

        let response = h.app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Missing required field: file");
        assert!(h.provider.prompts.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn missing_options_use_the_base_prompt() {
        let h = harness(FakeProvider::ok(), MemoryStore::default());
        let request = post_to("/api/generate", vec![Part::File("dog.png", jpeg(32, 32))]);

        let response = h.app.oneshot(request).await.expect("response");
        let body = read_json(response).await;
        assert!(body["image_url"].is_string());
        assert_eq!(
            h.provider.prompts.lock().expect("lock")[0],
            format!("{PROMPT_BASE}.")
        );
    }

    #[tokio::test]
    async fn other_formats_reach_the_provider_as_png() {
        let h = harness(FakeProvider::ok(), MemoryStore::default());
        let gif = encode(&solid_rgba(40, 30, [10, 200, 10, 255]), image::ImageFormat::Gif);
        let request = post_to(
            "/api/generate",
            vec![
                Part::File("dog.gif", gif),
                Part::Text("scenario", Scenario::GrapefruitGetaway.label()),
            ],
        );

        let response = h.app.oneshot(request).await.expect("response");
        let body = read_json(response).await;
        assert!(body["image_url"].is_string(), "{body}");

        let received = h.provider.received.lock().expect("lock");
        // the optimizer re-encodes as JPEG after conversion
        assert_eq!(received[0].format(), Some(image::ImageFormat::Jpeg));
        assert_eq!(body["performance"]["optimizer"], "optimized");
    }

    #[tokio::test]
    async fn upload_failure_is_reported_in_the_body() {
        let store = MemoryStore {
            fail: true,
            ..MemoryStore::default()
        };
        let h = harness(FakeProvider::ok(), store);
        let request = post_to("/api/generate", vec![Part::File("dog.jpg", jpeg(64, 64))]);

        let response = h.app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        let error = body["error"].as_str().expect("error");
        assert!(error.contains("Upload failed"));
        assert!(error.contains("Supabase down"));
    }

    #[tokio::test]
    async fn flux_route_matches_generate() {
        let h = harness(FakeProvider::ok(), MemoryStore::default());
        let request = post_to(
            "/api/generate-flux",
            vec![
                Part::File("dog.jpeg", jpeg(600, 900)),
                Part::Text("clothing", "bandana"),
            ],
        );

        let response = h.app.oneshot(request).await.expect("response");
        let body = read_json(response).await;
        assert!(body["image_url"].as_str().expect("image_url").starts_with(TEST_STORAGE_BASE));
        assert_eq!(body["performance"]["provider"], "fake");
        assert!(h.provider.prompts.lock().expect("lock")[0].contains(Clothing::Bandana.description()));
    }

    #[tokio::test]
    async fn dalle_needs_no_upload() {
        let h = harness(FakeProvider::ok(), MemoryStore::default());
        let request = Request::builder()
            .method("POST")
            .uri("/api/generate-dalle")
            .body(Body::empty())
            .expect("request");

        let response = h.app.oneshot(request).await.expect("response");
        let body = read_json(response).await;
        assert!(body["url"].as_str().expect("url").starts_with(TEST_STORAGE_BASE));
        assert!(body.get("performance").is_none());
        assert!(h.provider.received.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn non_multipart_body_is_unprocessable_json() {
        let h = harness(FakeProvider::ok(), MemoryStore::default());
        let request = Request::builder()
            .method("POST")
            .uri("/api/generate")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("scenario=Any&clothing=Any"))
            .expect("request");

        let response = h.app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        let body = read_json(response).await;
        assert!(body["error"].as_str().expect("error").starts_with("Invalid request"));
        assert!(h.provider.prompts.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn imagen_stores_the_provider_image_untouched() {
        let h = harness_with_imagen(FakeProvider::ok(), MemoryStore::default());
        let gif = encode(&solid_rgba(640, 480, [90, 60, 30, 255]), image::ImageFormat::Gif);
        let request = post_to(
            "/api/generate-imagen",
            vec![
                Part::File("dog.gif", gif),
                Part::Text("clothing", "Poncho"),
            ],
        );

        let response = h.app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        let url = body["url"].as_str().expect("url");
        assert!(url.starts_with(TEST_STORAGE_BASE));
        assert!(url.ends_with(".png"));
        assert!(body.get("performance").is_none());
        assert!(body.get("image_url").is_none());

        // converted to PNG, but neither shrunk nor re-encoded as JPEG
        let received = h.provider.received.lock().expect("lock");
        assert_eq!(received[0].format(), Some(image::ImageFormat::Png));
        let sent = image::load_from_memory(received[0].bytes()).expect("decode sent");
        assert_eq!((sent.width(), sent.height()), (640, 480));
        assert_eq!(
            h.provider.prompts.lock().expect("lock")[0],
            format!("{PROMPT_BASE}.")
        );

        let objects = h.store.objects.lock().expect("lock");
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].1, fake_output());
    }

    #[tokio::test]
    async fn unconfigured_provider_is_an_error_body() {
        let h = harness(FakeProvider::ok(), MemoryStore::default());
        let request = post_to("/api/generate-imagen", vec![Part::File("dog.jpg", jpeg(64, 64))]);

        let response = h.app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["error"], "imagen is not configured");
    }

    #[tokio::test]
    async fn options_lists_known_keys() {
        let h = harness(FakeProvider::ok(), MemoryStore::default());
        let request = Request::builder()
            .uri("/api/options")
            .body(Body::empty())
            .expect("request");

        let response = h.app.oneshot(request).await.expect("response");
        let body = read_json(response).await;
        assert_eq!(body["scenarios"].as_array().expect("scenarios").len(), Scenario::ALL.len());
        assert!(body["clothing"]
            .as_array()
            .expect("clothing")
            .contains(&Value::from("Poncho")));
    }

    #[tokio::test]
    async fn oversized_bodies_are_refused() {
        let provider = Arc::new(FakeProvider::ok());
        let shared: Arc<dyn ImageProvider> = provider.clone();
        let pipeline = Pipeline::new(
            Arc::new(MemoryStore::default()),
            Arc::new(LogoCompositor::from_image(RgbaImage::new(4, 4))),
            OptimizeSettings::default(),
            GenerationSettings::default(),
        );
        let providers = Providers {
            openai: Some(shared),
            ..Providers::default()
        };
        let app = create_router(1024).with_state(AppState::new(pipeline, providers));
        let request = post_to("/api/generate", vec![Part::File("dog.jpg", vec![0u8; 8192])]);

        let response = app.oneshot(request).await.expect("response");
        assert!(response.status().is_client_error());
        assert!(provider.prompts.lock().expect("lock").is_empty());
    }
}
