// End-to-end tests against S3 running in LocalStack

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use imgpipe::config::{StagingConfig, StagingDirs, StorageConfig, WatermarkConfig};
use imgpipe::handler::{Handler, InvocationEvent, ProcessRequest};
use imgpipe::pipeline::{Outcome, Pipeline, PipelineExecutor};
use imgpipe::storage::{ObjectLocator, ObjectStore, S3ObjectStore, TagSet};
use imgpipe::watermark::WatermarkProcessor;
use std::io::Cursor;
use std::sync::Arc;
use testcontainers::{clients::Cli, RunnableImage};
use testcontainers_modules::localstack::LocalStack;

const BUCKET: &str = "imgpipe-e2e";

fn storage_config(port: u16) -> StorageConfig {
    StorageConfig {
        region: "us-east-1".to_string(),
        endpoint: Some(format!("http://127.0.0.1:{}", port)),
        force_path_style: true,
        access_key: Some("test".to_string()),
        secret_key: Some("test".to_string()),
    }
}

fn png(width: u32, height: u32, color: Rgba<u8>) -> Bytes {
    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, color))
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    Bytes::from(buffer.into_inner())
}

async fn setup(port: u16, staging_root: &std::path::Path) -> (Arc<S3ObjectStore>, PipelineExecutor) {
    let store = Arc::new(S3ObjectStore::from_config(&storage_config(port)).await);
    store
        .client()
        .create_bucket()
        .bucket(BUCKET)
        .send()
        .await
        .expect("Failed to create bucket");

    let staging = StagingDirs::prepare(&StagingConfig {
        root: staging_root.to_path_buf(),
        ..StagingConfig::default()
    })
    .unwrap();
    let watermarks =
        WatermarkProcessor::from_config(&WatermarkConfig::default(), &staging).unwrap();
    let executor = PipelineExecutor::new(store.clone(), watermarks);
    (store, executor)
}

#[test]
#[ignore] // Requires Docker - run with: cargo test --test integration_tests -- --ignored
fn test_pipeline_round_trip_through_s3() {
    let docker = Cli::default();
    let container =
        docker.run(RunnableImage::from(LocalStack::default()).with_env_var(("SERVICES", "s3")));
    let port = container.get_host_port_ipv4(4566);
    let staging_root = tempfile::TempDir::new().unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let (store, executor) = setup(port, staging_root.path()).await;

        let source = ObjectLocator::new(BUCKET, "photos/cat.png");
        let target = ObjectLocator::new(BUCKET, "thumbs/cat.jpg");
        store
            .put_object(
                &source,
                png(120, 80, Rgba([30, 60, 90, 255])),
                "image/png",
                &TagSet::new(),
            )
            .await
            .unwrap();

        let pipeline = Pipeline::parse("image/resize,w_60,h_60/quality,q_0.8").unwrap();
        let outcome = executor.run(&source, &target, &pipeline).await.unwrap();
        assert!(outcome.is_processed());

        let written = store.get_object(&target).await.unwrap();
        let thumbnail = image::load_from_memory(&written).unwrap();
        // 60 / 1.5 = 40 is not above 60, so the width is derived: 60 * 1.5
        assert_eq!((thumbnail.width(), thumbnail.height()), (90, 60));

        assert_eq!(store.get_tags(&target).await.unwrap().get("updated"), Some("1"));
        assert_eq!(store.get_tags(&source).await.unwrap().get("updated"), Some("1"));

        let again = executor.run(&source, &target, &pipeline).await.unwrap();
        assert_eq!(again, Outcome::AlreadyProcessed);
    });
}

#[test]
#[ignore] // Requires Docker - run with: cargo test --test integration_tests -- --ignored
fn test_handler_applies_image_watermark_from_s3() {
    let docker = Cli::default();
    let container =
        docker.run(RunnableImage::from(LocalStack::default()).with_env_var(("SERVICES", "s3")));
    let port = container.get_host_port_ipv4(4566);
    let staging_root = tempfile::TempDir::new().unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let (store, executor) = setup(port, staging_root.path()).await;

        let source = ObjectLocator::new(BUCKET, "origin.png");
        store
            .put_object(
                &source,
                png(200, 100, Rgba([255, 255, 255, 255])),
                "image/png",
                &TagSet::new(),
            )
            .await
            .unwrap();
        store
            .put_object(
                &ObjectLocator::new(BUCKET, "logo.png"),
                png(40, 20, Rgba([0, 0, 0, 255])),
                "image/png",
                &TagSet::new(),
            )
            .await
            .unwrap();

        // image_ is base64 of "imgpipe-e2e/logo.png"
        let request = ProcessRequest {
            origin_bucket: BUCKET.to_string(),
            origin_key: "origin.png".to_string(),
            target_bucket: None,
            target_key: None,
        };
        let event = InvocationEvent::new(
            &request,
            "image/watermark,image_aW1ncGlwZS1lMmUvbG9nby5wbmc,g_se,x_10,y_10,shadow_0",
        )
        .unwrap();

        let handler = Handler::new(executor);
        let result = handler.handle(&event).await;
        assert_eq!(result.status_code, 200, "{}", result.body);

        let tags = store.get_tags(&source).await.unwrap();
        assert_eq!(tags.get("updated"), Some("1"));
        assert_eq!(tags.get("watermark"), Some("1"));

        let output = image::load_from_memory(&store.get_object(&source).await.unwrap())
            .unwrap()
            .to_rgba8();
        // Logo occupies (150..190, 70..90)
        assert_eq!(*output.get_pixel(170, 80), Rgba([0, 0, 0, 255]));
        assert_eq!(*output.get_pixel(195, 95), Rgba([255, 255, 255, 255]));
    });
}
