// Pipeline executor tests across parsing, transforms, watermarking and storage

use super::support::{decode, encoded, executor, solid_jpeg, solid_png};
use image::{ImageFormat, Rgba, RgbaImage};
use imgpipe::config::LimitsConfig;
use imgpipe::pipeline::{ExecutorState, Outcome, Pipeline, StageCounter};
use imgpipe::storage::{MemoryObjectStore, ObjectLocator, StoreOperation, Tag, TagSet};
use imgpipe::PipelineError;
use std::sync::Arc;
use tempfile::TempDir;

fn tags(pairs: &[(&str, &str)]) -> TagSet {
    pairs.iter().map(|(k, v)| Tag::new(*k, *v)).collect()
}

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8, 255])
    })
}

#[tokio::test]
async fn test_processed_source_runs_no_stage() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "cat.jpg");
    store.insert(
        source.clone(),
        solid_jpeg(64, 48),
        tags(&[("updated", "1"), ("owner", "alice")]),
    );

    let counter = StageCounter::new();
    let pipeline = Pipeline::parse("image/resize,w_32/quality,q_0.5").unwrap();
    let outcome = executor(store.clone(), temp.path())
        .run_observed(&source, &source, &pipeline, &counter)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::AlreadyProcessed);
    assert_eq!(counter.count(), 0);
    assert_eq!(counter.final_state(), Some(ExecutorState::Finalized));
    assert!(store.puts().is_empty());
    assert!(store.tag_writes().is_empty());
}

#[tokio::test]
async fn test_second_run_is_skipped() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "cat.jpg");
    store.insert(source.clone(), solid_jpeg(64, 48), TagSet::new());

    let executor = executor(store.clone(), temp.path());
    let pipeline = Pipeline::parse("image/resize,w_32").unwrap();

    let first = executor.run(&source, &source, &pipeline).await.unwrap();
    assert!(first.is_processed());

    let counter = StageCounter::new();
    let second = executor
        .run_observed(&source, &source, &pipeline, &counter)
        .await
        .unwrap();
    assert_eq!(second, Outcome::AlreadyProcessed);
    assert_eq!(counter.count(), 0);
    assert_eq!(store.puts().len(), 1);
}

#[tokio::test]
async fn test_unknown_operation_rejects_after_earlier_stages() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "cat.jpg");
    store.insert(source.clone(), solid_jpeg(64, 48), TagSet::new());

    let counter = StageCounter::new();
    let pipeline = Pipeline::parse("image/resize,w_32/sharpen,s_3/quality,q_0.5").unwrap();
    let err = executor(store.clone(), temp.path())
        .run_observed(&source, &source, &pipeline, &counter)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PipelineError::UnknownOperation {
            name: "sharpen".to_string()
        }
    );
    let stages = counter.stages();
    assert_eq!(stages.len(), 1);
    assert_eq!(stages[0].operation, "resize");
    assert_eq!((stages[0].width, stages[0].height), (32, 24));
    assert_eq!(counter.final_state(), Some(ExecutorState::Rejected));
    assert!(store.puts().is_empty());
    assert!(store.tag_writes().is_empty());
}

#[tokio::test]
async fn test_separate_target_gets_state_tags_and_source_is_marked() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "cat.jpg");
    let target = ObjectLocator::new("thumbs", "cat-small.png");
    store.insert(source.clone(), solid_jpeg(80, 40), tags(&[("owner", "alice")]));

    let pipeline = Pipeline::parse("image/resize,m_fixed,w_20,h_20").unwrap();
    let outcome = executor(store.clone(), temp.path())
        .run(&source, &target, &pipeline)
        .await
        .unwrap();

    match outcome {
        Outcome::Processed {
            target: written,
            content_type,
            ..
        } => {
            assert_eq!(written, target);
            assert_eq!(content_type, "image/png");
        }
        other => panic!("expected Processed, got {:?}", other),
    }

    let stored = store.object(&target).unwrap();
    assert_eq!(stored.tags.get("updated"), Some("1"));
    assert_eq!(stored.tags.get("owner"), None);
    assert_eq!(decode(&stored.body).dimensions(), (20, 20));

    let source_tags = store.object(&source).unwrap().tags;
    assert_eq!(source_tags.get("updated"), Some("1"));
    assert_eq!(source_tags.get("owner"), Some("alice"));
    assert_eq!(source_tags.get("watermark"), None);
}

#[tokio::test]
async fn test_in_place_run_keeps_existing_tags() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "cat.jpg");
    store.insert(source.clone(), solid_jpeg(80, 40), tags(&[("owner", "alice")]));

    executor(store.clone(), temp.path())
        .run(&source, &source, &Pipeline::parse("image/resize,w_40").unwrap())
        .await
        .unwrap();

    let stored = store.object(&source).unwrap();
    assert_eq!(stored.content_type, "image/jpeg");
    assert_eq!(stored.tags.get("owner"), Some("alice"));
    assert_eq!(stored.tags.get("updated"), Some("1"));
    assert_eq!(decode(&stored.body).dimensions(), (40, 20));
}

#[tokio::test]
async fn test_image_watermark_is_halved_and_placed() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "base.png");
    store.insert(
        source.clone(),
        solid_png(200, 100, Rgba([255, 255, 255, 255])),
        TagSet::new(),
    );
    store.insert(
        ObjectLocator::new("assets", "logo.png"),
        solid_png(300, 40, Rgba([255, 0, 0, 255])),
        TagSet::new(),
    );

    // image_ is base64 of "assets/logo.png"
    let pipeline =
        Pipeline::parse("image/watermark,image_YXNzZXRzL2xvZ28ucG5n,g_nw,x_0,y_0,shadow_0")
            .unwrap();
    let outcome = executor(store.clone(), temp.path())
        .run(&source, &source, &pipeline)
        .await
        .unwrap();

    let Outcome::Processed { bytes, state, .. } = outcome else {
        panic!("expected Processed");
    };
    assert!(state.watermark_applied);

    let result = decode(&bytes);
    assert_eq!(result.dimensions(), (200, 100));
    // Halved watermark is 150x20 at the top-left corner
    let inside = result.get_pixel(140, 15);
    assert!(inside[0] > 245 && inside[1] < 10 && inside[2] < 10);
    assert_eq!(*result.get_pixel(160, 15), Rgba([255, 255, 255, 255]));
    assert_eq!(*result.get_pixel(10, 30), Rgba([255, 255, 255, 255]));

    let stored = store.object(&source).unwrap();
    assert_eq!(stored.tags.get("watermark"), Some("1"));
}

#[tokio::test]
async fn test_lower_quality_produces_smaller_jpeg() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let high = ObjectLocator::new("photos", "high.jpg");
    let low = ObjectLocator::new("photos", "low.jpg");
    let body = encoded(gradient(128, 128), ImageFormat::Png);
    store.insert(high.clone(), body.clone(), TagSet::new());
    store.insert(low.clone(), body, TagSet::new());

    let executor = executor(store.clone(), temp.path());
    executor
        .run(&high, &high, &Pipeline::parse("image/quality,q_1").unwrap())
        .await
        .unwrap();
    executor
        .run(&low, &low, &Pipeline::parse("image/quality,q_0.1").unwrap())
        .await
        .unwrap();

    let high_size = store.object(&high).unwrap().body.len();
    let low_size = store.object(&low).unwrap().body.len();
    assert!(low_size < high_size, "{} >= {}", low_size, high_size);
}

#[tokio::test]
async fn test_target_without_extension_keeps_source_format() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "icon.png");
    let target = ObjectLocator::new("photos", "derived/icon");
    store.insert(
        source.clone(),
        solid_png(16, 16, Rgba([0, 128, 0, 255])),
        TagSet::new(),
    );

    executor(store.clone(), temp.path())
        .run(&source, &target, &Pipeline::parse("image").unwrap())
        .await
        .unwrap();

    assert_eq!(store.object(&target).unwrap().content_type, "image/png");
}

#[tokio::test]
async fn test_undecodable_source_fails_without_writes() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "notes.jpg");
    store.insert(source.clone(), b"plain text".to_vec(), TagSet::new());

    let counter = StageCounter::new();
    let err = executor(store.clone(), temp.path())
        .run_observed(
            &source,
            &source,
            &Pipeline::parse("image/resize,w_10").unwrap(),
            &counter,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::DecodeError { .. }));
    assert_eq!(counter.final_state(), Some(ExecutorState::Failed));
    assert!(store.puts().is_empty());
}

#[tokio::test]
async fn test_oversized_resize_is_rejected_before_allocation() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "cat.jpg");
    store.insert(source.clone(), solid_jpeg(64, 48), TagSet::new());
    let executor = executor(store.clone(), temp.path());

    for ops in [
        "image/resize,w_4000000000,h_4000000000,m_fixed",
        // derived height stays small, width alone is over the limit
        "image/resize,w_100000",
        // each side in range, area over the pixel budget
        "image/resize,w_8000,h_8000,m_fixed",
    ] {
        let counter = StageCounter::new();
        let err = executor
            .run_observed(&source, &source, &Pipeline::parse(ops).unwrap(), &counter)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidDimensions { .. }), "{}", ops);
        assert_eq!(err.status_code(), 400);
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.final_state(), Some(ExecutorState::Rejected));
    }
    assert!(store.puts().is_empty());
    assert!(store.object(&source).unwrap().tags.is_empty());
}

#[tokio::test]
async fn test_configured_limits_apply_to_resize_and_text() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "cat.jpg");
    store.insert(source.clone(), solid_jpeg(64, 48), TagSet::new());
    let executor = executor(store.clone(), temp.path()).with_limits(LimitsConfig {
        max_width: 50,
        max_font_size: 80,
        ..LimitsConfig::default()
    });

    let err = executor
        .run(&source, &source, &Pipeline::parse("image/resize,w_60").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidDimensions { .. }));

    // "Hi" at 200px
    let err = executor
        .run(
            &source,
            &source,
            &Pipeline::parse("image/watermark,text_SGk,size_200").unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::MalformedParameter { .. }));
    assert!(store.puts().is_empty());

    let outcome = executor
        .run(&source, &source, &Pipeline::parse("image/resize,w_40").unwrap())
        .await
        .unwrap();
    assert!(outcome.is_processed());
}

#[tokio::test]
async fn test_source_mark_failure_after_delivery_is_failed() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let source = ObjectLocator::new("photos", "cat.jpg");
    let target = ObjectLocator::new("thumbs", "cat.jpg");
    store.insert(source.clone(), solid_jpeg(64, 48), TagSet::new());
    store.fail_on(StoreOperation::PutTags);

    let counter = StageCounter::new();
    let err = executor(store.clone(), temp.path())
        .run_observed(
            &source,
            &target,
            &Pipeline::parse("image/resize,w_32").unwrap(),
            &counter,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::StorageError { .. }));
    assert_eq!(counter.final_state(), Some(ExecutorState::Failed));
    // The target was delivered and tagged, the source stays unmarked
    let delivered = store.object(&target).unwrap();
    assert_eq!(delivered.tags.get("updated"), Some("1"));
    assert!(store.object(&source).unwrap().tags.is_empty());
}
