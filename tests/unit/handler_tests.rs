// Invocation handler tests against an in-memory store

use super::support::{decode, executor, solid_jpeg};
use imgpipe::handler::{Handler, InvocationEvent, InvocationResult, ProcessRequest};
use imgpipe::pipeline::Outcome;
use imgpipe::storage::{MemoryObjectStore, ObjectLocator, StoreOperation, TagSet};
use imgpipe::PipelineError;
use rstest::rstest;
use std::sync::Arc;
use tempfile::TempDir;

const TEXT_WATERMARK_EVENT: &str = r#"{
    "body": "{\"origin-bucket\": \"origin-image\", \"origin-key\": \"origin.jpg\"}",
    "resource": "/{proxy+}",
    "requestContext": {"httpMethod": "POST", "stage": "prod"},
    "queryStringParameters": {
        "x-s3-process": "image/resize,w_1080,h_900/watermark,type_d3F5LXplbmhlaQ,size_30,text_44Gy44KJ44GM44GqIC0gSGlyYWdhbmEsIO2eiOudvOqwgOuCmCDlpKnnqbrkuYvln44=,color_222222,shadow_50,t_70,g_se,x_10,y_10,rotate_30"
    },
    "headers": {"Host": "origin-image.s3.amazonaws.com"},
    "httpMethod": "POST",
    "path": "/origin.jpg"
}"#;

struct Fixture {
    _temp: TempDir,
    store: Arc<MemoryObjectStore>,
    handler: Handler,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let handler = Handler::new(executor(store.clone(), temp.path()));
    Fixture {
        _temp: temp,
        store,
        handler,
    }
}

fn event(ops: &str) -> InvocationEvent {
    let request = ProcessRequest {
        origin_bucket: "photos".to_string(),
        origin_key: "cat.jpg".to_string(),
        target_bucket: None,
        target_key: Some("small/cat.jpg".to_string()),
    };
    InvocationEvent::new(&request, ops).unwrap()
}

#[tokio::test]
async fn test_text_watermark_event_processes_in_place() {
    let f = fixture();
    let source = ObjectLocator::new("origin-image", "origin.jpg");
    f.store.insert(source.clone(), solid_jpeg(400, 300), TagSet::new());

    let event = InvocationEvent::from_json(TEXT_WATERMARK_EVENT).unwrap();
    let result = f.handler.handle(&event).await;

    assert_eq!(result, InvocationResult::ok());
    let stored = f.store.object(&source).unwrap();
    assert_eq!(stored.tags.get("updated"), Some("1"));
    assert_eq!(stored.tags.get("watermark"), Some("1"));
    // 1080 / (4/3) = 810 is not above 900, so the width is derived: 900 * 4/3
    assert_eq!(decode(&stored.body).dimensions(), (1200, 900));
}

#[tokio::test]
async fn test_repeated_event_is_a_no_op() {
    let f = fixture();
    let source = ObjectLocator::new("photos", "cat.jpg");
    f.store.insert(source.clone(), solid_jpeg(64, 64), TagSet::new());
    let event = event("image/resize,w_32,h_32");

    assert!(f.handler.process(&event).await.unwrap().is_processed());
    assert_eq!(
        f.handler.process(&event).await.unwrap(),
        Outcome::AlreadyProcessed
    );
    assert_eq!(f.handler.handle(&event).await.status_code, 200);
    assert_eq!(f.store.puts().len(), 1);
    assert_eq!(
        f.store.puts()[0].locator,
        ObjectLocator::new("photos", "small/cat.jpg")
    );
}

#[rstest]
#[case("image/resize,w_32/flip,d_h", 400, "invalid parameters")]
#[case("thumbnail/resize,w_32", 400, "invalid parameters")]
#[case("image/resize,w_abc", 400, "invalid parameters")]
#[case("image/resize,w_-5,h_10", 400, "invalid dimensions")]
#[case("image/resize,m_fixed,w_0,h_0", 400, "invalid dimensions")]
#[tokio::test]
async fn test_bad_operations_map_to_status(
    #[case] ops: &str,
    #[case] status: u16,
    #[case] message: &str,
) {
    let f = fixture();
    f.store.insert(
        ObjectLocator::new("photos", "cat.jpg"),
        solid_jpeg(64, 64),
        TagSet::new(),
    );

    let result = f.handler.handle(&event(ops)).await;

    assert_eq!(result.status_code, status);
    assert_eq!(result.message().as_deref(), Some(message));
    assert!(f.store.puts().is_empty());
    assert!(f.store.tag_writes().is_empty());
}

#[tokio::test]
async fn test_envelope_errors_are_invalid_requests() {
    let f = fixture();

    let no_body = InvocationEvent::default();
    assert!(matches!(
        f.handler.process(&no_body).await,
        Err(PipelineError::InvalidRequest { .. })
    ));

    let mut no_ops = event("image/resize,w_10");
    no_ops.query_string_parameters = None;
    let result = f.handler.handle(&no_ops).await;
    assert_eq!(result.status_code, 400);
    assert_eq!(result.message().as_deref(), Some("invalid request"));
}

#[tokio::test]
async fn test_storage_failures_map_to_bad_gateway() {
    let f = fixture();
    // Source object is missing
    let result = f.handler.handle(&event("image/resize,w_10")).await;
    assert_eq!(result.status_code, 502);

    f.store.insert(
        ObjectLocator::new("photos", "cat.jpg"),
        solid_jpeg(64, 64),
        TagSet::new(),
    );
    f.store.fail_on(StoreOperation::PutObject);
    let result = f.handler.handle(&event("image/resize,w_10")).await;
    assert_eq!(result.status_code, 502);
    assert_eq!(result.message().as_deref(), Some("storage error"));
    assert!(f.store.tag_writes().is_empty());
}

#[test]
fn test_result_serializes_with_status_code_field() {
    let json = serde_json::to_value(InvocationResult::ok()).unwrap();
    assert_eq!(json["statusCode"], 200);
    assert_eq!(json["body"], r#"{"message":"OK"}"#);
}
