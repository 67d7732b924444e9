// Upload trigger tests with a mocked processing endpoint

use async_trait::async_trait;
use imgpipe::pipeline::IdempotencyGate;
use imgpipe::storage::{MemoryObjectStore, ObjectLocator, StoreOperation, Tag, TagSet};
use imgpipe::trigger::{ProcessNotifier, TriggerOutcome, UploadEvent, UploadTrigger};
use imgpipe::PipelineError;
use mockall::mock;
use mockall::predicate::eq;
use std::sync::Arc;

mock! {
    pub Notifier {}

    #[async_trait]
    impl ProcessNotifier for Notifier {
        async fn notify(&self, source: &ObjectLocator) -> Result<(), PipelineError>;
    }
}

fn records_event(keys: &[&str]) -> UploadEvent {
    let records: Vec<String> = keys
        .iter()
        .map(|key| {
            format!(
                r#"{{"s3": {{"bucket": {{"name": "photos"}}, "object": {{"key": "{}"}}}}}}"#,
                key
            )
        })
        .collect();
    UploadEvent::from_json(&format!(r#"{{"Records": [{}]}}"#, records.join(","))).unwrap()
}

fn store_with(objects: &[(&str, bool)]) -> Arc<MemoryObjectStore> {
    let store = Arc::new(MemoryObjectStore::new());
    for (key, processed) in objects {
        let tags: TagSet = if *processed {
            [Tag::new("updated", "1")].into_iter().collect()
        } else {
            TagSet::new()
        };
        store.insert(ObjectLocator::new("photos", *key), b"jpeg".to_vec(), tags);
    }
    store
}

#[tokio::test]
async fn test_only_unprocessed_uploads_are_notified() {
    let store = store_with(&[("new.jpg", false), ("done.jpg", true)]);

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .with(eq(ObjectLocator::new("photos", "new.jpg")))
        .times(1)
        .returning(|_| Ok(()));

    let trigger = UploadTrigger::new(IdempotencyGate::new(store), Arc::new(notifier));
    let outcomes = trigger
        .handle(&records_event(&["new.jpg", "done.jpg"]))
        .await
        .unwrap();

    assert_eq!(
        outcomes,
        vec![
            TriggerOutcome::Notified(ObjectLocator::new("photos", "new.jpg")),
            TriggerOutcome::Skipped(ObjectLocator::new("photos", "done.jpg")),
        ]
    );
}

#[tokio::test]
async fn test_body_event_uses_origin_fields() {
    let store = store_with(&[("cat.jpg", false)]);

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(|source| source.bucket == "photos" && source.key == "cat.jpg")
        .times(1)
        .returning(|_| Ok(()));

    let event = UploadEvent::from_json(
        r#"{"body": "{\"origin-bucket\": \"photos\", \"origin-key\": \"cat.jpg\"}"}"#,
    )
    .unwrap();
    let trigger = UploadTrigger::new(IdempotencyGate::new(store), Arc::new(notifier));

    assert_eq!(trigger.handle(&event).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_notifier_failure_is_returned() {
    let store = store_with(&[("new.jpg", false)]);

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .times(1)
        .returning(|_| Err(PipelineError::storage("notify", "endpoint returned 503")));

    let trigger = UploadTrigger::new(IdempotencyGate::new(store), Arc::new(notifier));
    let err = trigger
        .handle(&records_event(&["new.jpg"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::StorageError { .. }));
}

#[tokio::test]
async fn test_gate_failure_skips_notification() {
    let store = store_with(&[("new.jpg", false)]);
    store.fail_on(StoreOperation::GetTags);

    let mut notifier = MockNotifier::new();
    notifier.expect_notify().never();

    let trigger = UploadTrigger::new(IdempotencyGate::new(store), Arc::new(notifier));
    assert!(trigger.handle(&records_event(&["new.jpg"])).await.is_err());
}
