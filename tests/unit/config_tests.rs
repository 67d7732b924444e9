// Configuration loading tests

use imgpipe::config::{Config, ConfigError, LogFormat, StagingDirs};
use imgpipe::storage::S3ObjectStore;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_full_config_round_trips_through_file() {
    let staging_root = TempDir::new().unwrap();
    let yaml = format!(
        r#"
storage:
  region: ap-southeast-1
  endpoint: "http://localhost:4566"
  force_path_style: true
  access_key: test
  secret_key: test
staging:
  root: "{}"
  watermark_dir: assets
watermark:
  asset_cache_entries: 8
  asset_cache_ttl_secs: 60
logging:
  level: debug
  format: pretty
trigger:
  api_url: "http://localhost:9000/process"
"#,
        staging_root.path().display()
    );
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let config = Config::load_or_default(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.storage.region, "ap-southeast-1");
    assert!(config.storage.force_path_style);
    assert_eq!(config.watermark.asset_cache_entries, 8);
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.trigger.as_ref().unwrap().timeout_secs, 10);

    let dirs = StagingDirs::prepare(&config.staging).unwrap();
    assert!(dirs.watermark_dir().is_dir());
    assert!(dirs.watermark_dir().starts_with(staging_root.path()));
}

#[test]
fn test_credentials_must_come_in_pairs() {
    let config = Config::from_yaml_with_env("storage:\n  access_key: only-half\n").unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_endpoint_requires_http_scheme() {
    let config = Config::from_yaml_with_env("storage:\n  endpoint: localhost:4566\n").unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_s3_store_builds_from_static_credentials() {
    let config = Config::from_yaml_with_env(
        "storage:\n  endpoint: http://127.0.0.1:4566\n  force_path_style: true\n  access_key: test\n  secret_key: test\n",
    )
    .unwrap();

    let store = tokio_test::block_on(S3ObjectStore::from_config(&config.storage));
    assert_eq!(
        store.client().config().region().map(|r| r.as_ref()),
        Some("us-east-1")
    );
}
