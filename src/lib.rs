// imgpipe: image transformation pipeline for object storage

pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod storage;
pub mod transform;
pub mod trigger;
pub mod watermark;

pub use error::PipelineError;
