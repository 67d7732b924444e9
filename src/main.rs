use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use imgpipe::config::{Config, StagingDirs};
use imgpipe::handler::{Handler, InvocationEvent, InvocationResult};
use imgpipe::metrics::PipelineMetrics;
use imgpipe::pipeline::{Outcome, Pipeline, PipelineExecutor};
use imgpipe::storage::{MemoryObjectStore, ObjectLocator, ObjectStore, S3ObjectStore, TagSet};
use imgpipe::trigger::{HttpNotifier, UploadEvent, UploadTrigger};
use imgpipe::watermark::WatermarkProcessor;

/// imgpipe - image transformation pipeline for object storage
#[derive(Parser, Debug)]
#[command(name = "imgpipe")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults apply when it does not exist)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print Prometheus metrics after the command finishes
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the invocation handler on an event JSON file
    Invoke {
        #[arg(long)]
        event: PathBuf,
    },
    /// Run a pipeline directly against one object
    Process {
        /// Source object as bucket/key
        #[arg(long)]
        source: String,
        /// Target object as bucket/key (defaults to the source)
        #[arg(long)]
        target: Option<String>,
        /// Operation string, e.g. image/resize,w_300/quality,q_80
        #[arg(long)]
        ops: String,
        /// Use an in-memory store seeded from --input instead of S3
        #[arg(long, requires_all = ["input", "output"])]
        dry_run: bool,
        /// Local file loaded as the source object (dry run)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Local file the result is written to (dry run)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Watermark asset for a dry run, as bucket/key=path (repeatable)
        #[arg(long = "asset", value_name = "LOCATOR=PATH")]
        assets: Vec<String>,
    },
    /// Run the upload trigger on an event JSON file
    Trigger {
        #[arg(long)]
        event: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_or_default(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    config.validate()?;

    imgpipe::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    tracing::info!(
        config_file = %args.config.display(),
        region = %config.storage.region,
        endpoint = config.storage.endpoint.as_deref().unwrap_or("-"),
        trigger_enabled = config.trigger.is_some(),
        "Configuration loaded"
    );

    let staging = StagingDirs::prepare(&config.staging)?;

    let result = match args.command {
        Command::Invoke { event } => invoke(&config, &staging, &event).await,
        Command::Process {
            source,
            target,
            ops,
            dry_run,
            input,
            output,
            assets,
        } => {
            let source = parse_locator(&source)?;
            let target = match target {
                Some(target) => parse_locator(&target)?,
                None => source.clone(),
            };
            let request = ProcessArgs {
                source,
                target,
                ops,
                assets,
            };
            match (dry_run, input, output) {
                (true, Some(input), Some(output)) => {
                    process_dry_run(&config, &staging, request, &input, &output).await
                }
                _ => process(&config, &staging, request).await,
            }
        }
        Command::Trigger { event } => trigger(&config, &staging, &event).await,
    };

    if args.print_metrics {
        print!("{}", PipelineMetrics::global().render());
    }

    result
}

struct ProcessArgs {
    source: ObjectLocator,
    target: ObjectLocator,
    ops: String,
    assets: Vec<String>,
}

fn parse_locator(raw: &str) -> Result<ObjectLocator> {
    ObjectLocator::parse(raw).with_context(|| format!("'{}' is not bucket/key", raw))
}

async fn s3_store(config: &Config) -> Arc<dyn ObjectStore> {
    Arc::new(S3ObjectStore::from_config(&config.storage).await)
}

fn executor(
    config: &Config,
    staging: &StagingDirs,
    store: Arc<dyn ObjectStore>,
) -> Result<PipelineExecutor> {
    let watermarks = WatermarkProcessor::from_config(&config.watermark, staging)?;
    Ok(PipelineExecutor::new(store, watermarks).with_limits(config.limits))
}

async fn invoke(config: &Config, staging: &StagingDirs, event: &Path) -> Result<()> {
    let json = std::fs::read_to_string(event)
        .with_context(|| format!("failed to read {}", event.display()))?;

    let handler = Handler::new(executor(config, staging, s3_store(config).await)?);
    let result = match InvocationEvent::from_json(&json) {
        Ok(event) => handler.handle(&event).await,
        Err(e) => InvocationResult::from_error(&e),
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    // Non-2xx becomes an error so main still prints metrics before exiting 1
    result.into_result().map_err(anyhow::Error::msg)?;
    Ok(())
}

async fn process(config: &Config, staging: &StagingDirs, request: ProcessArgs) -> Result<()> {
    if !request.assets.is_empty() {
        bail!("--asset is only meaningful with --dry-run");
    }
    let pipeline = Pipeline::parse(&request.ops)?;
    let executor = executor(config, staging, s3_store(config).await)?;

    let outcome = executor
        .run(&request.source, &request.target, &pipeline)
        .await?;
    report(&outcome);
    Ok(())
}

async fn process_dry_run(
    config: &Config,
    staging: &StagingDirs,
    request: ProcessArgs,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let pipeline = Pipeline::parse(&request.ops)?;

    let store = Arc::new(MemoryObjectStore::new());
    let body = std::fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    store.insert(request.source.clone(), body, TagSet::new());

    for asset in &request.assets {
        let (locator, path) = asset
            .split_once('=')
            .with_context(|| format!("asset '{}' is not LOCATOR=PATH", asset))?;
        let body =
            std::fs::read(path).with_context(|| format!("failed to read asset {}", path))?;
        store.insert(parse_locator(locator)?, body, TagSet::new());
    }

    let executor = executor(config, staging, store.clone())?;
    let outcome = executor
        .run(&request.source, &request.target, &pipeline)
        .await?;

    if let Outcome::Processed { bytes, .. } = &outcome {
        std::fs::write(output, bytes)
            .with_context(|| format!("failed to write {}", output.display()))?;
    }
    report(&outcome);
    Ok(())
}

async fn trigger(config: &Config, staging: &StagingDirs, event: &Path) -> Result<()> {
    let Some(trigger_config) = &config.trigger else {
        bail!("the trigger section is missing from the configuration");
    };
    let json = std::fs::read_to_string(event)
        .with_context(|| format!("failed to read {}", event.display()))?;
    let event = UploadEvent::from_json(&json)?;

    let executor = executor(config, staging, s3_store(config).await)?;
    let trigger = UploadTrigger::new(
        executor.gate().clone(),
        Arc::new(HttpNotifier::new(trigger_config)?),
    );

    for outcome in trigger.handle(&event).await? {
        println!("{:?}", outcome);
    }
    Ok(())
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::AlreadyProcessed => println!("skipped: source already processed"),
        Outcome::Processed {
            target,
            content_type,
            bytes,
            ..
        } => println!("wrote {} ({}, {} bytes)", target, content_type, bytes.len()),
    }
}
