use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use leigraph_bucket::{BucketStore, MemoryBucketStore, S3BucketStore};
use leigraph_core::config::PipelineConfig;
use leigraph_core::publish::PublishError;
use leigraph_core::{pipeline, PipelineError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "GLEIF LEI to entity graph ETL", long_about = None)]
struct Cli {
    /// Pipeline configuration file; built-in defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Map source records into the fragment file
    Map,
    /// Merge the fragment file into the export directory
    Aggregate,
    /// Upload the export directory to the bucket
    Publish(PublishArgs),
    /// Map, aggregate and publish
    Run(PublishArgs),
}

#[derive(Args, Debug, Default)]
struct PublishArgs {
    /// Upload to an in-memory store and only log the object keys
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("leigraph failed: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Map => map(&config),
        Command::Aggregate => aggregate(&config),
        Command::Publish(args) => publish(&config, &args),
        Command::Run(args) => {
            map(&config)?;
            aggregate(&config)?;
            publish(&config, &args)
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)
            .map_err(PipelineError::from)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(config.with_process_env())
}

fn map(config: &PipelineConfig) -> Result<()> {
    let mapper = config.mapper().map_err(PipelineError::from)?;
    let summary = pipeline::map_sources(config, &mapper)?;
    info!(
        records = summary.records,
        fragments = summary.fragments.fragments,
        schemata = ?summary.fragments.by_schema,
        "Map stage complete"
    );
    Ok(())
}

fn aggregate(config: &PipelineConfig) -> Result<()> {
    let summary = pipeline::aggregate(config)?;
    info!(
        aggregator = summary.aggregator,
        records = ?summary.records,
        export = %summary.export_dir.display(),
        "Aggregate stage complete"
    );
    Ok(())
}

fn publish(config: &PipelineConfig, args: &PublishArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(publish_export(config, args))
}

async fn publish_export(config: &PipelineConfig, args: &PublishArgs) -> Result<()> {
    let store: Box<dyn BucketStore> = if args.dry_run {
        info!("Dry run: publishing to an in-memory store");
        Box::new(MemoryBucketStore::new())
    } else {
        let s3_config = config.s3_config().map_err(PipelineError::from)?;
        let store = S3BucketStore::new(s3_config)
            .await
            .map_err(|err| PipelineError::from(PublishError::from(err)))?;
        Box::new(store)
    };

    let summary = pipeline::publish(config, store.as_ref()).await?;
    if args.dry_run {
        for key in &summary.uploaded {
            info!(key = %key, "Would publish object");
        }
        for key in &summary.deleted {
            info!(key = %key, "Would delete stale object");
        }
    }
    info!(
        uploaded = summary.uploaded.len(),
        deleted = summary.deleted.len(),
        bytes = summary.bytes,
        "Publish stage complete"
    );
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map(PipelineError::exit_code)
        .unwrap_or(1)
}
