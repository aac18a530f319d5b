use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use omics_run_dispatcher::api::s3_event_dto::S3EventDto;
use omics_run_dispatcher::domain::bundle::guard::BundleUploadGuard;
use omics_run_dispatcher::domain::bundle::{BundleMapping, plan};
use omics_run_dispatcher::domain::config::DispatcherConfig;
use omics_run_dispatcher::domain::dispatcher::Dispatcher;
use omics_run_dispatcher::domain::dispatcher::report::DispatchReport;
use omics_run_dispatcher::domain::manifest::ManifestLocation;
use omics_run_dispatcher::domain::omics::aws::AwsOmicsClient;
use omics_run_dispatcher::domain::registration::{Registration, WorkflowRegistrar, PipelineVersion};
use omics_run_dispatcher::domain::status::StatusReporter;
use omics_run_dispatcher::domain::storage::ArtifactStore;
use omics_run_dispatcher::domain::submission::SubmissionPlan;
use omics_run_dispatcher::domain::trigger::handle_event;
use omics_run_dispatcher::domain::utils::id::{OmicsRunId, RunId};
use omics_run_dispatcher::domain::utils::retry::RetryPolicy;
use omics_run_dispatcher::loader::parser::parse_json_file;
use omics_run_dispatcher::{load_config, logger};

/// Read and bundle uploads can be large; a single PUT gets this long.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Parser, Debug)]
#[command(name = "omics-dispatch", version, about = "Start AWS HealthOmics runs from committed run manifests.")]
struct Cli {
    /// Dispatcher configuration file (JSON).
    #[arg(long, env = "OMICS_DISPATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// AWS region; falls back to the configuration and then the SDK defaults.
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process an S3 notification, or a single manifest object.
    Dispatch {
        /// S3 "object created" notification JSON.
        #[arg(long, conflicts_with_all = ["bucket", "key"], required_unless_present = "key")]
        event: Option<PathBuf>,

        #[arg(long, requires = "key")]
        bucket: Option<String>,

        /// Manifest key, e.g. `run_01/run_manifest.json`.
        #[arg(long, requires = "bucket")]
        key: Option<String>,
    },

    /// Pair FASTQs, build samplesheets and upload a run with its manifest.
    Submit {
        #[arg(long)]
        samples_dir: PathBuf,

        #[arg(long)]
        input_bucket: String,

        /// Run id and storage prefix; defaults to the samples directory name.
        #[arg(long, alias = "run-id")]
        job_name: Option<String>,

        #[arg(long, num_args = 1.., default_values = ["mag", "metatdenovo"])]
        workflows: Vec<String>,

        /// Parameter JSON for one workflow, as `workflow=path`. Repeatable.
        #[arg(long = "params", value_parser = parse_workflow_path)]
        params: Vec<(String, PathBuf)>,

        /// Write samplesheets and manifest locally, upload nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Upload nf-core workflow bundles to the code bucket, once each.
    Bundles {
        #[arg(long)]
        bucket: String,

        /// `workflow=/prefix` mapping. Repeatable.
        #[arg(long = "map", required = true)]
        map: Vec<String>,

        #[arg(long)]
        dry_run: bool,

        /// Overrides the configured retry policy (default 5).
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Base delay of the exponential backoff between attempts (default 1000).
        #[arg(long)]
        retry_delay_ms: Option<u64>,

        /// `nf-core-<workflow>_<version>.zip` files.
        #[arg(required = true)]
        zips: Vec<PathBuf>,
    },

    /// Create private HealthOmics workflows from uploaded bundles.
    Register {
        #[arg(long)]
        code_bucket: String,

        /// `name:version`, e.g. `mag:3.0.0`. Repeatable.
        #[arg(long = "workflow", required = true)]
        workflows: Vec<String>,

        /// Default run storage capacity in GiB.
        #[arg(long)]
        storage_capacity: Option<i32>,
    },

    /// Show the status of one HealthOmics run or of every run of a submission.
    Status {
        #[arg(long, conflicts_with = "run_id", required_unless_present = "run_id")]
        omics_run_id: Option<String>,

        #[arg(long)]
        run_id: Option<String>,
    },
}

fn parse_workflow_path(value: &str) -> std::result::Result<(String, PathBuf), String> {
    let (workflow, path) = value.split_once('=').ok_or_else(|| format!("expected workflow=path, got '{}'", value))?;
    Ok((workflow.trim().to_string(), PathBuf::from(path.trim())))
}

fn require_config(path: Option<&Path>) -> Result<DispatcherConfig> {
    let path = path.context("a configuration file is required (--config or OMICS_DISPATCH_CONFIG)")?;
    load_config(path).with_context(|| format!("loading configuration '{}'", path.display()))
}

fn print_report(report: &DispatchReport) {
    let headline = if report.is_complete_success() { "OK".green() } else { "FAILED".red() };
    println!("{} {}", headline, report);
}

#[tokio::main]
async fn main() -> ExitCode {
    logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the command ran but something in it failed.
async fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Dispatch { event, bucket, key } => {
            let config = require_config(cli.config.as_deref())?;
            let region = cli.region.clone().or_else(|| config.region.clone());
            let store = ArtifactStore::s3(&config.input_bucket, region.as_deref(), config.call_timeout)?;
            let omics = Arc::new(AwsOmicsClient::from_env(region).await);
            let dispatcher = Dispatcher::new(Arc::new(config), store, omics);

            match (event, bucket, key) {
                (Some(event_path), _, _) => {
                    let event: S3EventDto = parse_json_file(&event_path)?;
                    let mut ok = true;
                    for outcome in handle_event(&dispatcher, &event).await {
                        match outcome.report {
                            Ok(report) => {
                                print_report(&report);
                                ok &= report.is_complete_success();
                            }
                            Err(e) => {
                                println!("{} {}: {}", "FAILED".red(), outcome.location, e);
                                ok = false;
                            }
                        }
                    }
                    Ok(ok)
                }
                (None, Some(bucket), Some(key)) => {
                    let report = dispatcher.process_manifest(&ManifestLocation::new(bucket, key)).await?;
                    print_report(&report);
                    Ok(report.is_complete_success())
                }
                _ => bail!("either --event or both --bucket and --key are required"),
            }
        }

        Command::Submit { samples_dir, input_bucket, job_name, workflows, params, dry_run } => {
            let plan = SubmissionPlan::prepare(&samples_dir, &input_bucket, job_name.as_deref(), &workflows, &params, Utc::now())?;
            println!("Run '{}': {} sample(s), workflows {:?}", plan.run_id, plan.pairs.len(), plan.manifest.workflows);
            for path in plan.write_local()? {
                println!("  wrote {}", path.display());
            }
            if dry_run {
                println!("{} nothing uploaded", "[DRY RUN]".yellow());
                return Ok(true);
            }

            let store = ArtifactStore::s3(&input_bucket, cli.region.as_deref(), TRANSFER_TIMEOUT)?;
            let uploaded = plan.upload(&store).await?;
            println!("{} uploaded {} object(s) to {}", "OK".green(), uploaded.len(), store.uri(&format!("{}/", plan.run_id)));
            Ok(true)
        }

        Command::Bundles { bucket, map, dry_run, max_attempts, retry_delay_ms, zips } => {
            let mapping = BundleMapping::parse(&map)?;
            let planned = plan(&zips, &mapping)?;

            if dry_run {
                println!("{} no uploads will be performed", "[DRY RUN]".yellow());
                for upload in &planned {
                    println!("Would upload: {} -> s3://{}/{}", upload.bundle.path.display(), bucket, upload.key);
                }
                return Ok(true);
            }

            let retry = match (cli.config.as_deref(), max_attempts, retry_delay_ms) {
                (Some(path), None, None) => require_config(Some(path))?.upload_retry,
                (_, attempts, delay_ms) => RetryPolicy::exponential(
                    attempts.unwrap_or(5),
                    Duration::from_millis(delay_ms.unwrap_or(1000)),
                    Duration::from_secs(60),
                ),
            };
            let store = ArtifactStore::s3(&bucket, cli.region.as_deref(), TRANSFER_TIMEOUT)?;
            let summary = BundleUploadGuard::new(store, retry).upload_all(&planned).await;
            println!("{}", summary);
            Ok(summary.is_success())
        }

        Command::Register { code_bucket, workflows, storage_capacity } => {
            let pipelines = workflows.iter().map(|w| PipelineVersion::parse(w)).collect::<Result<Vec<_>, _>>()?;
            let omics = Arc::new(AwsOmicsClient::from_env(cli.region).await);
            let registrar = WorkflowRegistrar::new(omics, code_bucket, storage_capacity);

            let mut ok = true;
            for pipeline in &pipelines {
                match registrar.ensure_registered(pipeline).await {
                    Ok(Registration::Created(summary)) => println!("{} {} -> {}", "[CREATED]".green(), pipeline, summary.workflow_id),
                    Ok(Registration::Existing(summary)) => println!("[EXISTING] {} -> {}", pipeline, summary.workflow_id),
                    Err(e) => {
                        println!("{} {}: {}", "[FAILED]".red(), pipeline, e);
                        ok = false;
                    }
                }
            }
            Ok(ok)
        }

        Command::Status { omics_run_id, run_id } => {
            if let Some(omics_run_id) = omics_run_id {
                let reporter = StatusReporter::new(Arc::new(AwsOmicsClient::from_env(cli.region).await));
                println!("{}", reporter.run_status(&OmicsRunId::new(omics_run_id)).await?);
                return Ok(true);
            }

            let config = require_config(cli.config.as_deref())?;
            let region = cli.region.clone().or_else(|| config.region.clone());
            let reporter = StatusReporter::new(Arc::new(AwsOmicsClient::from_env(region).await));
            let run_id = RunId::new(run_id.context("--run-id or --omics-run-id is required")?);

            for (workflow, report) in reporter.runs_for(&run_id, config.catalog.names()).await? {
                match report {
                    Some(report) => println!("{}\n", report),
                    None => println!("[{}] no run dispatched for '{}'\n", workflow, run_id),
                }
            }
            Ok(true)
        }
    }
}
