use std::process::ExitCode;
use std::time::Instant;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use simfetch::app::{CampaignFetch, FetchOptions, FetchResult, ProgressEvent, ProgressSink};
use simfetch::config::{self, CampaignRequest, ConfigLoader, ResolvedConfig};
use simfetch::domain::WorkflowName;
use simfetch::error::FetchError;
use simfetch::mirror::Mirror;
use simfetch::output::{JsonOutput, OutputMode};
use simfetch::storage::GcsHttpClient;
use simfetch::transfer;

#[derive(Parser)]
#[command(name = "simfetch")]
#[command(about = "Download the needed analysis files from simulation workflow output in Cloud Storage")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch campaign files for one workflow or every workflow in simfetch.json")]
    Fetch(FetchArgs),
    #[command(about = "Show what fetch would download, without transferring")]
    Plan(FetchArgs),
}

#[derive(Args, Clone)]
struct FetchArgs {
    workflow: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    bucket: Option<String>,

    #[arg(long)]
    variant: Option<String>,

    #[arg(long)]
    local_dir: Option<String>,

    #[arg(long)]
    parallelism: Option<usize>,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(fetch) = report.downcast_ref::<FetchError>() {
            return ExitCode::from(map_exit_code(fetch));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error {
        FetchError::MissingConfig
        | FetchError::ConfigRead(_)
        | FetchError::ConfigParse(_)
        | FetchError::InvalidWorkflowName(_)
        | FetchError::InvalidVariantName(_)
        | FetchError::MetadataMissing(_)
        | FetchError::MetadataParse(_) => 2,
        FetchError::StorageHttp(_)
        | FetchError::StorageStatus { .. }
        | FetchError::Transfer { .. } => 3,
        FetchError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Summary
    };

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, false, output_mode),
        Commands::Plan(args) => run_fetch(args, true, output_mode),
    }
}

fn run_fetch(args: FetchArgs, plan_only: bool, output_mode: OutputMode) -> miette::Result<()> {
    let dry_run = plan_only || args.dry_run;
    let ResolvedConfig {
        bucket,
        parallelism,
        manifest,
        campaigns,
        ..
    } = resolve_campaigns(&args)?;
    let parallelism = args.parallelism.unwrap_or(parallelism);

    let start = Instant::now();
    let mut total = 0usize;
    let mut failed = 0usize;
    let campaign_count = campaigns.len();

    for campaign in campaigns {
        let store = GcsHttpClient::new(&bucket, &campaign.workflow).into_diagnostic()?;
        let mirror = Mirror::new(campaign.local_dir.clone());
        let fetch = CampaignFetch::new(
            store,
            campaign.workflow.clone(),
            campaign.variant.clone(),
            mirror,
        )
        .with_manifest(manifest.clone());

        let options = FetchOptions {
            parallelism,
            dry_run,
        };
        let result = match output_mode {
            OutputMode::Json => {
                let result = fetch.run(options, &JsonOutput).into_diagnostic()?;
                JsonOutput::print_fetch(&result).into_diagnostic()?;
                result
            }
            OutputMode::Summary => {
                let result = fetch.run(options, &ConsoleProgress).into_diagnostic()?;
                print_campaign_summary(&result, &campaign, dry_run);
                result
            }
        };
        total += result.transferred;
        failed += result.failed.len();
    }

    if campaign_count > 1 && matches!(output_mode, OutputMode::Summary) {
        let elapsed_secs = start.elapsed().as_secs_f64();
        println!(
            "==== Downloaded {total} files across {campaign_count} workflows in {elapsed_secs:1.1} seconds"
        );
    }

    if failed > 0 {
        return Err(miette::Report::msg(format!(
            "{failed} file(s) could not be transferred; see the fetch report"
        )));
    }
    Ok(())
}

fn resolve_campaigns(args: &FetchArgs) -> miette::Result<ResolvedConfig> {
    if let Some(workflow) = &args.workflow {
        let workflow: WorkflowName = workflow.parse().into_diagnostic()?;
        let bucket = args.bucket.clone().ok_or_else(|| {
            miette::Report::msg("--bucket is required when a workflow is given on the command line")
        })?;
        let variant = args
            .variant
            .as_deref()
            .unwrap_or_else(|| config::default_variant_name())
            .parse()
            .into_diagnostic()?;
        let local_dir = Utf8PathBuf::from(
            args.local_dir
                .as_deref()
                .unwrap_or_else(|| workflow.as_str()),
        );
        return Ok(ResolvedConfig {
            schema_version: 1,
            bucket,
            parallelism: transfer::default_parallelism(),
            manifest: config::default_manifest(),
            campaigns: vec![CampaignRequest {
                workflow,
                variant,
                local_dir,
            }],
        });
    }
    ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()
}

fn print_campaign_summary(result: &FetchResult, campaign: &CampaignRequest, dry_run: bool) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!(
        "{cyan}{} ({}): {} seed dirs x {} generations, {} files queued{reset}",
        result.workflow, result.variant, result.seed_dirs, result.generations, result.queued
    );
    if dry_run {
        println!("{cyan}  plan only, nothing transferred{reset}");
        return;
    }
    println!(
        "{green}  downloaded {} files into {}{reset}",
        result.transferred, campaign.local_dir
    );
    for path in &result.failed {
        println!("{red}  failed: {path}{reset}");
    }
}

/// Prints phase events to stderr so progress stays out of JSON pipelines.
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        eprintln!("{}", event.message);
    }
}
