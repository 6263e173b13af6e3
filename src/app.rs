use serde::Serialize;
use tracing::info;

use crate::discovery;
use crate::domain::{RunMetadata, VariantName, WorkflowName};
use crate::error::FetchError;
use crate::layout;
use crate::mirror::{FetchReport, Mirror};
use crate::queue::DownloadQueue;
use crate::storage::ObjectStore;
use crate::transfer;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub parallelism: usize,
    pub dry_run: bool,
}

/// Serializable outcome of one campaign fetch.
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub workflow: String,
    pub variant: String,
    pub generations: u32,
    pub seed_dirs: usize,
    pub queued: usize,
    pub transferred: usize,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Fetches the needed files of one campaign run: workflow metadata, the
/// per-variant model-parameter blob, and the per-generation manifest for
/// every seed line that completed through the final generation.
///
/// One instance serves one campaign; the queue it builds is not reusable
/// across runs.
pub struct CampaignFetch<S: ObjectStore> {
    store: S,
    workflow: WorkflowName,
    variant: VariantName,
    mirror: Mirror,
    manifest: Vec<String>,
    queue: DownloadQueue,
}

impl<S: ObjectStore> CampaignFetch<S> {
    pub fn new(store: S, workflow: WorkflowName, variant: VariantName, mirror: Mirror) -> Self {
        Self {
            store,
            workflow,
            variant,
            mirror,
            manifest: crate::config::default_manifest(),
            queue: DownloadQueue::new(),
        }
    }

    pub fn with_manifest(mut self, manifest: Vec<String>) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn queue(&self) -> &DownloadQueue {
        &self.queue
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Transfer and parse `metadata/metadata.json`. The generation count in
    /// it gates everything else, so failure here aborts the campaign.
    pub fn fetch_metadata(&self) -> Result<RunMetadata, FetchError> {
        self.mirror.ensure_root()?;
        let local = self.mirror.local_path(layout::METADATA_FILE);
        self.store
            .transfer(layout::METADATA_FILE, local.as_std_path())
            .map_err(|err| FetchError::MetadataMissing(err.to_string()))?;
        let content = self.mirror.read_to_string(layout::METADATA_FILE)?;
        let metadata = RunMetadata::parse(&content)?;
        info!(
            "workflow {} reports {} generations, {} init sims",
            self.workflow, metadata.generations, metadata.init_sims
        );
        Ok(metadata)
    }

    /// Build the complete download set: the metadata object itself, the
    /// per-variant sim-data blob, and manifest × generations for every
    /// completed seed directory. Returns the discovered seed directories.
    pub fn build_queue(&self, metadata: &RunMetadata) -> Result<Vec<String>, FetchError> {
        self.queue.queue("", [layout::METADATA_FILE]);
        self.queue.queue("", [layout::sim_data_path(&self.variant).as_str()]);

        let seed_dirs = match metadata.final_generation() {
            Some(max_gen) => {
                discovery::find_completed_seed_dirs(&self.store, &self.variant, max_gen)?
            }
            None => Vec::new(),
        };

        for seed_dir in &seed_dirs {
            for generation in 0..metadata.generations {
                self.queue
                    .queue(&layout::sim_out_dir(seed_dir, generation), &self.manifest);
            }
        }
        Ok(seed_dirs)
    }

    /// Run the whole campaign: metadata, discovery, queue expansion, the
    /// two-phase drain, and the run report. With `dry_run` the plan is
    /// returned after queue expansion and nothing is transferred.
    pub fn run(
        &self,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, FetchError> {
        sink.event(ProgressEvent {
            message: format!("phase=Metadata; reading {}", layout::METADATA_FILE),
        });
        let metadata = self.fetch_metadata()?;

        sink.event(ProgressEvent {
            message: format!("phase=Discover; probing seed dirs under {}", self.variant),
        });
        let seed_dirs = self.build_queue(&metadata)?;
        let queued = self.queue.len();

        if options.dry_run {
            return Ok(FetchResult {
                workflow: self.workflow.to_string(),
                variant: self.variant.to_string(),
                generations: metadata.generations,
                seed_dirs: seed_dirs.len(),
                queued,
                transferred: 0,
                failed: Vec::new(),
            });
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase=Transfer; {queued} files across {} seed dirs",
                seed_dirs.len()
            ),
        });
        let summary =
            transfer::drain_queue(&self.store, &self.queue, &self.mirror, options.parallelism);

        let result = FetchResult {
            workflow: self.workflow.to_string(),
            variant: self.variant.to_string(),
            generations: metadata.generations,
            seed_dirs: seed_dirs.len(),
            queued,
            transferred: summary.transferred,
            failed: summary.failed,
        };

        sink.event(ProgressEvent {
            message: "phase=Report; writing fetch report".to_string(),
        });
        self.mirror.write_report(&FetchReport {
            workflow: result.workflow.clone(),
            variant: result.variant.clone(),
            generations: result.generations,
            seed_dirs: result.seed_dirs,
            queued: result.queued,
            transferred: result.transferred,
            failed: result.failed.clone(),
            fetched_at: iso_timestamp(),
            tool: format!("simfetch/{}", env!("CARGO_PKG_VERSION")),
        })?;

        Ok(result)
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
