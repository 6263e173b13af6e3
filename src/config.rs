use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{VariantName, WorkflowName};
use crate::error::FetchError;
use crate::layout;
use crate::transfer;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub bucket: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub local_dir: Option<String>,
    #[serde(default)]
    pub parallelism: Option<usize>,
    #[serde(default)]
    pub manifest: Option<Vec<String>>,
    #[serde(default)]
    pub workflows: Vec<WorkflowEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WorkflowEntry {
    Shorthand(String),
    Detailed(WorkflowEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WorkflowEntryObject {
    pub name: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub local_dir: Option<String>,
}

/// One campaign to fetch: a workflow under the bucket, the variant to pull
/// from it, and the local directory its files land in. Several workflows may
/// share one local directory (continuation runs complement each other).
#[derive(Debug, Clone)]
pub struct CampaignRequest {
    pub workflow: WorkflowName,
    pub variant: VariantName,
    pub local_dir: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub bucket: String,
    pub parallelism: usize,
    pub manifest: Vec<String>,
    pub campaigns: Vec<CampaignRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, FetchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("simfetch.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(FetchError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FetchError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FetchError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, FetchError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let default_variant = config
            .variant
            .unwrap_or_else(|| default_variant_name().to_string());
        let campaigns = config
            .workflows
            .into_iter()
            .map(|entry| match entry {
                WorkflowEntry::Shorthand(value) => {
                    let workflow: WorkflowName = value.parse()?;
                    Ok(CampaignRequest {
                        variant: default_variant.parse()?,
                        local_dir: local_dir_for(&workflow, config.local_dir.as_deref(), None),
                        workflow,
                    })
                }
                WorkflowEntry::Detailed(obj) => {
                    let workflow: WorkflowName = obj.name.parse()?;
                    let variant = obj
                        .variant
                        .as_deref()
                        .unwrap_or(&default_variant)
                        .parse()?;
                    Ok(CampaignRequest {
                        variant,
                        local_dir: local_dir_for(
                            &workflow,
                            config.local_dir.as_deref(),
                            obj.local_dir.as_deref(),
                        ),
                        workflow,
                    })
                }
            })
            .collect::<Result<Vec<_>, FetchError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            bucket: config.bucket,
            parallelism: config
                .parallelism
                .unwrap_or_else(transfer::default_parallelism),
            manifest: config.manifest.unwrap_or_else(default_manifest),
            campaigns,
        })
    }
}

fn local_dir_for(
    workflow: &WorkflowName,
    config_default: Option<&str>,
    entry_override: Option<&str>,
) -> Utf8PathBuf {
    Utf8PathBuf::from(
        entry_override
            .or(config_default)
            .unwrap_or_else(|| workflow.as_str()),
    )
}

pub fn default_manifest() -> Vec<String> {
    layout::SIM_FILES.iter().map(|path| path.to_string()).collect()
}

pub fn default_variant_name() -> &'static str {
    "wildtype_000000"
}
