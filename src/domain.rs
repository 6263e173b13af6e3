use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Name of one campaign run, e.g. `20210228.075124__100_Seeds_32_gens_master_branch`.
/// Doubles as the default local directory name for that run's mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowName(String);

impl WorkflowName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkflowName {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && !normalized.contains('/')
            && !normalized.chars().any(char::is_whitespace);
        if !is_valid {
            return Err(FetchError::InvalidWorkflowName(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Named parameter configuration under which seeds were run,
/// e.g. `wildtype_000000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantName(String);

impl VariantName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VariantName {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && !normalized.contains('/')
            && !normalized.chars().any(char::is_whitespace);
        if !is_valid {
            return Err(FetchError::InvalidVariantName(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Fields read from the workflow's `metadata/metadata.json`. Unknown fields
/// are ignored; the run aborts if the object is missing or any of these
/// fields fail to parse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunMetadata {
    pub generations: u32,
    pub init_sims: u32,
    pub seed: u64,
}

impl RunMetadata {
    pub fn parse(content: &str) -> Result<Self, FetchError> {
        serde_json::from_str(content).map_err(|err| FetchError::MetadataParse(err.to_string()))
    }

    /// Index of the last generation a completed seed line must have written,
    /// or `None` for a run recorded with zero generations.
    pub fn final_generation(&self) -> Option<u32> {
        self.generations.checked_sub(1)
    }
}
