//! Where release artifacts come from.
//!
//! A source's only job is to leave a readable archive in the project's
//! staging directory. The deploy engine does not know how it got there.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::deploy::ProjectDeployment;
use crate::error::{Error, Result};

/// Which workflow run to deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunSelector {
    #[default]
    Latest,
    Id(u64),
}

impl FromStr for RunSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("latest") {
            return Ok(RunSelector::Latest);
        }
        s.parse::<u64>().map(RunSelector::Id).map_err(|_| {
            Error::validation_invalid_argument(
                "run_id",
                "Run id must be 'latest' or a numeric workflow run id",
                Some(s.to_string()),
                None,
            )
        })
    }
}

impl fmt::Display for RunSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunSelector::Latest => write!(f, "latest"),
            RunSelector::Id(id) => write!(f, "{}", id),
        }
    }
}

impl Serialize for RunSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of staging: where the archive now lives and what produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedArtifact {
    pub source: &'static str,
    pub staging_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
}

pub trait ArtifactSource {
    fn stage(&self, project: &ProjectDeployment, run: RunSelector) -> Result<StagedArtifact>;
}

/// Uses whatever is already in the staging directory.
pub struct LocalArtifactSource;

impl ArtifactSource for LocalArtifactSource {
    fn stage(&self, project: &ProjectDeployment, run: RunSelector) -> Result<StagedArtifact> {
        if run != RunSelector::Latest {
            return Err(Error::validation_invalid_argument(
                "run_id",
                "A specific run id cannot be combined with --skip-fetch",
                Some(run.to_string()),
                None,
            ));
        }

        if !project.staging_dir.is_dir() {
            return Err(Error::artifact_unavailable(
                Some(project.repo_key.clone()),
                Some(project.staging_dir.display().to_string()),
                "Staging directory does not exist",
            )
            .with_hint("Run without --skip-fetch to download the latest artifact"));
        }

        log_status!(
            "fetch",
            "Using staged artifact in {}",
            project.staging_dir.display()
        );

        Ok(StagedArtifact {
            source: "local",
            staging_dir: project.staging_dir.clone(),
            run_id: None,
            head_branch: None,
            artifact_name: None,
        })
    }
}
