use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::clear::{self, ClearEntryError, ClearReport};
use crate::error::Error;
use crate::extract::{ExtractStats, Extractor};
use crate::local_files::FileSystem;
use crate::preserve::PreserveRule;

/// One destination directory under the hosting base path.
#[derive(Debug, Clone, Serialize)]
pub struct SiteTarget {
    pub name: String,
    pub path: PathBuf,
}

impl SiteTarget {
    pub fn new(base_path: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: base_path.join(name),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteFailure {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl From<Error> for SiteFailure {
    fn from(err: Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message,
            details: err.details,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SiteStatus {
    Success,
    PartialFailure { errors: Vec<ClearEntryError> },
    /// Entries that could not be cleared before the failure are kept in `errors`.
    Fatal {
        error: SiteFailure,
        #[serde(rename = "errors", skip_serializing_if = "Vec::is_empty")]
        clear_errors: Vec<ClearEntryError>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOutcome {
    pub site: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: SiteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared: Option<ClearSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<ExtractStats>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearSummary {
    pub removed: usize,
    pub preserved: Vec<String>,
}

impl DeploymentOutcome {
    fn new(site: &SiteTarget, status: SiteStatus) -> Self {
        Self {
            site: site.name.clone(),
            path: site.path.clone(),
            status,
            cleared: None,
            extracted: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, SiteStatus::Success)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.status, SiteStatus::Fatal { .. })
    }

    pub fn clear_errors(&self) -> &[ClearEntryError] {
        match &self.status {
            SiteStatus::PartialFailure { errors } => errors,
            SiteStatus::Fatal { clear_errors, .. } => clear_errors,
            SiteStatus::Success => &[],
        }
    }
}

/// Clears and repopulates site directories from one artifact.
pub struct SiteDeployer<'a> {
    fs: &'a dyn FileSystem,
    extractor: &'a dyn Extractor,
    preserve: &'a PreserveRule,
}

impl<'a> SiteDeployer<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        extractor: &'a dyn Extractor,
        preserve: &'a PreserveRule,
    ) -> Self {
        Self {
            fs,
            extractor,
            preserve,
        }
    }

    /// Ensure the site directory, clear it, then unpack the artifact into it.
    ///
    /// Clear failures are carried into a `PartialFailure`; a failure to create
    /// the directory or to extract is `Fatal` for this site.
    pub fn deploy_to_site(&self, artifact: &Path, site: &SiteTarget) -> DeploymentOutcome {
        log_status!("deploy", "Deploying to site '{}' ({})", site.name, site.path.display());

        if let Err(err) = self.fs.ensure_dir(&site.path) {
            eprintln!(
                "[deploy] Error: cannot create {}: {}",
                site.path.display(),
                err.details
            );
            let status = SiteStatus::Fatal {
                error: err.into(),
                clear_errors: Vec::new(),
            };
            return DeploymentOutcome::new(site, status);
        }

        let ClearReport {
            removed,
            preserved,
            errors,
        } = clear::clear_directory(self.fs, &site.path, self.preserve);
        let cleared = Some(ClearSummary { removed, preserved });

        let stats = match self.extractor.extract(artifact, &site.path) {
            Ok(stats) => stats,
            Err(err) => {
                eprintln!(
                    "[deploy] Error: site '{}' may be partially deployed: {}",
                    site.name, err.message
                );
                let status = SiteStatus::Fatal {
                    error: err.into(),
                    clear_errors: errors,
                };
                let mut outcome = DeploymentOutcome::new(site, status);
                outcome.cleared = cleared;
                return outcome;
            }
        };

        let status = if errors.is_empty() {
            SiteStatus::Success
        } else {
            SiteStatus::PartialFailure { errors }
        };

        let mut outcome = DeploymentOutcome::new(site, status);
        outcome.cleared = cleared;
        outcome.extracted = Some(stats);
        outcome
    }
}
