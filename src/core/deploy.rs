use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::extract::{self, ArchiveFormat};
use crate::local_files::{self, FileSystem};
use crate::preserve::PreserveRule;
use crate::site::{DeploymentOutcome, SiteDeployer, SiteTarget};
use crate::source::{ArtifactSource, RunSelector, StagedArtifact};
use crate::utils::artifact;
use crate::utils::io;

/// Everything one run needs to know about the project being deployed.
///
/// Built once from validated configuration and not modified afterwards.
#[derive(Debug, Clone)]
pub struct ProjectDeployment {
    pub name: String,
    /// `owner/repo`
    pub repo_key: String,
    pub repo: String,
    pub workflow_filename: Option<String>,
    pub allowed_branches: Vec<String>,
    pub staging_dir: PathBuf,
    pub artifact_filename: String,
    pub target_sites: Vec<SiteTarget>,
    pub preserve_rule: PreserveRule,
}

impl ProjectDeployment {
    /// Look up `key` and build the deployment, optionally narrowed to one site.
    pub fn resolve(config: &AppConfig, key: &str, site_filter: Option<&str>) -> Result<Self> {
        let project = config.find_project(key)?;
        let github = &config.github_config;

        let mut target_sites: Vec<SiteTarget> = project
            .websites
            .iter()
            .map(|site| SiteTarget::new(&config.websites_base_path, site))
            .collect();

        if let Some(filter) = site_filter.map(str::trim).filter(|f| !f.is_empty()) {
            let available: Vec<String> = target_sites.iter().map(|s| s.name.clone()).collect();
            target_sites.retain(|s| s.name.eq_ignore_ascii_case(filter));
            if target_sites.is_empty() {
                return Err(Error::site_not_found(filter, available));
            }
        }

        Ok(Self {
            name: project.name.clone(),
            repo_key: project.repo_key(github),
            repo: project.repo_name().to_string(),
            workflow_filename: project.workflow_filename.clone(),
            allowed_branches: project.allowed_branches.clone(),
            staging_dir: project.download_directory.clone(),
            artifact_filename: project.artifact_filename.clone(),
            target_sites,
            preserve_rule: PreserveRule::compile(project.preserve_regex.as_deref())?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub project_key: String,
    pub site: Option<String>,
    pub run: RunSelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    CompletedWithWarnings,
    Failed,
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::CompletedWithWarnings => 3,
            RunStatus::Failed => 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub format: ArchiveFormat,
    pub entries: usize,
    pub uncompressed_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploySummary {
    pub total: usize,
    pub succeeded: usize,
    pub warnings: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub project: String,
    pub repo: String,
    pub run: RunSelector,
    pub status: RunStatus,
    pub staged: StagedArtifact,
    pub artifact: ArtifactInfo,
    pub sites: Vec<DeploymentOutcome>,
    pub summary: DeploySummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Deploy against the local filesystem.
pub fn run(
    config: &AppConfig,
    request: &DeployRequest,
    source: &dyn ArtifactSource,
) -> Result<DeployReport> {
    run_with_fs(config, request, source, &local_files::local())
}

/// Resolve, stage, verify, then deploy every selected site in configured order.
///
/// Configuration and staging problems are returned as errors before any site
/// directory is created or cleared. Per-site problems end up in the report.
pub fn run_with_fs(
    config: &AppConfig,
    request: &DeployRequest,
    source: &dyn ArtifactSource,
    fs: &dyn FileSystem,
) -> Result<DeployReport> {
    let started_at = Utc::now();
    let project = ProjectDeployment::resolve(config, &request.project_key, request.site.as_deref())?;

    log_status!(
        "deploy",
        "Deploying {} ({}) run {} to {} site(s)",
        project.name,
        project.repo_key,
        request.run,
        project.target_sites.len()
    );

    let staged = source.stage(&project, request.run).map_err(|e| {
        if e.code.category() == crate::error::ErrorCategory::Configuration {
            e
        } else {
            as_unavailable(e, &project.repo_key)
        }
    })?;

    let artifact_path =
        artifact::resolve_artifact_path(&staged.staging_dir, &project.artifact_filename)
            .map_err(|e| as_unavailable(e, &project.repo_key))?;

    // Verify the archive before the first site is cleared
    let extractor = extract::extractor_for(&artifact_path)
        .map_err(|e| as_unavailable(e, &project.repo_key))?;
    let summary = extractor
        .inspect(&artifact_path)
        .map_err(|e| as_unavailable(e, &project.repo_key))?;
    let artifact = ArtifactInfo {
        sha256: io::sha256_file(&artifact_path)?,
        path: artifact_path,
        format: extractor.format(),
        entries: summary.entries,
        uncompressed_bytes: summary.uncompressed_bytes,
    };
    log_status!(
        "deploy",
        "Verified {} archive {} ({} entries)",
        artifact.format.as_str(),
        artifact.path.display(),
        artifact.entries
    );

    fs.ensure_dir(&config.websites_base_path)?;

    let deployer = SiteDeployer::new(fs, extractor.as_ref(), &project.preserve_rule);
    let sites: Vec<DeploymentOutcome> = project
        .target_sites
        .iter()
        .map(|site| deployer.deploy_to_site(&artifact.path, site))
        .collect();

    let (summary, status) = aggregate(&sites);

    log_status!(
        "deploy",
        "{}: {} succeeded, {} with warnings, {} failed",
        project.repo_key,
        summary.succeeded,
        summary.warnings,
        summary.failed
    );

    Ok(DeployReport {
        project: project.name,
        repo: project.repo_key,
        run: request.run,
        status,
        staged,
        artifact,
        sites,
        summary,
        started_at,
        finished_at: Utc::now(),
    })
}

/// Errors while staging or verifying the artifact abort the run before any
/// site is touched; they are reported as artifact unavailability.
fn as_unavailable(err: Error, repo_key: &str) -> Error {
    match err.code {
        ErrorCode::ArtifactUnavailable | ErrorCode::ArtifactFetchFailed => err,
        _ => {
            let path = err.details["path"].as_str().map(str::to_string);
            let cause = err.details["error"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.message.clone());
            let mut wrapped = Error::artifact_unavailable(Some(repo_key.to_string()), path, cause);
            wrapped.hints = err.hints;
            wrapped
        }
    }
}

/// Overall status: success only if every site succeeded; any fatal site fails the run.
pub fn aggregate(outcomes: &[DeploymentOutcome]) -> (DeploySummary, RunStatus) {
    let mut summary = DeploySummary {
        total: outcomes.len(),
        ..DeploySummary::default()
    };

    for outcome in outcomes {
        if outcome.is_success() {
            summary.succeeded += 1;
        } else if outcome.is_fatal() {
            summary.failed += 1;
        } else {
            summary.warnings += 1;
        }
    }

    let status = if summary.failed > 0 {
        RunStatus::Failed
    } else if summary.warnings > 0 {
        RunStatus::CompletedWithWarnings
    } else {
        RunStatus::Success
    };

    (summary, status)
}
