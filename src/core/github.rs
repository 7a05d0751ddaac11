//! GitHub Actions artifact source.
//!
//! Finds a successful workflow run, downloads its first artifact and unpacks
//! it into the project's staging directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::{AppConfig, TOKEN_ENV};
use crate::deploy::ProjectDeployment;
use crate::error::{Error, Result};
use crate::extract::{ExtractStats, Extractor, ZipExtractor};
use crate::source::{ArtifactSource, RunSelector, StagedArtifact};
use crate::utils::io;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const ACCEPT_JSON: &str = "application/vnd.github.v3+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const RUNS_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

impl WorkflowRun {
    fn succeeded(&self) -> bool {
        self.conclusion.as_deref() == Some("success")
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowRunList {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunArtifact {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: u64,
    pub archive_download_url: String,
    #[serde(default)]
    pub expired: bool,
}

#[derive(Debug, Deserialize)]
struct RunArtifactList {
    #[serde(default)]
    artifacts: Vec<RunArtifact>,
}

pub struct GithubArtifactSource {
    client: Client,
    base_url: String,
    temp_dir: PathBuf,
}

impl GithubArtifactSource {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let token = config.github_token().ok_or_else(|| {
            Error::config_missing_key("github_config.token", None).with_hint(format!(
                "Set {} in the environment or a .env file next to the config",
                TOKEN_ENV
            ))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim())).map_err(|_| {
            Error::config_invalid_value(
                "github_config.token",
                None,
                "Token contains characters not allowed in an HTTP header",
            )
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(format!("webdeploy/{}", VERSION))
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))?;

        Ok(Self {
            client,
            base_url: config.github_config.base_url.trim_end_matches('/').to_string(),
            temp_dir: config.temp_dir(),
        })
    }

    fn get(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::artifact_fetch_failed(url, None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::artifact_fetch_failed(
                url,
                Some(status.as_u16()),
                format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
            ));
        }
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get(url)?.json().map_err(|e| {
            Error::internal_json(e.to_string(), Some(format!("parse response from {}", url)))
        })
    }

    fn find_run(&self, project: &ProjectDeployment, run: RunSelector) -> Result<WorkflowRun> {
        match run {
            RunSelector::Latest => {
                let url = runs_url(&self.base_url, project);
                let list: WorkflowRunList = self.get_json(&url)?;
                select_latest_run(&list.workflow_runs, &project.allowed_branches).ok_or_else(|| {
                    Error::artifact_unavailable(
                        Some(project.repo_key.clone()),
                        None,
                        no_run_message(project),
                    )
                })
            }
            RunSelector::Id(id) => {
                let url = format!("{}/repos/{}/actions/runs/{}", self.base_url, project.repo_key, id);
                let found: WorkflowRun = self.get_json(&url)?;
                if !found.succeeded() {
                    return Err(Error::artifact_unavailable(
                        Some(project.repo_key.clone()),
                        None,
                        format!(
                            "Run {} did not succeed (conclusion: {})",
                            id,
                            found.conclusion.as_deref().unwrap_or("pending")
                        ),
                    ));
                }
                Ok(found)
            }
        }
    }
}

impl ArtifactSource for GithubArtifactSource {
    fn stage(&self, project: &ProjectDeployment, run: RunSelector) -> Result<StagedArtifact> {
        let found = self.find_run(project, run)?;
        log_status!(
            "fetch",
            "Using run {} of {}{}",
            found.id,
            project.repo_key,
            found
                .head_branch
                .as_deref()
                .map(|b| format!(" on {}", b))
                .unwrap_or_default()
        );

        let url = format!(
            "{}/repos/{}/actions/runs/{}/artifacts",
            self.base_url, project.repo_key, found.id
        );
        let list: RunArtifactList = self.get_json(&url)?;
        let artifact = list
            .artifacts
            .into_iter()
            .find(|a| !a.expired)
            .ok_or_else(|| {
                Error::artifact_unavailable(
                    Some(project.repo_key.clone()),
                    None,
                    format!("Run {} has no unexpired artifacts", found.id),
                )
            })?;

        log_status!(
            "fetch",
            "Downloading '{}' ({} bytes)",
            artifact.name,
            artifact.size_in_bytes
        );
        let bytes = self
            .get(&artifact.archive_download_url)?
            .bytes()
            .map_err(|e| Error::artifact_fetch_failed(&artifact.archive_download_url, None, e.to_string()))?;

        let prefix = format!("{}-run-{}-", project.repo, found.id);
        unpack_download(&self.temp_dir, &prefix, &bytes, &project.staging_dir)?;
        log_status!("fetch", "Artifact staged in {}", project.staging_dir.display());

        Ok(StagedArtifact {
            source: "github",
            staging_dir: project.staging_dir.clone(),
            run_id: Some(found.id),
            head_branch: found.head_branch,
            artifact_name: Some(artifact.name),
        })
    }
}

/// Unpack a downloaded artifact into the staging directory.
///
/// The download is a zip wrapping the workflow's uploaded files. It is kept in
/// `temp_dir` only while extracting and removed afterwards, on success or failure.
fn unpack_download(
    temp_dir: &Path,
    prefix: &str,
    bytes: &[u8],
    staging_dir: &Path,
) -> Result<ExtractStats> {
    let download = io::write_temp_file(temp_dir, prefix, bytes, "save downloaded artifact")?;
    ZipExtractor.extract(download.path(), staging_dir)
}

/// Listing endpoint for successful runs, scoped to the workflow when one is configured.
fn runs_url(base_url: &str, project: &ProjectDeployment) -> String {
    match project.workflow_filename.as_deref() {
        Some(workflow) => format!(
            "{}/repos/{}/actions/workflows/{}/runs?status=success&per_page={}",
            base_url, project.repo_key, workflow, RUNS_PER_PAGE
        ),
        None => format!(
            "{}/repos/{}/actions/runs?status=success&per_page={}",
            base_url, project.repo_key, RUNS_PER_PAGE
        ),
    }
}

/// First successful run (the API lists newest first) on an allowed branch.
/// An empty allow-list accepts every branch.
fn select_latest_run(runs: &[WorkflowRun], allowed_branches: &[String]) -> Option<WorkflowRun> {
    runs.iter()
        .filter(|run| run.succeeded())
        .find(|run| {
            allowed_branches.is_empty()
                || run
                    .head_branch
                    .as_deref()
                    .is_some_and(|branch| allowed_branches.iter().any(|a| a == branch))
        })
        .cloned()
}

fn no_run_message(project: &ProjectDeployment) -> String {
    let scope = project
        .workflow_filename
        .as_deref()
        .map(|w| format!(" for workflow {}", w))
        .unwrap_or_default();
    if project.allowed_branches.is_empty() {
        format!("No successful workflow runs found{}", scope)
    } else {
        format!(
            "No successful workflow runs found{} on branches: {}",
            scope,
            project.allowed_branches.join(", ")
        )
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preserve::PreserveRule;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn project(workflow: Option<&str>, branches: &[&str]) -> ProjectDeployment {
        ProjectDeployment {
            name: "Shop".to_string(),
            repo_key: "acme/shop".to_string(),
            repo: "shop".to_string(),
            workflow_filename: workflow.map(str::to_string),
            allowed_branches: branches.iter().map(|b| b.to_string()).collect(),
            staging_dir: PathBuf::from("/tmp/staging"),
            artifact_filename: "release.zip".to_string(),
            target_sites: Vec::new(),
            preserve_rule: PreserveRule::none(),
        }
    }

    fn run(id: u64, branch: &str, conclusion: &str) -> WorkflowRun {
        WorkflowRun {
            id,
            head_branch: Some(branch.to_string()),
            status: Some("completed".to_string()),
            conclusion: Some(conclusion.to_string()),
        }
    }

    #[test]
    fn runs_url_scopes_to_workflow_when_configured() {
        let url = runs_url("https://api.github.com", &project(Some("build.yml"), &[]));
        assert_eq!(
            url,
            "https://api.github.com/repos/acme/shop/actions/workflows/build.yml/runs?status=success&per_page=100"
        );

        let url = runs_url("https://ghe.example.com/api/v3", &project(None, &[]));
        assert_eq!(
            url,
            "https://ghe.example.com/api/v3/repos/acme/shop/actions/runs?status=success&per_page=100"
        );
    }

    #[test]
    fn latest_run_is_first_successful() {
        let runs = vec![run(3, "main", "failure"), run(2, "main", "success"), run(1, "main", "success")];
        assert_eq!(select_latest_run(&runs, &[]).unwrap().id, 2);
    }

    #[test]
    fn latest_run_honors_allowed_branches() {
        let runs = vec![run(3, "feature/x", "success"), run(2, "main", "success")];
        let allowed = vec!["main".to_string()];
        assert_eq!(select_latest_run(&runs, &allowed).unwrap().id, 2);

        let allowed = vec!["release".to_string()];
        assert!(select_latest_run(&runs, &allowed).is_none());
    }

    #[test]
    fn deserializes_runs_and_artifacts() {
        let runs: WorkflowRunList = serde_json::from_str(
            r#"{"total_count":1,"workflow_runs":[{"id":42,"head_branch":"main","status":"completed","conclusion":"success","name":"build"}]}"#,
        )
        .unwrap();
        assert_eq!(runs.workflow_runs[0].id, 42);
        assert!(runs.workflow_runs[0].succeeded());

        let artifacts: RunArtifactList = serde_json::from_str(
            r#"{"total_count":1,"artifacts":[{"id":7,"name":"release","size_in_bytes":1024,"archive_download_url":"https://api.github.com/repos/acme/shop/actions/artifacts/7/zip","expired":false}]}"#,
        )
        .unwrap();
        assert_eq!(artifacts.artifacts[0].name, "release");
        assert!(!artifacts.artifacts[0].expired);
    }

    #[test]
    fn no_run_message_mentions_branches() {
        let msg = no_run_message(&project(Some("build.yml"), &["main", "release"]));
        assert_eq!(
            msg,
            "No successful workflow runs found for workflow build.yml on branches: main, release"
        );
    }

    fn zipped(name: &str, content: &str) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(name, FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn unpacked_download_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("tmp");
        let staging = dir.path().join("staging");

        let stats = unpack_download(&temp, "shop-run-42-", &zipped("release.zip", "payload"), &staging)
            .unwrap();

        assert_eq!(stats.files, 1);
        assert_eq!(std::fs::read_to_string(staging.join("release.zip")).unwrap(), "payload");
        assert_eq!(std::fs::read_dir(&temp).unwrap().count(), 0);
    }

    #[test]
    fn failed_unpack_still_removes_download() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("tmp");
        let staging = dir.path().join("staging");

        let err = unpack_download(&temp, "shop-run-42-", b"not a zip", &staging).unwrap_err();

        assert_eq!(err.code, crate::error::ErrorCode::ArtifactExtractFailed);
        assert_eq!(std::fs::read_dir(&temp).unwrap().count(), 0);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
