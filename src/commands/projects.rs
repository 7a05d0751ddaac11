use serde::Serialize;

use webdeploy::site::SiteTarget;

use super::CmdResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListItem {
    name: String,
    repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow_filename: Option<String>,
    artifact_filename: String,
    download_directory: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    allowed_branches: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preserve_regex: Option<String>,
    sites: Vec<SiteTarget>,
}

#[derive(Debug, Serialize)]
pub struct ProjectsOutput {
    command: String,
    projects: Vec<ProjectListItem>,
}

pub fn run(global: &crate::commands::GlobalArgs) -> CmdResult<ProjectsOutput> {
    let (_, config) = global.load_config()?;

    let projects = config
        .projects
        .iter()
        .map(|p| ProjectListItem {
            name: p.name.clone(),
            repo: p.repo_key(&config.github_config),
            workflow_filename: p.workflow_filename.clone(),
            artifact_filename: p.artifact_filename.clone(),
            download_directory: p.download_directory.display().to_string(),
            allowed_branches: p.allowed_branches.clone(),
            preserve_regex: p.preserve_regex.clone(),
            sites: p
                .websites
                .iter()
                .map(|site| SiteTarget::new(&config.websites_base_path, site))
                .collect(),
        })
        .collect();

    Ok((
        ProjectsOutput {
            command: "projects.list".to_string(),
            projects,
        },
        0,
    ))
}
