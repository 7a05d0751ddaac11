//! Application configuration (config.yaml).
//!
//! The file is parsed into typed structs, paths are expanded, and a separate
//! validation pass rejects anything the deploy engine could trip over later.
//! Nothing downstream inspects untyped YAML.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths;
use crate::preserve::PreserveRule;
use crate::utils::io;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_ARTIFACT_FILENAME: &str = "release.7z";
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub websites_base_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_extract_path: Option<PathBuf>,

    pub github_config: GithubConfig,

    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,

    pub owner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,

    /// Repository name, or `owner/repo` to override `github_config.owner`.
    pub repo: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_filename: Option<String>,

    /// File name (or glob) of the release archive inside the download directory.
    #[serde(default = "default_artifact_filename")]
    pub artifact_filename: String,

    #[serde(alias = "artifact_staging_path")]
    pub download_directory: PathBuf,

    pub websites: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_branches: Vec<String>,

    /// When clearing a site, entries whose name matches are kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_regex: Option<String>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_artifact_filename() -> String {
    DEFAULT_ARTIFACT_FILENAME.to_string()
}

impl ProjectConfig {
    pub fn owner<'a>(&'a self, github: &'a GithubConfig) -> &'a str {
        match self.repo.split_once('/') {
            Some((owner, _)) => owner,
            None => &github.owner,
        }
    }

    pub fn repo_name(&self) -> &str {
        match self.repo.split_once('/') {
            Some((_, name)) => name,
            None => &self.repo,
        }
    }

    /// `owner/repo`
    pub fn repo_key(&self, github: &GithubConfig) -> String {
        format!("{}/{}", self.owner(github), self.repo_name())
    }

    /// Whether `key` names this project, as `repo` or `owner/repo`.
    pub fn matches_key(&self, github: &GithubConfig, key: &str) -> bool {
        let key = key.trim();
        key.eq_ignore_ascii_case(self.repo_name()) || key.eq_ignore_ascii_case(&self.repo_key(github))
    }
}

impl AppConfig {
    pub fn project_keys(&self) -> Vec<String> {
        self.projects
            .iter()
            .map(|p| p.repo_key(&self.github_config))
            .collect()
    }

    pub fn find_project(&self, key: &str) -> Result<&ProjectConfig> {
        self.projects
            .iter()
            .find(|p| p.matches_key(&self.github_config, key))
            .ok_or_else(|| Error::project_not_found(key, self.project_keys()))
    }

    /// Token from the config file, falling back to $GITHUB_TOKEN.
    pub fn github_token(&self) -> Option<String> {
        self.github_config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_extract_path
            .clone()
            .unwrap_or_else(paths::default_temp_dir)
    }

    /// Copy safe to print: the token is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.github_config.token.is_some() {
            copy.github_config.token = Some("********".to_string());
        }
        copy
    }

    fn expand_paths(&mut self) {
        self.websites_base_path = paths::expand(&self.websites_base_path);
        self.temp_extract_path = self.temp_extract_path.as_deref().map(paths::expand);
        for project in &mut self.projects {
            project.download_directory = paths::expand(&project.download_directory);
        }
    }
}

/// Load, expand and validate the configuration file.
///
/// A `.env` file next to the configuration is loaded first so that
/// `GITHUB_TOKEN` can live beside it.
pub fn load(path: &Path) -> Result<AppConfig> {
    if !path.is_file() {
        return Err(Error::config_invalid_value(
            "config",
            Some(path.display().to_string()),
            "Configuration file not found",
        )
        .with_hint(format!(
            "Create the file or point to one with --config or ${}",
            paths::CONFIG_ENV
        )));
    }

    if let Some(env_file) = path.parent().map(|dir| dir.join(".env")) {
        if env_file.is_file() {
            dotenvy::from_path(&env_file).map_err(|e| {
                Error::config_invalid_value(
                    ".env",
                    Some(env_file.display().to_string()),
                    e.to_string(),
                )
            })?;
        }
    }

    let content = io::read_file(path, "read config")?;
    parse(&content, &path.display().to_string())
}

/// Parse, expand and validate configuration text. `source` labels errors.
pub fn parse(content: &str, source: &str) -> Result<AppConfig> {
    let mut config: AppConfig =
        serde_yml::from_str(content).map_err(|e| Error::config_invalid_yaml(source, e))?;
    config.expand_paths();
    validate(&config)?;
    Ok(config)
}

/// Reject configurations the deploy engine cannot act on safely.
pub fn validate(config: &AppConfig) -> Result<()> {
    require_field(&config.github_config.owner, "github_config.owner")?;
    if config.websites_base_path.as_os_str().is_empty() {
        return Err(Error::config_missing_key("websites_base_path", None));
    }

    let mut seen = HashSet::new();
    for (index, project) in config.projects.iter().enumerate() {
        let prefix = format!("projects[{}]", index);
        require_field(&project.name, &format!("{}.name", prefix))?;
        require_field(&project.repo, &format!("{}.repo", prefix))?;
        require_field(&project.artifact_filename, &format!("{}.artifact_filename", prefix))?;
        if project.download_directory.as_os_str().is_empty() {
            return Err(Error::config_missing_key(
                format!("{}.download_directory", prefix),
                None,
            ));
        }

        if project.websites.is_empty() {
            return Err(Error::config_invalid_value(
                format!("{}.websites", prefix),
                None,
                "At least one website is required",
            ));
        }

        for site in &project.websites {
            if !is_single_component(site) {
                return Err(Error::config_invalid_value(
                    format!("{}.websites", prefix),
                    Some(site.clone()),
                    "Site names must be a single directory name under websites_base_path",
                ));
            }
        }

        let key = project.repo_key(&config.github_config).to_ascii_lowercase();
        if !seen.insert(key.clone()) {
            return Err(Error::config_invalid_value(
                format!("{}.repo", prefix),
                Some(key),
                "Duplicate repository; each repo may be configured once",
            ));
        }

        PreserveRule::compile(project.preserve_regex.as_deref())?;
    }

    Ok(())
}

fn require_field(value: &str, key: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::config_missing_key(key, None));
    }
    Ok(())
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
websites_base_path: /srv/www
github_config:
  owner: acme
projects:
  - name: Storefront
    repo: storefront
    workflow_filename: release.yml
    download_directory: /var/deploy/storefront
    websites: [shop-a, shop-b]
    preserve_regex: 'web\.config'
  - name: Admin
    repo: other-org/admin
    artifact_filename: admin-*.zip
    download_directory: /var/deploy/admin
    websites: [admin]
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let config = parse(SAMPLE, "sample").unwrap();

        assert_eq!(config.github_config.base_url, DEFAULT_API_BASE);
        assert_eq!(config.projects.len(), 2);
        assert_eq!(config.projects[0].artifact_filename, "release.7z");
        assert!(config.projects[0].allowed_branches.is_empty());
        assert_eq!(config.projects[1].preserve_regex, None);
    }

    #[test]
    fn finds_project_by_repo_or_full_key() {
        let config = parse(SAMPLE, "sample").unwrap();

        assert_eq!(config.find_project("storefront").unwrap().name, "Storefront");
        assert_eq!(config.find_project("ACME/Storefront").unwrap().name, "Storefront");
        assert_eq!(config.find_project("other-org/admin").unwrap().name, "Admin");
        assert_eq!(config.find_project("admin").unwrap().name, "Admin");
    }

    #[test]
    fn unknown_project_lists_configured_keys() {
        let config = parse(SAMPLE, "sample").unwrap();
        let err = config.find_project("nonexistent-repo").unwrap_err();

        assert_eq!(err.code.as_str(), "project.not_found");
        assert_eq!(err.details["available"][0], "acme/storefront");
        assert_eq!(err.details["available"][1], "other-org/admin");
    }

    #[test]
    fn staging_path_alias_is_accepted() {
        let yaml = SAMPLE.replace(
            "download_directory: /var/deploy/storefront",
            "artifact_staging_path: /var/deploy/storefront",
        );
        let config = parse(&yaml, "sample").unwrap();
        assert_eq!(
            config.projects[0].download_directory,
            PathBuf::from("/var/deploy/storefront")
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let yaml = SAMPLE.replace("    websites: [admin]\n", "");
        let err = parse(&yaml, "sample").unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_yaml");
    }

    #[test]
    fn empty_websites_is_rejected() {
        let yaml = SAMPLE.replace("websites: [admin]", "websites: []");
        let err = parse(&yaml, "sample").unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
        assert_eq!(err.details["key"], "projects[1].websites");
    }

    #[test]
    fn site_names_cannot_escape_base_path() {
        for bad in ["../etc", "a/b", "..", "/abs"] {
            let yaml = SAMPLE.replace("websites: [admin]", &format!("websites: ['{}']", bad));
            let err = parse(&yaml, "sample").unwrap_err();
            assert_eq!(err.code.as_str(), "config.invalid_value", "accepted {}", bad);
        }
    }

    #[test]
    fn invalid_preserve_regex_fails_validation() {
        let yaml = SAMPLE.replace(r"'web\.config'", "'web(config'");
        let err = parse(&yaml, "sample").unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_pattern");
    }

    #[test]
    fn duplicate_repos_are_rejected() {
        let yaml = SAMPLE.replace("repo: other-org/admin", "repo: acme/storefront");
        let err = parse(&yaml, "sample").unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn blank_owner_is_a_missing_key() {
        let yaml = SAMPLE.replace("owner: acme", "owner: ''");
        let err = parse(&yaml, "sample").unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
        assert_eq!(err.details["key"], "github_config.owner");
    }

    #[test]
    fn whitespace_only_name_is_a_missing_key() {
        let yaml = SAMPLE.replace("name: Admin", "name: '   '");
        let err = parse(&yaml, "sample").unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
        assert_eq!(err.details["key"], "projects[1].name");
    }

    #[test]
    fn redacted_masks_token() {
        let yaml = SAMPLE.replace("owner: acme", "owner: acme\n  token: secret-token");
        let config = parse(&yaml, "sample").unwrap();

        let shown = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("secret-token"));
        assert_eq!(config.github_token().as_deref(), Some("secret-token"));
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = load(Path::new("/definitely/not/here/config.yaml")).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
        assert!(!err.hints.is_empty());
    }
}
