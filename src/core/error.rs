use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidYaml,
    ConfigInvalidValue,
    ConfigInvalidPattern,

    ValidationInvalidArgument,

    ProjectNotFound,
    SiteNotFound,

    ArtifactUnavailable,
    ArtifactFetchFailed,
    ArtifactExtractFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

/// Coarse classification of error codes, matching how a deploy run reacts to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad or missing configuration. Raised before any filesystem mutation.
    Configuration,
    /// The artifact could not be staged or failed its integrity check. No site touched.
    ArtifactUnavailable,
    /// The archive could not be unpacked into a site. Fatal for that site only.
    Extraction,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidYaml => "config.invalid_yaml",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigInvalidPattern => "config.invalid_pattern",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::ProjectNotFound => "project.not_found",
            ErrorCode::SiteNotFound => "site.not_found",

            ErrorCode::ArtifactUnavailable => "artifact.unavailable",
            ErrorCode::ArtifactFetchFailed => "artifact.fetch_failed",
            ErrorCode::ArtifactExtractFailed => "artifact.extract_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::ConfigMissingKey
            | ErrorCode::ConfigInvalidYaml
            | ErrorCode::ConfigInvalidValue
            | ErrorCode::ConfigInvalidPattern
            | ErrorCode::ValidationInvalidArgument
            | ErrorCode::ProjectNotFound
            | ErrorCode::SiteNotFound => ErrorCategory::Configuration,

            ErrorCode::ArtifactUnavailable | ErrorCode::ArtifactFetchFailed => {
                ErrorCategory::ArtifactUnavailable
            }

            ErrorCode::ArtifactExtractFailed => ErrorCategory::Extraction,

            ErrorCode::InternalIoError
            | ErrorCode::InternalJsonError
            | ErrorCode::InternalUnexpected => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidYamlDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidPatternDetails {
    pub pattern: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFailedDetails {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub error: String,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn project_not_found(id: impl Into<String>, available: Vec<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("Project '{}' is not configured", id),
            to_details(NotFoundDetails { id, available }),
        )
        .with_hint("Run 'webdeploy projects' to see configured projects")
    }

    pub fn site_not_found(id: impl Into<String>, available: Vec<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::SiteNotFound,
            format!("Site '{}' is not configured for this project", id),
            to_details(NotFoundDetails { id, available }),
        )
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let details = to_details(ConfigMissingKeyDetails {
            key: key.into(),
            path,
        });

        Self::new(
            ErrorCode::ConfigMissingKey,
            "Missing required configuration key",
            details,
        )
    }

    pub fn config_invalid_yaml(path: impl Into<String>, err: serde_yml::Error) -> Self {
        let details = to_details(ConfigInvalidYamlDetails {
            path: path.into(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidYaml,
            "Invalid YAML in configuration",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn config_invalid_pattern(pattern: impl Into<String>, err: regex::Error) -> Self {
        let details = to_details(InvalidPatternDetails {
            pattern: pattern.into(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidPattern,
            "Invalid preserve_regex pattern",
            details,
        )
    }

    pub fn artifact_unavailable(
        repo: Option<String>,
        path: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        let details = to_details(ArtifactDetails {
            path,
            repo,
            error: error.clone(),
        });

        Self::new(
            ErrorCode::ArtifactUnavailable,
            format!("Artifact unavailable: {}", error),
            details,
        )
    }

    pub fn artifact_fetch_failed(
        url: impl Into<String>,
        status: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        let details = to_details(FetchFailedDetails {
            url: url.into(),
            status,
            error: error.clone(),
        });

        let mut err = Self::new(
            ErrorCode::ArtifactFetchFailed,
            format!("Artifact fetch failed: {}", error),
            details,
        );
        if matches!(status, Some(401) | Some(403)) {
            err = err.with_hint("Check github_config.token or the GITHUB_TOKEN environment variable");
        }
        err.retryable = Some(status.map_or(true, |s| s >= 500));
        err
    }

    pub fn artifact_extract_failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        let details = to_details(ArtifactDetails {
            path: Some(path.into()),
            repo: None,
            error: error.clone(),
        });

        Self::new(
            ErrorCode::ArtifactExtractFailed,
            format!("Extraction failed: {}", error),
            details,
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}
