use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the configuration file location.
pub const CONFIG_ENV: &str = "WEBDEPLOY_CONFIG";

/// Base webdeploy config directory (~/.config/webdeploy/, %APPDATA%\webdeploy on Windows)
pub fn webdeploy() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("webdeploy"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("webdeploy"))
    }
}

/// Default config.yaml path
pub fn config_yaml() -> Result<PathBuf> {
    Ok(webdeploy()?.join("config.yaml"))
}

/// Config file to load: explicit path, then $WEBDEPLOY_CONFIG, then the default.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand(path));
    }
    match env::var(CONFIG_ENV) {
        Ok(value) if !value.trim().is_empty() => Ok(expand(Path::new(value.trim()))),
        _ => config_yaml(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).to_string()),
        None => path.to_path_buf(),
    }
}

/// Scratch directory for downloads when `temp_extract_path` is not configured.
pub fn default_temp_dir() -> PathBuf {
    env::temp_dir().join("webdeploy")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let path = resolve_config_path(Some(Path::new("/etc/webdeploy.yaml"))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/webdeploy.yaml"));
    }

    #[test]
    fn expand_leaves_absolute_paths_alone() {
        assert_eq!(expand(Path::new("/srv/www")), PathBuf::from("/srv/www"));
    }

    #[cfg(not(windows))]
    #[test]
    fn expand_replaces_tilde() {
        let expanded = expand(Path::new("~/deploy"));
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("deploy"));
    }
}
