use std::path::PathBuf;

use webdeploy::config::{self as app_config, AppConfig};
use webdeploy::paths;

pub type CmdResult<T> = webdeploy::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    pub config_path: Option<PathBuf>,
}

impl GlobalArgs {
    /// Resolve and load the configuration file, returning where it came from.
    pub fn load_config(&self) -> webdeploy::Result<(PathBuf, AppConfig)> {
        let path = paths::resolve_config_path(self.config_path.as_deref())?;
        let config = app_config::load(&path)?;
        Ok((path, config))
    }
}

pub mod config;
pub mod deploy;
pub mod projects;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (webdeploy::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Deploy(args) => {
            crate::tty::status("webdeploy is working...");
            dispatch!(args, global, deploy)
        }
        crate::Commands::Config(args) => dispatch!(args, global, config),
        crate::Commands::Projects => crate::output::map_cmd_result_to_json(projects::run(global)),
    }
}
