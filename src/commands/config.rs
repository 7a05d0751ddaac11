use clap::{Args, Subcommand};
use serde::Serialize;

use webdeploy::config::AppConfig;
use webdeploy::paths;

use super::CmdResult;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Display the validated configuration (token redacted)
    Show,
    /// Show which configuration file would be loaded
    Path,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    command: String,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<AppConfig>,
}

pub fn run(args: ConfigArgs, global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show => show(global),
        ConfigCommand::Path => path(global),
    }
}

fn show(global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    let (path, config) = global.load_config()?;
    Ok((
        ConfigOutput {
            command: "config.show".to_string(),
            path: path.display().to_string(),
            exists: None,
            config: Some(config.redacted()),
        },
        0,
    ))
}

fn path(global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    let path = paths::resolve_config_path(global.config_path.as_deref())?;
    Ok((
        ConfigOutput {
            command: "config.path".to_string(),
            exists: Some(path.is_file()),
            path: path.display().to_string(),
            config: None,
        },
        0,
    ))
}
