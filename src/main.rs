use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{config, deploy, projects};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "webdeploy")]
#[command(version = VERSION)]
#[command(about = "Deploy CI build artifacts into locally hosted websites")]
struct Cli {
    /// Configuration file (defaults to $WEBDEPLOY_CONFIG, then ~/.config/webdeploy/config.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the latest artifact for a repository and deploy it to its sites
    Deploy(deploy::DeployArgs),
    /// Inspect the loaded configuration
    Config(config::ConfigArgs),
    /// List configured projects and their site paths
    #[command(visible_alias = "list")]
    Projects,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = GlobalArgs {
        config_path: cli.config,
    };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    let _ = output::print_json_result(json_result, exit_code);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
