use clap::Args;

use webdeploy::deploy::{self, DeployReport, DeployRequest};
use webdeploy::github::GithubArtifactSource;
use webdeploy::source::{ArtifactSource, LocalArtifactSource, RunSelector};
use webdeploy::validation;

use super::CmdResult;

#[derive(Args)]
pub struct DeployArgs {
    /// Repository to deploy (`repo` or `owner/repo`)
    #[arg(long)]
    pub repo: String,

    /// Deploy to this site only (defaults to every configured site)
    #[arg(long)]
    pub site: Option<String>,

    /// Workflow run to deploy: `latest` or a numeric run id
    #[arg(long = "run-id", visible_alias = "runid", default_value = "latest")]
    pub run_id: String,

    /// Deploy whatever is already in the download directory
    #[arg(long)]
    pub skip_fetch: bool,
}

pub fn run(args: DeployArgs, global: &crate::commands::GlobalArgs) -> CmdResult<DeployReport> {
    let repo = validation::require_non_empty(&args.repo, "repo", "Repository cannot be empty")?;
    let run: RunSelector = args.run_id.parse()?;
    let (_, config) = global.load_config()?;

    let request = DeployRequest {
        project_key: repo.to_string(),
        site: args.site,
        run,
    };

    let github;
    let source: &dyn ArtifactSource = if args.skip_fetch {
        &LocalArtifactSource
    } else {
        // Fail on an unknown repo before asking for a token
        config.find_project(&request.project_key)?;
        github = GithubArtifactSource::new(&config)?;
        &github
    };

    let report = deploy::run(&config, &request, source)?;
    let exit_code = report.status.exit_code();
    Ok((report, exit_code))
}
