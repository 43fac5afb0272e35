use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use swagger_to_sdk_core::build::{
    build_libraries, BuildReport, BuildRequest, Collaborators, DEFAULT_BASE_BRANCH, DEFAULT_COMMIT_MESSAGE,
};
use swagger_to_sdk_core::config::CONFIG_FILE;
use swagger_to_sdk_core::context::RunContext;

use crate::autorest::{AutorestGenerator, AutorestInstaller};
use crate::git::GitCli;
use crate::github::GitHubClient;

/// CLI for swagger-to-sdk: regenerate an SDK repository from Swagger documents.
#[derive(Parser, Debug)]
#[clap(
    name = "swagger-to-sdk",
    version,
    about = "Build SDK using Autorest and push to Github. The GH_TOKEN environment variable needs to be set to act on Github."
)]
pub struct Cli {
    /// SDK repository id, `owner/name` or just `name` for a repository of the token owner
    pub sdk_git_id: String,

    /// Folder holding the REST API specifications
    #[clap(short = 'r', long, default_value = ".")]
    pub rest_folder: PathBuf,

    /// Repository receiving the pull request; no pull request when absent
    #[clap(long)]
    pub pr_repo_id: Option<String>,

    /// Commit message, `{hexsha}` is replaced by the REST API repository HEAD
    #[clap(short = 'm', long, default_value = DEFAULT_COMMIT_MESSAGE)]
    pub message: String,

    /// Only generate projects whose name starts with this prefix (repeatable)
    #[clap(short = 'p', long = "project")]
    pub projects: Vec<String>,

    /// Branch the generation starts from and the pull request targets
    #[clap(short = 'o', long, default_value = DEFAULT_BASE_BRANCH)]
    pub base_branch: String,

    /// Branch receiving the generated code
    #[clap(short = 'b', long)]
    pub branch: Option<String>,

    /// Configuration file, relative to the SDK repository root
    #[clap(short = 'c', long, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Directory of an already downloaded AutoRest (must contain AutoRest.exe)
    #[clap(long = "autorest")]
    pub autorest_dir: Option<PathBuf>,

    /// Verbosity in INFO mode
    #[clap(short = 'v', long)]
    pub verbose: bool,

    /// Verbosity in DEBUG mode
    #[clap(long)]
    pub debug: bool,
}

impl Cli {
    pub fn build_request(&self) -> BuildRequest {
        BuildRequest {
            sdk_git_id: self.sdk_git_id.clone(),
            pr_repo_id: self.pr_repo_id.clone(),
            rest_folder: self.rest_folder.clone(),
            config_file: self.config.clone(),
            project_filters: self.projects.clone(),
            message_template: self.message.clone(),
            base_branch: self.base_branch.clone(),
            branch: self.branch.clone(),
            generator_dir: self.autorest_dir.clone(),
        }
    }
}

/// Async CLI entrypoint wiring the real collaborators.
pub async fn run(cli: Cli, ctx: RunContext) -> Result<BuildReport> {
    let git = GitCli::new();
    let review = GitHubClient::new(ctx.token.clone());
    let generator = AutorestGenerator::for_host();
    let installer = AutorestInstaller::default();
    let collab = Collaborators {
        git: &git,
        review: &review,
        generator: &generator,
        installer: &installer,
    };
    run_with(&cli, &ctx, collab).await
}

/// Run a build with the given collaborators; used by [`run`] and by tests.
pub async fn run_with(cli: &Cli, ctx: &RunContext, collab: Collaborators<'_>) -> Result<BuildReport> {
    tracing::info!(sdk_git_id = %cli.sdk_git_id, token = ctx.has_token(), ci = ctx.ci.is_some(), "Build SDK starting");

    let request = cli.build_request();
    let report = build_libraries(ctx, &request, collab)
        .await
        .with_context(|| format!("Build of SDK {} failed", cli.sdk_git_id))?;

    tracing::info!(
        sdk_git_id = %report.sdk_git_id,
        generated = report.generated.len(),
        skipped = report.skipped.len(),
        committed = report.committed,
        "Build SDK complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["swagger-to-sdk", "Azure/azure-sdk-for-python"]).unwrap();
        assert_eq!(cli.sdk_git_id, "Azure/azure-sdk-for-python");
        assert_eq!(cli.rest_folder, PathBuf::from("."));
        assert_eq!(cli.message, "Generated from {hexsha}");
        assert_eq!(cli.base_branch, "master");
        assert_eq!(cli.config, PathBuf::from("swagger_to_sdk_config.json"));
        assert!(cli.projects.is_empty());
        assert!(cli.pr_repo_id.is_none() && cli.branch.is_none() && cli.autorest_dir.is_none());
        assert!(!cli.verbose && !cli.debug);
    }

    #[test]
    fn every_flag_reaches_the_build_request() {
        let cli = Cli::try_parse_from([
            "swagger-to-sdk",
            "azure-sdk-for-python",
            "-r",
            "specs",
            "--pr-repo-id",
            "Azure/azure-sdk-for-python",
            "-m",
            "Regenerated {hexsha}",
            "-p",
            "redis",
            "--project",
            "storage",
            "-o",
            "dev",
            "-b",
            "feature",
            "-c",
            "conf.json",
            "--autorest",
            "/opt/autorest",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);

        let request = cli.build_request();
        assert_eq!(request.sdk_git_id, "azure-sdk-for-python");
        assert_eq!(request.rest_folder, PathBuf::from("specs"));
        assert_eq!(request.pr_repo_id.as_deref(), Some("Azure/azure-sdk-for-python"));
        assert_eq!(request.message_template, "Regenerated {hexsha}");
        assert_eq!(request.project_filters, vec!["redis", "storage"]);
        assert_eq!(request.base_branch, "dev");
        assert_eq!(request.branch.as_deref(), Some("feature"));
        assert_eq!(request.config_file, PathBuf::from("conf.json"));
        assert_eq!(request.generator_dir, Some(PathBuf::from("/opt/autorest")));
    }

    #[test]
    fn sdk_git_id_is_required() {
        assert!(Cli::try_parse_from(["swagger-to-sdk"]).is_err());
    }
}
