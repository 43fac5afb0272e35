//! High-level pipeline: clone the SDK repository, regenerate every configured
//! project, then commit, push and open a pull request.
//!
//! # Responsibilities
//! - Sequential, fail-fast orchestration: one project is generated and
//!   reconciled before the next starts, the first error ends the run.
//! - All external effects go through the [`Collaborators`] traits, so the
//!   whole pipeline runs against mocks in tests.
//! - Temporary directories (generator install, generated trees, the clone)
//!   live in one [`tempfile::TempDir`] removed on every exit path.
//!
//! # Publishing
//! Without a token nothing leaves the machine: the base branch is generated
//! in the throw-away clone and the run ends with a warning.
//!
//! # Navigation
//! - Main entrypoint: [`build_libraries`]
//! - Inputs: [`BuildRequest`], [`Collaborators`]; output: [`BuildReport`].

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::config::{load_config, Project, SdkConfig};
use crate::context::RunContext;
use crate::contract::{
    CodeGenerator, GeneratorInstaller, GeneratorInvocation, NewPullRequest, PullRequest, PullRequestOutcome,
    ReviewHost, SourceControl, User,
};
use crate::error::BuildError;
use crate::options::build_generator_options;
use crate::pull_request::{compute_branch_name, comment_with_build_badge, find_initial_pr, swagger_project_files_in_pr};
use crate::reconcile::{reconcile, ReconcileReport};

pub const DEFAULT_COMMIT_MESSAGE: &str = "Generated from {hexsha}";
pub const DEFAULT_BASE_BRANCH: &str = "master";
/// Executable expected inside a pre-downloaded generator directory.
pub const GENERATOR_EXECUTABLE: &str = "AutoRest.exe";
/// HEAD placeholder when the REST API folder is not a git repository.
pub const NOT_GIT_HEXSHA: &str = "notgitrepo";

const GIT_HOST: &str = "github.com";
const DEFAULT_USER_EMAIL: &str = "autorestci@microsoft.com";
const DEFAULT_USER_NAME: &str = "SwaggerToSDK Automation";

/// Everything the user asked for on the command line.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// `owner/name`, or just `name` for a repository of the token owner.
    pub sdk_git_id: String,
    /// Repository receiving the pull request; no pull request when `None`.
    pub pr_repo_id: Option<String>,
    pub rest_folder: PathBuf,
    /// Configuration file, relative to the SDK repository root.
    pub config_file: PathBuf,
    /// Project name prefixes; every project when empty.
    pub project_filters: Vec<String>,
    /// Commit message, `{hexsha}` replaced by the REST API HEAD.
    pub message_template: String,
    pub base_branch: String,
    pub branch: Option<String>,
    /// Pre-downloaded generator directory, skips the download.
    pub generator_dir: Option<PathBuf>,
}

/// External capabilities used by a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub git: &'a dyn SourceControl,
    pub review: &'a dyn ReviewHost,
    pub generator: &'a dyn CodeGenerator,
    pub installer: &'a dyn GeneratorInstaller,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub sdk_git_id: String,
    /// Branch receiving the generated code, when publishing.
    pub branch: Option<String>,
    pub generated: Vec<ProjectReport>,
    pub skipped: Vec<String>,
    pub committed: bool,
    pub pull_request: Option<PullRequestOutcome>,
}

#[derive(Debug)]
pub struct ProjectReport {
    pub name: String,
    pub reconcile: ReconcileReport,
}

/// State shared by the steps of one run.
struct Run<'a> {
    ctx: &'a RunContext,
    request: &'a BuildRequest,
    collab: Collaborators<'a>,
    sdk_git_id: String,
    initial_pr: Option<PullRequest>,
}

pub async fn build_libraries(
    ctx: &RunContext,
    request: &BuildRequest,
    collab: Collaborators<'_>,
) -> Result<BuildReport, BuildError> {
    let needs_user = ctx.has_token() || !request.sdk_git_id.contains('/');
    let user = if needs_user {
        Some(
            collab
                .review
                .current_user()
                .await
                .map_err(BuildError::review("get current user"))?,
        )
    } else {
        None
    };

    let sdk_git_id = match &user {
        Some(user) if !request.sdk_git_id.contains('/') => format!("{}/{}", user.login, request.sdk_git_id),
        _ => request.sdk_git_id.clone(),
    };

    let initial_pr = find_initial_pr(ctx, collab.review).await?;
    let run = Run {
        ctx,
        request,
        collab,
        sdk_git_id,
        initial_pr,
    };

    let temp_dir = tempfile::tempdir().map_err(BuildError::TempDir)?;
    let report = run.execute(temp_dir.path(), user.as_ref()).await;

    if let Err(e) = temp_dir.close() {
        warn!(error = ?e, "Failed to clean temporary directory");
    }
    if report.is_ok() {
        info!("Build SDK finished and cleaned");
    }
    report
}

impl Run<'_> {
    async fn execute(&self, temp_dir: &Path, user: Option<&User>) -> Result<BuildReport, BuildError> {
        let git = self.collab.git;
        let mut report = BuildReport {
            sdk_git_id: self.sdk_git_id.clone(),
            ..BuildReport::default()
        };

        let sdk_folder = temp_dir.join("sdk");
        self.clone_sdk(&sdk_folder, user.map(|u| u.login.as_str())).await?;

        if let (Some(_), Some(user)) = (&self.ctx.token, user) {
            let branch = compute_branch_name(self.request.branch.as_deref(), self.ctx, self.initial_pr.as_ref());
            info!(branch = %branch, "Destination branch for generated code");
            git.configure_user(
                &sdk_folder,
                user.email.as_deref().unwrap_or(DEFAULT_USER_EMAIL),
                user.name.as_deref().unwrap_or(DEFAULT_USER_NAME),
            )
            .await
            .map_err(BuildError::git("config user"))?;

            info!("Try to checkout the destination branch if it already exists");
            if let Err(e) = git.checkout(&sdk_folder, &branch).await {
                info!(error = %e, "Destination branch does not exist");
                git.checkout(&sdk_folder, &self.request.base_branch)
                    .await
                    .map_err(BuildError::git("checkout base branch"))?;
            }
            self.sync_fork(&sdk_folder).await?;
            report.branch = Some(branch);
        } else {
            info!("No token provided, simply checkout base branch");
            git.checkout(&sdk_folder, &self.request.base_branch)
                .await
                .map_err(BuildError::git("checkout base branch"))?;
        }

        let config = load_config(&sdk_folder, &self.request.config_file)?;
        let hexsha = self.rest_hexsha().await?;

        let pr_files = match (&self.initial_pr, &self.ctx.ci) {
            (Some(pr), Some(ci)) => Some(
                swagger_project_files_in_pr(self.collab.review, &ci.repo_slug, pr, &self.request.rest_folder).await?,
            ),
            _ => None,
        };

        let executable = self.install_generator(temp_dir, &config).await?;

        for project in &config.projects {
            if !self.selected(project, pr_files.as_ref()) {
                report.skipped.push(project.name.clone());
                continue;
            }
            let reconciled = self
                .generate_project(temp_dir, &sdk_folder, &executable, &config, project)
                .await?;
            report.generated.push(ProjectReport {
                name: project.name.clone(),
                reconcile: reconciled,
            });
        }

        match &report.branch {
            Some(branch) => {
                if self.do_commit(&sdk_folder, branch, &hexsha).await? {
                    report.committed = true;
                    git.push(&sdk_folder, "origin", branch, true)
                        .await
                        .map_err(BuildError::git("push"))?;
                    if let Some(pr_repo_id) = &self.request.pr_repo_id {
                        report.pull_request = Some(self.do_pr(pr_repo_id, branch).await?);
                    }
                } else {
                    let notice = format!("No modification for {}", config.language());
                    self.comment_on_initial_pr(&notice).await?;
                }
            }
            None => warn!("Skipping commit creation since no token is provided"),
        }

        Ok(report)
    }

    async fn clone_sdk(&self, sdk_folder: &Path, login: Option<&str>) -> Result<(), BuildError> {
        info!(sdk_git_id = %self.sdk_git_id, "Clone SDK repository");
        let credentials = match (&self.ctx.token, login) {
            (Some(token), Some(login)) => format!("{login}:{token}@"),
            _ => {
                warn!("Will clone the repo without writing credentials");
                String::new()
            }
        };
        let url = format!("https://{credentials}{GIT_HOST}/{}.git", self.sdk_git_id);
        self.collab
            .git
            .clone_repo(&url, sdk_folder)
            .await
            .map_err(BuildError::git("clone"))?;
        info!("Clone success");
        debug!(path = %sdk_folder.display(), "SDK path");
        Ok(())
    }

    /// Rebase the current branch on the same branch of the fork parent, if any.
    async fn sync_fork(&self, sdk_folder: &Path) -> Result<(), BuildError> {
        let git = self.collab.git;
        info!("Check if repo has to be sync with upstream");
        let parent = self
            .collab
            .review
            .repository_parent(&self.sdk_git_id)
            .await
            .map_err(BuildError::review("get repository"))?;
        let Some(parent) = parent else {
            info!(sdk_git_id = %self.sdk_git_id, "Repository is not a fork, nothing to sync");
            return Ok(());
        };

        let upstream_url = format!("https://{GIT_HOST}/{parent}.git");
        git.add_remote(sdk_folder, "upstream", &upstream_url)
            .await
            .map_err(BuildError::git("remote add upstream"))?;
        git.fetch(sdk_folder, "upstream")
            .await
            .map_err(BuildError::git("fetch upstream"))?;
        let active = git
            .current_branch(sdk_folder)
            .await
            .map_err(BuildError::git("current branch"))?;
        let exists = git
            .remote_branch_exists(sdk_folder, "upstream", &active)
            .await
            .map_err(BuildError::git("list upstream branches"))?;
        if !exists {
            info!(branch = %active, "Upstream has no branch to merge from");
            return Ok(());
        }
        info!(branch = %active, "Merge from upstream");
        git.rebase(sdk_folder, &format!("upstream/{active}"))
            .await
            .map_err(BuildError::git("rebase"))?;
        git.push(sdk_folder, "origin", &active, false)
            .await
            .map_err(BuildError::git("push"))
    }

    async fn rest_hexsha(&self) -> Result<String, BuildError> {
        let sha = self
            .collab
            .git
            .head_sha(&self.request.rest_folder)
            .await
            .map_err(BuildError::git("rev-parse HEAD"))?;
        Ok(match sha {
            Some(sha) => {
                info!(hexsha = %sha, "Found REST API repo SHA1");
                sha
            }
            None => {
                warn!(hexsha = NOT_GIT_HEXSHA, "Not a git repo, SHA1 used will be a placeholder");
                NOT_GIT_HEXSHA.to_string()
            }
        })
    }

    async fn install_generator(&self, temp_dir: &Path, config: &SdkConfig) -> Result<PathBuf, BuildError> {
        if let Some(dir) = &self.request.generator_dir {
            let executable = dir.join(GENERATOR_EXECUTABLE);
            if executable.exists() {
                return Ok(executable);
            }
            error!(path = %executable.display(), "Generator executable not found");
            return Err(BuildError::GeneratorNotFound(executable));
        }

        let dest = temp_dir.join("autorest");
        std::fs::create_dir(&dest).map_err(|e| BuildError::Install(Box::new(e)))?;
        self.collab
            .installer
            .install(&dest, config.generator_version())
            .await
            .map_err(BuildError::Install)
    }

    fn selected(&self, project: &Project, pr_files: Option<&BTreeSet<String>>) -> bool {
        let filters = &self.request.project_filters;
        if !filters.is_empty() && !filters.iter().any(|p| project.name.starts_with(p.as_str())) {
            info!(project = %project.name, "Skip project");
            return false;
        }
        if let Some(files) = pr_files {
            if !files.contains(&project.swagger) {
                info!(project = %project.name, swagger = %project.swagger, "Skip file not in PR");
                return false;
            }
        }
        true
    }

    async fn generate_project(
        &self,
        temp_dir: &Path,
        sdk_folder: &Path,
        executable: &Path,
        config: &SdkConfig,
        project: &Project,
    ) -> Result<ReconcileReport, BuildError> {
        info!(project = %project.name, swagger = %project.swagger, "Working on project");

        let swagger_file = self.request.rest_folder.join(&project.swagger);
        if !swagger_file.is_file() {
            error!(path = %swagger_file.display(), "Swagger file does not exist or is not readable");
            return Err(BuildError::MissingSwagger(swagger_file));
        }
        let dest_folder = sdk_folder.join(&project.output_dir);
        if !dest_folder.is_dir() {
            error!(path = %dest_folder.display(), "Dest folder does not exist or is not accessible");
            return Err(BuildError::MissingDestination(dest_folder));
        }

        let generated_path = temp_dir.join(swagger_file.file_name().unwrap_or(OsStr::new(&project.name)));
        let invocation = GeneratorInvocation {
            executable: executable.to_path_buf(),
            input: swagger_file,
            output: generated_path.clone(),
            options: build_generator_options(config.language(), &config.meta, &project.options),
        };
        info!(cmd = %invocation.command_line(), "Generator command line");
        match self.collab.generator.generate(&invocation).await {
            Ok(output) => info!(project = %project.name, output = %output, "Generation done"),
            Err(source) => {
                error!(project = %project.name, error = %source, "Generation failed");
                return Err(BuildError::Generator {
                    project: project.name.clone(),
                    source,
                });
            }
        }

        reconcile(&generated_path, &dest_folder, &config.meta, &project.options).map_err(|source| {
            error!(project = %project.name, error = %source, "Reconciliation failed");
            BuildError::Reconcile {
                project: project.name.clone(),
                source,
            }
        })
    }

    /// Stage everything and commit on `branch`; `false` when nothing changed.
    async fn do_commit(&self, sdk_folder: &Path, branch: &str, hexsha: &str) -> Result<bool, BuildError> {
        let git = self.collab.git;
        git.stage_all(sdk_folder).await.map_err(BuildError::git("add"))?;
        let changed = git
            .has_staged_changes(sdk_folder)
            .await
            .map_err(BuildError::git("diff --staged"))?;
        if !changed {
            warn!("No modified files in this generation run");
            return Ok(false);
        }

        self.checkout_and_create_branch(sdk_folder, branch).await?;
        let message = self.request.message_template.replace("{hexsha}", hexsha);
        git.commit(sdk_folder, &message).await.map_err(BuildError::git("commit"))?;
        info!(message = %message, "Commit done");
        Ok(true)
    }

    async fn checkout_and_create_branch(&self, sdk_folder: &Path, name: &str) -> Result<(), BuildError> {
        let git = self.collab.git;
        let local = git
            .local_branch_exists(sdk_folder, name)
            .await
            .map_err(BuildError::git("list branches"))?;
        if local {
            return git.checkout(sdk_folder, name).await.map_err(BuildError::git("checkout"));
        }
        let remote = git
            .remote_branch_exists(sdk_folder, "origin", name)
            .await
            .map_err(BuildError::git("list remote branches"))?;
        if remote {
            // Checking out a remote-only branch creates the tracking branch.
            return git.checkout(sdk_folder, name).await.map_err(BuildError::git("checkout"));
        }
        git.create_branch(sdk_folder, name)
            .await
            .map_err(BuildError::git("create branch"))
    }

    async fn do_pr(&self, pr_repo_id: &str, branch: &str) -> Result<PullRequestOutcome, BuildError> {
        let head = match self.sdk_git_id.split_once('/') {
            Some((owner, _)) => {
                info!(owner, "Do the PR from fork owner");
                format!("{owner}:{branch}")
            }
            None => branch.to_string(),
        };
        let body = self
            .initial_pr
            .as_ref()
            .map(|pr| format!("Generated from RestAPI PR: {}", pr.html_url))
            .unwrap_or_default();
        let request = NewPullRequest {
            title: format!("Automatic PR from {branch}"),
            body,
            head,
            base: self.request.base_branch.clone(),
        };

        let outcome = self
            .collab
            .review
            .create_pull_request(pr_repo_id, request)
            .await
            .map_err(BuildError::review("create pull request"))?;
        match &outcome {
            PullRequestOutcome::AlreadyExists => {
                info!("PR already exists, it was a commit on an open PR");
            }
            PullRequestOutcome::Created(pr) => {
                info!(url = %pr.html_url, "Made PR");
                let comment = comment_with_build_badge(&pr.html_url, &self.sdk_git_id, branch);
                self.comment_on_initial_pr(&comment).await?;
            }
        }
        Ok(outcome)
    }

    /// Comment on the triggering pull request; `false` when there is none.
    async fn comment_on_initial_pr(&self, body: &str) -> Result<bool, BuildError> {
        if !self.ctx.has_token() {
            return Ok(false);
        }
        let (Some(pr), Some(ci)) = (&self.initial_pr, &self.ctx.ci) else {
            return Ok(false);
        };
        self.collab
            .review
            .create_comment(&ci.repo_slug, pr.number, body)
            .await
            .map_err(BuildError::review("create comment"))?;
        Ok(true)
    }
}
