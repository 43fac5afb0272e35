//! # contract: capability interfaces of the build driver
//!
//! The driver never spawns a process or opens a socket itself. Everything
//! external sits behind one of these traits:
//!
//! - [`SourceControl`]: the git operations on the SDK clone and the REST folder.
//! - [`ReviewHost`]: the pull request / comment REST API.
//! - [`CodeGenerator`]: one run of the code generator executable.
//! - [`GeneratorInstaller`]: fetching the generator package.
//!
//! ## Mocking & Testing
//! - Each trait is annotated for `mockall` (feature `test-export-mocks`, on by
//!   default) so integration tests can script the whole run.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::CollaboratorError;
use crate::options::GeneratorOptions;

/// The account a token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A pull request as far as the driver cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
    pub merged: bool,
}

/// Data needed to open a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// `branch` or `owner:branch` for a cross-fork pull request.
    pub head: String,
    pub base: String,
}

/// Result of asking the review host to open a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestOutcome {
    Created(PullRequest),
    /// A pull request for this head already exists; the push updated it.
    AlreadyExists,
}

/// One generator run: `<executable> -i <input> -o <output> <options>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorInvocation {
    pub executable: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub options: GeneratorOptions,
}

impl GeneratorInvocation {
    /// Arguments following the executable.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            self.input.to_string_lossy().into_owned(),
            "-o".to_string(),
            self.output.to_string_lossy().into_owned(),
        ];
        args.extend(self.options.to_args());
        args
    }

    /// Printable command line, for logs.
    pub fn command_line(&self) -> String {
        let mut line = format!(
            "{} -i {} -o {}",
            self.executable.display(),
            self.input.display(),
            self.output.display()
        );
        if !self.options.is_empty() {
            line.push(' ');
            line.push_str(&self.options.render());
        }
        line
    }
}

/// Git operations used on the SDK clone and the REST API folder.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Clone `url` into `dest`.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), CollaboratorError>;

    /// Check out an existing branch, tag or commit.
    async fn checkout(&self, repo: &Path, reference: &str) -> Result<(), CollaboratorError>;

    /// Create a local branch at HEAD and check it out.
    async fn create_branch(&self, repo: &Path, name: &str) -> Result<(), CollaboratorError>;

    async fn local_branch_exists(&self, repo: &Path, name: &str) -> Result<bool, CollaboratorError>;

    async fn remote_branch_exists(&self, repo: &Path, remote: &str, name: &str) -> Result<bool, CollaboratorError>;

    async fn current_branch(&self, repo: &Path) -> Result<String, CollaboratorError>;

    /// Set `user.email` and `user.name` in the repository config.
    async fn configure_user(&self, repo: &Path, email: &str, name: &str) -> Result<(), CollaboratorError>;

    /// Stage every modified, deleted and untracked file.
    async fn stage_all(&self, repo: &Path) -> Result<(), CollaboratorError>;

    /// Whether the index differs from HEAD.
    async fn has_staged_changes(&self, repo: &Path) -> Result<bool, CollaboratorError>;

    async fn commit(&self, repo: &Path, message: &str) -> Result<(), CollaboratorError>;

    async fn push(&self, repo: &Path, remote: &str, branch: &str, set_upstream: bool) -> Result<(), CollaboratorError>;

    async fn add_remote(&self, repo: &Path, name: &str, url: &str) -> Result<(), CollaboratorError>;

    async fn fetch(&self, repo: &Path, remote: &str) -> Result<(), CollaboratorError>;

    /// Rebase the current branch onto `onto` (e.g. `upstream/master`).
    async fn rebase(&self, repo: &Path, onto: &str) -> Result<(), CollaboratorError>;

    /// SHA1 of HEAD, `None` when `repo` is not a git repository.
    async fn head_sha(&self, repo: &Path) -> Result<Option<String>, CollaboratorError>;
}

/// The source hosting REST API (pull requests, comments, users).
///
/// Repositories are addressed by their `owner/name` id.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReviewHost: Send + Sync {
    /// The user owning the configured token.
    async fn current_user(&self) -> Result<User, CollaboratorError>;

    /// `owner/name` of the repository this one was forked from, if any.
    async fn repository_parent(&self, repo_id: &str) -> Result<Option<String>, CollaboratorError>;

    async fn pull_request(&self, repo_id: &str, number: u64) -> Result<PullRequest, CollaboratorError>;

    /// Paths of the files changed by a pull request.
    async fn pull_request_files(&self, repo_id: &str, number: u64) -> Result<Vec<String>, CollaboratorError>;

    /// Message of a commit.
    async fn commit_message(&self, repo_id: &str, sha: &str) -> Result<String, CollaboratorError>;

    async fn create_pull_request(
        &self,
        repo_id: &str,
        request: NewPullRequest,
    ) -> Result<PullRequestOutcome, CollaboratorError>;

    /// Post a comment on the conversation of a pull request.
    async fn create_comment(&self, repo_id: &str, number: u64, body: &str) -> Result<(), CollaboratorError>;
}

/// Runs the code generator.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Run one generation, returning the captured output. A non-zero exit is an error.
    async fn generate(&self, invocation: &GeneratorInvocation) -> Result<String, CollaboratorError>;
}

/// Makes a generator executable available.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GeneratorInstaller: Send + Sync {
    /// Install `version` of the generator under `dest`, returning the executable path.
    async fn install(&self, dest: &Path, version: &str) -> Result<PathBuf, CollaboratorError>;
}
