//! `SourceControl` backed by the `git` executable.

use std::path::Path;
use std::process::{Command, Output};

use async_trait::async_trait;
use swagger_to_sdk_core::contract::SourceControl;
use swagger_to_sdk_core::error::CollaboratorError;

/// Runs `git -C <repo> ...` for every operation.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        GitCli
    }
}

/// Launch git and capture its output; launch failures are errors, exit codes are not.
fn git_output(repo: Option<&Path>, args: &[&str]) -> Result<Output, CollaboratorError> {
    let mut command = Command::new("git");
    if let Some(repo) = repo {
        command.arg("-C").arg(repo);
    }
    command.args(args);
    command.output().map_err(|e| {
        tracing::error!(error = ?e, args = ?args, "Failed to launch git process");
        Box::new(e) as CollaboratorError
    })
}

/// Run a git command that must succeed, returning its trimmed stdout.
fn git(repo: &Path, args: &[&str]) -> Result<String, CollaboratorError> {
    let output = git_output(Some(repo), args)?;
    if output.status.success() {
        tracing::debug!(path = %repo.display(), args = ?args, "git command succeeded");
        return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    tracing::error!(
        path = %repo.display(),
        args = ?args,
        status = ?output.status,
        stderr = %stderr,
        "Git exited with non-zero code"
    );
    Err(format!("git {} failed ({}): {}", args.join(" "), output.status, stderr).into())
}

/// Run a git command whose exit code answers a yes/no question.
fn git_probe(repo: &Path, args: &[&str]) -> Result<bool, CollaboratorError> {
    let output = git_output(Some(repo), args)?;
    Ok(output.status.success())
}

#[async_trait]
impl SourceControl for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), CollaboratorError> {
        let dest_str = dest.to_string_lossy();
        let output = git_output(None, &["clone", url, dest_str.as_ref()])?;
        if output.status.success() {
            tracing::info!(path = %dest.display(), "Successfully cloned git repository");
            return Ok(());
        }
        // The url may embed credentials, keep it out of logs and errors.
        tracing::error!(path = %dest.display(), status = ?output.status, "Git clone exited with non-zero code");
        Err(format!("git clone into {} failed ({})", dest.display(), output.status).into())
    }

    async fn checkout(&self, repo: &Path, reference: &str) -> Result<(), CollaboratorError> {
        git(repo, &["checkout", reference]).map(|_| ())
    }

    async fn create_branch(&self, repo: &Path, name: &str) -> Result<(), CollaboratorError> {
        git(repo, &["checkout", "-b", name]).map(|_| ())
    }

    async fn local_branch_exists(&self, repo: &Path, name: &str) -> Result<bool, CollaboratorError> {
        git_probe(repo, &["show-ref", "--verify", "--quiet", &format!("refs/heads/{name}")])
    }

    async fn remote_branch_exists(&self, repo: &Path, remote: &str, name: &str) -> Result<bool, CollaboratorError> {
        git_probe(
            repo,
            &["show-ref", "--verify", "--quiet", &format!("refs/remotes/{remote}/{name}")],
        )
    }

    async fn current_branch(&self, repo: &Path) -> Result<String, CollaboratorError> {
        git(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    async fn configure_user(&self, repo: &Path, email: &str, name: &str) -> Result<(), CollaboratorError> {
        git(repo, &["config", "user.email", email])?;
        git(repo, &["config", "user.name", name]).map(|_| ())
    }

    async fn stage_all(&self, repo: &Path) -> Result<(), CollaboratorError> {
        git(repo, &["add", "-A"]).map(|_| ())
    }

    async fn has_staged_changes(&self, repo: &Path) -> Result<bool, CollaboratorError> {
        let output = git_output(Some(repo), &["diff", "--staged", "--quiet"])?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!(
                "git diff --staged failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )
            .into()),
        }
    }

    async fn commit(&self, repo: &Path, message: &str) -> Result<(), CollaboratorError> {
        git(repo, &["commit", "-m", message]).map(|_| ())
    }

    async fn push(&self, repo: &Path, remote: &str, branch: &str, set_upstream: bool) -> Result<(), CollaboratorError> {
        if set_upstream {
            git(repo, &["push", "--set-upstream", remote, branch]).map(|_| ())
        } else {
            git(repo, &["push", remote, branch]).map(|_| ())
        }
    }

    async fn add_remote(&self, repo: &Path, name: &str, url: &str) -> Result<(), CollaboratorError> {
        git(repo, &["remote", "add", name, url]).map(|_| ())
    }

    async fn fetch(&self, repo: &Path, remote: &str) -> Result<(), CollaboratorError> {
        git(repo, &["fetch", remote]).map(|_| ())
    }

    async fn rebase(&self, repo: &Path, onto: &str) -> Result<(), CollaboratorError> {
        git(repo, &["rebase", onto]).map(|_| ())
    }

    async fn head_sha(&self, repo: &Path) -> Result<Option<String>, CollaboratorError> {
        let output = git_output(Some(repo), &["rev-parse", "HEAD"])?;
        if !output.status.success() {
            tracing::debug!(path = %repo.display(), "Not a git repository");
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }
}
