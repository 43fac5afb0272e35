//! Discovery of the REST API pull request that triggered a run, and the
//! small pieces of text derived from it (branch name, comments).

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::contract::{PullRequest, ReviewHost};
use crate::error::BuildError;

pub const DEFAULT_BRANCH_NAME: &str = "autorest";
const CI_PR_BRANCH_PREFIX: &str = "RestAPI-PR";
const CI_BRANCH_PREFIX: &str = "RestAPI-";

fn swagger_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^.*/swagger/.*\.json").expect("static regex"))
}

fn issue_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#(\d+)").expect("static regex"))
}

/// Find the pull request behind the current CI build.
///
/// A pull request build names it directly. For a push build, every `#<n>`
/// in the commit message is tried and the first merged pull request wins.
/// Outside CI there is none.
pub async fn find_initial_pr(ctx: &RunContext, review: &dyn ReviewHost) -> Result<Option<PullRequest>, BuildError> {
    let Some(ci) = &ctx.ci else {
        return Ok(None);
    };

    if let Some(number) = ci.pull_request {
        let pr = review
            .pull_request(&ci.repo_slug, number)
            .await
            .map_err(BuildError::review("get pull request"))?;
        info!(number, url = %pr.html_url, "Build comes from a pull request");
        return Ok(Some(pr));
    }
    info!("This build doesn't come from a PR");

    let message = review
        .commit_message(&ci.repo_slug, &ci.commit)
        .await
        .map_err(BuildError::review("get commit"))?;

    for capture in issue_reference_regex().captures_iter(&message) {
        let Ok(number) = capture[1].parse::<u64>() else {
            continue;
        };
        info!(number, "Check if referenced issue is a PR");
        match review.pull_request(&ci.repo_slug, number).await {
            Ok(pr) if pr.merged => return Ok(Some(pr)),
            Ok(_) => debug!(number, "Referenced PR is not merged"),
            Err(e) => debug!(number, error = %e, "Referenced number is not a PR"),
        }
    }
    warn!("Was not able to find PR from commit message");
    Ok(None)
}

/// Swagger documents among the changed files of a pull request.
pub fn swagger_files(changed: &[String]) -> BTreeSet<String> {
    changed
        .iter()
        .filter(|f| swagger_path_regex().is_match(f))
        .cloned()
        .collect()
}

/// Documents referenced by the composite files of the REST API folder,
/// mapped to the composite file (relative, `/`-separated) listing them.
pub fn composite_index(rest_folder: &Path) -> HashMap<String, String> {
    let mut index = HashMap::new();
    let pattern = format!("{}/*/composite*.json", glob::Pattern::escape(&rest_folder.to_string_lossy()));
    let Ok(paths) = glob::glob(&pattern) else {
        return index;
    };
    for path in paths.flatten() {
        let documents = match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|c| serde_json::from_str::<Value>(&c).map_err(|e| e.to_string()))
        {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable composite file");
                continue;
            }
        };
        let relative = path
            .strip_prefix(rest_folder)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let Some(list) = documents.get("documents").and_then(Value::as_array) else {
            continue;
        };
        for document in list.iter().filter_map(Value::as_str) {
            index.insert(repo_relative_document(document), relative.clone());
        }
    }
    index
}

/// `https://.../master/<path>` becomes `<path>`; anything else is kept.
fn repo_relative_document(document: &str) -> String {
    if document.starts_with("https") {
        if let Some((_, path)) = document.split_once("/master/") {
            return path.to_string();
        }
    }
    document.to_string()
}

/// Project files touched by a pull request: its Swagger files plus the
/// composite files that list them.
pub async fn swagger_project_files_in_pr(
    review: &dyn ReviewHost,
    repo_id: &str,
    pr: &PullRequest,
    rest_folder: &Path,
) -> Result<BTreeSet<String>, BuildError> {
    let changed = review
        .pull_request_files(repo_id, pr.number)
        .await
        .map_err(BuildError::review("list pull request files"))?;
    let mut files = swagger_files(&changed);
    let index = composite_index(rest_folder);
    let composites: Vec<String> = files.iter().filter_map(|f| index.get(f).cloned()).collect();
    files.extend(composites);
    debug!(?files, "Swagger project files in PR");
    Ok(files)
}

/// Branch receiving the generated code.
pub fn compute_branch_name(explicit: Option<&str>, ctx: &RunContext, initial_pr: Option<&PullRequest>) -> String {
    if let Some(branch) = explicit {
        return branch.to_string();
    }
    let Some(ci) = &ctx.ci else {
        return DEFAULT_BRANCH_NAME.to_string();
    };
    info!("Travis detected");
    match initial_pr {
        Some(pr) => format!("{CI_PR_BRANCH_PREFIX}{}", pr.number),
        None => format!("{CI_BRANCH_PREFIX}{}", ci.branch),
    }
}

/// Comment text prefixed with the CI build badge of the SDK branch.
pub fn comment_with_build_badge(comment: &str, sdk_fork_id: &str, branch_name: &str) -> String {
    format!(
        "[![Build Status](https://travis-ci.org/{sdk_fork_id}.svg?branch={branch_name})](https://travis-ci.org/{sdk_fork_id}) {comment}"
    )
}
