//! Error taxonomy for a build run.
//!
//! Collaborator traits return the boxed [`CollaboratorError`]; the driver wraps
//! those into [`BuildError`] variants naming the step that failed.

use std::path::PathBuf;

/// Error type returned by collaborator implementations (git, review host, generator).
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config JSON {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config section '{0}' is missing or is not an object")]
    MissingSection(&'static str),
    #[error("meta option '{0}' is missing or is not a string")]
    MissingMeta(&'static str),
    #[error("project '{project}' has no string option '{key}'")]
    MissingProjectKey { project: String, key: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("no path matches generated base directory pattern '{pattern}' under {root:?}")]
    BaseDirectoryNotFound { pattern: String, root: PathBuf },
    #[error("generated tree {0:?} does not exist (already consumed?)")]
    GeneratedTreeMissing(PathBuf),
    #[error("destination tree {0:?} does not exist")]
    DestinationMissing(PathBuf),
    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("glob traversal failed: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("{action} {path:?}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReconcileError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReconcileError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Swagger file does not exist or is not readable: {0:?}")]
    MissingSwagger(PathBuf),
    #[error("Dest folder does not exist or is not accessible: {0:?}")]
    MissingDestination(PathBuf),
    #[error("{0:?} does not exist")]
    GeneratorNotFound(PathBuf),
    #[error("unable to install the code generator: {0}")]
    Install(#[source] CollaboratorError),
    #[error("code generation failed for project '{project}': {source}")]
    Generator {
        project: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("reconciliation failed for project '{project}': {source}")]
    Reconcile {
        project: String,
        #[source]
        source: ReconcileError,
    },
    #[error("git {step} failed: {source}")]
    Git {
        step: &'static str,
        #[source]
        source: CollaboratorError,
    },
    #[error("review host call '{step}' failed: {source}")]
    Review {
        step: &'static str,
        #[source]
        source: CollaboratorError,
    },
    #[error("failed to create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),
}

impl BuildError {
    pub(crate) fn git(step: &'static str) -> impl FnOnce(CollaboratorError) -> Self {
        move |source| BuildError::Git { step, source }
    }

    pub(crate) fn review(step: &'static str) -> impl FnOnce(CollaboratorError) -> Self {
        move |source| BuildError::Review { step, source }
    }
}
