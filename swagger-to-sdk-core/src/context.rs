//! Run context, built once at startup and handed to everything that needs the
//! publishing token or the CI environment.

/// Environment variable holding the GitHub token.
pub const TOKEN_VAR: &str = "GH_TOKEN";

#[derive(Clone, Default)]
pub struct RunContext {
    /// GitHub token. Without it nothing is published.
    pub token: Option<String>,
    /// Present when running inside a Travis CI build.
    pub ci: Option<CiContext>,
}

/// What Travis tells us about the build that triggered this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiContext {
    /// `owner/name` of the repository being built.
    pub repo_slug: String,
    /// Pull request number, `None` for a push build.
    pub pull_request: Option<u64>,
    pub branch: String,
    pub commit: String,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("ci", &self.ci)
            .finish()
    }
}

impl RunContext {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the context from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(TOKEN_VAR).filter(|t| !t.is_empty());
        let ci = if lookup("TRAVIS").as_deref() == Some("true") {
            let pull_request = lookup("TRAVIS_PULL_REQUEST").and_then(|raw| match raw.as_str() {
                "false" | "" => None,
                number => number.parse().ok(),
            });
            Some(CiContext {
                repo_slug: lookup("TRAVIS_REPO_SLUG").unwrap_or_default(),
                pull_request,
                branch: lookup("TRAVIS_BRANCH").unwrap_or_default(),
                commit: lookup("TRAVIS_COMMIT").unwrap_or_default(),
            })
        } else {
            None
        };
        tracing::debug!(token_set = token.is_some(), ci = ?ci, "Run context built");
        RunContext { token, ci }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}
