//! The JSON configuration document of an SDK repository: global "meta"
//! options and one option set per project.

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::error::ConfigError;
use crate::options::OptionSet;

/// Default configuration file name, looked up at the root of the SDK repository.
pub const CONFIG_FILE: &str = "swagger_to_sdk_config.json";
/// Generator package version used when `meta.autorest` is not set.
pub const LATEST_TAG: &str = "latest";

/// The configuration document: global options plus one option set per project.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub meta: OptionSet,
    pub projects: Vec<Project>,
}

/// A configured project, in document order.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    /// Swagger file, relative to the REST API folder.
    pub swagger: String,
    /// Destination folder, relative to the SDK repository root.
    pub output_dir: String,
    /// The full project-local option set, `swagger` and `output_dir` included.
    pub options: OptionSet,
}

impl SdkConfig {
    /// Parse a configuration document from its JSON value.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Object(mut root) = value else {
            return Err(ConfigError::MissingSection("meta"));
        };
        let meta = match root.remove("meta") {
            Some(Value::Object(meta)) => meta,
            _ => return Err(ConfigError::MissingSection("meta")),
        };
        if meta.get("language").and_then(Value::as_str).is_none() {
            return Err(ConfigError::MissingMeta("language"));
        }
        let raw_projects = match root.remove("projects") {
            Some(Value::Object(projects)) => projects,
            _ => return Err(ConfigError::MissingSection("projects")),
        };

        let mut projects = Vec::with_capacity(raw_projects.len());
        for (name, local) in raw_projects {
            let Value::Object(options) = local else {
                return Err(ConfigError::MissingProjectKey { project: name, key: "swagger" });
            };
            let swagger = project_str(&name, &options, "swagger")?;
            let output_dir = project_str(&name, &options, "output_dir")?;
            projects.push(Project {
                name,
                swagger,
                output_dir,
                options,
            });
        }
        Ok(SdkConfig { meta, projects })
    }

    /// Target language, used for the default generator and for notices.
    pub fn language(&self) -> &str {
        self.meta.get("language").and_then(Value::as_str).unwrap_or_default()
    }

    /// Generator package version to download.
    pub fn generator_version(&self) -> &str {
        self.meta.get("autorest").and_then(Value::as_str).unwrap_or(LATEST_TAG)
    }

    pub fn trace_loaded(&self) {
        info!(
            language = self.language(),
            projects_count = self.projects.len(),
            "Loaded SDK configuration"
        );
        debug!(config = ?self, "Config loaded (full debug)");
    }
}

fn project_str(project: &str, options: &OptionSet, key: &'static str) -> Result<String, ConfigError> {
    options
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingProjectKey {
            project: project.to_string(),
            key,
        })
}

/// Read and parse the JSON configuration file at `sdk_root/config_file`.
pub fn load_config(sdk_root: &Path, config_file: &Path) -> Result<SdkConfig, ConfigError> {
    let path: PathBuf = sdk_root.join(config_file);
    info!(config_path = ?path, "Loading configuration from file");

    let content = std::fs::read_to_string(&path).map_err(|source| {
        error!(error = ?source, config_path = ?path, "Failed to read config file");
        ConfigError::Read {
            path: path.clone(),
            source,
        }
    })?;

    let value: Value = serde_json::from_str(&content).map_err(|source| {
        error!(error = ?source, config_path = ?path, "Failed to parse config JSON");
        ConfigError::Parse {
            path: path.clone(),
            source,
        }
    })?;

    let config = SdkConfig::from_value(value).inspect_err(|e| {
        error!(error = %e, config_path = ?path, "Invalid configuration document");
    })?;
    config.trace_loaded();
    Ok(config)
}
