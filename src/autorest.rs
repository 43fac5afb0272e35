//! The AutoRest code generator: installing its package and running it.

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use swagger_to_sdk_core::config::LATEST_TAG;
use swagger_to_sdk_core::contract::{CodeGenerator, GeneratorInstaller, GeneratorInvocation};
use swagger_to_sdk_core::error::CollaboratorError;

pub const AUTOREST_DOWNLOAD_URL: &str = "https://www.myget.org/F/autorest/api/v2/package/AutoRest/";
/// Location of the executable inside the extracted package.
pub const PACKAGED_EXECUTABLE: &str = "tools/AutoRest.exe";

/// Package url for a version; `latest` is the bare base url.
pub fn download_url(base: &str, version: &str) -> String {
    if version == LATEST_TAG {
        base.to_string()
    } else {
        format!("{base}{version}")
    }
}

/// Runs `AutoRest.exe`, through `mono` when `use_mono` is set.
#[derive(Debug, Clone)]
pub struct AutorestGenerator {
    use_mono: bool,
}

impl AutorestGenerator {
    /// Mono is needed everywhere but Windows.
    pub fn for_host() -> Self {
        AutorestGenerator {
            use_mono: !cfg!(windows),
        }
    }

    pub fn new(use_mono: bool) -> Self {
        AutorestGenerator { use_mono }
    }

    fn command(&self, invocation: &GeneratorInvocation) -> Command {
        let mut command = if self.use_mono {
            let mut command = Command::new("mono");
            command.arg(&invocation.executable);
            command
        } else {
            Command::new(&invocation.executable)
        };
        command.args(invocation.args());
        command
    }
}

#[async_trait]
impl CodeGenerator for AutorestGenerator {
    async fn generate(&self, invocation: &GeneratorInvocation) -> Result<String, CollaboratorError> {
        let output = self.command(invocation).output().map_err(|e| {
            tracing::error!(error = ?e, executable = %invocation.executable.display(), "Failed to launch generator");
            Box::new(e) as CollaboratorError
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            tracing::debug!(output = %combined, "Generator output");
            Ok(combined)
        } else {
            tracing::error!(status = ?output.status, output = %combined, "Generator exited with non-zero code");
            Err(format!("generator exited with {}: {}", output.status, combined.trim()).into())
        }
    }
}

/// Downloads the AutoRest NuGet package and unzips it.
#[derive(Debug, Clone)]
pub struct AutorestInstaller {
    http: reqwest::Client,
    base_url: String,
}

impl Default for AutorestInstaller {
    fn default() -> Self {
        Self::with_base_url(AUTOREST_DOWNLOAD_URL.to_string())
    }
}

impl AutorestInstaller {
    pub fn with_base_url(base_url: String) -> Self {
        AutorestInstaller {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl GeneratorInstaller for AutorestInstaller {
    async fn install(&self, dest: &Path, version: &str) -> Result<PathBuf, CollaboratorError> {
        let url = download_url(&self.base_url, version);
        tracing::info!(url = %url, version, "Downloading AutoRest package");

        let response = self.http.get(&url).send().await.map_err(|e| {
            format!("Unable to download AutoRest for {version} from {url}: {e}")
        })?;
        if !response.status().is_success() {
            return Err(format!(
                "Unable to download AutoRest for {version} from {url}: status {}",
                response.status()
            )
            .into());
        }
        let bytes = response.bytes().await?;
        tracing::info!(bytes = bytes.len(), "Downloaded AutoRest package");

        extract_package(&bytes, dest)?;
        let executable = dest.join(PACKAGED_EXECUTABLE);
        if !executable.is_file() {
            return Err(format!("{} not found in the AutoRest package", PACKAGED_EXECUTABLE).into());
        }
        tracing::info!(path = %executable.display(), "AutoRest installed");
        Ok(executable)
    }
}

/// Unzip an in-memory archive under `dest`, ignoring entries escaping it.
fn extract_package(bytes: &[u8], dest: &Path) -> Result<(), CollaboratorError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "Skipping archive entry outside the destination");
            continue;
        };
        let outpath = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)?;
    }
    tracing::debug!(path = %dest.display(), "Extraction complete");
    Ok(())
}
