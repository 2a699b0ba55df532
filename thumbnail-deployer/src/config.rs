//! Deployment configuration: resource names, credentials file and packaging settings.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use regex::Regex;
use serde::Deserialize;

use crate::error::{DeployError, DeployResult};

pub const DEFAULT_FUNCTION_NAME: &str = "CreateThumbnail";
pub const DEFAULT_SOURCE_BUCKET: &str = "lambda-thumbnail-example";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const ROLE_PROPAGATION_WAIT: Duration = Duration::from_secs(8);
pub const NOTIFICATION_ID: &str = "CreateThumbnailStartingEvent";
pub const FUNCTION_RUNTIME: &str = "nodejs20.x";
pub const FUNCTION_TIMEOUT_SECS: i32 = 30;

static BUCKET_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("bucket name pattern is valid")
});
static FUNCTION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("function name pattern is valid")
});
static IAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w+=,.@-]{1,64}$").expect("IAM name pattern is valid"));

/// Every AWS resource name the deployer touches, derived from one base function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentNames {
    pub function_name: String,
    pub role_name: String,
    pub policy_name: String,
    pub source_bucket: String,
    pub target_bucket: String,
}

impl DeploymentNames {
    /// Derive names from the function name and source bucket; the target bucket
    /// defaults to `{source}resized`.
    pub fn new(function_name: &str, source_bucket: &str, target_bucket: Option<&str>) -> Self {
        Self {
            function_name: function_name.to_string(),
            role_name: format!("lambda-{function_name}-execution"),
            policy_name: format!("lambda-{function_name}-execution-access"),
            source_bucket: source_bucket.to_string(),
            target_bucket: target_bucket
                .map_or_else(|| format!("{source_bucket}resized"), str::to_string),
        }
    }

    pub fn validate(&self) -> DeployResult<()> {
        if !FUNCTION_NAME.is_match(&self.function_name) {
            return Err(DeployError::config(format!(
                "invalid function name '{}'",
                self.function_name
            )));
        }
        for name in [&self.role_name, &self.policy_name] {
            if !IAM_NAME.is_match(name) {
                return Err(DeployError::config(format!(
                    "derived IAM name '{name}' is not valid (at most 64 characters from [A-Za-z0-9+=,.@_-])"
                )));
            }
        }
        for bucket in [&self.source_bucket, &self.target_bucket] {
            if !BUCKET_NAME.is_match(bucket) {
                return Err(DeployError::config(format!(
                    "invalid bucket name '{bucket}'"
                )));
            }
        }
        Ok(())
    }

    /// Statement id for the S3 invoke permission on the function's resource policy.
    pub fn permission_statement_id(&self) -> String {
        format!("s3-invoke-{}", self.function_name)
    }
}

impl Default for DeploymentNames {
    fn default() -> Self {
        Self::new(DEFAULT_FUNCTION_NAME, DEFAULT_SOURCE_BUCKET, None)
    }
}

/// Runtime settings used when the function has to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSettings {
    pub runtime: String,
    pub handler: String,
    pub timeout_secs: i32,
}

impl Default for FunctionSettings {
    fn default() -> Self {
        Self {
            runtime: FUNCTION_RUNTIME.to_string(),
            handler: PackagingSettings::default().handler(),
            timeout_secs: FUNCTION_TIMEOUT_SECS,
        }
    }
}

/// Static credentials and region read from a local JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsFile {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    pub region: String,
}

impl CredentialsFile {
    pub fn load(path: &Path) -> DeployResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeployError::io("read credentials file", path, e))?;
        let parsed: Self = serde_json::from_str(&content).map_err(|e| {
            DeployError::config(format!(
                "credentials file '{}' is not valid: {e}",
                path.display()
            ))
        })?;
        parsed.validate(path)?;
        Ok(parsed)
    }

    fn validate(&self, path: &Path) -> DeployResult<()> {
        let missing = [
            ("accessKeyId", self.access_key_id.trim().is_empty()),
            ("secretAccessKey", self.secret_access_key.trim().is_empty()),
            ("region", self.region.trim().is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, empty)| empty.then_some(field))
        .collect::<Vec<_>>();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DeployError::config(format!(
                "credentials file '{}' has empty fields: {}",
                path.display(),
                missing.join(", ")
            )))
        }
    }

    fn credentials(&self) -> Credentials {
        Credentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.clone(),
            self.session_token.clone(),
            None,
            "thumbnail-deployer-config-file",
        )
    }
}

/// Where the SDK gets its credentials from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsSource {
    /// A JSON credentials file, see [`CredentialsFile`].
    File(PathBuf),
    /// The standard AWS provider chain (environment, profile, instance metadata).
    DefaultChain,
}

/// Load the shared SDK configuration all three clients are built from.
pub async fn load_sdk_config(source: &CredentialsSource) -> DeployResult<SdkConfig> {
    match source {
        CredentialsSource::File(path) => {
            let file = CredentialsFile::load(path)?;
            log::debug!(
                "Using credentials from '{}' in region {}",
                path.display(),
                file.region
            );
            Ok(aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(file.region.clone()))
                .credentials_provider(file.credentials())
                .load()
                .await)
        }
        CredentialsSource::DefaultChain => {
            log::debug!("Using the default AWS credential provider chain");
            Ok(aws_config::defaults(BehaviorVersion::latest()).load().await)
        }
    }
}

/// Where the function source lives and how its archive is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagingSettings {
    pub project_dir: PathBuf,
    pub build_dir: PathBuf,
    /// Handler source file, relative to `project_dir`.
    pub entry_file: PathBuf,
    /// Extra files or directories bundled with the handler, relative to `project_dir`.
    pub include: Vec<PathBuf>,
    /// Command run in `project_dir` before archiving; `None` skips it.
    pub install_command: Option<Vec<String>>,
}

impl PackagingSettings {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        Self {
            build_dir: project_dir.join("build"),
            project_dir,
            entry_file: PathBuf::from("src").join(format!("{DEFAULT_FUNCTION_NAME}.js")),
            include: vec![PathBuf::from("node_modules")],
            install_command: Some(vec!["npm".to_string(), "install".to_string()]),
        }
    }

    #[must_use]
    pub fn without_install(mut self) -> Self {
        self.install_command = None;
        self
    }

    /// Lambda handler string: entry file path without extension, plus `.handler`.
    pub fn handler(&self) -> String {
        let stem = self.entry_file.with_extension("");
        let module = stem
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        format!("{module}.handler")
    }
}

impl Default for PackagingSettings {
    fn default() -> Self {
        Self::new("deployed")
    }
}
