//! Provisioning steps: execution role, inline policy, function, invoke permission,
//! bucket notification and the smoke-test invocation.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::aws::{
    AddPermissionRequest, AwsError, CreateFunctionRequest, FunctionState, FunctionVersion, IamApi,
    LambdaApi, LambdaNotification, S3Api,
};
use crate::config::NOTIFICATION_ID;
use crate::error::DeployResult;
use crate::event::test_event;
use crate::packaging::{Archive, Packaging};
use crate::policy::{bucket_arn, execution_access_policy, trust_policy};

const LATEST_VERSION: &str = "$LATEST";
const OBJECT_CREATED_EVENT: &str = "s3:ObjectCreated:*";
/// State checks that may find a new function still `Pending`; the n-th retry waits n² seconds.
const READY_POLL_ATTEMPTS: u64 = 5;

/// Everything a successful provisioning run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub role_arn: String,
    pub function_arn: String,
    pub archive: Archive,
    /// Decoded tail of the smoke-test invocation's execution log.
    pub invocation_log: String,
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "execution role: {}", self.role_arn)?;
        writeln!(f, "function: {}", self.function_arn)?;
        writeln!(
            f,
            "archive: {} ({})",
            self.archive.path.display(),
            if self.archive.built { "built" } else { "cached" }
        )?;
        writeln!(f, "invocation log:")?;
        write!(f, "{}", self.invocation_log)
    }
}

impl<I: IamApi, L: LambdaApi, S: S3Api> super::service::DeployerService<I, L, S> {
    /// Look up the execution role, creating it if it does not exist. Returns its ARN.
    ///
    /// After creation the service waits a fixed delay for IAM to propagate the role and
    /// then looks it up again. There is no retry beyond that single wait.
    pub async fn ensure_role(&self) -> DeployResult<String> {
        let role_name = &self.names.role_name;
        log::info!("Requesting IAM GetRole for role name '{role_name}'...");
        match self.iam.get_role(role_name).await {
            Ok(arn) => Ok(arn),
            Err(e) if e.is_not_found() => {
                log::info!("Requesting IAM CreateRole for role name '{role_name}'...");
                let trust = trust_policy().to_json()?;
                self.iam.create_role(role_name, "/", &trust).await?;

                log::info!(
                    "Wait {} seconds for role to be created...",
                    self.role_wait.as_secs()
                );
                tokio::time::sleep(self.role_wait).await;

                log::info!("Requesting IAM GetRole for role name '{role_name}'...");
                Ok(self.iam.get_role(role_name).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the role's inline access policy.
    pub async fn put_execution_policy(&self) -> DeployResult<()> {
        let names = &self.names;
        log::info!(
            "Requesting IAM PutRolePolicy '{}' for role name '{}'...",
            names.policy_name,
            names.role_name
        );
        let document =
            execution_access_policy(&names.source_bucket, &names.target_bucket).to_json()?;
        log::debug!("Policy document: {document}");
        self.iam
            .put_role_policy(&names.role_name, &names.policy_name, &document)
            .await?;
        Ok(())
    }

    /// Resolve the function's unqualified ARN, creating the function from `archive` if
    /// it does not exist. An existing function is never updated.
    pub async fn ensure_function(&self, role_arn: &str, archive: &Archive) -> DeployResult<String> {
        let function_name = &self.names.function_name;
        log::info!("Requesting Lambda ListVersionsByFunction for name '{function_name}'...");
        match self.lambda.list_versions_by_function(function_name).await {
            Ok(versions) => {
                let arn = latest_function_arn(&versions).ok_or_else(|| {
                    AwsError::unexpected(
                        "ListVersionsByFunction",
                        format!("no {LATEST_VERSION} version for '{function_name}'"),
                    )
                })?;
                match self.deployed_code_matches(archive).await {
                    Some(true) => log::debug!("Deployed code for '{function_name}' is up to date"),
                    Some(false) => log::warn!(
                        "Deployed code for '{function_name}' differs from {}; the function is not updated",
                        archive.path.display()
                    ),
                    None => {}
                }
                Ok(arn)
            }
            Err(e) if e.is_not_found() => {
                log::info!("Requesting Lambda CreateFunction for name '{function_name}'...");
                let request = CreateFunctionRequest {
                    function_name: function_name.clone(),
                    role_arn: role_arn.to_string(),
                    runtime: self.function.runtime.clone(),
                    handler: self.function.handler.clone(),
                    timeout_secs: self.function.timeout_secs,
                    zip_file: archive.read()?,
                };
                let arn = self.lambda.create_function(request).await?;
                self.wait_until_active().await?;
                Ok(arn)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Compare the deployed code hash with the local archive. `None` when either
    /// side cannot be determined; that is logged and never fails the run.
    async fn deployed_code_matches(&self, archive: &Archive) -> Option<bool> {
        let function_name = &self.names.function_name;
        let deployed = match self.lambda.get_function_code_sha256(function_name).await {
            Ok(Some(sha)) => sha,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Could not compare deployed code for '{function_name}': {e}");
                return None;
            }
        };
        match archive.sha256_base64() {
            Ok(local) => {
                log::debug!("Deployed {deployed}, local {local}");
                Some(deployed == local)
            }
            Err(e) => {
                log::warn!("Could not hash {}: {e}", archive.path.display());
                None
            }
        }
    }

    /// Poll a newly created function until Lambda reports it ready, backing off
    /// between checks while it is `Pending`.
    async fn wait_until_active(&self) -> DeployResult<()> {
        let function_name = &self.names.function_name;
        let mut attempt = 0;
        loop {
            log::info!(
                "Requesting Lambda GetFunctionConfiguration for name '{function_name}'..."
            );
            match self.lambda.get_function_state(function_name).await? {
                FunctionState::Active | FunctionState::Inactive => return Ok(()),
                FunctionState::Pending if attempt < READY_POLL_ATTEMPTS => {
                    attempt += 1;
                    let backoff = Duration::from_secs(attempt * attempt);
                    log::info!(
                        "Function '{function_name}' is pending, waiting {} seconds...",
                        backoff.as_secs()
                    );
                    tokio::time::sleep(backoff).await;
                }
                FunctionState::Pending => {
                    return Err(AwsError::unexpected(
                        "GetFunctionConfiguration",
                        format!("'{function_name}' is still pending after {attempt} checks"),
                    )
                    .into())
                }
                FunctionState::Failed { reason } => {
                    return Err(AwsError::unexpected(
                        "GetFunctionConfiguration",
                        format!(
                            "'{function_name}' failed to become active: {}",
                            reason.as_deref().unwrap_or("no reason given")
                        ),
                    )
                    .into())
                }
                FunctionState::Other(state) => {
                    return Err(AwsError::unexpected(
                        "GetFunctionConfiguration",
                        format!("unexpected state '{state}' for '{function_name}'"),
                    )
                    .into())
                }
            }
        }
    }

    /// Allow S3 to invoke the function for events from the source bucket.
    /// An already existing grant counts as success.
    pub async fn grant_s3_invoke(&self) -> DeployResult<()> {
        log::info!("Requesting Lambda AddPermission...");
        let request = AddPermissionRequest {
            function_name: self.names.function_name.clone(),
            statement_id: self.names.permission_statement_id(),
            action: "lambda:InvokeFunction".to_string(),
            principal: "s3.amazonaws.com".to_string(),
            source_arn: bucket_arn(&self.names.source_bucket),
        };
        match self.lambda.add_permission(request).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                log::info!("Invoke permission already granted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the source bucket's notification configuration with one that invokes
    /// `function_arn` on every object-created event.
    pub async fn wire_notification(&self, function_arn: &str) -> DeployResult<()> {
        log::info!(
            "Requesting S3 PutBucketNotificationConfiguration for bucket '{}'...",
            self.names.source_bucket
        );
        let notification = LambdaNotification {
            id: NOTIFICATION_ID.to_string(),
            function_arn: function_arn.to_string(),
            events: vec![OBJECT_CREATED_EVENT.to_string()],
        };
        self.s3
            .put_bucket_notification(&self.names.source_bucket, &notification)
            .await?;
        Ok(())
    }

    /// Invoke the function synchronously with a synthetic object-created event and
    /// return the decoded log tail.
    pub async fn invoke_test_event(&self) -> DeployResult<String> {
        let function_name = &self.names.function_name;
        log::info!("Requesting Lambda Invoke for name '{function_name}'...");
        let payload = serde_json::to_vec(&test_event(&self.names.source_bucket))?;
        let output = self.lambda.invoke(function_name, &payload).await?;

        if let Some(function_error) = &output.function_error {
            log::warn!(
                "Function '{function_name}' reported {function_error} (status {})",
                output.status_code
            );
        }
        if let Some(response) = &output.payload {
            log::debug!("Response payload: {}", String::from_utf8_lossy(response));
        }

        let encoded = output.log_result.ok_or_else(|| {
            AwsError::unexpected("Invoke", format!("no LogResult for '{function_name}'"))
        })?;
        let decoded = STANDARD.decode(encoded.trim()).map_err(|e| {
            AwsError::unexpected("Invoke", format!("LogResult is not valid base64: {e}"))
        })?;
        Ok(String::from_utf8_lossy(&decoded).into_owned())
    }

    /// Run the whole pipeline: role, policy, package, function, permission,
    /// notification, invocation. The first failure aborts the remaining steps.
    pub async fn provision(&self, packaging: &dyn Packaging) -> DeployResult<ProvisionReport> {
        let role_arn = self.ensure_role().await?;
        log::info!("Execution role ARN: {role_arn}");

        self.put_execution_policy().await?;

        let archive = packaging.prepare().await?;
        let function_arn = self.ensure_function(&role_arn, &archive).await?;
        log::info!("Function ARN: {function_arn}");

        self.grant_s3_invoke().await?;
        self.wire_notification(&function_arn).await?;
        log::info!("Put bucket notification");

        let invocation_log = self.invoke_test_event().await?;

        Ok(ProvisionReport {
            role_arn,
            function_arn,
            archive,
            invocation_log,
        })
    }
}

/// ARN of the `$LATEST` version with the version qualifier stripped.
fn latest_function_arn(versions: &[FunctionVersion]) -> Option<String> {
    versions
        .iter()
        .find(|v| v.version == LATEST_VERSION)
        .map(|v| {
            v.function_arn
                .strip_suffix(":$LATEST")
                .unwrap_or(&v.function_arn)
                .to_string()
        })
}
