//! AWS integration: provider seams over IAM, Lambda and S3 plus their SDK-backed clients.
//!
//! The provisioning service only talks to the [`IamApi`], [`LambdaApi`] and [`S3Api`]
//! traits. SDK errors are classified into [`AwsError`] at this boundary so callers can
//! branch on "not found" and "conflict" without touching SDK error types.

pub(crate) mod iam_client;
pub(crate) mod lambda_client;
pub(crate) mod s3_client;

use async_trait::async_trait;
use aws_smithy_runtime_api::client::result::SdkError;
use thiserror::Error;

pub use iam_client::SdkIamClient;
pub use lambda_client::SdkLambdaClient;
pub use s3_client::SdkS3Client;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AwsError {
    /// IAM `NoSuchEntity` or Lambda `ResourceNotFoundException`.
    #[error("{operation}: resource not found: {message}")]
    NotFound {
        operation: &'static str,
        message: String,
    },
    /// Lambda `ResourceConflictException`.
    #[error("{operation}: resource conflict: {message}")]
    Conflict {
        operation: &'static str,
        message: String,
    },
    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },
    #[error("Unexpected response from {operation}: {message}")]
    UnexpectedResponse {
        operation: &'static str,
        message: String,
    },
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub(crate) fn unexpected(operation: &'static str, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            operation,
            message: message.into(),
        }
    }
}

pub type AwsResult<T> = Result<T, AwsError>;

/// How a modeled service error maps onto [`AwsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServiceErrorKind {
    NotFound,
    Conflict,
    Other,
}

/// Classify an SDK failure. Only modeled service errors can be `NotFound`/`Conflict`;
/// dispatch, timeout and response errors are always `Service`.
pub(crate) fn classify_sdk_error<E, R>(
    operation: &'static str,
    err: &SdkError<E, R>,
    kind: impl FnOnce(&E) -> ServiceErrorKind,
) -> AwsError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = aws_sdk_iam::error::DisplayErrorContext(err).to_string();
    match err.as_service_error().map(kind) {
        Some(ServiceErrorKind::NotFound) => AwsError::NotFound { operation, message },
        Some(ServiceErrorKind::Conflict) => AwsError::Conflict { operation, message },
        _ => AwsError::Service { operation, message },
    }
}

/// A published version of a function as reported by `ListVersionsByFunction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionVersion {
    pub version: String,
    pub function_arn: String,
}

/// Lifecycle state from `GetFunctionConfiguration`. A new function is `Pending`
/// until Lambda has finished creating it and cannot be invoked before then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionState {
    Pending,
    Active,
    Inactive,
    Failed { reason: Option<String> },
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFunctionRequest {
    pub function_name: String,
    pub role_arn: String,
    pub runtime: String,
    pub handler: String,
    pub timeout_secs: i32,
    pub zip_file: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddPermissionRequest {
    pub function_name: String,
    pub statement_id: String,
    pub action: String,
    pub principal: String,
    pub source_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutput {
    pub status_code: i32,
    /// Base64-encoded tail of the execution log.
    pub log_result: Option<String>,
    pub function_error: Option<String>,
    pub payload: Option<Vec<u8>>,
}

/// Object-created notification targeting a Lambda function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaNotification {
    pub id: String,
    pub function_arn: String,
    pub events: Vec<String>,
}

#[async_trait]
pub trait IamApi: Send + Sync {
    /// Returns the role ARN.
    async fn get_role(&self, role_name: &str) -> AwsResult<String>;

    async fn create_role(
        &self,
        role_name: &str,
        path: &str,
        assume_role_policy_document: &str,
    ) -> AwsResult<()>;

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> AwsResult<()>;

    async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> AwsResult<()>;

    async fn delete_role(&self, role_name: &str) -> AwsResult<()>;
}

#[async_trait]
pub trait LambdaApi: Send + Sync {
    async fn list_versions_by_function(
        &self,
        function_name: &str,
    ) -> AwsResult<Vec<FunctionVersion>>;

    /// Base64 SHA-256 of the deployed code package, if Lambda reports one.
    async fn get_function_code_sha256(&self, function_name: &str) -> AwsResult<Option<String>>;

    async fn get_function_state(&self, function_name: &str) -> AwsResult<FunctionState>;

    /// Returns the new function's ARN.
    async fn create_function(&self, request: CreateFunctionRequest) -> AwsResult<String>;

    async fn add_permission(&self, request: AddPermissionRequest) -> AwsResult<()>;

    /// Synchronous invocation with the log tail requested.
    async fn invoke(&self, function_name: &str, payload: &[u8]) -> AwsResult<InvocationOutput>;

    async fn delete_function(&self, function_name: &str) -> AwsResult<()>;
}

#[async_trait]
pub trait S3Api: Send + Sync {
    /// Replaces the bucket's whole notification configuration.
    async fn put_bucket_notification(
        &self,
        bucket: &str,
        notification: &LambdaNotification,
    ) -> AwsResult<()>;
}
