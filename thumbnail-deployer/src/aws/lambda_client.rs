//! AWS Lambda client wrapper for function deployment, permissions and invocation

use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{FunctionCode, InvocationType, LogType, Runtime, State};
use aws_sdk_lambda::Client as LambdaClient;

use crate::aws::{
    classify_sdk_error, AddPermissionRequest, AwsError, AwsResult, CreateFunctionRequest,
    FunctionState, FunctionVersion, InvocationOutput, LambdaApi, ServiceErrorKind,
};

pub struct SdkLambdaClient {
    client: LambdaClient,
}

impl SdkLambdaClient {
    pub fn new(client: LambdaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LambdaApi for SdkLambdaClient {
    async fn list_versions_by_function(
        &self,
        function_name: &str,
    ) -> AwsResult<Vec<FunctionVersion>> {
        let response = self
            .client
            .list_versions_by_function()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("ListVersionsByFunction", &e, |se| {
                    if se.is_resource_not_found_exception() {
                        ServiceErrorKind::NotFound
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;

        Ok(response
            .versions()
            .iter()
            .filter_map(|config| {
                Some(FunctionVersion {
                    version: config.version()?.to_string(),
                    function_arn: config.function_arn()?.to_string(),
                })
            })
            .collect())
    }

    async fn get_function_code_sha256(&self, function_name: &str) -> AwsResult<Option<String>> {
        let response = self
            .client
            .get_function()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("GetFunction", &e, |se| {
                    if se.is_resource_not_found_exception() {
                        ServiceErrorKind::NotFound
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;

        Ok(response
            .configuration()
            .and_then(|config| config.code_sha256())
            .map(str::to_string))
    }

    async fn get_function_state(&self, function_name: &str) -> AwsResult<FunctionState> {
        let conf = self
            .client
            .get_function_configuration()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("GetFunctionConfiguration", &e, |se| {
                    if se.is_resource_not_found_exception() {
                        ServiceErrorKind::NotFound
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;

        Ok(match conf.state() {
            Some(State::Pending) => FunctionState::Pending,
            Some(State::Active) => FunctionState::Active,
            Some(State::Inactive) => FunctionState::Inactive,
            Some(State::Failed) => FunctionState::Failed {
                reason: conf.state_reason().map(str::to_string),
            },
            Some(other) => FunctionState::Other(other.as_str().to_string()),
            None => FunctionState::Other("unknown".to_string()),
        })
    }

    async fn create_function(&self, request: CreateFunctionRequest) -> AwsResult<String> {
        let code = FunctionCode::builder()
            .zip_file(Blob::new(request.zip_file))
            .build();

        let response = self
            .client
            .create_function()
            .function_name(&request.function_name)
            .role(&request.role_arn)
            .runtime(Runtime::from(request.runtime.as_str()))
            .handler(&request.handler)
            .timeout(request.timeout_secs)
            .code(code)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("CreateFunction", &e, |se| {
                    if se.is_resource_conflict_exception() {
                        ServiceErrorKind::Conflict
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;

        response
            .function_arn()
            .map(str::to_string)
            .ok_or_else(|| {
                AwsError::unexpected(
                    "CreateFunction",
                    format!("no FunctionArn in response for '{}'", request.function_name),
                )
            })
    }

    async fn add_permission(&self, request: AddPermissionRequest) -> AwsResult<()> {
        self.client
            .add_permission()
            .function_name(request.function_name)
            .statement_id(request.statement_id)
            .action(request.action)
            .principal(request.principal)
            .source_arn(request.source_arn)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("AddPermission", &e, |se| {
                    if se.is_resource_conflict_exception() {
                        ServiceErrorKind::Conflict
                    } else if se.is_resource_not_found_exception() {
                        ServiceErrorKind::NotFound
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;
        Ok(())
    }

    async fn invoke(&self, function_name: &str, payload: &[u8]) -> AwsResult<InvocationOutput> {
        let response = self
            .client
            .invoke()
            .function_name(function_name)
            .invocation_type(InvocationType::RequestResponse)
            .log_type(LogType::Tail)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("Invoke", &e, |se| {
                    if se.is_resource_not_found_exception() {
                        ServiceErrorKind::NotFound
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;

        Ok(InvocationOutput {
            status_code: response.status_code(),
            log_result: response.log_result().map(str::to_string),
            function_error: response.function_error().map(str::to_string),
            payload: response.payload().map(|blob| blob.as_ref().to_vec()),
        })
    }

    async fn delete_function(&self, function_name: &str) -> AwsResult<()> {
        self.client
            .delete_function()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("DeleteFunction", &e, |se| {
                    if se.is_resource_not_found_exception() {
                        ServiceErrorKind::NotFound
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;
        Ok(())
    }
}
