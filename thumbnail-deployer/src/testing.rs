//! In-memory IAM, Lambda and S3 fakes sharing one call journal.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_lc_rs::digest::{digest, SHA256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::time::Instant;

use crate::aws::{
    AddPermissionRequest, AwsError, AwsResult, CreateFunctionRequest, FunctionState,
    FunctionVersion, IamApi, InvocationOutput, LambdaApi, LambdaNotification, S3Api,
};
use crate::commands::DeployerService;
use crate::config::DeploymentNames;
use crate::packaging::{Archive, Packaging};
use crate::DeployResult;

pub(crate) const ACCOUNT: &str = "123456789012";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    GetRole(String),
    CreateRole { role: String, path: String, document: String },
    PutRolePolicy { role: String, policy: String, document: String },
    DeleteRolePolicy { role: String, policy: String },
    DeleteRole(String),
    ListVersions(String),
    GetFunction(String),
    GetFunctionState(String),
    CreateFunction(CreateFunctionRequest),
    AddPermission(AddPermissionRequest),
    Invoke { function: String, payload: serde_json::Value },
    DeleteFunction(String),
    PutBucketNotification { bucket: String, notification: LambdaNotification },
    Prepare,
}

/// Ordered record of every call made against the fakes, with the (paused) tokio clock.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<(Call, Instant)>>>);

impl Journal {
    fn record(&self, call: Call) {
        self.0.lock().unwrap().push((call, Instant::now()));
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub(crate) fn timed_calls(&self) -> Vec<(Call, Instant)> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Errors returned for every call of the named operation.
#[derive(Debug, Default)]
struct Failures(Mutex<HashMap<&'static str, AwsError>>);

impl Failures {
    fn set(&self, operation: &'static str, error: AwsError) {
        self.0.lock().unwrap().insert(operation, error);
    }

    fn check(&self, operation: &'static str) -> AwsResult<()> {
        match self.0.lock().unwrap().get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

pub(crate) fn not_found(operation: &'static str) -> AwsError {
    AwsError::NotFound {
        operation,
        message: "not found".to_string(),
    }
}

pub(crate) fn service_error(operation: &'static str) -> AwsError {
    AwsError::Service {
        operation,
        message: "AccessDenied".to_string(),
    }
}

fn conflict(operation: &'static str) -> AwsError {
    AwsError::Conflict {
        operation,
        message: "already exists".to_string(),
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeIam {
    journal: Journal,
    roles: Mutex<HashMap<String, String>>,
    policies: Mutex<HashMap<(String, String), String>>,
    failures: Failures,
}

impl FakeIam {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub(crate) fn with_role(self, role_name: &str) -> Self {
        self.roles
            .lock()
            .unwrap()
            .insert(role_name.to_string(), role_arn(role_name));
        self
    }

    pub(crate) fn with_policy(self, role_name: &str, policy_name: &str) -> Self {
        self.policies.lock().unwrap().insert(
            (role_name.to_string(), policy_name.to_string()),
            "{}".to_string(),
        );
        self
    }

    pub(crate) fn fail(&self, operation: &'static str, error: AwsError) {
        self.failures.set(operation, error);
    }

    pub(crate) fn has_role(&self, role_name: &str) -> bool {
        self.roles.lock().unwrap().contains_key(role_name)
    }

    pub(crate) fn policy(&self, role_name: &str, policy_name: &str) -> Option<String> {
        self.policies
            .lock()
            .unwrap()
            .get(&(role_name.to_string(), policy_name.to_string()))
            .cloned()
    }
}

pub(crate) fn role_arn(role_name: &str) -> String {
    format!("arn:aws:iam::{ACCOUNT}:role/{role_name}")
}

#[async_trait]
impl IamApi for FakeIam {
    async fn get_role(&self, role_name: &str) -> AwsResult<String> {
        self.journal.record(Call::GetRole(role_name.to_string()));
        self.failures.check("GetRole")?;
        self.roles
            .lock()
            .unwrap()
            .get(role_name)
            .cloned()
            .ok_or_else(|| not_found("GetRole"))
    }

    async fn create_role(
        &self,
        role_name: &str,
        path: &str,
        assume_role_policy_document: &str,
    ) -> AwsResult<()> {
        self.journal.record(Call::CreateRole {
            role: role_name.to_string(),
            path: path.to_string(),
            document: assume_role_policy_document.to_string(),
        });
        self.failures.check("CreateRole")?;
        self.roles
            .lock()
            .unwrap()
            .insert(role_name.to_string(), role_arn(role_name));
        Ok(())
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> AwsResult<()> {
        self.journal.record(Call::PutRolePolicy {
            role: role_name.to_string(),
            policy: policy_name.to_string(),
            document: policy_document.to_string(),
        });
        self.failures.check("PutRolePolicy")?;
        if !self.has_role(role_name) {
            return Err(not_found("PutRolePolicy"));
        }
        self.policies.lock().unwrap().insert(
            (role_name.to_string(), policy_name.to_string()),
            policy_document.to_string(),
        );
        Ok(())
    }

    async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> AwsResult<()> {
        self.journal.record(Call::DeleteRolePolicy {
            role: role_name.to_string(),
            policy: policy_name.to_string(),
        });
        self.failures.check("DeleteRolePolicy")?;
        self.policies
            .lock()
            .unwrap()
            .remove(&(role_name.to_string(), policy_name.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteRolePolicy"))
    }

    async fn delete_role(&self, role_name: &str) -> AwsResult<()> {
        self.journal.record(Call::DeleteRole(role_name.to_string()));
        self.failures.check("DeleteRole")?;
        self.roles
            .lock()
            .unwrap()
            .remove(role_name)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteRole"))
    }
}

#[derive(Debug, Clone)]
struct DeployedFunction {
    arn: String,
    code_sha256: String,
}

#[derive(Debug, Default)]
pub(crate) struct FakeLambda {
    journal: Journal,
    functions: Mutex<HashMap<String, DeployedFunction>>,
    permissions: Mutex<HashSet<(String, String)>>,
    log_tail: Mutex<Option<String>>,
    function_error: Mutex<Option<String>>,
    /// States reported before a function turns `Active`.
    pending_states: Mutex<Vec<FunctionState>>,
    failures: Failures,
}

pub(crate) fn function_arn(function_name: &str) -> String {
    format!("arn:aws:lambda:us-east-1:{ACCOUNT}:function:{function_name}")
}

pub(crate) fn sha256_base64(bytes: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, bytes).as_ref())
}

impl FakeLambda {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            log_tail: Mutex::new(Some(STANDARD.encode("START RequestId: 1\nEND RequestId: 1\n"))),
            ..Self::default()
        }
    }

    pub(crate) fn with_function(self, function_name: &str, code: &[u8]) -> Self {
        self.functions.lock().unwrap().insert(
            function_name.to_string(),
            DeployedFunction {
                arn: function_arn(function_name),
                code_sha256: sha256_base64(code),
            },
        );
        self
    }

    pub(crate) fn with_permission(self, function_name: &str, statement_id: &str) -> Self {
        self.permissions
            .lock()
            .unwrap()
            .insert((function_name.to_string(), statement_id.to_string()));
        self
    }

    pub(crate) fn set_log_tail(&self, log_tail: Option<String>) {
        *self.log_tail.lock().unwrap() = log_tail;
    }

    pub(crate) fn set_function_error(&self, error: Option<&str>) {
        *self.function_error.lock().unwrap() = error.map(str::to_string);
    }

    /// Report these states, in order, before settling on `Active`.
    pub(crate) fn set_pending_states(&self, states: Vec<FunctionState>) {
        *self.pending_states.lock().unwrap() = states;
    }

    pub(crate) fn fail(&self, operation: &'static str, error: AwsError) {
        self.failures.set(operation, error);
    }

    pub(crate) fn has_function(&self, function_name: &str) -> bool {
        self.functions.lock().unwrap().contains_key(function_name)
    }

    fn function(&self, operation: &'static str, function_name: &str) -> AwsResult<DeployedFunction> {
        self.functions
            .lock()
            .unwrap()
            .get(function_name)
            .cloned()
            .ok_or_else(|| not_found(operation))
    }
}

#[async_trait]
impl LambdaApi for FakeLambda {
    async fn list_versions_by_function(
        &self,
        function_name: &str,
    ) -> AwsResult<Vec<FunctionVersion>> {
        self.journal
            .record(Call::ListVersions(function_name.to_string()));
        self.failures.check("ListVersionsByFunction")?;
        let function = self.function("ListVersionsByFunction", function_name)?;
        Ok(vec![
            FunctionVersion {
                version: "$LATEST".to_string(),
                function_arn: format!("{}:$LATEST", function.arn),
            },
            FunctionVersion {
                version: "1".to_string(),
                function_arn: format!("{}:1", function.arn),
            },
        ])
    }

    async fn get_function_code_sha256(&self, function_name: &str) -> AwsResult<Option<String>> {
        self.journal
            .record(Call::GetFunction(function_name.to_string()));
        self.failures.check("GetFunction")?;
        Ok(Some(self.function("GetFunction", function_name)?.code_sha256))
    }

    async fn get_function_state(&self, function_name: &str) -> AwsResult<FunctionState> {
        self.journal
            .record(Call::GetFunctionState(function_name.to_string()));
        self.failures.check("GetFunctionConfiguration")?;
        self.function("GetFunctionConfiguration", function_name)?;
        let mut pending = self.pending_states.lock().unwrap();
        if pending.is_empty() {
            Ok(FunctionState::Active)
        } else {
            Ok(pending.remove(0))
        }
    }

    async fn create_function(&self, request: CreateFunctionRequest) -> AwsResult<String> {
        self.journal.record(Call::CreateFunction(request.clone()));
        self.failures.check("CreateFunction")?;
        let mut functions = self.functions.lock().unwrap();
        if functions.contains_key(&request.function_name) {
            return Err(conflict("CreateFunction"));
        }
        let arn = function_arn(&request.function_name);
        functions.insert(
            request.function_name.clone(),
            DeployedFunction {
                arn: arn.clone(),
                code_sha256: sha256_base64(&request.zip_file),
            },
        );
        Ok(arn)
    }

    async fn add_permission(&self, request: AddPermissionRequest) -> AwsResult<()> {
        self.journal.record(Call::AddPermission(request.clone()));
        self.failures.check("AddPermission")?;
        self.function("AddPermission", &request.function_name)?;
        let inserted = self
            .permissions
            .lock()
            .unwrap()
            .insert((request.function_name, request.statement_id));
        if inserted {
            Ok(())
        } else {
            Err(conflict("AddPermission"))
        }
    }

    async fn invoke(&self, function_name: &str, payload: &[u8]) -> AwsResult<InvocationOutput> {
        self.journal.record(Call::Invoke {
            function: function_name.to_string(),
            payload: serde_json::from_slice(payload).unwrap(),
        });
        self.failures.check("Invoke")?;
        self.function("Invoke", function_name)?;
        Ok(InvocationOutput {
            status_code: 200,
            log_result: self.log_tail.lock().unwrap().clone(),
            function_error: self.function_error.lock().unwrap().clone(),
            payload: Some(b"null".to_vec()),
        })
    }

    async fn delete_function(&self, function_name: &str) -> AwsResult<()> {
        self.journal
            .record(Call::DeleteFunction(function_name.to_string()));
        self.failures.check("DeleteFunction")?;
        self.functions
            .lock()
            .unwrap()
            .remove(function_name)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteFunction"))
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeS3 {
    journal: Journal,
    notifications: Mutex<HashMap<String, LambdaNotification>>,
    failures: Failures,
}

impl FakeS3 {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub(crate) fn fail(&self, operation: &'static str, error: AwsError) {
        self.failures.set(operation, error);
    }

    pub(crate) fn notification(&self, bucket: &str) -> Option<LambdaNotification> {
        self.notifications.lock().unwrap().get(bucket).cloned()
    }
}

#[async_trait]
impl S3Api for FakeS3 {
    async fn put_bucket_notification(
        &self,
        bucket: &str,
        notification: &LambdaNotification,
    ) -> AwsResult<()> {
        self.journal.record(Call::PutBucketNotification {
            bucket: bucket.to_string(),
            notification: notification.clone(),
        });
        self.failures.check("PutBucketNotificationConfiguration")?;
        self.notifications
            .lock()
            .unwrap()
            .insert(bucket.to_string(), notification.clone());
        Ok(())
    }
}

/// Hands out a pre-built archive and records that packaging happened.
pub(crate) struct FakePackaging {
    journal: Journal,
    archive: Archive,
    _dir: tempfile::TempDir,
}

impl FakePackaging {
    pub(crate) fn new(journal: Journal, contents: &[u8]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc123.zip");
        std::fs::write(&path, contents).unwrap();
        Self {
            journal,
            archive: Archive {
                path,
                revision: "abc123".to_string(),
                built: true,
            },
            _dir: dir,
        }
    }

    pub(crate) fn archive(&self) -> &Archive {
        &self.archive
    }
}

#[async_trait]
impl Packaging for FakePackaging {
    async fn prepare(&self) -> DeployResult<Archive> {
        self.journal.record(Call::Prepare);
        Ok(self.archive.clone())
    }
}

pub(crate) type FakeService = DeployerService<FakeIam, FakeLambda, FakeS3>;

pub(crate) fn service(iam: FakeIam, lambda: FakeLambda, s3: FakeS3) -> FakeService {
    DeployerService::new(iam, lambda, s3, DeploymentNames::new("CreateThumbnail", "photos", None))
}
