//! Thumbnail Deployer Service Layer
//!
//! This module provides the service that holds the IAM, Lambda and S3 clients together
//! with the resource names, and exposes the provisioning steps (provision.rs) and
//! teardown (teardown.rs) on top of them. Every step awaits its call before the next
//! one starts; there is no fan-out.

use std::time::Duration;

use aws_config::SdkConfig;

use crate::aws::{IamApi, LambdaApi, S3Api, SdkIamClient, SdkLambdaClient, SdkS3Client};
use crate::config::{DeploymentNames, FunctionSettings, ROLE_PROPAGATION_WAIT};

/// Main service struct that holds AWS clients and the deployment settings
pub struct DeployerService<I, L, S> {
    pub(crate) iam: I,
    pub(crate) lambda: L,
    pub(crate) s3: S,
    pub(crate) names: DeploymentNames,
    pub(crate) function: FunctionSettings,
    pub(crate) role_wait: Duration,
}

impl<I: IamApi, L: LambdaApi, S: S3Api> DeployerService<I, L, S> {
    pub fn new(iam: I, lambda: L, s3: S, names: DeploymentNames) -> Self {
        Self {
            iam,
            lambda,
            s3,
            names,
            function: FunctionSettings::default(),
            role_wait: ROLE_PROPAGATION_WAIT,
        }
    }

    /// Fixed pause after creating the execution role, before it is looked up again.
    #[must_use]
    pub fn with_role_wait(mut self, role_wait: Duration) -> Self {
        self.role_wait = role_wait;
        self
    }

    #[must_use]
    pub fn with_function_settings(mut self, function: FunctionSettings) -> Self {
        self.function = function;
        self
    }

    pub fn names(&self) -> &DeploymentNames {
        &self.names
    }

    // provisioning steps are implemented in provision.rs
    // teardown() is implemented in teardown.rs
}

impl DeployerService<SdkIamClient, SdkLambdaClient, SdkS3Client> {
    /// Create a service backed by the AWS SDK, all clients sharing one configuration.
    pub fn from_sdk_config(config: &SdkConfig, names: DeploymentNames) -> Self {
        Self::new(
            SdkIamClient::new(aws_sdk_iam::Client::new(config)),
            SdkLambdaClient::new(aws_sdk_lambda::Client::new(config)),
            SdkS3Client::new(aws_sdk_s3::Client::new(config)),
            names,
        )
    }
}
