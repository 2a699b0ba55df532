//! This crate provides the core logic of the thumbnail deployer:
//! - Provider seams over IAM, Lambda and S3, with AWS SDK implementations
//! - Execution role trust policy and inline access policy documents
//! - Function packaging keyed by source revision
//! - Idempotent provisioning pipeline, smoke-test invocation and teardown
//!

pub mod aws;
pub mod commands;
pub mod config;
mod error;
pub mod event;
pub mod packaging;
pub mod policy;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for a small, focused public API
pub use aws::{AwsError, AwsResult, FunctionState, IamApi, LambdaApi, S3Api};
pub use commands::{DeletionOutcome, DeployerService, ProvisionReport, TeardownReport};
pub use config::{
    load_sdk_config, CredentialsFile, CredentialsSource, DeploymentNames, FunctionSettings,
    PackagingSettings,
};
pub use error::{DeployError, DeployResult};
pub use packaging::{Archive, Packager, Packaging};
