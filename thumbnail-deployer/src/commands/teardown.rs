//! Teardown: delete function, inline policy and role, in that order.

use std::fmt;

use crate::aws::{AwsResult, IamApi, LambdaApi, S3Api};
use crate::error::DeployResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    Deleted,
    AlreadyAbsent,
}

impl fmt::Display for DeletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleted => write!(f, "deleted"),
            Self::AlreadyAbsent => write!(f, "already absent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub function: DeletionOutcome,
    pub policy: DeletionOutcome,
    pub role: DeletionOutcome,
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function: {}", self.function)?;
        writeln!(f, "inline policy: {}", self.policy)?;
        write!(f, "execution role: {}", self.role)
    }
}

impl<I: IamApi, L: LambdaApi, S: S3Api> super::service::DeployerService<I, L, S> {
    /// Delete the function, then the inline policy, then the role.
    ///
    /// With `ignore_missing`, a resource that does not exist is reported as
    /// [`DeletionOutcome::AlreadyAbsent`]; any other failure stops the teardown.
    pub async fn teardown(&self, ignore_missing: bool) -> DeployResult<TeardownReport> {
        let names = &self.names;

        log::info!("Requesting Lambda DeleteFunction for '{}'...", names.function_name);
        let function = deletion_outcome(
            self.lambda.delete_function(&names.function_name).await,
            ignore_missing,
        )?;

        log::info!("Requesting IAM DeleteRolePolicy for '{}'...", names.policy_name);
        let policy = deletion_outcome(
            self.iam
                .delete_role_policy(&names.role_name, &names.policy_name)
                .await,
            ignore_missing,
        )?;

        log::info!("Requesting IAM DeleteRole for '{}'...", names.role_name);
        let role = deletion_outcome(self.iam.delete_role(&names.role_name).await, ignore_missing)?;

        Ok(TeardownReport {
            function,
            policy,
            role,
        })
    }
}

fn deletion_outcome(result: AwsResult<()>, ignore_missing: bool) -> DeployResult<DeletionOutcome> {
    match result {
        Ok(()) => Ok(DeletionOutcome::Deleted),
        Err(e) if ignore_missing && e.is_not_found() => {
            log::info!("{e}; nothing to delete");
            Ok(DeletionOutcome::AlreadyAbsent)
        }
        Err(e) => Err(e.into()),
    }
}
