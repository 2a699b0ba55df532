//! AWS IAM client wrapper for execution role operations

use async_trait::async_trait;
use aws_sdk_iam::Client as IamClient;

use crate::aws::{classify_sdk_error, AwsError, AwsResult, IamApi, ServiceErrorKind};

pub struct SdkIamClient {
    client: IamClient,
}

impl SdkIamClient {
    pub fn new(client: IamClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IamApi for SdkIamClient {
    async fn get_role(&self, role_name: &str) -> AwsResult<String> {
        let response = self
            .client
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("GetRole", &e, |se| {
                    if se.is_no_such_entity_exception() {
                        ServiceErrorKind::NotFound
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;

        response
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| {
                AwsError::unexpected("GetRole", format!("no role in response: {response:?}"))
            })
    }

    async fn create_role(
        &self,
        role_name: &str,
        path: &str,
        assume_role_policy_document: &str,
    ) -> AwsResult<()> {
        self.client
            .create_role()
            .role_name(role_name)
            .path(path)
            .assume_role_policy_document(assume_role_policy_document)
            .send()
            .await
            .map_err(|e| classify_sdk_error("CreateRole", &e, |_| ServiceErrorKind::Other))?;
        Ok(())
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> AwsResult<()> {
        self.client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(policy_document)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("PutRolePolicy", &e, |se| {
                    if se.is_no_such_entity_exception() {
                        ServiceErrorKind::NotFound
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;
        Ok(())
    }

    async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> AwsResult<()> {
        self.client
            .delete_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("DeleteRolePolicy", &e, |se| {
                    if se.is_no_such_entity_exception() {
                        ServiceErrorKind::NotFound
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> AwsResult<()> {
        self.client
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("DeleteRole", &e, |se| {
                    if se.is_no_such_entity_exception() {
                        ServiceErrorKind::NotFound
                    } else {
                        ServiceErrorKind::Other
                    }
                })
            })?;
        Ok(())
    }
}
