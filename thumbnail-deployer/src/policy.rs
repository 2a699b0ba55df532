//! IAM policy documents for the execution role.
//!
//! Documents are rebuilt on every call and never compared against what IAM stores;
//! `PutRolePolicy` overwrites the inline policy wholesale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const POLICY_VERSION: &str = "2012-10-17";
pub const LAMBDA_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

/// `{"Service": "..."}` style principal block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(pub BTreeMap<String, String>);

impl Principal {
    pub fn service(service: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert("Service".to_string(), service.to_string());
        Self(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionType {
    Single(String),
    Multiple(Vec<String>),
}

impl PolicyDocument {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

fn bucket_objects_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}/*")
}

fn allow(action: &str, resource: String) -> Statement {
    Statement {
        sid: None,
        effect: "Allow".to_string(),
        principal: None,
        action: ActionType::Multiple(vec![action.to_string()]),
        resource: Some(resource),
    }
}

/// Trust policy letting the Lambda service assume the execution role.
pub fn trust_policy() -> PolicyDocument {
    PolicyDocument {
        version: POLICY_VERSION.to_string(),
        statement: vec![Statement {
            sid: Some(String::new()),
            effect: "Allow".to_string(),
            principal: Some(Principal::service(LAMBDA_SERVICE_PRINCIPAL)),
            action: ActionType::Single("sts:AssumeRole".to_string()),
            resource: None,
        }],
    }
}

/// Inline policy: all log actions, read from the source bucket, write to the target bucket.
pub fn execution_access_policy(source_bucket: &str, target_bucket: &str) -> PolicyDocument {
    PolicyDocument {
        version: POLICY_VERSION.to_string(),
        statement: vec![
            allow("logs:*", "arn:aws:logs:*:*:*".to_string()),
            allow("s3:GetObject", bucket_objects_arn(source_bucket)),
            allow("s3:PutObject", bucket_objects_arn(target_bucket)),
        ],
    }
}
