//! Synthetic S3 object-created notification used to smoke-test the deployed function.

use serde_json::{json, Value};

use crate::policy::bucket_arn;

pub const TEST_OBJECT_KEY: &str = "HappyFace.jpg";

/// Builds a `Records` payload shaped like a real `ObjectCreated:Put` notification
/// for [`TEST_OBJECT_KEY`] in `bucket`.
pub fn test_event(bucket: &str) -> Value {
    json!({
        "Records": [
            {
                "eventVersion": "2.0",
                "eventSource": "aws:s3",
                "awsRegion": "us-east-1",
                "eventTime": "1970-01-01T00:00:00.000Z",
                "eventName": "ObjectCreated:Put",
                "userIdentity": {
                    "principalId": "AIDAJDPLRKLG7UEXAMPLE"
                },
                "requestParameters": {
                    "sourceIPAddress": "127.0.0.1"
                },
                "responseElements": {
                    "x-amz-request-id": "C3D13FE58DE4C810",
                    "x-amz-id-2": "FMyUVURIY8/IgAtTv8xRjskZQpcIZ9KG4V5Wp6S7S/JRWeUWerMUE5JgHvANOjpD"
                },
                "s3": {
                    "s3SchemaVersion": "1.0",
                    "configurationId": "testConfigRule",
                    "bucket": {
                        "name": bucket,
                        "ownerIdentity": {
                            "principalId": "A3NL1KOZZKExample"
                        },
                        "arn": bucket_arn(bucket)
                    },
                    "object": {
                        "key": TEST_OBJECT_KEY,
                        "size": 1024,
                        "eTag": "d41d8cd98f00b204e9800998ecf8427e",
                        "versionId": "096fKKXTRTtl3on89fVO.nfljtsv6qko"
                    }
                }
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_targets_bucket() {
        let event = test_event("photos");
        let record = &event["Records"][0];
        assert_eq!(record["eventName"], "ObjectCreated:Put");
        assert_eq!(record["s3"]["bucket"]["name"], "photos");
        assert_eq!(record["s3"]["bucket"]["arn"], "arn:aws:s3:::photos");
        assert_eq!(record["s3"]["object"]["key"], TEST_OBJECT_KEY);
        assert_eq!(record["s3"]["object"]["size"], 1024);
    }

    #[test]
    fn test_event_has_single_record() {
        let event = test_event("photos");
        assert_eq!(event["Records"].as_array().map(Vec::len), Some(1));
    }
}
