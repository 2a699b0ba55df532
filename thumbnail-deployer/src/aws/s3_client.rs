//! AWS S3 client wrapper for bucket notification wiring

use async_trait::async_trait;
use aws_sdk_s3::types::{Event, LambdaFunctionConfiguration, NotificationConfiguration};
use aws_sdk_s3::Client as S3Client;

use crate::aws::{
    classify_sdk_error, AwsError, AwsResult, LambdaNotification, S3Api, ServiceErrorKind,
};

pub struct SdkS3Client {
    client: S3Client,
}

impl SdkS3Client {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl S3Api for SdkS3Client {
    async fn put_bucket_notification(
        &self,
        bucket: &str,
        notification: &LambdaNotification,
    ) -> AwsResult<()> {
        let lambda_config = LambdaFunctionConfiguration::builder()
            .id(&notification.id)
            .lambda_function_arn(&notification.function_arn)
            .set_events(Some(
                notification
                    .events
                    .iter()
                    .map(|event| Event::from(event.as_str()))
                    .collect(),
            ))
            .build()
            .map_err(|e| AwsError::Service {
                operation: "PutBucketNotificationConfiguration",
                message: format!("invalid Lambda notification configuration: {e}"),
            })?;

        let configuration = NotificationConfiguration::builder()
            .lambda_function_configurations(lambda_config)
            .build();

        self.client
            .put_bucket_notification_configuration()
            .bucket(bucket)
            .notification_configuration(configuration)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error("PutBucketNotificationConfiguration", &e, |_| {
                    ServiceErrorKind::Other
                })
            })?;
        Ok(())
    }
}
