use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;

#[derive(Debug, Clone)]
pub struct Bucket {
    name: String,
    client: aws_sdk_s3::Client,
}

#[derive(Debug, Clone, Default)]
pub struct PutObjectOptions {
    pub content_type: Option<String>,
}

impl Bucket {
    pub fn new(name: String, client: aws_sdk_s3::Client) -> Self {
        Self { name, client }
    }

    /// Builds a bucket handle from the ambient AWS credential chain with an
    /// explicit region override.
    pub async fn from_region(name: String, region: String) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        Self::new(name, aws_sdk_s3::Client::new(&config))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn put_object(
        &self,
        key: impl Into<String>,
        body: impl Into<ByteStream>,
        options: Option<PutObjectOptions>,
    ) -> Result<(), SdkError<PutObjectError>> {
        let options = options.unwrap_or_default();

        self.client
            .put_object()
            .bucket(self.name())
            .key(key)
            .body(body.into())
            .set_content_type(options.content_type)
            .send()
            .await?;

        Ok(())
    }
}
