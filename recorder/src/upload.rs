use std::path::Path;

use anyhow::Context as _;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use common::s3::{Bucket, PutObjectOptions};

/// Destination for finished recordings. `key` is the bare file name; the
/// uploader owns any directory prefix.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, key: &str, file: &Path) -> anyhow::Result<()>;

    fn directory(&self) -> &str;
}

pub struct S3Uploader {
    bucket: Bucket,
    directory: String,
}

impl S3Uploader {
    pub async fn new(region: String, bucket: String, directory: String) -> Self {
        Self {
            bucket: Bucket::from_region(bucket, region).await,
            directory,
        }
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    async fn upload(&self, key: &str, file: &Path) -> anyhow::Result<()> {
        let key = if self.directory.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.directory)
        };

        let body = ByteStream::from_path(file)
            .await
            .with_context(|| format!("cannot read {}", file.display()))?;

        self.bucket
            .put_object(
                key.as_str(),
                body,
                Some(PutObjectOptions {
                    content_type: content_type(file),
                }),
            )
            .await
            .with_context(|| format!("cannot upload {key} to {}", self.bucket.name()))?;

        Ok(())
    }

    fn directory(&self) -> &str {
        &self.directory
    }
}

fn content_type(path: &Path) -> Option<String> {
    let content_type = match path.extension()?.to_str()? {
        "webm" => "video/webm",
        "mp4" => "video/mp4",
        "ogg" => "audio/ogg",
        _ => return None,
    };
    Some(content_type.to_string())
}
