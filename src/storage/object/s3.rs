//! Amazon S3 client
//!
//! Wraps the async AWS SDK behind the blocking [`ObjectClient`] contract.
//! Each client owns a current-thread tokio runtime and drives every request
//! to completion with `block_on`; object bodies keep a handle on the same
//! runtime so they can be read as plain `std::io::Read` streams.

use super::{ListPage, ObjectClient, UploadedPart};
use crate::error::{BridgeError, Result, ResultExt};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::{Buf, Bytes};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Minimum part size accepted by S3 for all but the last part
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Connection options for an S3 bucket
#[derive(Clone, Serialize, Deserialize)]
pub struct S3Options {
    /// Bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Custom endpoint URL (MinIO, Ceph, ...)
    pub endpoint_url: Option<String>,
    /// Access key ID (falls back to the AWS credential chain)
    pub access_key_id: Option<String>,
    /// Secret access key
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
    /// Use path-style URLs
    pub force_path_style: bool,
    /// Keys requested per listing page
    pub page_size: usize,
    /// Multipart part size in bytes
    pub part_size: usize,
}

impl Default for S3Options {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            page_size: 1000,
            part_size: 8 * 1024 * 1024,
        }
    }
}

impl S3Options {
    /// Options for `bucket` with every other field taken from the environment
    pub fn from_env(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: std::env::var("AWS_REGION")
                .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint_url: std::env::var("AWS_ENDPOINT_URL")
                .ok()
                .or_else(|| std::env::var("S3_ENDPOINT").ok()),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
            force_path_style: std::env::var("S3_PATH_STYLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(BridgeError::config("Bucket name is required"));
        }
        if self.part_size < MIN_PART_SIZE {
            return Err(BridgeError::config("Multipart part size must be at least 5MB"));
        }
        if self.page_size == 0 || self.page_size > 1000 {
            return Err(BridgeError::config("Listing page size must be between 1 and 1000"));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(BridgeError::config(
                "Access key ID and secret access key must be given together",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for S3Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Options")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "********"))
            .field("force_path_style", &self.force_path_style)
            .field("page_size", &self.page_size)
            .field("part_size", &self.part_size)
            .finish()
    }
}

/// Blocking S3 client bound to one bucket
pub struct S3Client {
    runtime: Arc<Runtime>,
    client: aws_sdk_s3::Client,
    bucket: String,
    page_size: usize,
    part_size: usize,
}

impl ObjectClient for S3Client {
    type Options = S3Options;
    type Body = S3Body;

    fn connect(options: &S3Options) -> Result<Self> {
        options.validate()?;
        let target = Self::target(options);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BridgeError::connection(&target, format!("Cannot start runtime: {}", e)))?;

        let client = runtime.block_on(async {
            let mut aws_config_builder =
                aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(aws_config::Region::new(options.region.clone()));

            if let Some(ref endpoint) = options.endpoint_url {
                aws_config_builder = aws_config_builder.endpoint_url(endpoint);
            }

            if let (Some(ref key_id), Some(ref secret)) =
                (&options.access_key_id, &options.secret_access_key)
            {
                let creds = aws_credential_types::Credentials::new(
                    key_id,
                    secret,
                    None,
                    None,
                    "storebridge-static",
                );
                aws_config_builder = aws_config_builder.credentials_provider(creds);
            }

            let aws_config = aws_config_builder.load().await;

            let mut s3_config = aws_sdk_s3::config::Builder::from(&aws_config);
            if options.force_path_style {
                s3_config = s3_config.force_path_style(true);
            }
            aws_sdk_s3::Client::from_conf(s3_config.build())
        });

        runtime
            .block_on(client.head_bucket().bucket(&options.bucket).send())
            .map_err(|e| BridgeError::connection(&target, format!("S3 head_bucket failed: {}", e)))?;

        tracing::debug!("S3 bucket {} is reachable", options.bucket);
        Ok(Self {
            runtime: Arc::new(runtime),
            client,
            bucket: options.bucket.clone(),
            page_size: options.page_size,
            part_size: options.part_size,
        })
    }

    fn target(options: &S3Options) -> String {
        match &options.endpoint_url {
            Some(endpoint) => format!("s3://{} ({})", options.bucket, endpoint),
            None => format!("s3://{}", options.bucket),
        }
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn part_size(&self) -> usize {
        self.part_size
    }

    fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<char>,
        token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage> {
        let request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_delimiter(delimiter.map(String::from))
            .set_continuation_token(token.map(str::to_string))
            .max_keys(max_keys.min(i32::MAX as usize) as i32);

        let output = self
            .runtime
            .block_on(request.send())
            .io_context(|| format!("S3 list_objects_v2 failed for prefix '{}'", prefix))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|common| common.prefix().map(str::to_string))
            .collect();
        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            keys,
            common_prefixes,
            next_token,
        })
    }

    fn head(&self, key: &str) -> Result<bool> {
        let result = self
            .runtime
            .block_on(self.client.head_object().bucket(&self.bucket).key(key).send());

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(BridgeError::io(format!("S3 head_object failed for {}", key), e)),
        }
    }

    fn get(&self, key: &str) -> Result<S3Body> {
        let output = self
            .runtime
            .block_on(self.client.get_object().bucket(&self.bucket).key(key).send())
            .io_context(|| format!("S3 get_object failed for {}", key))?;

        Ok(S3Body {
            runtime: Arc::clone(&self.runtime),
            stream: output.body,
            chunk: Bytes::new(),
        })
    }

    fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .set_content_type(content_type.map(str::to_string));

        self.runtime
            .block_on(request.send())
            .io_context(|| format!("S3 put_object failed for {}", key))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.runtime
            .block_on(self.client.delete_object().bucket(&self.bucket).key(key).send())
            .io_context(|| format!("S3 delete_object failed for {}", key))?;
        Ok(())
    }

    fn create_multipart(&self, key: &str) -> Result<String> {
        let output = self
            .runtime
            .block_on(
                self.client
                    .create_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .send(),
            )
            .io_context(|| format!("S3 create_multipart_upload failed for {}", key))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| {
                BridgeError::io(
                    format!("S3 create_multipart_upload failed for {}", key),
                    "missing upload id",
                )
            })
    }

    fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        number: i32,
        data: Vec<u8>,
    ) -> Result<UploadedPart> {
        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(number)
            .body(ByteStream::from(data));

        let output = self
            .runtime
            .block_on(request.send())
            .io_context(|| format!("S3 upload_part {} failed for {}", number, key))?;

        Ok(UploadedPart {
            number,
            etag: output.e_tag().unwrap_or_default().to_string(),
        })
    }

    fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<()> {
        let parts = parts
            .into_iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.number)
                    .e_tag(part.etag)
                    .build()
            })
            .collect();
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let request = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed);

        self.runtime
            .block_on(request.send())
            .io_context(|| format!("S3 complete_multipart_upload failed for {}", key))?;
        Ok(())
    }

    fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()> {
        let request = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id);

        self.runtime
            .block_on(request.send())
            .io_context(|| format!("S3 abort_multipart_upload failed for {}", key))?;
        Ok(())
    }
}

impl Drop for S3Client {
    fn drop(&mut self) {
        tracing::debug!("Shutting down S3 client for bucket {}", self.bucket);
    }
}

/// Blocking reader over an S3 object body
pub struct S3Body {
    runtime: Arc<Runtime>,
    stream: ByteStream,
    chunk: Bytes,
}

impl Read for S3Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while !self.chunk.has_remaining() {
            match self.runtime.block_on(self.stream.try_next()) {
                Ok(Some(next)) => self.chunk = next,
                Ok(None) => return Ok(0),
                Err(e) => return Err(io::Error::other(e)),
            }
        }

        let n = buf.len().min(self.chunk.remaining());
        self.chunk.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = S3Options::default();
        assert_eq!(options.region, "us-east-1");
        assert_eq!(options.page_size, 1000);
        assert!(!options.force_path_style);
    }

    #[test]
    fn test_validate() {
        assert!(S3Options::default().validate().is_err());

        let options = S3Options {
            bucket: "bucket".to_string(),
            ..Default::default()
        };
        assert!(options.validate().is_ok());

        let small_parts = S3Options {
            part_size: 1024,
            ..options.clone()
        };
        assert!(small_parts.validate().is_err());

        let half_credentials = S3Options {
            access_key_id: Some("AKIA".to_string()),
            ..options
        };
        assert!(half_credentials.validate().is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let options = S3Options {
            bucket: "b".to_string(),
            secret_access_key: Some("very-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", options);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("********"));
    }

    #[test]
    fn test_target() {
        let mut options = S3Options {
            bucket: "data".to_string(),
            ..Default::default()
        };
        assert_eq!(S3Client::target(&options), "s3://data");

        options.endpoint_url = Some("http://localhost:9000".to_string());
        assert_eq!(S3Client::target(&options), "s3://data (http://localhost:9000)");
    }

    #[test]
    fn test_connect_rejects_invalid_options() {
        assert!(matches!(
            S3Client::connect(&S3Options::default()),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    #[ignore = "requires S3_TEST_BUCKET and AWS credentials"]
    fn test_round_trip_against_bucket() {
        use crate::storage::{Closeable, Directory, Endpoint, File, S3Store};
        use std::io::Write;

        let bucket = std::env::var("S3_TEST_BUCKET").unwrap();
        let store = S3Store::open(S3Options::from_env(bucket)).unwrap();
        let dir = store.directory("/storebridge-test");
        let file = dir.file("hello.txt").unwrap();

        let mut writer = file.open_write().unwrap();
        writer.write_all(b"hello").unwrap();
        writer.close().unwrap();

        let mut content = String::new();
        file.open_read().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");

        file.delete().unwrap();
        assert!(!file.exists().unwrap());
    }
}
