use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use super::{config::StorageConfig, StorageSink};
use crate::error::StorageError;

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);

        if let Some((access_key, secret_key)) = config.static_credentials() {
            let credentials = Credentials::new(access_key, secret_key, None, None, "archiver-storage");
            s3_config_builder = s3_config_builder.credentials_provider(credentials);
        }

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket);

        Self {
            client,
            bucket: config.bucket,
        }
    }

    #[instrument(skip(self, data))]
    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResult, StorageError> {
        let checksum = calculate_sha256(&data);
        let size = data.len() as i64;

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::request("put_object", DisplayErrorContext(&e).to_string()))?;

        let result = UploadResult {
            key: key.to_string(),
            checksum,
            size,
        };
        log_upload(&self.bucket, &result);

        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::request("get_object", DisplayErrorContext(&e).to_string()))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::request("get_object", e.to_string()))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(data)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        debug!("Deleting s3://{}/{}", self.bucket, key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::request("delete_object", DisplayErrorContext(&e).to_string()))?;

        info!("Successfully deleted s3://{}/{}", self.bucket, key);

        Ok(())
    }
}

#[async_trait]
impl StorageSink for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if not_found {
                    Ok(false)
                } else {
                    Err(StorageError::request(
                        "head_bucket",
                        DisplayErrorContext(&e).to_string(),
                    ))
                }
            }
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.upload(key, body, content_type).await.map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn log_upload(bucket: &str, result: &UploadResult) {
    info!(
        size = result.size,
        checksum = %result.checksum,
        "Successfully uploaded to s3://{}/{}",
        bucket,
        result.key
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_upload_log_carries_size_and_checksum() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let body = br#"{"message_id": "m1"}"#;
        let result = UploadResult {
            key: "messages/m1.json".to_string(),
            checksum: calculate_sha256(body),
            size: body.len() as i64,
        };
        tracing::subscriber::with_default(subscriber, || log_upload("orders-archive", &result));

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("s3://orders-archive/messages/m1.json"));
        assert!(output.contains(&format!("checksum={}", result.checksum)));
        assert!(output.contains(&format!("size={}", body.len())));
    }

    #[test]
    fn test_calculate_sha256() {
        let checksum = calculate_sha256(br#"{"message_id": "m1"}"#);
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_calculate_sha256_known_value() {
        assert_eq!(
            calculate_sha256(b"Hello, World!"),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }
}
