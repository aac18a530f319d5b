use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::utils::s3_uri::S3Uri;
use crate::error::{Error, Result};

/// One bucket of object storage, with every call bounded by a timeout.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    call_timeout: Duration,
}

impl ArtifactStore {
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>, call_timeout: Duration) -> Self {
        ArtifactStore { bucket: bucket.into(), store, call_timeout }
    }

    /// S3-backed store; credentials come from the usual `AWS_*` environment.
    pub fn s3(bucket: &str, region: Option<&str>, call_timeout: Duration) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        let store = builder.build().map_err(|e| Error::ConfigError(format!("Failed to build S3 store for '{}': {}", bucket, e)))?;
        Ok(ArtifactStore::new(bucket, Arc::new(store), call_timeout))
    }

    pub fn in_memory(bucket: impl Into<String>) -> Self {
        ArtifactStore::new(bucket, Arc::new(InMemory::new()), Duration::from_secs(20))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn uri(&self, key: &str) -> String {
        S3Uri::new(&self.bucket, key).to_string()
    }

    /// Existence probe (HEAD). A missing object is `Ok(false)`, not an error.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let location = ObjectPath::from(key);
        match self.bounded("HEAD", key, self.store.head(&location)).await? {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(Error::StorageError { key: key.to_string(), source }),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let location = ObjectPath::from(key);
        let fetch = async {
            let result = self.store.get(&location).await?;
            result.bytes().await
        };
        self.bounded("GET", key, fetch).await?.map_err(|source| Error::StorageError { key: key.to_string(), source })
    }

    pub async fn put(&self, key: &str, body: Bytes, content_type: Option<&'static str>) -> Result<()> {
        let location = ObjectPath::from(key);
        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.into());
        }
        let opts = PutOptions { attributes, ..Default::default() };
        self.bounded("PUT", key, self.store.put_opts(&location, PutPayload::from(body), opts))
            .await?
            .map_err(|source| Error::StorageError { key: key.to_string(), source })?;
        log::debug!("Stored {}", self.uri(key));
        Ok(())
    }

    /// Uploads a local file and returns the number of bytes written.
    pub async fn put_file(&self, path: &Path, key: &str, content_type: Option<&'static str>) -> Result<u64> {
        let body = Bytes::from(tokio::fs::read(path).await?);
        let size = body.len() as u64;
        self.put(key, body, content_type).await?;
        Ok(size)
    }

    async fn bounded<T>(&self, operation: &'static str, key: &str, fut: impl Future<Output = T>) -> Result<T> {
        tokio::time::timeout(self.call_timeout, fut).await.map_err(|_| Error::Timeout {
            operation,
            resource: self.uri(key),
            seconds: self.call_timeout.as_secs(),
        })
    }
}
