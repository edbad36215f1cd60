use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use common::Result;
use common::config::Settings;
use datafusion::execution::context::SessionContext;
use object_store::aws::AmazonS3Builder;
use std::sync::Arc;
use url::Url;

/// Connection settings for S3-compatible storage. Credentials are carried
/// here explicitly; nothing reads or writes process environment variables.
#[derive(Clone)]
pub struct S3Options {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Clone)]
pub struct S3Manager {
    pub options: S3Options,
    client_cache: Arc<dashmap::DashMap<String, Arc<S3Client>>>,
    object_store_cache: Arc<dashmap::DashMap<String, Arc<object_store::aws::AmazonS3>>>,
}

impl S3Manager {
    pub fn new(options: S3Options) -> Self {
        Self {
            options,
            client_cache: Arc::new(dashmap::DashMap::new()),
            object_store_cache: Arc::new(dashmap::DashMap::new()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(S3Options {
            endpoint: settings.s3.endpoint.clone(),
            region: settings.s3.region.clone(),
            access_key_id: settings.aws.access_key_id.clone(),
            secret_access_key: settings.aws.secret_access_key.clone(),
        })
    }

    pub async fn get_client(&self, bucket: &str) -> Result<Arc<S3Client>> {
        if let Some(client) = self.client_cache.get(bucket) {
            return Ok(client.clone());
        }

        let credentials = Credentials::new(
            &self.options.access_key_id,
            &self.options.secret_access_key,
            None,
            None,
            "static",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.options.region.clone()))
            .credentials_provider(credentials);

        // Custom endpoints (MinIO, localstack) need path-style addressing.
        if let Some(endpoint) = &self.options.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Arc::new(aws_sdk_s3::Client::from_conf(builder.build()));
        self.client_cache.insert(bucket.to_string(), client.clone());
        Ok(client)
    }

    pub async fn get_object_store(&self, bucket: &str) -> Result<Arc<object_store::aws::AmazonS3>> {
        if let Some(store) = self.object_store_cache.get(bucket) {
            return Ok(store.clone());
        }

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.options.region)
            .with_access_key_id(&self.options.access_key_id)
            .with_secret_access_key(&self.options.secret_access_key);

        if let Some(endpoint) = &self.options.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }

        let store = Arc::new(builder.build()?);
        self.object_store_cache
            .insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    /// Makes `<scheme>://<bucket>/...` paths resolvable in the session. The
    /// store is keyed under the URI's own scheme so `s3a://` locations from
    /// older job configs keep working.
    pub async fn register_object_store(
        &self,
        ctx: &SessionContext,
        scheme: &str,
        bucket: &str,
    ) -> Result<()> {
        let store = self.get_object_store(bucket).await?;
        let url = Url::parse(&format!("{}://{}", scheme, bucket))?;
        ctx.runtime_env().register_object_store(&url, store);
        Ok(())
    }

    /// Verifies that a bucket exists and is accessible
    pub async fn verify_bucket_exists(&self, bucket: &str) -> Result<()> {
        let client = self.get_client(bucket).await?;

        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => Err(common::Error::Storage(format!(
                "Cannot access bucket '{}': {}",
                bucket, e
            ))),
        }
    }

    /// Inspects a data URI and, for S3 locations, verifies the bucket and
    /// registers its object store with the session. Local paths and
    /// `file://` URIs need no registration and return `None`.
    pub async fn register_for_uri(
        &self,
        ctx: &SessionContext,
        uri: &str,
    ) -> Result<Option<String>> {
        let Ok(url) = Url::parse(uri) else {
            // Not a URL at all: treat as a local filesystem path.
            return Ok(None);
        };

        match url.scheme() {
            "s3" | "s3a" => {
                let bucket = url
                    .host_str()
                    .ok_or_else(|| {
                        common::Error::InvalidInput(format!("S3 URI '{}' has no bucket", uri))
                    })?
                    .to_string();
                self.verify_bucket_exists(&bucket).await?;
                self.register_object_store(ctx, url.scheme(), &bucket)
                    .await?;
                Ok(Some(bucket))
            }
            "file" => Ok(None),
            other => Err(common::Error::InvalidInput(format!(
                "Unsupported storage scheme '{}' in '{}'",
                other, uri
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> S3Manager {
        S3Manager::new(S3Options {
            endpoint: Some("http://localhost:9000".to_string()),
            region: "us-east-1".to_string(),
            access_key_id: "minio".to_string(),
            secret_access_key: "minio123".to_string(),
        })
    }

    #[tokio::test]
    async fn local_paths_skip_registration() {
        let ctx = SessionContext::new();
        let m = manager();
        assert_eq!(m.register_for_uri(&ctx, "/tmp/streams/").await.unwrap(), None);
        assert_eq!(
            m.register_for_uri(&ctx, "file:///tmp/streams/").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn unknown_schemes_are_rejected() {
        let ctx = SessionContext::new();
        let m = manager();
        let err = m
            .register_for_uri(&ctx, "gs://analytics/streams/")
            .await
            .unwrap_err();
        assert!(matches!(err, common::Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn object_store_handles_are_cached_per_bucket() {
        let m = manager();
        let a = m.get_object_store("warehouse").await.unwrap();
        let b = m.get_object_store("warehouse").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
