// dbbackup/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::ObjectCannedAcl;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use super::{ObjectStore, RemoteObject, StorageError, StorageResult};
use crate::config::SpacesConfig;

/// S3-compatible object store (DigitalOcean Spaces, MinIO, AWS S3) bound to one bucket.
#[derive(Clone)]
pub struct SpacesStore {
    client: s3::Client,
    bucket: String,
}

impl SpacesStore {
    pub async fn connect(spaces_config: &SpacesConfig) -> Self {
        tracing::info!(
            endpoint = %spaces_config.endpoint_url,
            bucket = %spaces_config.bucket_name,
            "Establishing connection to object storage"
        );

        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&spaces_config.endpoint_url)
            .region(Region::new(spaces_config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &spaces_config.access_key_id,
                &spaces_config.secret_access_key,
                None, // session_token
                None, // expiry
                "Static",
            ))
            .load()
            .await;

        SpacesStore {
            client: s3::Client::new(&sdk_config),
            bucket: spaces_config.bucket_name.clone(),
        }
    }
}

fn to_chrono(value: &s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(value.secs(), value.subsec_nanos())
}

#[async_trait]
impl ObjectStore for SpacesStore {
    async fn list_objects(&self) -> StorageResult<Vec<RemoteObject>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                StorageError::ListFailed(format!(
                    "bucket {}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

            for object in page.contents() {
                let (Some(key), Some(last_modified)) = (
                    object.key(),
                    object.last_modified().and_then(to_chrono),
                ) else {
                    tracing::warn!(key = ?object.key(), "Skipping listing entry without key or modification time");
                    continue;
                };

                objects.push(RemoteObject {
                    key: key.to_string(),
                    last_modified,
                    size: object.size().unwrap_or(0).max(0) as u64,
                });
            }
        }

        tracing::debug!(bucket = %self.bucket, count = objects.len(), "Listed bucket");
        Ok(objects)
    }

    async fn put_object(&self, key: &str, source: &Path) -> StorageResult<()> {
        let body = ByteStream::from_path(source).await.map_err(|e| {
            StorageError::UploadFailed(format!("{}: {}", source.display(), e))
        })?;
        let size = body.size_hint().0;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::Private)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                StorageError::UploadFailed(format!(
                    "s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        tracing::debug!(bucket = %self.bucket, key = %key, size_bytes = size, "Object written");
        Ok(())
    }

    async fn get_object(&self, key: &str, destination: &Path) -> StorageResult<u64> {
        let mut object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::DownloadFailed(format!(
                        "s3://{}/{}: {}",
                        self.bucket,
                        key,
                        DisplayErrorContext(&e)
                    ))
                }
            })?;

        let write_failed = |e: std::io::Error| {
            StorageError::DownloadFailed(format!("{}: {}", destination.display(), e))
        };
        let mut output_file = tokio::fs::File::create(destination).await.map_err(write_failed)?;

        let mut written = 0u64;
        while let Some(chunk) = object.body.try_next().await.map_err(|e| {
            StorageError::DownloadFailed(format!("s3://{}/{}: {}", self.bucket, key, e))
        })? {
            output_file.write_all(&chunk).await.map_err(write_failed)?;
            written += chunk.len() as u64;
        }
        output_file.flush().await.map_err(write_failed)?;

        tracing::debug!(bucket = %self.bucket, key = %key, size_bytes = written, "Object downloaded");
        Ok(written)
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::DeleteFailed(format!(
                    "s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        tracing::debug!(bucket = %self.bucket, key = %key, "Object deleted");
        Ok(())
    }
}
