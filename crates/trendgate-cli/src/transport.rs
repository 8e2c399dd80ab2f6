//! Moves the metrics database between CI runs.
//!
//! A plain path is used in place. An object-store URL (`s3://bucket/prefix?region=..`,
//! `file:///dir/metrics.db`, `memory://`) is downloaded into a temp directory, used there, and
//! uploaded again after writes. The upload is conditional on the object being unchanged since
//! the download, so two concurrent runs cannot silently overwrite each other.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, ObjectStoreExt, PutMode, PutOptions, PutPayload, UpdateVersion};
use tempfile::TempDir;
use trendgate_core::errors::{codes, Error, Result, StorageErrorKind};
use trendgate_core::storage::SqliteStore;

const DEFAULT_OBJECT_NAME: &str = "metrics.db";

/// Parsed `database` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSpec {
    Local(PathBuf),
    Remote(RemoteSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    pub scheme: String,
    pub bucket: Option<String>,
    /// Object key of the database file inside the bucket (or below the root for `file://`).
    pub key: String,
    pub region: Option<String>,
}

impl RemoteSpec {
    /// Location for logs and messages. Never includes query parameters.
    pub fn display(&self) -> String {
        match &self.bucket {
            Some(bucket) => format!("{}://{}/{}", self.scheme, bucket, self.key),
            None => format!("{}:///{}", self.scheme, self.key),
        }
    }
}

impl DatabaseSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::missing_field("database"));
        }
        if !raw.contains("://") {
            return Ok(DatabaseSpec::Local(PathBuf::from(raw)));
        }

        let url = url::Url::parse(raw).map_err(|e| {
            Error::invalid_field(
                codes::INVALID_ARGUMENT,
                "database",
                format!("invalid database URL: {}", e),
            )
        })?;
        let scheme = url.scheme().to_string();
        if !matches!(scheme.as_str(), "s3" | "file" | "memory") {
            return Err(Error::invalid_field(
                codes::INVALID_ARGUMENT,
                "database",
                format!("unsupported database scheme `{}` (use s3, file or memory)", scheme),
            ));
        }

        let bucket = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.to_string());
        let path = url.path().trim_matches('/');
        let key = if path.is_empty() {
            DEFAULT_OBJECT_NAME.to_string()
        } else if path.ends_with(".db") || path.ends_with(".sqlite") {
            path.to_string()
        } else {
            format!("{}/{}", path, DEFAULT_OBJECT_NAME)
        };
        let region = url
            .query_pairs()
            .find(|(k, _)| k == "region")
            .map(|(_, v)| v.to_string());

        if scheme == "s3" && bucket.is_none() {
            return Err(Error::invalid_field(
                codes::INVALID_ARGUMENT,
                "database",
                "s3 URL must include a bucket name",
            ));
        }

        Ok(DatabaseSpec::Remote(RemoteSpec {
            scheme,
            bucket,
            key,
            region,
        }))
    }
}

/// Maps object-store failures onto storage error kinds.
fn storage_error(err: object_store::Error, context: &str) -> Error {
    let kind = match &err {
        object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. } => {
            StorageErrorKind::Conflict
        }
        object_store::Error::PermissionDenied { .. } => StorageErrorKind::Permission,
        object_store::Error::Unauthenticated { .. } => StorageErrorKind::Auth,
        object_store::Error::NotFound { .. } => StorageErrorKind::Io,
        _ => StorageErrorKind::Network,
    };
    Error::storage(kind, format!("{}: {}", context, err))
}

fn conflict(location: &str) -> Error {
    Error::storage(
        StorageErrorKind::Conflict,
        format!("{} was modified by another run since it was downloaded", location),
    )
}

struct Remote {
    inner: Arc<dyn ObjectStore>,
    key: ObjectPath,
    location: String,
    /// Version observed at download; `None` when the object did not exist yet.
    version: Option<UpdateVersion>,
    /// Whether the backend honours `PutMode::Update`. Local filesystems only support `Create`.
    conditional_updates: bool,
    _dir: TempDir,
}

/// A database checked out for one invocation.
pub struct DatabaseHandle {
    path: PathBuf,
    remote: Option<Remote>,
}

impl DatabaseHandle {
    /// Resolve `spec` and make the database available as a local file.
    pub async fn checkout(spec: &str) -> Result<Self> {
        match DatabaseSpec::parse(spec)? {
            DatabaseSpec::Local(path) => Ok(Self { path, remote: None }),
            DatabaseSpec::Remote(remote) => {
                let inner = object_store_for(&remote)?;
                let conditional_updates = remote.scheme != "file";
                Self::download(
                    inner,
                    ObjectPath::from(remote.key.as_str()),
                    remote.display(),
                    conditional_updates,
                )
                .await
            }
        }
    }

    async fn download(
        inner: Arc<dyn ObjectStore>,
        key: ObjectPath,
        location: String,
        conditional_updates: bool,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("trendgate-").tempdir()?;
        let path = dir.path().join(DEFAULT_OBJECT_NAME);

        let version = match inner.get(&key).await {
            Ok(result) => {
                let version = UpdateVersion {
                    e_tag: result.meta.e_tag.clone(),
                    version: result.meta.version.clone(),
                };
                let bytes = result
                    .bytes()
                    .await
                    .map_err(|e| storage_error(e, &format!("failed to download {}", location)))?;
                tokio::fs::write(&path, &bytes).await?;
                tracing::info!(location = %location, bytes = bytes.len(), "downloaded metrics database");
                Some(version)
            }
            Err(object_store::Error::NotFound { .. }) => {
                tracing::info!(location = %location, "no metrics database yet, starting a new one");
                None
            }
            Err(e) => return Err(storage_error(e, &format!("failed to download {}", location))),
        };

        Ok(Self {
            path,
            remote: Some(Remote {
                inner,
                key,
                location,
                version,
                conditional_updates,
                _dir: dir,
            }),
        })
    }

    #[cfg(test)]
    fn path(&self) -> &std::path::Path {
        &self.path
    }

    #[cfg(test)]
    fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn open(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.path)
    }

    /// Upload the local copy. No-op for local databases. The store must be dropped first.
    pub async fn publish(&mut self) -> Result<()> {
        let Some(remote) = self.remote.as_mut() else {
            return Ok(());
        };
        let bytes = Bytes::from(tokio::fs::read(&self.path).await?);
        let size = bytes.len();
        remote.put(bytes).await?;
        tracing::info!(location = %remote.location, bytes = size, "published metrics database");
        Ok(())
    }
}

impl Remote {
    async fn put(&mut self, bytes: Bytes) -> Result<()> {
        let mode = match self.version.clone() {
            None => PutMode::Create,
            Some(v) if self.conditional_updates => PutMode::Update(v),
            Some(_) => return self.check_then_put(bytes).await,
        };

        let opts = PutOptions {
            mode,
            ..Default::default()
        };
        match self
            .inner
            .put_opts(&self.key, PutPayload::from_bytes(bytes.clone()), opts)
            .await
        {
            Ok(res) => {
                self.version = Some(UpdateVersion {
                    e_tag: res.e_tag,
                    version: res.version,
                });
                Ok(())
            }
            Err(object_store::Error::AlreadyExists { .. })
            | Err(object_store::Error::Precondition { .. }) => Err(conflict(&self.location)),
            Err(object_store::Error::NotSupported { .. }) => {
                tracing::warn!(
                    location = %self.location,
                    "conditional writes not supported by backend, falling back to check-then-put"
                );
                self.check_then_put(bytes).await
            }
            Err(e) => Err(storage_error(e, &format!("failed to upload {}", self.location))),
        }
    }

    /// Best effort for backends without conditional updates: compare the current version with
    /// the one seen at download, then overwrite. Racy by nature.
    async fn check_then_put(&mut self, bytes: Bytes) -> Result<()> {
        let current = match self.inner.head(&self.key).await {
            Ok(meta) => Some(meta.e_tag),
            Err(object_store::Error::NotFound { .. }) => None,
            Err(e) => return Err(storage_error(e, &format!("failed to inspect {}", self.location))),
        };
        let expected = self.version.as_ref().map(|v| v.e_tag.clone());
        if current != expected {
            return Err(conflict(&self.location));
        }

        let res = self
            .inner
            .put(&self.key, PutPayload::from_bytes(bytes))
            .await
            .map_err(|e| storage_error(e, &format!("failed to upload {}", self.location)))?;
        self.version = Some(UpdateVersion {
            e_tag: res.e_tag,
            version: res.version,
        });
        Ok(())
    }
}

fn object_store_for(spec: &RemoteSpec) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match spec.scheme.as_str() {
        "memory" => Arc::new(object_store::memory::InMemory::new()),
        "file" => {
            // file:///var/ci/metrics.db has no host; the key is the absolute path below `/`.
            let root = match &spec.bucket {
                Some(host) => PathBuf::from(format!("/{}", host)),
                None => PathBuf::from("/"),
            };
            if let Some(parent) = root.join(&spec.key).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(
                object_store::local::LocalFileSystem::new_with_prefix(&root)
                    .map_err(|e| storage_error(e, "failed to open local object store"))?,
            )
        }
        "s3" => {
            let bucket = spec.bucket.as_deref().unwrap_or_default();
            let mut builder = object_store::aws::AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .with_allow_http(false);
            if let Some(region) = &spec.region {
                builder = builder.with_region(region);
            }
            Arc::new(
                builder
                    .build()
                    .map_err(|e| storage_error(e, "failed to create S3 client"))?,
            )
        }
        scheme => {
            return Err(Error::invalid_field(
                codes::INVALID_ARGUMENT,
                "database",
                format!("unsupported database scheme `{}`", scheme),
            ))
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use trendgate_core::model::{BuildContext, CollectedMetric};
    use trendgate_core::storage::MetricsStore;

    fn ctx(run: u64) -> BuildContext {
        BuildContext {
            commit_sha: format!("sha{}", run),
            branch: "main".into(),
            run_id: run.to_string(),
            run_number: run,
            timestamp: Utc::now(),
        }
    }

    async fn checkout_from(inner: Arc<dyn ObjectStore>) -> DatabaseHandle {
        DatabaseHandle::download(
            inner,
            ObjectPath::from("ci/metrics.db"),
            "memory:///ci/metrics.db".into(),
            true,
        )
        .await
        .unwrap()
    }

    fn record(handle: &DatabaseHandle, run: u64) {
        let store = handle.open().unwrap();
        store
            .record_run(&ctx(run), &[CollectedMetric::numeric("cov", run as f64)])
            .unwrap();
    }

    #[test]
    fn parses_local_and_remote_specs() {
        assert_eq!(
            DatabaseSpec::parse(".trendgate/metrics.db").unwrap(),
            DatabaseSpec::Local(PathBuf::from(".trendgate/metrics.db"))
        );

        let DatabaseSpec::Remote(s3) =
            DatabaseSpec::parse("s3://ci-bucket/acme/widgets?region=eu-west-1").unwrap()
        else {
            panic!("expected remote spec");
        };
        assert_eq!(s3.bucket.as_deref(), Some("ci-bucket"));
        assert_eq!(s3.key, "acme/widgets/metrics.db");
        assert_eq!(s3.region.as_deref(), Some("eu-west-1"));
        assert_eq!(s3.display(), "s3://ci-bucket/acme/widgets/metrics.db");

        let DatabaseSpec::Remote(file) = DatabaseSpec::parse("file:///var/ci/trend.db").unwrap()
        else {
            panic!("expected remote spec");
        };
        assert_eq!(file.bucket, None);
        assert_eq!(file.key, "var/ci/trend.db");
    }

    #[test]
    fn rejects_unknown_schemes_and_bucketless_s3() {
        assert_eq!(
            DatabaseSpec::parse("ftp://host/db").unwrap_err().code(),
            "validation.invalid_argument"
        );
        assert!(DatabaseSpec::parse("s3:///db").is_err());
        assert!(DatabaseSpec::parse("  ").is_err());
    }

    #[tokio::test]
    async fn round_trip_through_object_store() {
        let inner: Arc<dyn ObjectStore> = Arc::new(object_store::memory::InMemory::new());

        let mut first = checkout_from(inner.clone()).await;
        record(&first, 1);
        first.publish().await.unwrap();

        let second = checkout_from(inner.clone()).await;
        let store = second.open().unwrap();
        assert_eq!(store.list_builds(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_publish_is_a_retryable_conflict() {
        let inner: Arc<dyn ObjectStore> = Arc::new(object_store::memory::InMemory::new());
        let mut seed = checkout_from(inner.clone()).await;
        record(&seed, 1);
        seed.publish().await.unwrap();

        let mut a = checkout_from(inner.clone()).await;
        let mut b = checkout_from(inner.clone()).await;
        record(&a, 2);
        record(&b, 3);
        a.publish().await.unwrap();

        let err = b.publish().await.unwrap_err();
        assert_eq!(err.code(), "storage.conflict");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn two_first_runs_race_on_create() {
        let inner: Arc<dyn ObjectStore> = Arc::new(object_store::memory::InMemory::new());
        let mut a = checkout_from(inner.clone()).await;
        let mut b = checkout_from(inner.clone()).await;
        record(&a, 1);
        record(&b, 2);
        a.publish().await.unwrap();
        assert_eq!(b.publish().await.unwrap_err().code(), "storage.conflict");
    }

    #[tokio::test]
    async fn file_urls_publish_repeatedly() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}/nested/metrics.db", dir.path().display());

        for run in 1..=2 {
            let mut handle = DatabaseHandle::checkout(&url).await.unwrap();
            assert!(handle.is_remote());
            record(&handle, run);
            handle.publish().await.unwrap();
        }
        let store = SqliteStore::open(&dir.path().join("nested/metrics.db")).unwrap();
        assert_eq!(store.list_builds(None).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn local_paths_are_used_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.db");
        let mut handle = DatabaseHandle::checkout(path.to_str().unwrap()).await.unwrap();
        assert!(!handle.is_remote());
        assert_eq!(handle.path(), path.as_path());
        record(&handle, 1);
        handle.publish().await.unwrap();
        assert!(path.exists());
    }
}
