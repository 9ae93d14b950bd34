pub mod json;

use common::config::{S3Settings, StorageSettings};
use common::{Error, Result};
use datafusion::dataframe::{DataFrame, DataFrameWriteOptions};
use datafusion::execution::context::SessionContext;
use futures::StreamExt;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// A resolved source prefix or table destination: a URL DataFusion can read
/// or write, plus the object-store handle and prefix used for listing and
/// deletion.
#[derive(Clone)]
pub struct TableLocation {
    url: String,
    prefix: ObjectPath,
    store: Arc<dyn ObjectStore>,
}

impl TableLocation {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn prefix(&self) -> &ObjectPath {
        &self.prefix
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }
}

enum RootKind {
    Local(PathBuf),
    Remote { bucket: String, key_prefix: String },
}

/// One configured storage root, local filesystem or S3-compatible remote.
/// Credentials come from the settings passed at construction; nothing is
/// read from ambient process state.
struct StorageRoot {
    kind: RootKind,
    store: Arc<dyn ObjectStore>,
}

impl StorageRoot {
    fn new(root: &str, s3: Option<&S3Settings>) -> Result<Self> {
        if root.starts_with("s3://") {
            let url = Url::parse(root)?;
            let bucket = url
                .host_str()
                .ok_or_else(|| {
                    Error::InvalidInput(format!("S3 root '{}' has no bucket", root))
                })?
                .to_string();
            let s3 = s3.ok_or_else(|| {
                Error::InvalidInput(
                    "storage.s3 settings are required for s3:// roots".to_string(),
                )
            })?;

            let store = AmazonS3Builder::new()
                .with_bucket_name(&bucket)
                .with_region(&s3.region)
                .with_access_key_id(&s3.access_key)
                .with_secret_access_key(&s3.secret_key)
                .with_endpoint(&s3.endpoint)
                .with_allow_http(s3.allow_http)
                .build()?;

            let key_prefix = url.path().trim_matches('/').to_string();
            Ok(Self {
                kind: RootKind::Remote { bucket, key_prefix },
                store: Arc::new(store),
            })
        } else {
            let path = root.strip_prefix("file://").unwrap_or(root);
            let path = std::path::absolute(path)?;
            Ok(Self {
                kind: RootKind::Local(path),
                store: Arc::new(LocalFileSystem::new()),
            })
        }
    }

    fn location(&self, relative: &str) -> Result<TableLocation> {
        let relative = relative.trim_matches('/');

        match &self.kind {
            RootKind::Local(base) => {
                let mut full = base.clone();
                for part in relative.split('/').filter(|p| !p.is_empty()) {
                    full.push(part);
                }
                let prefix = ObjectPath::from_absolute_path(&full)?;
                Ok(TableLocation {
                    url: full.to_string_lossy().into_owned(),
                    prefix,
                    store: self.store.clone(),
                })
            }
            RootKind::Remote { bucket, key_prefix } => {
                let key = if key_prefix.is_empty() {
                    relative.to_string()
                } else {
                    format!("{}/{}", key_prefix, relative)
                };
                Ok(TableLocation {
                    url: format!("s3://{}/{}", bucket, key),
                    prefix: ObjectPath::parse(&key)?,
                    store: self.store.clone(),
                })
            }
        }
    }
}

/// Resolves the two configured roots and carries out all table reads and
/// writes against them. Output tables are always replaced wholesale; there
/// is no append mode and no locking against concurrent runs.
pub struct StorageManager {
    input: StorageRoot,
    output: StorageRoot,
}

impl StorageManager {
    pub fn new(settings: &StorageSettings) -> Result<Self> {
        let s3 = settings.s3.as_ref();
        Ok(Self {
            input: StorageRoot::new(&settings.input_root, s3)?,
            output: StorageRoot::new(&settings.output_root, s3)?,
        })
    }

    /// Registers any remote roots with the DataFusion runtime so s3:// paths
    /// resolve through the configured credentials.
    pub fn register_object_stores(&self, ctx: &SessionContext) -> Result<()> {
        for root in [&self.input, &self.output] {
            if let RootKind::Remote { bucket, .. } = &root.kind {
                let url = Url::parse(&format!("s3://{}", bucket))?;
                ctx.runtime_env().register_object_store(&url, root.store.clone());
            }
        }
        Ok(())
    }

    pub fn input_location(&self, relative: &str) -> Result<TableLocation> {
        self.input.location(relative)
    }

    pub fn output_location(&self, relative: &str) -> Result<TableLocation> {
        self.output.location(relative)
    }

    /// Removes every object under the location's prefix. A missing prefix
    /// counts as already empty. Returns the number of objects deleted.
    pub async fn delete_prefix(&self, location: &TableLocation) -> Result<usize> {
        let store = location.store();
        let entries: Vec<_> = store.list(Some(location.prefix())).collect().await;

        let mut removed = 0;
        for entry in entries {
            match entry {
                Ok(meta) => {
                    store.delete(&meta.location).await?;
                    removed += 1;
                }
                Err(object_store::Error::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }

    /// Writes a table dataset, replacing whatever was at the destination.
    /// The prefix is cleared first, so partition values present in an
    /// earlier run but absent from this one are removed, not retained.
    pub async fn write_table(
        &self,
        df: DataFrame,
        location: &TableLocation,
        partition_by: &[&str],
    ) -> Result<()> {
        let schema = df.schema();
        for column in partition_by {
            if !schema.fields().iter().any(|f| f.name() == column) {
                return Err(Error::SchemaValidation(format!(
                    "Missing partition column {} in table at {}",
                    column,
                    location.url()
                )));
            }
        }

        let removed = self.delete_prefix(location).await?;
        if removed > 0 {
            info!(removed, url = %location.url(), "Cleared previous table contents");
        }

        let options = DataFrameWriteOptions::new()
            .with_partition_by(partition_by.iter().map(|c| c.to_string()).collect());
        df.write_parquet(location.url(), options, None).await?;

        info!(url = %location.url(), "Wrote table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_settings(input: &str, output: &str) -> StorageSettings {
        StorageSettings {
            input_root: input.to_string(),
            output_root: output.to_string(),
            s3: None,
        }
    }

    #[test]
    fn test_local_location_joins_segments() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let manager = StorageManager::new(&local_settings(&root, &root)).unwrap();

        let location = manager.output_location("songs/songs.parquet").unwrap();
        assert!(location.url().ends_with("/songs/songs.parquet"));
        assert!(location.url().starts_with('/'));
    }

    #[test]
    fn test_s3_root_requires_settings() {
        let err = StorageManager::new(&local_settings("s3://raw/events", "/tmp/out"));
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_delete_prefix_missing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let manager = StorageManager::new(&local_settings(&root, &root)).unwrap();

        let location = manager.output_location("never/written").unwrap();
        assert_eq!(manager.delete_prefix(&location).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_prefix_removes_nested_objects() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let manager = StorageManager::new(&local_settings(&root, &root)).unwrap();

        let table_dir = dir.path().join("songs").join("s_year=2018");
        std::fs::create_dir_all(&table_dir).unwrap();
        std::fs::write(table_dir.join("part-0.parquet"), b"x").unwrap();
        std::fs::write(dir.path().join("songs").join("part-1.parquet"), b"y").unwrap();

        let location = manager.output_location("songs").unwrap();
        assert_eq!(manager.delete_prefix(&location).await.unwrap(), 2);
        assert_eq!(manager.delete_prefix(&location).await.unwrap(), 0);
    }
}
