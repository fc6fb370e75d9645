//! File-backed store: one JSON document per entity under `<data_dir>/<entity>/<id>.json`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ecosys_common::{EntityType, PersistentStore, StoreError};
use tokio::fs;
use tracing::debug;

const EXTENSION: &str = "json";

/// JSON file store
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entity_dir(&self, entity: EntityType) -> PathBuf {
        self.root.join(entity.as_str())
    }

    fn path_for(&self, entity: EntityType, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Backend(format!("invalid id: {id:?}")));
        }
        Ok(self.entity_dir(entity).join(format!("{id}.{EXTENSION}")))
    }
}

#[async_trait]
impl PersistentStore for JsonFileStore {
    async fn save(&self, entity: EntityType, id: &str, blob: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(entity, id)?;
        fs::create_dir_all(self.entity_dir(entity)).await?;

        // Write then rename so readers never see a partial document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &blob).await?;
        fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), bytes = blob.len(), "Saved");
        Ok(())
    }

    async fn load(&self, entity: EntityType, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(entity, id)?;
        match fs::read(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, entity: EntityType) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let dir = self.entity_dir(entity);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = id.to_string();
            items.push((id, fs::read(&path).await?));
        }
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }
}
