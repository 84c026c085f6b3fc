use std::collections::HashMap;
use std::path::PathBuf;
use async_trait::async_trait;
use tokio::sync::RwLock;
use super::descriptor::UploadDescriptor;
use super::errors::Result;
use super::types::DescriptorId;

/// Durable descriptor persistence. Survives process restarts; the manager
/// writes back after every descriptor mutation and is the only client.
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    async fn save(&self, descriptor: &UploadDescriptor) -> Result<()>;

    async fn load(&self, id: DescriptorId) -> Result<Option<UploadDescriptor>>;

    async fn load_all(&self) -> Result<Vec<UploadDescriptor>>;

    async fn delete(&self, id: DescriptorId) -> Result<()>;
}

/// Stores all descriptors as one JSON document, rewritten on every change.
pub struct JsonFileStore {
    path: PathBuf,
    cache: RwLock<Option<HashMap<DescriptorId, UploadDescriptor>>>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cache: RwLock::new(None),
        }
    }

    async fn ensure_loaded<'a>(
        path: &PathBuf,
        guard: &'a mut Option<HashMap<DescriptorId, UploadDescriptor>>,
    ) -> Result<&'a mut HashMap<DescriptorId, UploadDescriptor>> {
        if guard.is_none() {
            let map = if path.exists() {
                let data = tokio::fs::read_to_string(path).await?;
                let descriptors: Vec<UploadDescriptor> = serde_json::from_str(&data)?;
                descriptors.into_iter().map(|d| (d.id, d)).collect()
            } else {
                HashMap::new()
            };
            *guard = Some(map);
        }

        Ok(guard.get_or_insert_with(HashMap::new))
    }

    async fn flush(path: &PathBuf, cache: &HashMap<DescriptorId, UploadDescriptor>) -> Result<()> {
        let descriptors: Vec<&UploadDescriptor> = cache.values().collect();
        let data = serde_json::to_string_pretty(&descriptors)?;
        tokio::fs::write(path, data).await?;

        Ok(())
    }
}

#[async_trait]
impl DescriptorStore for JsonFileStore {
    async fn save(&self, descriptor: &UploadDescriptor) -> Result<()> {
        let mut guard = self.cache.write().await;
        let cache = Self::ensure_loaded(&self.path, &mut guard).await?;
        cache.insert(descriptor.id, descriptor.clone());

        Self::flush(&self.path, cache).await
    }

    async fn load(&self, id: DescriptorId) -> Result<Option<UploadDescriptor>> {
        let mut guard = self.cache.write().await;
        let cache = Self::ensure_loaded(&self.path, &mut guard).await?;

        Ok(cache.get(&id).cloned())
    }

    async fn load_all(&self) -> Result<Vec<UploadDescriptor>> {
        let mut guard = self.cache.write().await;
        let cache = Self::ensure_loaded(&self.path, &mut guard).await?;

        Ok(cache.values().cloned().collect())
    }

    async fn delete(&self, id: DescriptorId) -> Result<()> {
        let mut guard = self.cache.write().await;
        let cache = Self::ensure_loaded(&self.path, &mut guard).await?;
        cache.remove(&id);

        Self::flush(&self.path, cache).await
    }
}

/// Non-durable store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    descriptors: RwLock<HashMap<DescriptorId, UploadDescriptor>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DescriptorStore for MemoryStore {
    async fn save(&self, descriptor: &UploadDescriptor) -> Result<()> {
        self.descriptors
            .write()
            .await
            .insert(descriptor.id, descriptor.clone());

        Ok(())
    }

    async fn load(&self, id: DescriptorId) -> Result<Option<UploadDescriptor>> {
        Ok(self.descriptors.read().await.get(&id).cloned())
    }

    async fn load_all(&self) -> Result<Vec<UploadDescriptor>> {
        Ok(self.descriptors.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: DescriptorId) -> Result<()> {
        self.descriptors.write().await.remove(&id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> UploadDescriptor {
        UploadDescriptor::new(PathBuf::from("video.mp4"), 2048, None)
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("descriptors.json");
        let store = JsonFileStore::new(path.clone());

        let saved = descriptor();
        store.save(&saved).await.unwrap();

        let loaded = store.load(saved.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, saved.id);
        assert_eq!(loaded.source, saved.source);
        assert_eq!(loaded.step, saved.step);

        // a fresh store over the same file sees the data
        let reopened = JsonFileStore::new(path);
        let all = reopened.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, saved.id);
    }

    #[tokio::test]
    async fn test_json_store_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("descriptors.json"));

        let saved = descriptor();
        store.save(&saved).await.unwrap();
        store.delete(saved.id).await.unwrap();

        assert!(store.load(saved.id).await.unwrap().is_none());
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let saved = descriptor();

        store.save(&saved).await.unwrap();
        assert!(store.load(saved.id).await.unwrap().is_some());

        store.delete(saved.id).await.unwrap();
        assert!(store.load(saved.id).await.unwrap().is_none());
    }
}
