use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{fs, fs::File};
use uuid::Uuid;

/// Temp files for uploads in flight. Each upload gets a random file name.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub async fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn create(&self) -> io::Result<(PathBuf, File)> {
        let path = self.dir.join(Uuid::new_v4().simple().to_string());
        let file = File::create(&path).await?;
        Ok((path, file))
    }

    pub async fn remove(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            tracing::warn!("Failed to remove upload {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_create_and_remove() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = UploadStore::new(dir.path().join("uploads")).await?;

        let (path, mut file) = store.create().await?;
        file.write_all(b"image bytes").await?;
        file.flush().await?;
        assert!(path.starts_with(store.dir()));
        assert_eq!(std::fs::read(&path)?, b"image bytes");

        let (other, _) = store.create().await?;
        assert_ne!(path, other);

        store.remove(&path).await;
        store.remove(&other).await;
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(store.dir())?.count(), 0);

        Ok(())
    }
}
