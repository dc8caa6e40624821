use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio::fs;

/// Directory-backed key/value store. Each key is one JSON file.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();
        self.root.join(format!("{name}.json"))
    }

    /// `Ok(None)` when the key was never written.
    pub async fn get_item<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> anyhow::Result<Option<T>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", path.display()));
            }
        };
        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse json: {}", path.display()))?;
        Ok(Some(value))
    }

    pub async fn set_item<T: serde::Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let path = self.path_for(key);
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create store dir: {}", self.root.display()))?;

        let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
        let data = serde_json::to_vec_pretty(value).context("serialize json")?;
        fs::write(&tmp_path, &data)
            .await
            .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("rename tmp to final: {}", path.display()))?;
        Ok(())
    }

    pub async fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
        }
    }
}
