use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::traits::PageSource;
use crate::model::PassKind;
use crate::util::rules::cache_key_for_url;

/// 本地页面缓存：`<sha256(url)>.html`
///
/// 既是抓取结果的落盘位置，也可单独作为离线重抽取的页面来源。
pub struct LocalPageCache {
    base_path: PathBuf,
}

impl LocalPageCache {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        // 确保缓存目录存在
        std::fs::create_dir_all(&base_path).with_context(|| {
            format!("Failed to create page cache directory: {}", base_path.display())
        })?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 获取缓存文件的完整路径
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.base_path.join(cache_key_for_url(url))
    }

    pub async fn put(&self, url: &str, html: &str) -> Result<()> {
        let path = self.path_for(url);
        fs::write(&path, html.as_bytes())
            .await
            .with_context(|| format!("Failed to write cached page: {}", path.display()))?;
        Ok(())
    }

    pub async fn get(&self, url: &str) -> Result<Option<String>> {
        let path = self.path_for(url);

        match fs::read(&path).await {
            Ok(data) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read cached page: {}", path.display())),
        }
    }

    pub async fn contains(&self, url: &str) -> bool {
        fs::try_exists(self.path_for(url)).await.unwrap_or(false)
    }
}

#[async_trait]
impl PageSource for LocalPageCache {
    async fn fetch(&self, url: &str) -> Option<String> {
        match self.get(url).await {
            Ok(Some(html)) => {
                debug!(event = "page_cache.hit", url = %url);
                Some(html)
            }
            Ok(None) => {
                debug!(event = "page_cache.miss", url = %url);
                None
            }
            Err(e) => {
                warn!(event = "page_cache.read_failed", url = %url, error = %e);
                None
            }
        }
    }

    fn pass_kind(&self) -> PassKind {
        PassKind::OfflineCache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let cache = LocalPageCache::new(temp_dir.path()).unwrap();
        let url = "https://www.example.edu.cn/xxgk/";

        assert!(cache.fetch(url).await.is_none());
        cache.put(url, "<p>学校概况</p>").await.unwrap();
        assert!(cache.contains(url).await);
        assert_eq!(cache.fetch(url).await.as_deref(), Some("<p>学校概况</p>"));
        assert_eq!(cache.pass_kind(), PassKind::OfflineCache);
    }

    #[tokio::test]
    async fn test_key_ignores_surrounding_whitespace() {
        let temp_dir = TempDir::new().unwrap();
        let cache = LocalPageCache::new(temp_dir.path()).unwrap();
        cache.put("https://a.edu.cn/", "x").await.unwrap();
        assert_eq!(cache.fetch("  https://a.edu.cn/ ").await.as_deref(), Some("x"));

        let name = cache
            .path_for("https://a.edu.cn/")
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert!(name.ends_with(".html"));
        assert_eq!(name.len(), 64 + 5);
    }
}
