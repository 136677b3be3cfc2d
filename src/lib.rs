use std::path::{Path, PathBuf};

use anyhow::Context;

pub mod build_info;
pub mod model;
pub mod pipeline;
pub mod storage;
pub mod util;

pub use util::config::find_config_file_path;
use util::config::{Config, ConfigLoader, ConfigWriter};

/// 默认配置文件名
pub const CONFIG_FILE: &str = "config.yaml";

/// 加载配置
///
/// 未显式指定路径时按 [`find_config_file_path`] 的顺序查找；找不到则在工作目录
/// 生成默认模板后再读取。返回配置和实际使用的路径。
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<(Config, PathBuf)> {
    let config_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => find_config_file_path(CONFIG_FILE).unwrap_or_else(|| PathBuf::from(CONFIG_FILE)),
    };

    if !config_path.exists() {
        tracing::warn!(
            event = "config.missing",
            "配置文件不存在，正在生成模板: {}",
            config_path.display()
        );
        ConfigWriter::ensure_template(&config_path)?;
    }

    let config = ConfigLoader::load_with_env_overrides(&config_path)
        .with_context(|| format!("配置加载失败: {}", config_path.display()))?;
    tracing::info!(event = "config.load.success", path = %config_path.display());
    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_writes_template_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let (config, used) = load_config(Some(&path)).unwrap();
        assert_eq!(used, path);
        assert!(path.exists());
        assert_eq!(config.storage.key_column, "school_name");
    }

    #[test]
    fn test_load_config_reads_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "extraction:\n  save_every: 3\n").unwrap();

        let (config, _) = load_config(Some(&path)).unwrap();
        assert_eq!(config.extraction.save_every, 3);
    }
}
