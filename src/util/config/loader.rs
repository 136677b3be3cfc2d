//! 配置加载和管理模块
//! 处理配置文件的读取、写入与环境变量覆盖

use super::types::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从YAML文件读取配置
    pub fn read_yaml(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config = serde_yaml::from_str(&config_str)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(config)
    }

    /// 从环境变量读取配置覆盖
    pub fn apply_env_overrides(config: Config) -> Config {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok())
    }

    /// 覆盖逻辑与变量来源分离，便于测试
    pub fn apply_overrides_from<F>(mut config: Config, lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(level) = var("IACI_LOG_LEVEL") {
            tracing::info!("[ok] 环境变量覆盖日志级别: {}", level);
            config.logging.level = level;
        }

        // 数据文件
        if let Some(path) = var("IACI_TABLE_PATH") {
            tracing::info!("[ok] 环境变量覆盖记录表路径: {}", path);
            config.storage.table_path = path;
        }
        if let Some(path) = var("IACI_OUTPUT_PATH") {
            tracing::info!("[ok] 环境变量覆盖指数结果路径: {}", path);
            config.storage.output_path = path;
        }
        if let Some(dir) = var("IACI_CACHE_DIR") {
            tracing::info!("[ok] 环境变量覆盖页面缓存目录: {}", dir);
            config.storage.cache_dir = dir;
        }

        // 模型接口（安全字段不打印明文）
        if let Some(key) = var("IACI_LLM_API_KEY").or_else(|| var("MOONSHOT_API_KEY")) {
            config.llm.api_key = key;
            tracing::info!("[ok] 环境变量覆盖模型 API Key: [安全隐藏]");
        }
        if let Some(base_url) = var("IACI_LLM_BASE_URL") {
            tracing::info!("[ok] 环境变量覆盖模型接口地址: {}", base_url);
            config.llm.base_url = base_url;
        }
        if let Some(model) = var("IACI_LLM_MODEL") {
            tracing::info!("[ok] 环境变量覆盖模型名称: {}", model);
            config.llm.model = model;
        }

        if let Some(flag) = var("IACI_ENRICHMENT_ENABLED") {
            match Self::parse_bool(&flag) {
                Ok(enabled) => {
                    config.enrichment.enabled = enabled;
                    tracing::info!("[ok] 环境变量覆盖模型补全开关: {}", enabled);
                }
                Err(()) => {
                    tracing::warn!("[warn] IACI_ENRICHMENT_ENABLED 无法解析为布尔值: {}", flag);
                }
            }
        }

        config
    }

    fn parse_bool(value: &str) -> Result<bool, ()> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Ok(true),
            "false" | "0" | "no" | "n" => Ok(false),
            _ => Err(()),
        }
    }

    /// 读取配置文件并应用环境变量覆盖
    pub fn load_with_env_overrides(path: impl AsRef<Path>) -> Result<Config> {
        // 1. 从配置文件读取基础配置
        let base_config = Self::read_yaml(path)?;

        // 2. 应用环境变量覆盖
        let config = Self::apply_env_overrides(base_config);

        // 3. 基本格式检查；完整校验见 ConfigValidator
        Self::validate_config(&config)?;

        tracing::info!("[ok] 配置加载完成");
        Ok(config)
    }

    /// 快速失败的基本检查
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.storage.key_column.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.key_column 不能为空"));
        }
        if config.storage.table_path.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.table_path 不能为空"));
        }
        if config.enrichment.enabled {
            Url::parse(&config.llm.base_url)
                .with_context(|| format!("无效的模型接口地址: {}", config.llm.base_url))?;
        }
        Ok(())
    }
}

/// 配置写入器
pub struct ConfigWriter;

impl ConfigWriter {
    /// 将配置写入YAML文件
    pub fn write_yaml(config: &Config, path: impl AsRef<Path>) -> Result<()> {
        let yaml_content = serde_yaml::to_string(config)?;
        fs::write(path, yaml_content)?;
        Ok(())
    }

    /// 写入配置到指定路径，确保目录存在
    pub fn write_yaml_with_dir(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::write_yaml(config, path)
    }

    /// 配置文件不存在时写出默认模板；返回是否新写入
    pub fn ensure_template(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        Self::write_yaml_with_dir(&Self::generate_template(), path)
            .with_context(|| format!("写入配置模板失败: {}", path.display()))?;
        tracing::info!("[ok] 已生成默认配置文件: {}", path.display());
        Ok(true)
    }

    /// 生成默认模板（不含任何密钥）
    pub fn generate_template() -> Config {
        Config::default()
    }
}

/// 按顺序查找配置文件：工作目录、上级目录、`config/` 子目录
pub fn find_config_file_path(filename: &str) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let mut candidates = vec![cwd.join(filename)];
    if let Some(parent) = cwd.parent() {
        candidates.push(parent.join(filename));
    }
    candidates.push(cwd.join("config").join(filename));
    candidates.into_iter().find(|p| p.is_file())
}
