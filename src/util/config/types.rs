//! 配置数据结构定义
//!
//! 每个配置段都有默认值，配置文件只需写出需要覆盖的部分。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::pipeline::{DerivedFieldSettings, ExtractionSettings};
use crate::util::enrichment::{EnrichmentSettings, LlmSettings};
use crate::util::extract::{KeywordTagger, ProfileSettings, TagLabel};
use crate::util::http_client::HttpClientConfig;
use crate::util::index::IndexSettings;
use crate::util::rules::{defaults, RuleSet};

/// 主配置结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub http: HttpClientConfig,
    pub extraction: ExtractionSettings,
    pub rules: RulesConfig,
    pub profile: ProfileSettings,
    pub enrichment: EnrichmentSettings,
    pub llm: LlmSettings,
    pub derived: DerivedFieldSettings,
    pub index: IndexSettings,
    pub logging: LoggingConfig,
}

/// 数据文件位置
///
/// 表文件按扩展名选择存储：`.json` 或 `.db` / `.sqlite`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 抽取与补全读写的记录表
    pub table_path: String,
    /// 指数结果表
    pub output_path: String,
    /// 指数构建报告（JSON）
    pub report_path: String,
    /// 页面缓存目录
    pub cache_dir: String,
    /// 记录表的键列（院校名称）
    pub key_column: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table_path: "data/schools.json".to_string(),
            output_path: "data/iaci_scores.json".to_string(),
            report_path: "data/iaci_report.json".to_string(),
            cache_dir: "data/html_cache".to_string(),
            key_column: "school_name".to_string(),
        }
    }
}

/// 规则与词表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub metric_rules: RuleSet,
    pub positioning_taxonomy: Vec<TagLabel>,
    pub tli_keywords: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            metric_rules: defaults::basic_metric_rules(),
            positioning_taxonomy: defaults::positioning_taxonomy(),
            tli_keywords: defaults::tli_keywords(),
        }
    }
}

impl RulesConfig {
    /// 定位标签 + 国际化打分
    pub fn tagger(&self) -> KeywordTagger {
        KeywordTagger::new(&self.positioning_taxonomy, &self.tli_keywords)
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: LogFileConfig,
    /// 是否输出 JSON 结构化日志
    pub structured: Option<bool>,
    pub level_config: Option<LevelConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: LogFileConfig::default(),
            structured: Some(false),
            level_config: None,
        }
    }
}

/// 日志文件配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    pub enabled: bool,
    pub directory: String,
    pub retention_days: Option<u32>,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "logs".to_string(),
            retention_days: Some(7),
        }
    }
}

/// 按模块覆盖日志级别，键为模块简称，如 `extract: debug`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LevelConfig {
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
storage:
  table_path: /tmp/t.db
index:
  non_null_threshold: 0.6
llm:
  model: kimi-latest
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.table_path, "/tmp/t.db");
        assert_eq!(config.storage.key_column, "school_name");
        assert_eq!(config.index.non_null_threshold, 0.6);
        assert_eq!(config.index.sub_indices.len(), 4);
        assert_eq!(config.llm.model, "kimi-latest");
        assert_eq!(config.llm.max_tokens, 1200);
        assert_eq!(config.rules.metric_rules.rules.len(), 11);
        assert_eq!(config.extraction.max_pages_per_record, 10);
    }

    #[test]
    fn test_default_round_trips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
