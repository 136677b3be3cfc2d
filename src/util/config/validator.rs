//! 配置验证模块
//! 在运行前检查权重、阈值、规则与接口配置

use super::types::*;
use crate::util::extract::PatternExtractor;
use crate::util::index::IndexError;

/// 配置验证器
pub struct ConfigValidator;

impl ConfigValidator {
    /// 全面验证配置
    pub fn validate_all(config: &Config) -> ValidationReport {
        let mut report = ValidationReport::new();

        Self::validate_storage_config(&config.storage, &mut report);
        Self::validate_rules_config(&config.rules, &mut report);
        Self::validate_profile_config(config, &mut report);
        Self::validate_index_config(config, &mut report);
        Self::validate_enrichment_config(config, &mut report);
        Self::validate_logging_config(&config.logging, &mut report);

        report
    }

    fn validate_storage_config(storage: &StorageConfig, report: &mut ValidationReport) {
        if storage.key_column.trim().is_empty() {
            report.add_error("storage.key_column", "键列不能为空");
        }
        if storage.table_path == storage.output_path {
            report.add_error(
                "storage.output_path",
                "指数结果表不能与记录表为同一文件",
            );
        }
    }

    /// 每条规则的正则都必须能编译且捕获组存在
    fn validate_rules_config(rules: &RulesConfig, report: &mut ValidationReport) {
        if rules.metric_rules.is_empty() {
            report.add_warning("rules.metric_rules", "未配置任何数值抽取规则");
        }
        if let Err(err) = PatternExtractor::new(&rules.metric_rules) {
            report.add_error("rules.metric_rules", &err.to_string());
        }
        if rules.positioning_taxonomy.is_empty() {
            report.add_warning("rules.positioning_taxonomy", "定位标签表为空");
        }
        if rules.tli_keywords.is_empty() {
            report.add_warning("rules.tli_keywords", "文本国际化词表为空，raw_tli_score 将全部为 0");
        }
    }

    fn validate_profile_config(config: &Config, report: &mut ValidationReport) {
        let profile = &config.profile;
        for (field, value) in [
            ("profile.block_min_length", profile.block_min_length),
            ("profile.preferred_url_threshold", profile.preferred_url_threshold),
            ("profile.default_url_threshold", profile.default_url_threshold),
            ("profile.snippet_max_chars", profile.snippet_max_chars),
        ] {
            if value == 0 {
                report.add_error(field, "必须大于0");
            }
        }
        if profile.heading_keywords.is_empty() {
            report.add_warning("profile.heading_keywords", "未配置概况标题关键词");
        }
        if config.extraction.max_pages_per_record == 0 {
            report.add_error("extraction.max_pages_per_record", "必须大于0");
        }
        if config.extraction.offline {
            report.add_info("extraction.offline", "离线模式：只读取本地页面缓存");
        }
    }

    fn validate_index_config(config: &Config, report: &mut ValidationReport) {
        let index = &config.index;
        if !(index.non_null_threshold > 0.0 && index.non_null_threshold <= 1.0) {
            report.add_error(
                "index.non_null_threshold",
                &format!("必须在 (0, 1] 之间: {}", index.non_null_threshold),
            );
        }
        match index.check() {
            Ok(()) => {}
            Err(err @ IndexError::InvalidWeights { .. }) => {
                report.add_error("index.weights", &err.to_string());
            }
            Err(err @ IndexError::UnknownSubIndex(_)) => {
                report.add_error("index.composite.weights", &err.to_string());
            }
            Err(err) => report.add_error("index", &err.to_string()),
        }
        if let Some(pca) = &index.pca {
            if pca.component == 0 {
                report.add_error("index.pca.component", "主成分序号从1开始");
            }
            if !pca.inputs.is_empty() && pca.component > pca.inputs.len() {
                report.add_error(
                    "index.pca.component",
                    &format!("主成分序号 {} 超过输入列数 {}", pca.component, pca.inputs.len()),
                );
            }
        }
        for sub in &index.sub_indices {
            for component in &sub.components {
                if index.exclude_columns.contains(&component.column) {
                    report.add_warning(
                        "index.exclude_columns",
                        &format!("子指数 {} 的分量 {} 被排除", sub.name, component.column),
                    );
                }
            }
        }
    }

    fn validate_enrichment_config(config: &Config, report: &mut ValidationReport) {
        if !config.enrichment.enabled {
            report.add_info("enrichment.enabled", "模型补全未启用");
            return;
        }
        if !config.llm.has_api_key() {
            report.add_warning(
                "llm.api_key",
                "已启用模型补全但未配置 API Key（IACI_LLM_API_KEY / MOONSHOT_API_KEY）",
            );
        }
        if config.enrichment.targets.is_empty() {
            report.add_warning("enrichment.targets", "未配置补全目标字段");
        }
        if !(config.llm.base_url.starts_with("http://") || config.llm.base_url.starts_with("https://")) {
            report.add_error(
                "llm.base_url",
                &format!("无效的模型接口地址: {}", config.llm.base_url),
            );
        }
    }

    fn validate_logging_config(logging: &LoggingConfig, report: &mut ValidationReport) {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&logging.level.to_lowercase().as_str()) {
            report.add_error(
                "logging.level",
                &format!("无效的日志级别: {}", logging.level),
            );
        }
        if logging.file.enabled && logging.file.directory.trim().is_empty() {
            report.add_error("logging.file.directory", "日志目录不能为空");
        }
    }
}

/// 验证报告
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub info: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_info(&mut self, field: &str, message: &str) {
        self.info.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// 把全部问题写入日志
    pub fn log(&self) {
        for issue in &self.errors {
            tracing::error!(event = "config.invalid", field = %issue.field, "{}", issue.message);
        }
        for issue in &self.warnings {
            tracing::warn!(event = "config.warning", field = %issue.field, "{}", issue.message);
        }
        for issue in &self.info {
            tracing::info!(event = "config.info", field = %issue.field, "{}", issue.message);
        }
    }
}

/// 验证问题
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}
