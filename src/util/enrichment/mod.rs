//! 大模型辅助补全：只填充规则抽取后仍为空的目标字段

pub mod client;
pub mod response;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{FieldMap, PassKind, Record};
use crate::util::merge::merge_into_record;

pub use client::{ChatCompletionProvider, CompletionProvider, LlmSettings};
pub use response::{parse_json_lenient, parse_response, FieldSuggestion};

pub const EVIDENCE_SUFFIX: &str = "_llm_evidence";
pub const SOURCE_SUFFIX: &str = "_llm_source";
pub const CONFIDENCE_SUFFIX: &str = "_llm_confidence";

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("response is not JSON: {0}")]
    NotJson(String),
    #[error("response has unexpected shape: {0}")]
    WrongShape(String),
    #[error("provider request failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Integer,
    Float,
    /// 比例或比值，接受 `0.945`、`"94.5%"`、`"18:1"`
    Ratio,
    Text,
}

/// 补全目标字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentTarget {
    pub field: String,
    pub description: String,
    pub kind: TargetKind,
}

impl EnrichmentTarget {
    pub fn new(field: &str, description: &str, kind: TargetKind) -> Self {
        Self {
            field: field.to_string(),
            description: description.to_string(),
            kind,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self.kind, TargetKind::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    pub enabled: bool,
    pub targets: Vec<EnrichmentTarget>,
    /// 作为“已知信息”放进提示词的列
    pub context_columns: Vec<String>,
    pub system_prompt: String,
    pub save_every: usize,
    /// 相邻两次请求之间的等待（毫秒）
    pub request_delay_ms: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            targets: default_targets(),
            context_columns: [
                "students_total",
                "teachers_total",
                "major_count",
                "campus_area_m2",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            system_prompt: "你是一个严谨的数据提取助手，只输出 JSON".to_string(),
            save_every: 20,
            request_delay_ms: 2000,
        }
    }
}

impl EnrichmentSettings {
    pub fn numeric_target_fields(&self) -> Vec<String> {
        self.targets
            .iter()
            .filter(|t| t.is_numeric())
            .map(|t| t.field.clone())
            .collect()
    }
}

fn default_targets() -> Vec<EnrichmentTarget> {
    use TargetKind::*;
    vec![
        EnrichmentTarget::new(
            "employment_rate_2024",
            "最近一届本科毕业生就业率（2024 届），例如 0.945 表示 94.5%。如果只看到 95%、94%以上之类，请尽量给出小数形式。",
            Ratio,
        ),
        EnrichmentTarget::new(
            "employment_rate_2025",
            "最近一届本科毕业生就业率（2025 届），没有就返回 null。",
            Ratio,
        ),
        EnrichmentTarget::new(
            "further_study_rate_2025",
            "最近一届本科毕业生升学率（含考研、出国深造），用 0-1 之间的小数表示。",
            Ratio,
        ),
        EnrichmentTarget::new(
            "intl_partner_universities_count",
            "学校公开的海外合作高校数量（中外高校、合作院校数量），用整数表示。",
            Integer,
        ),
        EnrichmentTarget::new(
            "intl_partner_countries_count",
            "学校公开的合作国家或地区数量，用整数表示。",
            Integer,
        ),
        EnrichmentTarget::new(
            "studyabroad_students_annual",
            "每年出国（境）交流、访学、双学位、短期项目等人数。整数，模糊描述则给估计值。",
            Integer,
        ),
        EnrichmentTarget::new(
            "languages_offered_count",
            "学校目前开设的外国语言语种数量（不要算汉语相关，只算其他自然语言，如英语、日语、泰语等），请给出整数。",
            Integer,
        ),
        EnrichmentTarget::new(
            "languages_list",
            "学校目前开设的外国语言语种列表，用中文全称表示，用顿号（、）分隔，例如：英语、日语、韩语、泰语、越南语。",
            Text,
        ),
        EnrichmentTarget::new(
            "foreign_major_count",
            "学校开设的外语类本科专业数量（如英语、翻译、商务英语、日语、泰语等），用整数表示。",
            Integer,
        ),
        EnrichmentTarget::new(
            "asean_partner_countries_count",
            "学校与多少个东盟国家（东盟10国）有正式合作或交流关系（请给出大致整数，若无则为0）。",
            Integer,
        ),
        EnrichmentTarget::new(
            "asean_partner_universities_count",
            "学校与东盟高校的合作院校数量（交换、联合培养、合作办学等，给出大致整数，若无则为0）。",
            Integer,
        ),
        EnrichmentTarget::new(
            "asean_program_count",
            "与东盟相关的项目数量（例如东盟交换项目、研学、暑期学校、联合培养等，粗略估算一个整数，若无则为0）。",
            Integer,
        ),
    ]
}

/// 单条记录的补全结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentOutcome {
    pub requested: Vec<String>,
    pub filled: Vec<String>,
}

impl EnrichmentOutcome {
    pub fn skipped(&self) -> bool {
        self.requested.is_empty()
    }
}

/// 补全流程：计算剩余字段 → 组装提示词 → 调用模型 → 解析 → 只填空值
pub struct EnrichmentPass {
    settings: EnrichmentSettings,
    provider: Arc<dyn CompletionProvider>,
}

impl EnrichmentPass {
    pub fn new(settings: EnrichmentSettings, provider: Arc<dyn CompletionProvider>) -> Self {
        Self { settings, provider }
    }

    pub fn settings(&self) -> &EnrichmentSettings {
        &self.settings
    }

    /// 仍为空的目标字段（保持声明顺序）
    pub fn residual_targets(&self, record: &Record) -> Vec<&EnrichmentTarget> {
        self.settings
            .targets
            .iter()
            .filter(|t| record.is_empty_field(&t.field))
            .collect()
    }

    pub fn build_prompt(&self, record: &Record, residual: &[&EnrichmentTarget]) -> String {
        let mut context = Map::new();
        context.insert("school_name".to_string(), Value::String(record.name.clone()));
        for column in &self.settings.context_columns {
            if let Some(value) = record.get(column) {
                context.insert(column.clone(), value.to_json());
            }
        }
        let context = Value::Object(context).to_string();
        let metric_desc = residual
            .iter()
            .map(|t| format!("- {}: {}", t.field, t.description))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "你是一名严谨的教育数据抽取助手，现在要通过联网搜索来补全一所中国民办本科高校的若干指标。\n\
             【已知信息】\n{context}\n\
             【学校】\n{name}\n\
             【需要补全的指标】\n{metric_desc}\n\
             请从官网与权威来源获取数据。\n\
             每个字段输出：\n\
             {{\n  \"value\": 数值或 null,\n  \"evidence\": \"证据中文原文\",\n  \"source_url\": \"来源链接\",\n  \"confidence\": \"high/medium/low\"\n}}\n\
             以 JSON 格式返回，不要额外解释。",
            context = context,
            name = record.name,
            metric_desc = metric_desc,
        )
    }

    /// 对单条记录补全；没有剩余字段时不调用模型
    pub async fn enrich_record(&self, record: &mut Record) -> Result<EnrichmentOutcome, EnrichmentError> {
        let residual = self.residual_targets(record);
        if residual.is_empty() {
            return Ok(EnrichmentOutcome::default());
        }
        let requested: Vec<String> = residual.iter().map(|t| t.field.clone()).collect();

        let prompt = self.build_prompt(record, &residual);
        let reply = self
            .provider
            .complete(&self.settings.system_prompt, &prompt)
            .await?;
        let suggestions = parse_response(&reply, &residual)?;

        let mut values = FieldMap::new();
        for (field, suggestion) in &suggestions {
            values.insert(field.clone(), suggestion.value.clone());
        }
        let filled = merge_into_record(record, &values);

        for field in &filled {
            let Some(suggestion) = suggestions.get(field) else {
                continue;
            };
            if let Some(evidence) = &suggestion.evidence {
                record.set(format!("{}{}", field, EVIDENCE_SUFFIX), evidence.as_str());
            }
            if let Some(source) = &suggestion.source_url {
                record.set(format!("{}{}", field, SOURCE_SUFFIX), source.as_str());
            }
            if let Some(confidence) = suggestion.confidence {
                record.set(format!("{}{}", field, CONFIDENCE_SUFFIX), confidence.as_str());
            }
        }

        debug!(
            event = "enrichment.record_done",
            school = %record.name,
            provider = self.provider.name(),
            pass = PassKind::ModelAssisted.as_str(),
            requested = requested.len(),
            filled = filled.len()
        );
        if !filled.is_empty() {
            info!(
                event = "enrichment.fields_filled",
                school = %record.name,
                fields = ?filled
            );
        }
        Ok(EnrichmentOutcome { requested, filled })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubProvider {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionProvider for StubProvider {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, EnrichmentError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(EnrichmentError::Transport)
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn settings() -> EnrichmentSettings {
        EnrichmentSettings {
            targets: vec![
                EnrichmentTarget::new("intl_partner_universities_count", "合作高校数量", TargetKind::Integer),
                EnrichmentTarget::new("employment_rate_2024", "就业率", TargetKind::Ratio),
            ],
            context_columns: vec!["students_total".to_string()],
            ..EnrichmentSettings::default()
        }
    }

    #[tokio::test]
    async fn test_fills_only_residual_fields() {
        let provider = StubProvider::replying(
            r#"{"intl_partner_universities_count": {"value": 80, "evidence": "与80所高校合作", "source_url": "https://x.edu.cn", "confidence": "medium"},
                "employment_rate_2024": {"value": 0.5}}"#,
        );
        let pass = EnrichmentPass::new(settings(), provider.clone());
        let mut record = Record::new("某学院")
            .with_field("students_total", 12000)
            .with_field("employment_rate_2024", 0.93);

        let outcome = pass.enrich_record(&mut record).await.unwrap();
        assert_eq!(outcome.requested, vec!["intl_partner_universities_count"]);
        assert_eq!(outcome.filled, vec!["intl_partner_universities_count"]);
        assert_eq!(record.get_f64("intl_partner_universities_count"), Some(80.0));
        assert_eq!(record.get_f64("employment_rate_2024"), Some(0.93));
        assert_eq!(
            record.get_str("intl_partner_universities_count_llm_confidence"),
            Some("medium")
        );
        assert_eq!(
            record.get_str("intl_partner_universities_count_llm_source"),
            Some("https://x.edu.cn")
        );

        let prompt = provider.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("某学院"));
        assert!(prompt.contains("\"students_total\":12000"));
        assert!(prompt.contains("合作高校数量"));
        assert!(!prompt.contains("就业率"));
    }

    #[tokio::test]
    async fn test_no_residual_skips_provider() {
        let provider = StubProvider::replying("{}");
        let pass = EnrichmentPass::new(settings(), provider.clone());
        let mut record = Record::new("某学院")
            .with_field("intl_partner_universities_count", 10)
            .with_field("employment_rate_2024", 0.9);
        let outcome = pass.enrich_record(&mut record).await.unwrap();
        assert!(outcome.skipped());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_reply_keeps_nulls() {
        let provider = StubProvider::replying("今天无法访问网络");
        let pass = EnrichmentPass::new(settings(), provider);
        let mut record = Record::new("某学院");
        let result = pass.enrich_record(&mut record).await;
        assert!(matches!(result, Err(EnrichmentError::NotJson(_))));
        assert!(record.fields.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let provider = Arc::new(StubProvider {
            reply: Err("timeout".to_string()),
            prompts: Mutex::new(Vec::new()),
        });
        let pass = EnrichmentPass::new(settings(), provider);
        let mut record = Record::new("某学院");
        assert!(matches!(
            pass.enrich_record(&mut record).await,
            Err(EnrichmentError::Transport(_))
        ));
    }

    #[test]
    fn test_default_targets_cover_index_inputs() {
        let fields = EnrichmentSettings::default().numeric_target_fields();
        for field in ["languages_offered_count", "foreign_major_count", "asean_program_count"] {
            assert!(fields.iter().any(|f| f == field));
        }
        assert!(!fields.iter().any(|f| f == "languages_list"));
    }
}
