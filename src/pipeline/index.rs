//! 指数流程：派生字段 → 综合指数 → 写出结果表与报告

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::model::RecordTable;
use crate::storage::TableStore;
use crate::util::extract::derive::{apply_list_counts, text_intl_score, ListCountRule};
use crate::util::extract::KeywordTagger;
use crate::util::index::{IndexBuilder, IndexReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedFieldSettings {
    pub list_counts: Vec<ListCountRule>,
    /// 参与文本国际化打分的文本列
    pub tli_text_columns: Vec<String>,
    pub tli_column: String,
}

impl Default for DerivedFieldSettings {
    fn default() -> Self {
        Self {
            list_counts: vec![ListCountRule {
                source: "languages_list".to_string(),
                target: "languages_offered_count".to_string(),
            }],
            tli_text_columns: [
                "profile_text_snippet",
                "intl_text_snippet",
                "asean_text_snippet",
                "positioning_keywords",
                "intl_keywords",
                "asean_keywords",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            tli_column: "raw_tli_score".to_string(),
        }
    }
}

/// 派生字段写回；列表计数只填空值，国际化原始分每次重算
pub fn apply_derived_fields(
    table: &mut RecordTable,
    settings: &DerivedFieldSettings,
    tli_tagger: &KeywordTagger,
) -> usize {
    let mut filled = 0;
    for name in table.names() {
        let Some(record) = table.get_mut(&name) else {
            continue;
        };
        filled += apply_list_counts(record, &settings.list_counts).len();
        let score = text_intl_score(record, &settings.tli_text_columns, tli_tagger);
        record.set(settings.tli_column.as_str(), score);
    }
    for rule in &settings.list_counts {
        table.ensure_column(&rule.target);
    }
    table.ensure_column(&settings.tli_column);
    table.sync_columns();
    filled
}

pub struct IndexRunner {
    builder: IndexBuilder,
    derived: DerivedFieldSettings,
    tli_tagger: KeywordTagger,
    input: Arc<dyn TableStore>,
    output: Arc<dyn TableStore>,
    report_path: Option<PathBuf>,
}

impl IndexRunner {
    pub fn new(
        builder: IndexBuilder,
        derived: DerivedFieldSettings,
        tli_tagger: KeywordTagger,
        input: Arc<dyn TableStore>,
        output: Arc<dyn TableStore>,
    ) -> Self {
        Self {
            builder,
            derived,
            tli_tagger,
            input,
            output,
            report_path: None,
        }
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub async fn run(&self) -> Result<IndexReport> {
        let mut table = self.input.load().await.context("加载记录表失败")?;
        let filled = apply_derived_fields(&mut table, &self.derived, &self.tli_tagger);
        info!(event = "index.derived_fields", filled, tli_column = %self.derived.tli_column);

        let (scored, report) = self.builder.build(&table).context("综合指数构建失败")?;
        self.output.save(&scored).await.context("保存指数结果失败")?;

        if let Some(path) = &self.report_path {
            let data = serde_json::to_vec_pretty(&report).context("序列化指数报告失败")?;
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            tokio::fs::write(path, data)
                .await
                .with_context(|| format!("写入指数报告失败: {}", path.display()))?;
        }

        info!(
            event = "index.finished",
            rows = report.rows,
            kept = report.kept_columns.len(),
            dropped = report.dropped_columns.len(),
            output = %self.output.describe()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::storage::JsonTableStore;
    use crate::util::index::{ComponentSpec, CompositeSpec, IndexSettings, SubIndexSpec, Transform, WeightSpec};
    use crate::util::rules::defaults;
    use tempfile::TempDir;

    fn tli_tagger() -> KeywordTagger {
        KeywordTagger::new(&[], &defaults::tli_keywords())
    }

    #[test]
    fn test_derived_fields() {
        let mut table = RecordTable::from_records(
            "school_name",
            vec![
                Record::new("甲学院")
                    .with_field("languages_list", "英语、日语、泰语")
                    .with_field("profile_text_snippet", "坚持国际化办学"),
                Record::new("乙学院")
                    .with_field("languages_list", "英语")
                    .with_field("languages_offered_count", 4),
            ],
        );
        let filled = apply_derived_fields(&mut table, &DerivedFieldSettings::default(), &tli_tagger());
        assert_eq!(filled, 1);
        assert_eq!(table.get("甲学院").unwrap().get_f64("languages_offered_count"), Some(3.0));
        assert_eq!(table.get("乙学院").unwrap().get_f64("languages_offered_count"), Some(4.0));
        assert!(table.get("甲学院").unwrap().get_f64("raw_tli_score").unwrap() > 0.0);
        assert_eq!(table.get("乙学院").unwrap().get_f64("raw_tli_score"), Some(0.0));
        assert!(table.has_column("raw_tli_score"));
    }

    #[tokio::test]
    async fn test_run_writes_scores_and_report() {
        let dir = TempDir::new().unwrap();
        let input = Arc::new(JsonTableStore::new(dir.path().join("in.json"), "school_name"));
        let output = Arc::new(JsonTableStore::new(dir.path().join("out.json"), "school_name"));
        input
            .save(&RecordTable::from_records(
                "school_name",
                vec![
                    Record::new("甲学院")
                        .with_field("languages_list", "英语、日语、泰语、越南语")
                        .with_field("profile_text_snippet", "国际化 东盟 留学生"),
                    Record::new("乙学院")
                        .with_field("languages_list", "英语")
                        .with_field("profile_text_snippet", "应用型"),
                ],
            ))
            .await
            .unwrap();

        let settings = IndexSettings {
            pca: None,
            sub_indices: vec![
                SubIndexSpec {
                    name: "LRI".to_string(),
                    components: vec![ComponentSpec::new("languages_offered_count", 1.0, Transform::Log1p)],
                },
                SubIndexSpec {
                    name: "TLI".to_string(),
                    components: vec![ComponentSpec::new("raw_tli_score", 1.0, Transform::None)],
                },
            ],
            composite: CompositeSpec {
                weights: vec![
                    WeightSpec { sub_index: "LRI".to_string(), weight: 0.5 },
                    WeightSpec { sub_index: "TLI".to_string(), weight: 0.5 },
                ],
                ..CompositeSpec::default()
            },
            ..IndexSettings::default()
        };
        let report_path = dir.path().join("reports/index.json");
        let runner = IndexRunner::new(
            IndexBuilder::new(settings).unwrap(),
            DerivedFieldSettings::default(),
            tli_tagger(),
            input.clone(),
            output.clone(),
        )
        .with_report_path(&report_path);

        let report = runner.run().await.unwrap();
        assert_eq!(report.rows, 2);
        assert!(report_path.exists());

        let scored = output.load().await.unwrap();
        assert_eq!(scored.get("甲学院").unwrap().get_f64("IACI_rank"), Some(1.0));
        assert_eq!(scored.get("乙学院").unwrap().get_f64("IACI_rank"), Some(2.0));
        assert!(input.load().await.unwrap().get("甲学院").unwrap().is_empty_field("IACI"));
    }
}
