//! 模型补全流程：逐条记录补全剩余字段，失败记录保持原样

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{PROFILE_SNIPPET_COLUMN, STATUS_COLUMN};
use crate::model::{Record, RecordTable, Status};
use crate::storage::TableStore;
use crate::util::enrichment::EnrichmentPass;
use crate::util::merge::MergedMetrics;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentSummary {
    pub total: usize,
    pub skipped: usize,
    pub requested: usize,
    pub failed: usize,
    pub fields_filled: usize,
}

pub struct EnrichmentRunner {
    pass: EnrichmentPass,
    store: Arc<dyn TableStore>,
    status_fields: Vec<String>,
}

impl EnrichmentRunner {
    pub fn new(pass: EnrichmentPass, store: Arc<dyn TableStore>) -> Self {
        let status_fields = pass.settings().numeric_target_fields();
        Self {
            pass,
            store,
            status_fields,
        }
    }

    /// 追加参与状态判定的数值字段（通常是抽取规则的目标字段）
    pub fn with_status_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.status_fields.contains(&field) {
                self.status_fields.push(field);
            }
        }
        self
    }

    pub async fn run(&self) -> Result<EnrichmentSummary> {
        let mut table = self.store.load().await.context("加载记录表失败")?;
        let summary = self.run_on(&mut table).await;
        self.store.save(&table).await.context("保存记录表失败")?;

        info!(
            event = "enrichment.finished",
            total = summary.total,
            skipped = summary.skipped,
            requested = summary.requested,
            failed = summary.failed,
            filled = summary.fields_filled
        );
        Ok(summary)
    }

    pub async fn run_on(&self, table: &mut RecordTable) -> EnrichmentSummary {
        let settings = self.pass.settings();
        let delay = Duration::from_millis(settings.request_delay_ms);
        let save_every = settings.save_every;

        let mut summary = EnrichmentSummary {
            total: table.len(),
            ..Default::default()
        };
        let mut unsaved = 0usize;

        for name in table.names() {
            let Some(mut record) = table.get(&name).cloned() else {
                continue;
            };
            if self.pass.residual_targets(&record).is_empty() {
                debug!(event = "enrichment.skip_complete", school = %name);
                summary.skipped += 1;
                continue;
            }

            if summary.requested > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            summary.requested += 1;

            match self.pass.enrich_record(&mut record).await {
                Ok(outcome) => {
                    summary.fields_filled += outcome.filled.len();
                    if !outcome.filled.is_empty() {
                        refresh_status(&mut record, &self.status_fields);
                    }
                    table.upsert(record);
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(event = "enrichment.record_failed", school = %name, error = %e);
                }
            }

            unsaved += 1;
            if save_every > 0 && unsaved >= save_every {
                if let Err(e) = self.store.save(table).await {
                    warn!(event = "enrichment.checkpoint_failed", error = %e);
                } else {
                    unsaved = 0;
                }
            }
        }
        summary
    }
}

/// 合并后重新判定状态；已是 ok 的记录不降级
fn refresh_status(record: &mut Record, status_fields: &[String]) {
    let current = record.status(STATUS_COLUMN);
    if current.is_ok() {
        return;
    }
    let has_numeric = MergedMetrics::seeded_from(record, status_fields).has_numeric(status_fields);
    let has_profile = record
        .get_str(PROFILE_SNIPPET_COLUMN)
        .is_some_and(|s| !s.is_empty());
    let status = Status::derive(has_numeric, has_profile);
    if status != current {
        debug!(
            event = "enrichment.status_changed",
            school = %record.name,
            from = current.as_str(),
            to = status.as_str()
        );
        record.set(STATUS_COLUMN, status.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::storage::JsonTableStore;
    use crate::util::enrichment::{
        CompletionProvider, EnrichmentError, EnrichmentSettings, EnrichmentTarget, TargetKind,
    };
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// 按学校名称返回预设回复
    struct ScriptedProvider;

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, EnrichmentError> {
            if prompt.contains("甲学院") {
                Ok(r#"{"foreign_major_count": {"value": 6, "confidence": "high"}}"#.to_string())
            } else {
                Ok("服务繁忙".to_string())
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_failures_keep_nulls_and_run_continues() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonTableStore::new(dir.path().join("t.json"), "school_name"));
        let table = RecordTable::from_records(
            "school_name",
            vec![
                Record::new("甲学院"),
                Record::new("乙学院"),
                Record::new("丙学院").with_field("foreign_major_count", 3),
            ],
        );
        store.save(&table).await.unwrap();

        let settings = EnrichmentSettings {
            enabled: true,
            targets: vec![EnrichmentTarget::new(
                "foreign_major_count",
                "外语类专业数量",
                TargetKind::Integer,
            )],
            request_delay_ms: 0,
            save_every: 1,
            ..EnrichmentSettings::default()
        };
        let runner = EnrichmentRunner::new(
            EnrichmentPass::new(settings, Arc::new(ScriptedProvider)),
            store.clone(),
        );
        let summary = runner.run().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.requested, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.fields_filled, 1);

        let saved = store.load().await.unwrap();
        assert_eq!(saved.get("甲学院").unwrap().get_f64("foreign_major_count"), Some(6.0));
        assert_eq!(
            saved.get("甲学院").unwrap().get_str("foreign_major_count_llm_confidence"),
            Some("high")
        );
        assert!(saved.get("乙学院").unwrap().is_empty_field("foreign_major_count"));
        assert_eq!(saved.get("丙学院").unwrap().get_f64("foreign_major_count"), Some(3.0));
    }

    #[tokio::test]
    async fn test_filled_fields_promote_status() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonTableStore::new(dir.path().join("t.json"), "school_name"));
        let mut table = RecordTable::from_records(
            "school_name",
            vec![
                Record::new("甲学院").with_field(STATUS_COLUMN, "missing"),
                Record::new("乙学院").with_field(STATUS_COLUMN, "missing"),
            ],
        );

        let settings = EnrichmentSettings {
            enabled: true,
            targets: vec![EnrichmentTarget::new(
                "foreign_major_count",
                "外语类专业数量",
                TargetKind::Integer,
            )],
            request_delay_ms: 0,
            save_every: 0,
            ..EnrichmentSettings::default()
        };
        let runner = EnrichmentRunner::new(
            EnrichmentPass::new(settings, Arc::new(ScriptedProvider)),
            store,
        )
        .with_status_fields(["college_count"]);
        runner.run_on(&mut table).await;

        let enriched = table.get("甲学院").unwrap();
        assert_eq!(enriched.get_f64("foreign_major_count"), Some(6.0));
        assert_eq!(enriched.status(STATUS_COLUMN), Status::Ok);
        assert_eq!(table.get("乙学院").unwrap().status(STATUS_COLUMN), Status::Missing);
    }

    #[test]
    fn test_refresh_status_never_downgrades_ok() {
        let fields = vec!["college_count".to_string()];

        let mut ok = Record::new("甲学院").with_field(STATUS_COLUMN, "ok");
        refresh_status(&mut ok, &fields);
        assert_eq!(ok.status(STATUS_COLUMN), Status::Ok);

        let mut profile_only = Record::new("乙学院")
            .with_field(STATUS_COLUMN, "missing")
            .with_field(PROFILE_SNIPPET_COLUMN, "学校简介");
        refresh_status(&mut profile_only, &fields);
        assert_eq!(profile_only.status(STATUS_COLUMN), Status::Partial);

        let mut counted = Record::new("丙学院")
            .with_field(STATUS_COLUMN, "partial")
            .with_field("college_count", 12);
        refresh_status(&mut counted, &fields);
        assert_eq!(counted.status(STATUS_COLUMN), Status::Ok);
    }
}
