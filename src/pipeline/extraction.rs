//! 抽取流程：逐条记录抓取候选页面、规则抽取、写回，定期保存

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::candidates::{CandidateSettings, CandidateSupplier};
use super::{
    LAST_CRAWLED_COLUMN, POSITIONING_COLUMN, PROFILE_SNIPPET_COLUMN, PROFILE_URL_COLUMN,
    STATUS_COLUMN,
};
use crate::model::{Record, RecordTable, Status};
use crate::storage::{PageSource, TableStore};
use crate::util::extract::{normalize_whitespace, PageDocument, RecordExtractor};
use crate::util::merge::{merge_into_record, MergedMetrics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub candidates: CandidateSettings,
    /// 每条记录最多使用的有效页面数
    pub max_pages_per_record: usize,
    /// 每处理多少条记录保存一次
    pub save_every: usize,
    /// 在官网首页上按链接文字发现概况页
    pub discover_about_links: bool,
    /// 只读本地页面缓存，不访问网络
    pub offline: bool,
    /// 状态为 ok 的记录跳过
    pub skip_ok: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            candidates: CandidateSettings::default(),
            max_pages_per_record: 10,
            save_every: 5,
            discover_about_links: true,
            offline: false,
            skip_ok: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub total: usize,
    pub skipped: usize,
    pub ok: usize,
    pub partial: usize,
    pub missing: usize,
    pub pages_fetched: usize,
    /// 本次运行所用规则集的指纹
    pub rules_fingerprint: String,
}

impl ExtractionSummary {
    fn record(&mut self, status: Status) {
        match status {
            Status::Ok => self.ok += 1,
            Status::Partial => self.partial += 1,
            Status::Missing => self.missing += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.ok + self.partial + self.missing
    }
}

pub struct ExtractionRunner {
    extractor: RecordExtractor,
    source: Arc<dyn PageSource>,
    store: Arc<dyn TableStore>,
    settings: ExtractionSettings,
}

impl ExtractionRunner {
    pub fn new(
        extractor: RecordExtractor,
        source: Arc<dyn PageSource>,
        store: Arc<dyn TableStore>,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            extractor,
            source,
            store,
            settings,
        }
    }

    pub async fn run(&self) -> Result<ExtractionSummary> {
        let mut table = self.store.load().await.context("加载记录表失败")?;
        let summary = self.run_on(&mut table).await?;
        self.store.save(&table).await.context("保存记录表失败")?;

        info!(
            event = "extraction.finished",
            total = summary.total,
            skipped = summary.skipped,
            ok = summary.ok,
            partial = summary.partial,
            missing = summary.missing,
            pages = summary.pages_fetched,
            rules = %summary.rules_fingerprint
        );
        Ok(summary)
    }

    /// 对已加载的表逐条处理；按 `save_every` 中途保存
    pub async fn run_on(&self, table: &mut RecordTable) -> Result<ExtractionSummary> {
        let supplier = CandidateSupplier::new(self.settings.candidates.clone(), table)
            .context("候选地址列配置与记录表不匹配")?;
        for column in [
            STATUS_COLUMN,
            LAST_CRAWLED_COLUMN,
            PROFILE_URL_COLUMN,
            PROFILE_SNIPPET_COLUMN,
            POSITIONING_COLUMN,
        ] {
            table.ensure_column(column);
        }

        let mut summary = ExtractionSummary {
            total: table.len(),
            rules_fingerprint: self.extractor.rules_fingerprint().to_string(),
            ..Default::default()
        };
        let mut unsaved = 0usize;

        for (position, name) in table.names().into_iter().enumerate() {
            let Some(mut record) = table.get(&name).cloned() else {
                continue;
            };
            if self.settings.skip_ok && record.status(STATUS_COLUMN).is_ok() {
                debug!(event = "extraction.skip_ok", school = %name);
                summary.skipped += 1;
                continue;
            }

            info!(
                event = "extraction.record_start",
                school = %name,
                position = position + 1,
                total = summary.total
            );
            let (status, pages) = self.process_record(&supplier, &mut record).await;
            summary.record(status);
            summary.pages_fetched += pages;
            table.upsert(record);

            unsaved += 1;
            if self.settings.save_every > 0 && unsaved >= self.settings.save_every {
                if let Err(e) = self.store.save(table).await {
                    warn!(event = "extraction.checkpoint_failed", error = %e);
                } else {
                    debug!(event = "extraction.checkpoint", processed = summary.processed());
                    unsaved = 0;
                }
            }
        }
        Ok(summary)
    }

    /// 处理单条记录，返回状态与实际使用的页面数
    pub async fn process_record(
        &self,
        supplier: &CandidateSupplier,
        record: &mut Record,
    ) -> (Status, usize) {
        let crawled_at = chrono::Local::now().to_rfc3339();
        let mut candidates = supplier.candidates(record);
        if candidates.is_empty() {
            warn!(event = "extraction.no_candidates", school = %record.name);
            record.set(STATUS_COLUMN, Status::Missing.as_str());
            record.set(LAST_CRAWLED_COLUMN, crawled_at);
            return (Status::Missing, 0);
        }

        let official = supplier.official_url(record);
        let mut pages: Vec<PageDocument> = Vec::new();
        let mut next = 0;
        while next < candidates.len() && pages.len() < self.settings.max_pages_per_record {
            let url = candidates[next].clone();
            next += 1;

            let Some(html) = self.source.fetch(&url).await else {
                debug!(event = "extraction.page_unavailable", school = %record.name, url = %url);
                continue;
            };
            let page = PageDocument::from_html(url.as_str(), &html);

            if self.settings.discover_about_links
                && pages.is_empty()
                && official.as_deref() == Some(url.as_str())
            {
                let mut discovered = 0;
                for link in page.links_matching(supplier.about_link_keywords()) {
                    if supplier.admit(&mut candidates, &link) {
                        discovered += 1;
                    }
                }
                if discovered > 0 {
                    info!(event = "extraction.about_links", school = %record.name, discovered);
                }
            }
            pages.push(page);
        }

        let existing_profile = record
            .get_str(PROFILE_SNIPPET_COLUMN)
            .filter(|s| !s.is_empty())
            .map(normalize_whitespace);

        let seed = MergedMetrics::seeded_from(record, self.extractor.status_fields());
        let outcome = self
            .extractor
            .extract_record_seeded(seed, &pages, self.source.pass_kind());

        let filled = merge_into_record(record, outcome.metrics.values());

        let has_profile = match (&existing_profile, &outcome.profile) {
            (Some(existing), _) => {
                let tags = self.extractor.tagger().tag_joined(existing);
                record.set(POSITIONING_COLUMN, tags);
                true
            }
            (None, Some(selection)) => {
                let max_chars = self.extractor.profile_selector().settings().snippet_max_chars;
                record.set(PROFILE_URL_COLUMN, selection.source_url.as_str());
                record.set(PROFILE_SNIPPET_COLUMN, selection.snippet(max_chars));
                record.set(POSITIONING_COLUMN, outcome.tags.join(", "));
                true
            }
            (None, None) => false,
        };

        let status = Status::derive(
            outcome.metrics.has_numeric(self.extractor.status_fields()),
            has_profile,
        );
        record.set(STATUS_COLUMN, status.as_str());
        record.set(LAST_CRAWLED_COLUMN, crawled_at);

        info!(
            event = "extraction.record_done",
            school = %record.name,
            status = status.as_str(),
            pages = pages.len(),
            filled = filled.len()
        );
        (status, pages.len())
    }
}
