//! 页面文本抽取：数值指标、简介文本、定位标签

pub mod derive;
pub mod numeric;
pub mod page;
pub mod pattern;
pub mod profile;
pub mod tagger;

use tracing::debug;

use crate::model::{PassKind, Provenance, Status};
use crate::util::merge::MergedMetrics;
use crate::util::rules::{compute_rule_set_fingerprint, RuleError, RuleSet};

pub use numeric::parse_magnitude;
pub use page::{normalize_whitespace, PageDocument};
pub use pattern::PatternExtractor;
pub use profile::{ProfileSelection, ProfileSelector, ProfileSettings, ProfileStage};
pub use tagger::{KeywordTagger, TagLabel};

/// 单条记录的抽取结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub metrics: MergedMetrics,
    pub profile: Option<ProfileSelection>,
    pub tags: Vec<String>,
    pub status: Status,
    pub pages_used: usize,
}

impl ExtractionOutcome {
    pub fn profile_text(&self) -> Option<&str> {
        self.profile.as_ref().map(|p| p.text.as_str())
    }

    pub fn profile_source_url(&self) -> Option<&str> {
        self.profile.as_ref().map(|p| p.source_url.as_str())
    }
}

/// 记录级抽取入口：逐页规则抽取并合并，再选简介、打标签、判定状态
pub struct RecordExtractor {
    patterns: PatternExtractor,
    profile: ProfileSelector,
    tagger: KeywordTagger,
    status_fields: Vec<String>,
    rules_fingerprint: String,
}

impl RecordExtractor {
    pub fn new(
        rules: &RuleSet,
        profile: ProfileSettings,
        tagger: KeywordTagger,
    ) -> Result<Self, RuleError> {
        let patterns = PatternExtractor::new(rules)?;
        let status_fields = patterns.target_fields();
        Ok(Self {
            patterns,
            profile: ProfileSelector::new(profile),
            tagger,
            status_fields,
            rules_fingerprint: compute_rule_set_fingerprint(rules)?,
        })
    }

    /// 追加参与状态判定的数值字段（如模型补全的目标字段）
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

    pub fn status_fields(&self) -> &[String] {
        &self.status_fields
    }

    /// 当前规则集的 SHA256 指纹
    pub fn rules_fingerprint(&self) -> &str {
        &self.rules_fingerprint
    }

    pub fn patterns(&self) -> &PatternExtractor {
        &self.patterns
    }

    pub fn profile_selector(&self) -> &ProfileSelector {
        &self.profile
    }

    pub fn tagger(&self) -> &KeywordTagger {
        &self.tagger
    }

    pub fn extract_record(&self, pages: &[PageDocument]) -> ExtractionOutcome {
        self.extract_record_seeded(MergedMetrics::new(), pages, PassKind::Rule)
    }

    /// 在已有指标基础上继续抽取；已有非空字段保持不变
    pub fn extract_record_seeded(
        &self,
        seed: MergedMetrics,
        pages: &[PageDocument],
        pass: PassKind,
    ) -> ExtractionOutcome {
        let mut metrics = seed;
        for page in pages {
            let partial = self.patterns.extract(&page.text);
            if partial.is_empty() {
                continue;
            }
            let provenance = Provenance::from_url(pass, &page.url);
            let filled = metrics.absorb(&partial, Some(&provenance));
            debug!(
                event = "extract.page_merged",
                url = %page.url,
                matched = partial.len(),
                filled = filled.len()
            );
        }

        let profile = self.profile.select(pages);
        let tags = profile
            .as_ref()
            .map(|p| self.tagger.tag(&p.text))
            .unwrap_or_default();
        let status = Status::derive(metrics.has_numeric(&self.status_fields), profile.is_some());

        ExtractionOutcome {
            metrics,
            profile,
            tags,
            status,
            pages_used: pages.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;
    use crate::util::rules::defaults;

    fn extractor() -> RecordExtractor {
        RecordExtractor::new(
            &defaults::basic_metric_rules(),
            ProfileSettings::default(),
            KeywordTagger::new(&defaults::positioning_taxonomy(), &defaults::tli_keywords()),
        )
        .unwrap()
    }

    #[test]
    fn test_two_pages_merge_to_ok() {
        let pages = vec![
            PageDocument::from_text("https://www.a.edu.cn/gk/1", "学校始建于1985年"),
            PageDocument::from_text("https://www.a.edu.cn/gk/2", "现有在校生18000人"),
        ];
        let outcome = extractor().extract_record(&pages);
        assert_eq!(outcome.metrics.get("founded_year"), Some(&FieldValue::Int(1985)));
        assert_eq!(outcome.metrics.get("students_total"), Some(&FieldValue::Int(18000)));
        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(
            outcome
                .metrics
                .provenance("students_total")
                .and_then(|p| p.source_url.as_deref()),
            Some("https://www.a.edu.cn/gk/2")
        );
    }

    #[test]
    fn test_rules_fingerprint_follows_rule_set() {
        let mut rules = defaults::basic_metric_rules();
        let base = extractor();
        assert_eq!(base.rules_fingerprint(), extractor().rules_fingerprint());

        rules.rules.pop();
        let trimmed = RecordExtractor::new(
            &rules,
            ProfileSettings::default(),
            KeywordTagger::new(&defaults::positioning_taxonomy(), &defaults::tli_keywords()),
        )
        .unwrap();
        assert_ne!(base.rules_fingerprint(), trimmed.rules_fingerprint());
    }

    #[test]
    fn test_zero_pages_is_missing() {
        let outcome = extractor().extract_record(&[]);
        assert_eq!(outcome.status, Status::Missing);
        assert!(outcome.metrics.is_empty());
        assert!(outcome.profile_text().is_none());
        assert!(outcome.tags.is_empty());
    }

    #[test]
    fn test_profile_only_is_partial_with_tags() {
        let text = "学校秉持应用型人才培养定位，深化产教融合，推进国际化办学，与东盟国家高校开展联合培养。".repeat(5);
        let pages = vec![PageDocument::from_text("https://www.a.edu.cn/about", &text)];
        let outcome = extractor().extract_record(&pages);
        assert_eq!(outcome.status, Status::Partial);
        assert_eq!(outcome.profile_source_url(), Some("https://www.a.edu.cn/about"));
        assert_eq!(outcome.tags, vec!["应用型", "国际化", "东盟"]);
    }

    #[test]
    fn test_earlier_page_wins() {
        let pages = vec![
            PageDocument::from_text("p1", "现有在校生12000人"),
            PageDocument::from_text("p2", "现有在校生15000人"),
        ];
        let outcome = extractor().extract_record(&pages);
        assert_eq!(outcome.metrics.get("students_total"), Some(&FieldValue::Int(12000)));
    }

    #[test]
    fn test_seeded_values_are_kept() {
        let mut seed = MergedMetrics::new();
        seed.fill("students_total", &FieldValue::Int(9000), None);
        let pages = vec![PageDocument::from_text("p1", "现有在校生12000人")];
        let outcome = extractor().extract_record_seeded(seed, &pages, PassKind::OfflineCache);
        assert_eq!(outcome.metrics.get("students_total"), Some(&FieldValue::Int(9000)));
        assert_eq!(outcome.status, Status::Ok);
    }

    #[test]
    fn test_extra_status_fields() {
        let ex = extractor().with_status_fields(["intl_partner_universities_count"]);
        assert!(ex
            .status_fields()
            .iter()
            .any(|f| f == "intl_partner_universities_count"));
    }
}
