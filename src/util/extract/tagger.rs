//! 关键词打标与文本国际化打分

use serde::{Deserialize, Serialize};

/// 分类标签及其触发词
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagLabel {
    pub label: String,
    pub triggers: Vec<String>,
}

impl TagLabel {
    pub fn new(label: &str, triggers: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// 关键词打标器
///
/// 标签表与打分词表在构造时传入，之后只读。
#[derive(Debug, Clone)]
pub struct KeywordTagger {
    labels: Vec<(String, Vec<String>)>,
    score_keywords: Vec<String>,
}

impl KeywordTagger {
    pub fn new(taxonomy: &[TagLabel], score_keywords: &[String]) -> Self {
        let labels = taxonomy
            .iter()
            .map(|entry| {
                let triggers = entry
                    .triggers
                    .iter()
                    .filter(|t| !t.is_empty())
                    .map(|t| t.to_lowercase())
                    .collect();
                (entry.label.clone(), triggers)
            })
            .collect();
        Self {
            labels,
            score_keywords: score_keywords
                .iter()
                .filter(|k| !k.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// 命中的标签，按分类表顺序、去重；拉丁字母触发词大小写不敏感
    pub fn tag(&self, text: &str) -> Vec<String> {
        let mut hits: Vec<String> = Vec::new();
        if text.trim().is_empty() {
            return hits;
        }
        let lowered = text.to_lowercase();
        for (label, triggers) in &self.labels {
            if hits.contains(label) {
                continue;
            }
            if triggers.iter().any(|t| lowered.contains(t.as_str())) {
                hits.push(label.clone());
            }
        }
        hits
    }

    /// 标签以 `", "` 连接，用于写回表格
    pub fn tag_joined(&self, text: &str) -> String {
        self.tag(text).join(", ")
    }

    /// `总命中次数 + 0.5 * 命中的不同关键词数`，大小写敏感，空文本为 0
    pub fn score(&self, text: &str) -> f64 {
        let mut total = 0usize;
        let mut distinct = 0usize;
        for keyword in &self.score_keywords {
            let count = text.matches(keyword.as_str()).count();
            total += count;
            if count > 0 {
                distinct += 1;
            }
        }
        total as f64 + 0.5 * distinct as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::rules::defaults;

    fn tagger() -> KeywordTagger {
        KeywordTagger::new(&defaults::positioning_taxonomy(), &defaults::tli_keywords())
    }

    #[test]
    fn test_tag_applied_university() {
        let labels = tagger().tag("应用技术型大学");
        assert!(labels.contains(&"应用型".to_string()));
        assert!(tagger().tag("").is_empty());
    }

    #[test]
    fn test_tag_case_insensitive_and_ordered() {
        let labels = tagger().tag("推进产教融合，深化与 ASEAN 国家的 International 交流");
        assert_eq!(labels, vec!["应用型", "国际化", "东盟"]);
    }

    #[test]
    fn test_tag_dedup_repeated_label() {
        let taxonomy = vec![TagLabel::new("师范", &["师范"]), TagLabel::new("师范", &["教师教育"])];
        let tagger = KeywordTagger::new(&taxonomy, &[]);
        assert_eq!(tagger.tag("师范 教师教育"), vec!["师范"]);
    }

    #[test]
    fn test_score_formula() {
        let tagger = KeywordTagger::new(&[], &["国际化".to_string(), "东盟".to_string()]);
        // 国际化 x2, 东盟 x1 -> 3 + 0.5 * 2
        assert_eq!(tagger.score("国际化 东盟 国际化"), 4.0);
        assert_eq!(tagger.score(""), 0.0);
    }

    #[test]
    fn test_score_monotonic_in_keyword() {
        let tagger = tagger();
        let text = "学校坚持开放办学";
        assert!(tagger.score(&format!("{} 国际化", text)) >= tagger.score(text));
    }

    #[test]
    fn test_score_case_sensitive() {
        let tagger = KeywordTagger::new(&[], &["RCEP".to_string()]);
        assert_eq!(tagger.score("rcep"), 0.0);
        assert_eq!(tagger.score("RCEP"), 1.5);
    }
}
