//! 派生字段：列表计数与文本国际化原始分

use serde::{Deserialize, Serialize};

use super::tagger::KeywordTagger;
use crate::model::{FieldMap, FieldValue, Record};
use crate::util::merge::merge_into_record;

const LIST_SEPARATORS: &[char] = &['、', '，', ',', ';', '；', '/', '\\', '|'];

/// 由列表文本列推断计数列，例如 `languages_list` -> `languages_offered_count`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListCountRule {
    pub source: String,
    pub target: String,
}

/// 拆分列表文本并计数非空项；没有任何项时返回 None
pub fn count_list_items(text: &str) -> Option<i64> {
    let count = text
        .split(LIST_SEPARATORS)
        .filter(|part| !part.trim().is_empty())
        .count();
    if count == 0 {
        None
    } else {
        Some(count as i64)
    }
}

/// 目标列为空时由源列推断，返回写入的目标列
pub fn apply_list_counts(record: &mut Record, rules: &[ListCountRule]) -> Vec<String> {
    let mut derived = FieldMap::new();
    for rule in rules {
        if !record.is_empty_field(&rule.target) {
            continue;
        }
        if let Some(count) = record.get_str(&rule.source).and_then(count_list_items) {
            derived.insert(rule.target.clone(), FieldValue::Int(count));
        }
    }
    merge_into_record(record, &derived)
}

/// 拼接若干文本列（跳过空值与非文本值），以换行分隔
pub fn combined_text(record: &Record, columns: &[String]) -> String {
    columns
        .iter()
        .filter_map(|column| record.get_str(column))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 文本国际化原始分：对拼接文本打分
pub fn text_intl_score(record: &Record, columns: &[String], tagger: &KeywordTagger) -> f64 {
    tagger.score(&combined_text(record, columns))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_list_items() {
        assert_eq!(count_list_items("英语、日语、韩语"), Some(3));
        assert_eq!(count_list_items("英语, 泰语；越南语 | 老挝语/缅甸语"), Some(5));
        assert_eq!(count_list_items(" 、 ，"), None);
    }

    #[test]
    fn test_apply_list_counts_fill_only() {
        let rules = vec![ListCountRule {
            source: "languages_list".into(),
            target: "languages_offered_count".into(),
        }];

        let mut empty = Record::new("甲").with_field("languages_list", "英语、泰语");
        assert_eq!(apply_list_counts(&mut empty, &rules), vec!["languages_offered_count"]);
        assert_eq!(empty.get_f64("languages_offered_count"), Some(2.0));

        let mut filled = Record::new("乙")
            .with_field("languages_list", "英语、泰语")
            .with_field("languages_offered_count", 6);
        assert!(apply_list_counts(&mut filled, &rules).is_empty());
        assert_eq!(filled.get_f64("languages_offered_count"), Some(6.0));
    }

    #[test]
    fn test_text_intl_score() {
        let tagger = KeywordTagger::new(&[], &["国际化".to_string(), "东盟".to_string()]);
        let record = Record::new("丙")
            .with_field("profile_text_snippet", "国际化办学")
            .with_field("positioning_keywords", "国际化, 东盟")
            .with_field("students_total", 100);
        let columns = vec![
            "profile_text_snippet".to_string(),
            "positioning_keywords".to_string(),
            "students_total".to_string(),
            "missing".to_string(),
        ];
        assert_eq!(combined_text(&record, &columns), "国际化办学\n国际化, 东盟");
        assert_eq!(text_intl_score(&record, &columns, &tagger), 4.0);
    }
}
