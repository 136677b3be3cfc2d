use regex::{Captures, Regex};
use tracing::debug;

use super::numeric::{parse_chinese_numeral, parse_float, parse_integer, parse_magnitude};
use crate::model::{FieldMap, FieldValue, PartialFieldMap};
use crate::util::rules::{Coercion, ExtractionRule, RuleError, RuleSet};

struct CompiledRule {
    rule: ExtractionRule,
    regexes: Vec<Regex>,
}

/// 基于有序规则集的正则抽取器
///
/// 规则在构造时编译一次，之后 [`PatternExtractor::extract`] 只读且幂等。
pub struct PatternExtractor {
    rules: Vec<CompiledRule>,
}

impl PatternExtractor {
    pub fn new(rule_set: &RuleSet) -> Result<Self, RuleError> {
        let mut rules = Vec::with_capacity(rule_set.rules.len());
        for rule in &rule_set.rules {
            rules.push(compile_rule(rule)?);
        }
        Ok(Self { rules })
    }

    pub fn target_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for compiled in &self.rules {
            for field in compiled.rule.target_fields() {
                if !fields.iter().any(|f| f == field) {
                    fields.push(field.to_string());
                }
            }
        }
        fields
    }

    /// 对一页纯文本应用全部规则
    pub fn extract(&self, text: &str) -> PartialFieldMap {
        let mut values = FieldMap::new();
        if text.trim().is_empty() {
            return PartialFieldMap::default();
        }

        for compiled in &self.rules {
            let rule = &compiled.rule;
            let targets = rule.target_fields();

            for (pattern, regex) in rule.patterns.iter().zip(&compiled.regexes) {
                if targets.iter().all(|t| values.contains_key(*t)) {
                    break;
                }
                let Some(caps) = regex.captures(text) else {
                    continue;
                };
                let Some(raw) = caps.get(pattern.value_group) else {
                    continue;
                };
                let Some(value) = coerce(rule.coercion, raw.as_str()) else {
                    debug!(
                        event = "extract.coerce_failed",
                        rule = %rule.name,
                        raw = raw.as_str()
                    );
                    continue;
                };
                if !value.as_f64().is_some_and(|v| rule.guard.accepts(v)) {
                    debug!(
                        event = "extract.guard_rejected",
                        rule = %rule.name,
                        value = %value
                    );
                    continue;
                }

                let target = resolve_target(rule, &caps);
                if values.contains_key(target) {
                    continue;
                }
                values.insert(target.to_string(), value);
            }
        }

        PartialFieldMap::new(values)
    }
}

fn compile_rule(rule: &ExtractionRule) -> Result<CompiledRule, RuleError> {
    if rule.patterns.is_empty() {
        return Err(RuleError::NoPatterns {
            rule: rule.name.clone(),
        });
    }

    let mut regexes = Vec::with_capacity(rule.patterns.len());
    for pattern in &rule.patterns {
        let regex = Regex::new(&pattern.regex).map_err(|source| RuleError::InvalidRegex {
            rule: rule.name.clone(),
            pattern: pattern.regex.clone(),
            source,
        })?;

        let group_count = regex.captures_len();
        let route_groups = rule.routes.iter().map(|r| r.group);
        for group in std::iter::once(pattern.value_group).chain(route_groups) {
            if group >= group_count {
                return Err(RuleError::UnknownGroup {
                    rule: rule.name.clone(),
                    pattern: pattern.regex.clone(),
                    group,
                });
            }
        }
        regexes.push(regex);
    }

    Ok(CompiledRule {
        rule: rule.clone(),
        regexes,
    })
}

/// 路由按声明顺序检查，第一个命中的限定词决定目标字段
fn resolve_target<'a>(rule: &'a ExtractionRule, caps: &Captures<'_>) -> &'a str {
    rule.routes
        .iter()
        .find(|route| {
            caps.get(route.group)
                .is_some_and(|m| m.as_str().contains(route.contains.as_str()))
        })
        .map(|route| route.target.as_str())
        .unwrap_or_else(|| rule.target_field())
}

fn coerce(coercion: Coercion, raw: &str) -> Option<FieldValue> {
    match coercion {
        Coercion::Integer => parse_integer(raw).map(FieldValue::Int),
        Coercion::Magnitude => parse_magnitude(raw).map(FieldValue::Int),
        Coercion::ChineseNumeral => parse_chinese_numeral(raw).map(FieldValue::Int),
        Coercion::Float => parse_float(raw).map(FieldValue::Float),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::rules::{defaults, ValueGuard};

    fn extractor() -> PatternExtractor {
        PatternExtractor::new(&defaults::basic_metric_rules()).unwrap()
    }

    #[test]
    fn test_founded_year_and_students() {
        let map = extractor().extract("学校始建于1985年，现有在校生18000人。");
        assert_eq!(map.get("founded_year"), Some(&FieldValue::Int(1985)));
        assert_eq!(map.get("students_total"), Some(&FieldValue::Int(18000)));
    }

    #[test]
    fn test_year_guard_rejects_out_of_range() {
        let map = extractor().extract("创办于1850年");
        assert!(!map.contains_key("founded_year"));
    }

    #[test]
    fn test_magnitude_and_second_pattern() {
        let map = extractor().extract("全日制本科生1.2万人，占地面积80万平方米，馆藏图书120万册");
        assert_eq!(map.get("students_total"), Some(&FieldValue::Int(12000)));
        assert_eq!(map.get("campus_area_m2"), Some(&FieldValue::Int(800000)));
        assert_eq!(map.get("library_books"), Some(&FieldValue::Int(1200000)));
    }

    #[test]
    fn test_qualifier_routing() {
        let map = extractor().extract("现有教职工1200人，其中专任教师900人");
        assert_eq!(map.get("fulltime_teachers"), Some(&FieldValue::Int(900)));
        assert_eq!(map.get("teachers_total"), Some(&FieldValue::Int(1200)));
    }

    #[test]
    fn test_fulltime_only_does_not_fill_total() {
        let map = extractor().extract("学校现有专任教师900人");
        assert_eq!(map.get("fulltime_teachers"), Some(&FieldValue::Int(900)));
        assert!(!map.contains_key("teachers_total"));

        let map = extractor().extract("教师650人");
        assert_eq!(map.get("teachers_total"), Some(&FieldValue::Int(650)));
    }

    #[test]
    fn test_multi_digit_counts() {
        let map = extractor().extract("学校下设12个学院，开设45个本科专业，拥有12个校区");
        assert_eq!(map.get("college_count"), Some(&FieldValue::Int(12)));
        assert_eq!(map.get("major_count"), Some(&FieldValue::Int(45)));
        assert_eq!(map.get("campus_count"), Some(&FieldValue::Int(12)));

        let map = extractor().extract("学校设有10个校区");
        assert_eq!(map.get("campus_count"), Some(&FieldValue::Int(10)));
    }

    #[test]
    fn test_chinese_numeral_and_ratio() {
        let map = extractor().extract("学校拥有两个校区，师生比为17.5:1");
        assert_eq!(map.get("campus_count"), Some(&FieldValue::Int(2)));
        assert_eq!(map.get("student_teacher_ratio"), Some(&FieldValue::Float(17.5)));
    }

    #[test]
    fn test_rejected_match_falls_through_to_next_pattern() {
        let rules = RuleSet::new(vec![ExtractionRule::new("n", Coercion::Integer)
            .pattern(r"甲(\d+)", 1)
            .pattern(r"乙(\d+)", 1)
            .guard(ValueGuard::positive())]);
        let extractor = PatternExtractor::new(&rules).unwrap();
        let map = extractor.extract("甲0 乙7");
        assert_eq!(map.get("n"), Some(&FieldValue::Int(7)));
    }

    #[test]
    fn test_extract_is_idempotent() {
        let text = "设有12个二级学院，开设45个本科专业，实验室80个";
        let ex = extractor();
        let first = ex.extract(text);
        assert_eq!(first, ex.extract(text));
        assert_eq!(first.get("college_count"), Some(&FieldValue::Int(12)));
        assert_eq!(first.get("major_count"), Some(&FieldValue::Int(45)));
        assert_eq!(first.get("labs_count"), Some(&FieldValue::Int(80)));
    }

    #[test]
    fn test_empty_text() {
        assert!(extractor().extract("  ").is_empty());
    }

    #[test]
    fn test_invalid_rule_definitions() {
        let bad_regex = RuleSet::new(vec![
            ExtractionRule::new("x", Coercion::Integer).pattern(r"(\d+", 1)
        ]);
        assert!(matches!(
            PatternExtractor::new(&bad_regex),
            Err(RuleError::InvalidRegex { .. })
        ));

        let bad_group = RuleSet::new(vec![
            ExtractionRule::new("x", Coercion::Integer).pattern(r"(\d+)", 2)
        ]);
        assert!(matches!(
            PatternExtractor::new(&bad_group),
            Err(RuleError::UnknownGroup { group: 2, .. })
        ));

        let empty = RuleSet::new(vec![ExtractionRule::new("x", Coercion::Integer)]);
        assert!(matches!(
            PatternExtractor::new(&empty),
            Err(RuleError::NoPatterns { .. })
        ));
    }
}
