//! 模型回复解析：宽松 JSON 提取 + 按目标类型转换取值

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{EnrichmentError, EnrichmentTarget, TargetKind};
use crate::model::{Confidence, FieldValue};
use crate::util::extract::numeric::{parse_float, parse_magnitude};

/// 单个字段的补全建议
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSuggestion {
    pub value: FieldValue,
    pub evidence: Option<String>,
    pub source_url: Option<String>,
    pub confidence: Option<Confidence>,
}

/// 整段文本按 JSON 解析；失败时截取第一个 `{` 到最后一个 `}` 再试一次
pub fn parse_json_lenient(text: &str) -> Result<Value, EnrichmentError> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Ok(value);
            }
        }
    }
    Err(EnrichmentError::NotJson(preview(text)))
}

/// 解析回复并只保留 `targets` 中字段的有效取值
///
/// 接受三种形状：
/// - `{"metrics": {field: {value, evidence, source_url, confidence}}}`
/// - `{field: {value, ...}}`
/// - `{field: scalar}`
pub fn parse_response(
    text: &str,
    targets: &[&EnrichmentTarget],
) -> Result<BTreeMap<String, FieldSuggestion>, EnrichmentError> {
    let root = parse_json_lenient(text)?;
    let Value::Object(object) = root else {
        return Err(EnrichmentError::WrongShape(
            "top-level value is not an object".to_string(),
        ));
    };
    let fields: &Map<String, Value> = match object.get("metrics") {
        Some(Value::Object(inner)) => inner,
        Some(_) => {
            return Err(EnrichmentError::WrongShape(
                "`metrics` is not an object".to_string(),
            ))
        }
        None => &object,
    };

    let mut suggestions = BTreeMap::new();
    for target in targets {
        let Some(entry) = fields.get(&target.field) else {
            continue;
        };
        let suggestion = match entry {
            Value::Object(detail) => FieldSuggestion {
                value: detail
                    .get("value")
                    .and_then(|v| coerce_value(target.kind, v))
                    .unwrap_or_default(),
                evidence: text_field(detail, "evidence"),
                source_url: text_field(detail, "source_url").or_else(|| text_field(detail, "source")),
                confidence: text_field(detail, "confidence").and_then(|c| Confidence::parse(&c)),
            },
            Value::Array(_) => continue,
            scalar => FieldSuggestion {
                value: coerce_value(target.kind, scalar).unwrap_or_default(),
                evidence: None,
                source_url: None,
                confidence: None,
            },
        };
        suggestions.insert(target.field.clone(), suggestion);
    }
    Ok(suggestions)
}

/// 按目标类型转换取值；无法转换或不合法时返回 None
pub fn coerce_value(kind: TargetKind, value: &Value) -> Option<FieldValue> {
    match kind {
        TargetKind::Integer => {
            let number = match value {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => parse_magnitude(s)? as f64,
                _ => return None,
            };
            if !number.is_finite() || number < 0.0 {
                return None;
            }
            Some(FieldValue::Int(number.round() as i64))
        }
        TargetKind::Float => {
            let number = match value {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => parse_float(s)?,
                _ => return None,
            };
            Some(FieldValue::from_f64(number)).filter(|v| !v.is_null())
        }
        TargetKind::Ratio => {
            let number = match value {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => parse_ratio(s)?,
                _ => return None,
            };
            if !number.is_finite() || number < 0.0 {
                return None;
            }
            Some(FieldValue::Float(number))
        }
        TargetKind::Text => match value {
            Value::String(s) if !s.trim().is_empty() && !is_null_word(s) => {
                Some(FieldValue::Text(s.trim().to_string()))
            }
            Value::Number(n) => Some(FieldValue::Text(n.to_string())),
            _ => None,
        },
    }
}

/// `"18:1"` -> 18.0，`"94.5%"` -> 0.945，其余按浮点解析
fn parse_ratio(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if let Some(percent) = trimmed.strip_suffix('%').or_else(|| trimmed.strip_suffix('％')) {
        return parse_float(percent).map(|v| v / 100.0);
    }
    parse_float(trimmed)
}

fn is_null_word(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "null" | "none" | "n/a" | "unknown" | "无" | "未知"
    )
}

fn text_field(detail: &Map<String, Value>, key: &str) -> Option<String> {
    match detail.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(120).collect();
    if head.len() < text.len() {
        format!("{}...", head)
    } else {
        head
    }
}
