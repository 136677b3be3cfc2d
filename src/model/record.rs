use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::fmt;

use super::value::{FieldMap, FieldValue};

/// 一所院校的记录：唯一名称 + 稀疏字段表
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub name: String,
    pub fields: FieldMap,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: FieldMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str).map(str::trim)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_f64)
    }

    pub fn is_empty_field(&self, key: &str) -> bool {
        self.get(key).is_none()
    }

    /// 覆盖写入（仅用于派生字段：状态、时间戳、计算列）
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn status(&self, status_column: &str) -> Status {
        self.get_str(status_column)
            .map(Status::parse)
            .unwrap_or(Status::Missing)
    }
}

/// 记录完整度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// 至少有一个数值指标
    Ok,
    /// 只有描述性文本
    Partial,
    Missing,
}

impl Status {
    pub fn derive(has_numeric_metric: bool, has_profile_text: bool) -> Self {
        if has_numeric_metric {
            Status::Ok
        } else if has_profile_text {
            Status::Partial
        } else {
            Status::Missing
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Partial => "partial",
            Status::Missing => "missing",
        }
    }

    /// 宽松解析，未知取值一律视为 missing
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "ok" => Status::Ok,
            "partial" => Status::Partial,
            _ => Status::Missing,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 抽取来源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// 在线抓取页面上的规则抽取
    Rule,
    /// 本地缓存页面上的离线规则抽取
    OfflineCache,
    /// 大模型辅助补全
    ModelAssisted,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Rule => "rule",
            PassKind::OfflineCache => "offline_cache",
            PassKind::ModelAssisted => "model_assisted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "高" => Some(Confidence::High),
            "medium" | "mid" | "中" => Some(Confidence::Medium),
            "low" | "低" => Some(Confidence::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// 字段值的来源信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub pass: PassKind,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
}

impl Provenance {
    pub fn new(pass: PassKind) -> Self {
        Self {
            pass,
            source_url: None,
            evidence: None,
            confidence: None,
        }
    }

    pub fn from_url(pass: PassKind, url: &str) -> Self {
        Self {
            source_url: Some(url.to_string()),
            ..Self::new(pass)
        }
    }
}

/// 单个页面的抽取结果，创建后只读
///
/// 构造时丢弃空值，因此其中每个键都持有非空值。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartialFieldMap {
    values: FieldMap,
}

impl PartialFieldMap {
    pub fn new(values: FieldMap) -> Self {
        Self {
            values: values.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &FieldMap {
        &self.values
    }
}

impl FromIterator<(String, FieldValue)> for PartialFieldMap {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PartialFieldMap {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
