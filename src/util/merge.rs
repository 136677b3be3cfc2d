//! 字段合并：先到先得，只填空值
//!
//! 所有写入抽取结果的路径（多页面合并、写回表格、模型补全）都经过
//! [`fill_if_empty`]，已有非空值的字段不会被覆盖，也不会被清空。

use std::collections::BTreeMap;

use crate::model::{FieldMap, FieldValue, PartialFieldMap, Provenance, Record};

/// 仅当 `key` 缺失或为空时写入；`value` 为空时什么也不做。返回是否写入
pub fn fill_if_empty(target: &mut FieldMap, key: &str, value: &FieldValue) -> bool {
    if value.is_null() {
        return false;
    }
    match target.get(key) {
        Some(existing) if !existing.is_null() => false,
        _ => {
            target.insert(key.to_string(), value.clone());
            true
        }
    }
}

/// `merge(accumulated, incoming) -> accumulated'`
pub fn merge(mut accumulated: FieldMap, incoming: &PartialFieldMap) -> FieldMap {
    for (key, value) in incoming {
        fill_if_empty(&mut accumulated, key, value);
    }
    accumulated
}

/// 按顺序折叠多个页面的抽取结果
pub fn fold_partials<'a, I>(partials: I) -> FieldMap
where
    I: IntoIterator<Item = &'a PartialFieldMap>,
{
    partials.into_iter().fold(FieldMap::new(), merge)
}

/// 把字段写回记录（同样只填空值），返回实际写入的字段名
pub fn merge_into_record(record: &mut Record, values: &FieldMap) -> Vec<String> {
    values
        .iter()
        .filter(|(key, value)| fill_if_empty(&mut record.fields, key, value))
        .map(|(key, _)| key.clone())
        .collect()
}

/// 单条记录跨页面、跨抽取方式累积的指标，附带来源信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedMetrics {
    values: FieldMap,
    provenance: BTreeMap<String, Provenance>,
}

impl MergedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以表中已有的非空字段为起点，后续抽取只能补空
    pub fn seeded_from(record: &Record, fields: &[String]) -> Self {
        let values = fields
            .iter()
            .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
            .collect();
        Self {
            values,
            provenance: BTreeMap::new(),
        }
    }

    /// 合并一个页面/一次补全的结果，返回新写入的字段
    pub fn absorb(&mut self, incoming: &PartialFieldMap, provenance: Option<&Provenance>) -> Vec<String> {
        let mut filled = Vec::new();
        for (key, value) in incoming {
            if self.fill(key, value, provenance.cloned()) {
                filled.push(key.clone());
            }
        }
        filled
    }

    pub fn fill(&mut self, key: &str, value: &FieldValue, provenance: Option<Provenance>) -> bool {
        let written = fill_if_empty(&mut self.values, key, value);
        if written {
            if let Some(p) = provenance {
                self.provenance.insert(key.to_string(), p);
            }
        }
        written
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn provenance(&self, key: &str) -> Option<&Provenance> {
        self.provenance.get(key)
    }

    pub fn values(&self) -> &FieldMap {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 目标字段中仍为空的部分（保持 `targets` 的顺序）
    pub fn residual<'a>(&self, targets: &'a [String]) -> Vec<&'a str> {
        targets
            .iter()
            .filter(|t| self.get(t).is_none())
            .map(String::as_str)
            .collect()
    }

    /// 指定字段中是否至少有一个数值
    pub fn has_numeric(&self, fields: &[String]) -> bool {
        fields
            .iter()
            .any(|f| self.get(f).is_some_and(|v| v.is_numeric() || v.as_f64().is_some()))
    }

    pub fn into_values(self) -> FieldMap {
        self.values
    }
}
