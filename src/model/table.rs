use std::collections::HashMap;

use super::record::Record;
use super::value::FieldValue;

/// 以院校名称为键的记录表
///
/// 列集合是开放的：`columns` 记录首次出现的顺序，未知列原样保留。
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    key_column: String,
    columns: Vec<String>,
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl RecordTable {
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            ..Default::default()
        }
    }

    pub fn from_records(key_column: impl Into<String>, records: Vec<Record>) -> Self {
        let mut table = Self::new(key_column);
        for record in records {
            table.upsert(record);
        }
        table
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        column == self.key_column || self.columns.iter().any(|c| c == column)
    }

    pub fn ensure_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Record> {
        self.index.get(name).map(|&i| &self.records[i])
    }

    /// 可变访问；修改后新增的字段需通过 [`RecordTable::sync_columns`] 登记到列集合
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Record> {
        match self.index.get(name) {
            Some(&i) => self.records.get_mut(i),
            None => None,
        }
    }

    /// 插入或整体替换同名记录
    pub fn upsert(&mut self, record: Record) {
        for key in record.fields.keys() {
            if !self.has_column(key) {
                self.columns.push(key.clone());
            }
        }
        match self.index.get(&record.name) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index.insert(record.name.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn set_field(&mut self, name: &str, column: &str, value: impl Into<FieldValue>) -> bool {
        self.ensure_column(column);
        match self.get_mut(name) {
            Some(record) => {
                record.set(column, value);
                true
            }
            None => false,
        }
    }

    /// 按记录顺序写入一整列
    pub fn set_column(&mut self, column: &str, values: Vec<FieldValue>) {
        self.ensure_column(column);
        for (record, value) in self.records.iter_mut().zip(values) {
            record.set(column, value);
        }
    }

    /// 把记录中出现但尚未登记的字段补入列集合
    pub fn sync_columns(&mut self) {
        let mut missing = Vec::new();
        for record in &self.records {
            for key in record.fields.keys() {
                if !self.has_column(key) && !missing.contains(key) {
                    missing.push(key.clone());
                }
            }
        }
        self.columns.extend(missing);
    }

    /// 数值列视图；列不存在时返回 None（区别于“全部为空”）
    pub fn numeric_column(&self, column: &str) -> Option<Vec<Option<f64>>> {
        if !self.has_column(column) {
            return None;
        }
        Some(
            self.records
                .iter()
                .map(|record| record.get_f64(column))
                .collect(),
        )
    }
}
