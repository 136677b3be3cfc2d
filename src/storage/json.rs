use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use super::traits::TableStore;
use crate::model::{FieldValue, Record, RecordTable};

/// JSON 文件存储：行对象数组，键列在前，其余列按表的列顺序
pub struct JsonTableStore {
    path: PathBuf,
    key_column: String,
}

impl JsonTableStore {
    pub fn new(path: impl AsRef<Path>, key_column: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            key_column: key_column.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 记录转为行对象；缺失列写 null，保证每行列集合一致
pub(crate) fn record_to_row(table: &RecordTable, record: &Record) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert(
        table.key_column().to_string(),
        Value::String(record.name.clone()),
    );
    for column in table.columns() {
        if column == table.key_column() {
            continue;
        }
        let value = record
            .fields
            .get(column)
            .map(FieldValue::to_json)
            .unwrap_or(Value::Null);
        row.insert(column.clone(), value);
    }
    row
}

/// 行对象转为记录；键列缺失或为空时报错
pub(crate) fn row_to_record(key_column: &str, row: &Map<String, Value>) -> Result<Record> {
    let name = match row.get(key_column) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(anyhow!("row has no value in key column `{}`", key_column)),
    };
    let mut record = Record::new(name);
    for (column, value) in row {
        if column == key_column {
            continue;
        }
        record.set(column.as_str(), FieldValue::from_json(value));
    }
    Ok(record)
}

/// 按行出现顺序登记列，再插入记录
pub(crate) fn table_from_rows(key_column: &str, rows: &[Map<String, Value>]) -> Result<RecordTable> {
    let mut table = RecordTable::new(key_column);
    for (i, row) in rows.iter().enumerate() {
        for column in row.keys() {
            table.ensure_column(column);
        }
        let record = row_to_record(key_column, row).with_context(|| format!("row {}", i))?;
        table.upsert(record);
    }
    Ok(table)
}

#[async_trait]
impl TableStore for JsonTableStore {
    async fn load(&self) -> Result<RecordTable> {
        let data = fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read table file: {}", self.path.display()))?;
        let rows: Vec<Map<String, Value>> = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse table file: {}", self.path.display()))?;
        let table = table_from_rows(&self.key_column, &rows)
            .with_context(|| format!("Invalid table file: {}", self.path.display()))?;

        info!(
            event = "table.loaded",
            store = %self.describe(),
            records = table.len(),
            columns = table.columns().len()
        );
        Ok(table)
    }

    async fn save(&self, table: &RecordTable) -> Result<()> {
        let rows: Vec<Value> = table
            .records()
            .iter()
            .map(|record| Value::Object(record_to_row(table, record)))
            .collect();
        let data = serde_json::to_vec_pretty(&rows).context("Failed to serialize table")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create parent directory")?;
            }
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &data)
            .await
            .with_context(|| format!("Failed to write file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace file: {}", self.path.display()))?;

        info!(event = "table.saved", store = %self.describe(), records = table.len());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_preserves_unknown_columns_and_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("schools.json");
        std::fs::write(
            &path,
            r#"[
                {"school_name": "甲学院", "zzz_note": "保留", "students_total": 18000, "official_website": "https://a.edu.cn"},
                {"school_name": "乙学院", "students_total": null, "ratio": 0.5}
            ]"#,
        )
        .unwrap();

        let store = JsonTableStore::new(&path, "school_name");
        let mut table = store.load().await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.columns(),
            &["zzz_note", "students_total", "official_website", "ratio"]
        );
        assert_eq!(table.get("甲学院").unwrap().get_str("zzz_note"), Some("保留"));

        table.set_field("乙学院", "metrics_status", "missing");
        store.save(&table).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.columns().last().map(String::as_str), Some("metrics_status"));
        assert_eq!(reloaded.get("乙学院").unwrap().get_f64("ratio"), Some(0.5));
        assert!(reloaded.get("甲学院").unwrap().is_empty_field("metrics_status"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.find("\"school_name\"").unwrap() < raw.find("\"zzz_note\"").unwrap());
    }

    #[tokio::test]
    async fn test_missing_key_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, r#"[{"students_total": 1}]"#).unwrap();
        assert!(JsonTableStore::new(&path, "school_name").load().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonTableStore::new(temp_dir.path().join("none.json"), "school_name");
        assert!(store.load().await.is_err());
    }
}
