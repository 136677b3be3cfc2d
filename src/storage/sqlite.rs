use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use super::json::{record_to_row, row_to_record};
use super::traits::TableStore;
use crate::model::RecordTable;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    name TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    data TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS table_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const META_COLUMNS: &str = "columns";
const META_KEY_COLUMN: &str = "key_column";

/// SQLite 存储：每条记录一行 JSON，列顺序保存在 `table_meta`
pub struct SqliteTableStore {
    path: PathBuf,
    key_column: String,
}

impl SqliteTableStore {
    pub fn new(path: impl AsRef<Path>, key_column: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            key_column: key_column.to_string(),
        }
    }

    fn open(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        conn.execute_batch(CREATE_TABLES)
            .context("Failed to create table schema")?;
        Ok(conn)
    }

    fn load_blocking(path: &Path, key_column: &str) -> Result<RecordTable> {
        let conn = Self::open(path)?;

        let stored_key: Option<String> = conn
            .query_row(
                "SELECT value FROM table_meta WHERE key = ?1",
                params![META_KEY_COLUMN],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(stored_key) = stored_key {
            if stored_key != key_column {
                return Err(anyhow!(
                    "database key column is `{}`, expected `{}`",
                    stored_key,
                    key_column
                ));
            }
        }

        let mut table = RecordTable::new(key_column);
        let columns: Option<String> = conn
            .query_row(
                "SELECT value FROM table_meta WHERE key = ?1",
                params![META_COLUMNS],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(columns) = columns {
            let columns: Vec<String> =
                serde_json::from_str(&columns).context("Invalid column list in table_meta")?;
            for column in &columns {
                table.ensure_column(column);
            }
        }

        let mut stmt = conn.prepare("SELECT name, data FROM records ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (name, data) = row?;
            let mut object: Map<String, Value> = serde_json::from_str(&data)
                .with_context(|| format!("Invalid record data for `{}`", name))?;
            object.insert(key_column.to_string(), Value::String(name));
            table.upsert(row_to_record(key_column, &object)?);
        }
        Ok(table)
    }

    fn save_blocking(path: &Path, table: &RecordTable) -> Result<()> {
        let mut conn = Self::open(path)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM records", [])?;
        {
            let mut insert =
                tx.prepare("INSERT INTO records (name, position, data) VALUES (?1, ?2, ?3)")?;
            for (position, record) in table.records().iter().enumerate() {
                let mut row = record_to_row(table, record);
                row.remove(table.key_column());
                let data = serde_json::to_string(&row)?;
                insert.execute(params![record.name, position as i64, data])?;
            }
        }
        let columns = serde_json::to_string(table.columns())?;
        tx.execute(
            "INSERT OR REPLACE INTO table_meta (key, value) VALUES (?1, ?2)",
            params![META_COLUMNS, columns],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO table_meta (key, value) VALUES (?1, ?2)",
            params![META_KEY_COLUMN, table.key_column()],
        )?;
        tx.commit().context("Failed to commit table")?;
        Ok(())
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn load(&self) -> Result<RecordTable> {
        let path = self.path.clone();
        let key_column = self.key_column.clone();
        let table = tokio::task::spawn_blocking(move || Self::load_blocking(&path, &key_column))
            .await
            .context("SQLite load task panicked")??;

        info!(
            event = "table.loaded",
            store = %self.describe(),
            records = table.len(),
            columns = table.columns().len()
        );
        Ok(table)
    }

    async fn save(&self, table: &RecordTable) -> Result<()> {
        let path = self.path.clone();
        let snapshot = table.clone();
        tokio::task::spawn_blocking(move || Self::save_blocking(&path, &snapshot))
            .await
            .context("SQLite save task panicked")??;

        info!(event = "table.saved", store = %self.describe(), records = table.len());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use tempfile::TempDir;

    fn sample() -> RecordTable {
        let mut table = RecordTable::from_records(
            "school_name",
            vec![
                Record::new("乙学院").with_field("students_total", 9000),
                Record::new("甲学院")
                    .with_field("custom_note", "自定义列")
                    .with_field("employment_rate_2024", 0.93),
            ],
        );
        table.ensure_column("metrics_status");
        table
    }

    #[tokio::test]
    async fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteTableStore::new(temp_dir.path().join("iaci.db"), "school_name");
        let table = sample();
        store.save(&table).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.names(), vec!["乙学院", "甲学院"]);
        assert_eq!(loaded.columns(), table.columns());
        assert_eq!(loaded.get("甲学院").unwrap().get_str("custom_note"), Some("自定义列"));
        assert_eq!(loaded.get("甲学院").unwrap().get_f64("employment_rate_2024"), Some(0.93));
        assert!(loaded.get("乙学院").unwrap().is_empty_field("custom_note"));
    }

    #[tokio::test]
    async fn test_save_replaces_previous_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteTableStore::new(temp_dir.path().join("iaci.db"), "school_name");
        store.save(&sample()).await.unwrap();

        let smaller = RecordTable::from_records("school_name", vec![Record::new("丙学院")]);
        store.save(&smaller).await.unwrap();
        assert_eq!(store.load().await.unwrap().names(), vec!["丙学院"]);
    }

    #[tokio::test]
    async fn test_key_column_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("iaci.db");
        SqliteTableStore::new(&path, "school_name").save(&sample()).await.unwrap();
        assert!(SqliteTableStore::new(&path, "name").load().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_database_loads_empty_table() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteTableStore::new(temp_dir.path().join("fresh.db"), "school_name");
        assert!(store.load().await.unwrap().is_empty());
    }
}
