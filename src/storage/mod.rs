// 存储抽象层模块：记录表持久化与页面来源

pub mod fetcher;
pub mod json;
pub mod page_cache;
pub mod sqlite;
pub mod traits;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

pub use fetcher::HttpPageFetcher;
pub use json::JsonTableStore;
pub use page_cache::LocalPageCache;
pub use sqlite::SqliteTableStore;
pub use traits::{PageSource, TableStore};

/// 按扩展名选择存储：`.db` / `.sqlite` / `.sqlite3` 使用 SQLite，其余按 JSON
pub fn open_table_store(path: impl AsRef<Path>, key_column: &str) -> Result<Arc<dyn TableStore>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let store: Arc<dyn TableStore> = match extension.as_deref() {
        Some("db") | Some("sqlite") | Some("sqlite3") => {
            Arc::new(SqliteTableStore::new(path, key_column))
        }
        Some("json") | None => Arc::new(JsonTableStore::new(path, key_column)),
        Some(other) => {
            return Err(anyhow::anyhow!(
                "unsupported table file extension `.{}`: {}",
                other,
                path.display()
            ))
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_by_extension() {
        assert!(open_table_store("data/iaci.db", "school_name")
            .unwrap()
            .describe()
            .starts_with("sqlite:"));
        assert!(open_table_store("data/iaci.json", "school_name")
            .unwrap()
            .describe()
            .starts_with("json:"));
        assert!(open_table_store("data/iaci.xlsx", "school_name").is_err());
    }
}
