use anyhow::Result;
use async_trait::async_trait;

use crate::model::{PassKind, RecordTable};

/// 记录表持久化
#[async_trait]
pub trait TableStore: Send + Sync {
    /// 读取整张表；未知列原样保留
    async fn load(&self) -> Result<RecordTable>;

    /// 覆盖保存整张表，列顺序与 `table.columns()` 一致
    async fn save(&self, table: &RecordTable) -> Result<()>;

    /// 日志里使用的简短描述
    fn describe(&self) -> String;
}

/// 页面来源：返回 HTML，取不到时为 None
///
/// 单个页面的失败只影响该页面，因此这里不返回错误。
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<String>;

    /// 该来源对应的抽取轮次，用于字段来源标注
    fn pass_kind(&self) -> PassKind;
}
