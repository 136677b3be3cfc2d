pub mod config;
pub mod enrichment; // 大模型补全
pub mod extract;
pub mod http_client; // HTTP客户端（页面抓取与模型接口共用）
pub mod index;
pub mod log;
pub mod merge;
pub mod rules;
