//! 批处理流程：抽取、模型补全、指数构建

pub mod candidates;
pub mod enrichment;
pub mod extraction;
pub mod index;

pub use candidates::{CandidateSettings, CandidateSupplier, ColumnRoles, RoleGroup, UrlRewrite};
pub use enrichment::{EnrichmentRunner, EnrichmentSummary};
pub use extraction::{ExtractionRunner, ExtractionSettings, ExtractionSummary};
pub use index::{apply_derived_fields, DerivedFieldSettings, IndexRunner};

/// 记录完整度状态列
pub const STATUS_COLUMN: &str = "metrics_status";
pub const LAST_CRAWLED_COLUMN: &str = "last_crawled_at";
pub const PROFILE_URL_COLUMN: &str = "profile_page_url";
pub const PROFILE_SNIPPET_COLUMN: &str = "profile_text_snippet";
pub const POSITIONING_COLUMN: &str = "positioning_keywords";
