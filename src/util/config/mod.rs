//! 配置管理模块
//!
//! - types: 配置数据结构定义
//! - loader: 配置加载、写入和环境变量处理
//! - validator: 配置验证

pub mod loader;
pub mod types;
pub mod validator;

pub use loader::{find_config_file_path, ConfigLoader, ConfigWriter};
pub use types::*;
pub use validator::{ConfigValidator, ValidationIssue, ValidationReport};
