//! 编译期写入的构建信息（见 build.rs）

pub const BUILD_VERSION: &str = env!("APP_BUILD_VERSION");
pub const BUILD_COMMIT: &str = env!("APP_BUILD_COMMIT");
pub const BUILD_TIMESTAMP: &str = env!("APP_BUILD_TIMESTAMP");

/// 版本摘要：Cargo 版本 + 构建版本、提交与时间
pub fn summary() -> String {
    format!(
        "{} (build {}, commit {}, built at {})",
        env!("CARGO_PKG_VERSION"),
        BUILD_VERSION,
        BUILD_COMMIT,
        BUILD_TIMESTAMP
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_starts_with_package_version() {
        let summary = summary();
        assert!(summary.starts_with(env!("CARGO_PKG_VERSION")));
        assert!(summary.contains(BUILD_COMMIT));
    }
}
