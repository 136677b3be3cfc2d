use crate::util::config::{LevelConfig, LoggingConfig};
use std::io;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::fmt::format::{Format, Full};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::EnvFilter, Layer, Registry};

/// 初始化日志：控制台始终输出，按配置追加按天滚动的文件输出
///
/// 返回的 guard 需要持有到进程结束，否则文件缓冲不会落盘。
pub fn log_init_with_config(
    file_prefix: &str,
    config: &LoggingConfig,
) -> anyhow::Result<Option<WorkerGuard>> {
    let level_filter = parse_level(&config.level);
    let filter_expression = build_env_filter_expression(level_filter, config.level_config.as_ref());
    let use_json = config.structured.unwrap_or(false);

    let stdout_filter = EnvFilter::try_new(filter_expression.as_str())
        .unwrap_or_else(|_| EnvFilter::new(level_filter_to_str(level_filter)));

    if !config.file.enabled {
        if use_json {
            let stdout_layer = layer()
                .json()
                .with_target(false)
                .with_writer(io::stdout)
                .with_filter(stdout_filter);
            Registry::default().with(stdout_layer).try_init()?;
        } else {
            let stdout_layer = layer()
                .event_format(console_format())
                .with_writer(io::stdout)
                .with_filter(stdout_filter);
            Registry::default().with(stdout_layer).try_init()?;
        }

        tracing::info!(event = "log.init", level = %config.level, console = true, file = false, structured = use_json);
        return Ok(None);
    }

    let log_dir = resolve_log_dir(&config.file.directory);
    std::fs::create_dir_all(&log_dir)?;

    let file_filter = EnvFilter::try_new(filter_expression.as_str())
        .unwrap_or_else(|_| EnvFilter::new(level_filter_to_str(level_filter)));
    let file_appender = daily(&log_dir, format!("{}.log", file_prefix));
    let (no_blocking, guard) = tracing_appender::non_blocking(file_appender);

    if use_json {
        let stdout_layer = layer()
            .json()
            .with_target(false)
            .with_writer(io::stdout)
            .with_filter(stdout_filter);
        let file_layer = layer()
            .json()
            .with_target(false)
            .with_ansi(false)
            .with_writer(no_blocking)
            .with_filter(file_filter);
        Registry::default()
            .with(stdout_layer)
            .with(file_layer)
            .try_init()?;
    } else {
        let stdout_layer = layer()
            .event_format(console_format())
            .with_writer(io::stdout)
            .with_filter(stdout_filter);
        let file_layer = layer()
            .event_format(Format::default().with_target(false))
            .with_ansi(false)
            .with_writer(no_blocking)
            .with_filter(file_filter);
        Registry::default()
            .with(stdout_layer)
            .with(file_layer)
            .try_init()?;
    }

    tracing::info!(
        event = "log.init",
        level = %config.level,
        console = true,
        file = true,
        directory = %log_dir.display(),
        rotation = "daily",
        structured = use_json
    );

    if let Some(retention) = config.file.retention_days {
        tracing::info!(event = "log.retention", days = retention);
        if let Err(e) = cleanup_old_logs(&log_dir, retention) {
            tracing::warn!(event = "log.cleanup_failed", error = %e);
        }
    }

    Ok(Some(guard))
}

fn console_format() -> Format<Full, ()> {
    Format::default()
        .without_time()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
}

/// 相对路径基于当前工作目录；在 `bin/` 下启动时回到上级目录
fn resolve_log_dir(directory: &str) -> PathBuf {
    let path = Path::new(directory);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if current_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
        if let Some(parent) = current_dir.parent() {
            return parent.join(directory);
        }
    }
    current_dir.join(directory)
}

/// 删除超过保留天数的日志文件，只处理文件名含 `.log` 的文件
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> anyhow::Result<usize> {
    if !log_dir.exists() {
        tracing::debug!("日志目录不存在: {}", log_dir.display());
        return Ok(0);
    }

    let retention = std::time::Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    let cutoff = match std::time::SystemTime::now().checked_sub(retention) {
        Some(cutoff) => cutoff,
        None => return Ok(0),
    };

    let mut deleted_count = 0;
    let mut total_size_deleted = 0u64;

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("");
        if !file_name.contains(".log") {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let modified = match metadata.modified() {
            Ok(t) => t,
            Err(_) => continue,
        };
        if modified >= cutoff {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                deleted_count += 1;
                total_size_deleted += metadata.len();
                tracing::debug!("已删除过期日志: {}", path.display());
            }
            Err(e) => {
                tracing::warn!("删除日志文件失败: {} - {}", path.display(), e);
            }
        }
    }

    if deleted_count > 0 {
        let size_mb = total_size_deleted as f64 / (1024.0 * 1024.0);
        tracing::info!(
            event = "log.cleanup",
            deleted = deleted_count,
            "已清理 {} 个过期日志文件，释放空间 {:.2} MB",
            deleted_count,
            size_mb
        );
    }

    Ok(deleted_count)
}

fn parse_level(level: &str) -> LevelFilter {
    match normalize_level_str(level) {
        Some("trace") => LevelFilter::TRACE,
        Some("debug") => LevelFilter::DEBUG,
        Some("warn") => LevelFilter::WARN,
        Some("error") => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

fn build_env_filter_expression(
    default_level: LevelFilter,
    level_config: Option<&LevelConfig>,
) -> String {
    let mut directives = vec![level_filter_to_str(default_level).to_string()];

    if let Some(cfg) = level_config {
        let mut overrides: Vec<_> = cfg.overrides.iter().collect();
        overrides.sort();
        for (target, level_str) in overrides {
            if let Some(level) = normalize_level_str(level_str) {
                directives.push(format!("{}={level}", normalize_directive_target(target)));
            }
        }
    }

    directives.join(",")
}

fn normalize_level_str(level: &str) -> Option<&'static str> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

fn level_filter_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "off",
        LevelFilter::ERROR => "error",
        LevelFilter::WARN => "warn",
        LevelFilter::INFO => "info",
        LevelFilter::DEBUG => "debug",
        LevelFilter::TRACE => "trace",
    }
}

/// `extract` -> `iaci_index::util::extract`，`pipeline.index` -> `iaci_index::pipeline::index`
fn normalize_directive_target(target: &str) -> String {
    if let Some(raw) = target.strip_prefix("target:") {
        return raw.to_string();
    }
    if target.contains("::") {
        return target.to_string();
    }
    let path = target.replace('.', "::");
    match path.split("::").next() {
        Some("pipeline") | Some("storage") | Some("model") => format!("iaci_index::{path}"),
        _ => format!("iaci_index::util::{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_filter_expression_with_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("extract".to_string(), "debug".to_string());
        overrides.insert("pipeline.index".to_string(), "TRACE".to_string());
        overrides.insert("storage".to_string(), "loud".to_string());
        let cfg = LevelConfig { overrides };

        let expr = build_env_filter_expression(LevelFilter::INFO, Some(&cfg));
        assert_eq!(
            expr,
            "info,iaci_index::util::extract=debug,iaci_index::pipeline::index=trace"
        );
    }

    #[test]
    fn test_directive_targets() {
        assert_eq!(normalize_directive_target("target:reqwest"), "reqwest");
        assert_eq!(normalize_directive_target("hyper::client"), "hyper::client");
        assert_eq!(
            normalize_directive_target("enrichment.client"),
            "iaci_index::util::enrichment::client"
        );
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("verbose"), LevelFilter::INFO);
        assert_eq!(parse_level(" Warn "), LevelFilter::WARN);
    }

    #[test]
    fn test_cleanup_keeps_recent_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("iaci.log.2026-10-18"), "x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let deleted = cleanup_old_logs(dir.path(), 7).unwrap();
        assert_eq!(deleted, 0);
        assert!(dir.path().join("iaci.log.2026-10-18").exists());

        // 保留 0 天：日志文件全部过期
        std::thread::sleep(std::time::Duration::from_millis(20));
        let deleted = cleanup_old_logs(dir.path(), 0).unwrap();
        assert_eq!(deleted, 1);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(cleanup_old_logs(&missing, 7).unwrap(), 0);
    }
}
