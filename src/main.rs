use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use iaci_index::build_info;
use iaci_index::pipeline::{EnrichmentRunner, ExtractionRunner, IndexRunner};
use iaci_index::storage::{open_table_store, HttpPageFetcher, LocalPageCache, PageSource};
use iaci_index::util::config::{Config, ConfigValidator};
use iaci_index::util::enrichment::{ChatCompletionProvider, EnrichmentPass};
use iaci_index::util::extract::RecordExtractor;
use iaci_index::util::http_client::HttpClient;
use iaci_index::util::index::IndexBuilder;
use iaci_index::util::log::log_init_with_config;

const USAGE: &str = "用法: iaci-index [--config <path>] <extract|enrich|index|run|check-config|version>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        eprintln!("[PANIC] 程序异常退出");
        eprintln!("位置: {}", location);
        eprintln!("原因: {}", message);
        eprintln!(
            "时间: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        tracing::error!(event = "panic.raised", location = %location, reason = %message);

        let panic_msg = format!(
            "PANIC OCCURRED\nLocation: {}\nReason: {}\nTime: {}\n\n",
            location,
            message,
            chrono::Local::now()
        );
        if let Err(e) = std::fs::write("./panic.log", &panic_msg) {
            eprintln!("[WARN] 无法写入panic.log: {}", e);
        } else {
            eprintln!("[OK] Panic信息已保存到 ./panic.log");
        }

        std::io::stderr().flush().ok();
    }));

    let (config_path, command) = parse_args(std::env::args().skip(1))?;

    if command == "version" {
        println!("iaci-index {}", build_info::summary());
        return Ok(());
    }

    let (config, used_path) = iaci_index::load_config(config_path.as_deref())?;
    let _log_guard = log_init_with_config("iaci-index", &config.logging)?;
    tracing::info!(
        event = "app.start",
        command = %command,
        config = %used_path.display(),
        build = %build_info::summary()
    );

    let report = ConfigValidator::validate_all(&config);
    report.log();
    if report.has_errors() {
        bail!("配置校验失败：{} 个错误", report.errors.len());
    }

    match command.as_str() {
        "check-config" => {
            println!(
                "配置检查通过: {} 个警告, {} 条提示",
                report.warnings.len(),
                report.info.len()
            );
            Ok(())
        }
        "extract" => run_extraction(&config).await,
        "enrich" => run_enrichment(&config, true).await,
        "index" => run_index(&config).await,
        "run" => {
            run_extraction(&config).await?;
            run_enrichment(&config, false).await?;
            run_index(&config).await
        }
        other => Err(anyhow!("未知子命令: {other}\n{USAGE}")),
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<(Option<PathBuf>, String)> {
    let mut config_path = None;
    let mut command = None;
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or_else(|| anyhow!("--config 缺少路径\n{USAGE}"))?;
                config_path = Some(PathBuf::from(path));
            }
            "--version" | "-V" => command = Some("version".to_string()),
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if command.is_none() => command = Some(other.to_string()),
            other => bail!("多余的参数: {other}\n{USAGE}"),
        }
    }
    let command = command.ok_or_else(|| anyhow!("{USAGE}"))?;
    Ok((config_path, command))
}

fn page_source(config: &Config) -> anyhow::Result<Arc<dyn PageSource>> {
    let cache = Arc::new(LocalPageCache::new(&config.storage.cache_dir)?);
    if config.extraction.offline {
        tracing::info!(event = "extraction.offline", cache_dir = %config.storage.cache_dir);
        return Ok(cache);
    }
    let client = HttpClient::new(config.http.clone()).context("初始化HTTP客户端失败")?;
    Ok(Arc::new(HttpPageFetcher::new(client).with_cache(cache)))
}

async fn run_extraction(config: &Config) -> anyhow::Result<()> {
    let extractor = RecordExtractor::new(
        &config.rules.metric_rules,
        config.profile.clone(),
        config.rules.tagger(),
    )?
    .with_status_fields(config.enrichment.numeric_target_fields());
    let store = open_table_store(&config.storage.table_path, &config.storage.key_column)?;
    let runner = ExtractionRunner::new(extractor, page_source(config)?, store, config.extraction.clone());
    let summary = runner.run().await?;
    println!(
        "抽取完成: 共 {} 条, 跳过 {}, ok {}, partial {}, missing {}, 页面 {}",
        summary.total, summary.skipped, summary.ok, summary.partial, summary.missing, summary.pages_fetched
    );
    Ok(())
}

/// `required` 为真时（单独执行 enrich）未启用或缺少密钥视为错误
async fn run_enrichment(config: &Config, required: bool) -> anyhow::Result<()> {
    if !config.enrichment.enabled || !config.llm.has_api_key() {
        if required {
            bail!("模型补全需要 enrichment.enabled=true 且配置 API Key（IACI_LLM_API_KEY）");
        }
        tracing::info!(
            event = "enrichment.disabled",
            enabled = config.enrichment.enabled,
            has_key = config.llm.has_api_key()
        );
        return Ok(());
    }

    let provider = ChatCompletionProvider::new(config.llm.clone(), &config.http)?;
    let pass = EnrichmentPass::new(config.enrichment.clone(), Arc::new(provider));
    let store = open_table_store(&config.storage.table_path, &config.storage.key_column)?;
    let summary = EnrichmentRunner::new(pass, store)
        .with_status_fields(config.rules.metric_rules.target_fields())
        .run()
        .await?;
    println!(
        "补全完成: 共 {} 条, 请求 {}, 失败 {}, 填充字段 {}",
        summary.total, summary.requested, summary.failed, summary.fields_filled
    );
    Ok(())
}

async fn run_index(config: &Config) -> anyhow::Result<()> {
    let builder = IndexBuilder::new(config.index.clone())?;
    let input = open_table_store(&config.storage.table_path, &config.storage.key_column)?;
    let output = open_table_store(&config.storage.output_path, &config.storage.key_column)?;
    let report = IndexRunner::new(builder, config.derived.clone(), config.rules.tagger(), input, output)
        .with_report_path(&config.storage.report_path)
        .run()
        .await?;
    println!(
        "指数构建完成: {} 所院校, 输出 {}",
        report.rows, config.storage.output_path
    );
    Ok(())
}
