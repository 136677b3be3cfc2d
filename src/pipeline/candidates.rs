//! 候选页面地址：按声明的列角色收集、规范化、过滤、去重

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{Record, RecordTable};
use crate::util::rules::defaults;

static IPV4_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://\d{1,3}(\.\d{1,3}){3}").expect("valid ipv4 regex"));
static DATED_NEWS_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/20\d{2}/\d{1,2}/").expect("valid dated path regex"));

const PSEUDO_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:"];

/// 一组同类链接列，例如 `intl_coop` -> `intl_coop_url_1, intl_coop_url_2`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleGroup {
    pub role: String,
    pub columns: Vec<String>,
}

/// 显式声明的列角色；官网列在前，其余分组按声明顺序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRoles {
    pub official_site_column: String,
    pub groups: Vec<RoleGroup>,
}

impl Default for ColumnRoles {
    fn default() -> Self {
        Self {
            official_site_column: "official_site".to_string(),
            groups: Vec::new(),
        }
    }
}

impl ColumnRoles {
    /// 全部链接列，官网列在前
    pub fn url_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.official_site_column.as_str()];
        for group in &self.groups {
            for column in &group.columns {
                if !columns.contains(&column.as_str()) {
                    columns.push(column);
                }
            }
        }
        columns
    }

    /// 声明的列必须都存在于表结构中
    pub fn validate(&self, table: &RecordTable) -> Result<()> {
        if !table.has_column(&self.official_site_column) {
            bail!(
                "official site column `{}` is not in the table",
                self.official_site_column
            );
        }
        for group in &self.groups {
            for column in &group.columns {
                if !table.has_column(column) {
                    bail!(
                        "column `{}` declared for role `{}` is not in the table",
                        column,
                        group.role
                    );
                }
            }
        }
        Ok(())
    }
}

/// 子串替换式的地址修正
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRewrite {
    pub contains: String,
    pub replace_with: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateSettings {
    pub roles: ColumnRoles,
    pub rewrites: Vec<UrlRewrite>,
    /// 系统、登录类地址关键词
    pub blocked_keywords: Vec<String>,
    /// 带日期的新闻路径只有包含这些关键词时才保留
    pub overview_keywords: Vec<String>,
    /// 官网首页上用来发现概况页的链接文字
    pub about_link_keywords: Vec<String>,
}

impl Default for CandidateSettings {
    fn default() -> Self {
        Self {
            roles: ColumnRoles::default(),
            rewrites: vec![UrlRewrite {
                contains: "id.sanyau.edu.cn:9092".to_string(),
                replace_with: "https://id.sanyau.edu.cn/".to_string(),
            }],
            blocked_keywords: defaults::blocked_url_keywords(),
            overview_keywords: defaults::overview_url_keywords(),
            about_link_keywords: defaults::about_link_keywords(),
        }
    }
}

/// 为单条记录给出有序、去重的候选地址
#[derive(Debug, Clone)]
pub struct CandidateSupplier {
    settings: CandidateSettings,
}

impl CandidateSupplier {
    /// 构造时校验列角色
    pub fn new(settings: CandidateSettings, table: &RecordTable) -> Result<Self> {
        settings.roles.validate(table)?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &CandidateSettings {
        &self.settings
    }

    /// 丢弃伪协议；命中修正规则时整体替换
    pub fn normalize(&self, url: &str) -> Option<String> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        let lower = url.to_lowercase();
        if PSEUDO_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return None;
        }
        for rewrite in &self.settings.rewrites {
            if url.contains(&rewrite.contains) {
                return Some(rewrite.replace_with.clone());
            }
        }
        Some(url.to_string())
    }

    /// 是否可能对简介或办学指标有用
    pub fn is_useful(&self, url: &str) -> bool {
        let lower = url.trim().to_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return false;
        }
        if self
            .settings
            .blocked_keywords
            .iter()
            .any(|kw| lower.contains(kw.as_str()))
        {
            return false;
        }
        if IPV4_HOST.is_match(&lower) {
            return false;
        }
        if DATED_NEWS_PATH.is_match(&lower)
            && !self
                .settings
                .overview_keywords
                .iter()
                .any(|kw| lower.contains(kw.as_str()))
        {
            return false;
        }
        true
    }

    /// 规范化并过滤后追加到候选列表；返回是否新增
    pub fn admit(&self, candidates: &mut Vec<String>, url: &str) -> bool {
        match self.normalize(url) {
            Some(url) if self.is_useful(&url) && !candidates.contains(&url) => {
                candidates.push(url);
                true
            }
            _ => false,
        }
    }

    /// 规范化后的官网地址（不经过有用性过滤）
    pub fn official_url(&self, record: &Record) -> Option<String> {
        record
            .get_str(&self.settings.roles.official_site_column)
            .and_then(|url| self.normalize(url))
    }

    pub fn candidates(&self, record: &Record) -> Vec<String> {
        let mut candidates = Vec::new();
        for column in self.settings.roles.url_columns() {
            if let Some(url) = record.get_str(column) {
                self.admit(&mut candidates, url);
            }
        }
        candidates
    }

    pub fn about_link_keywords(&self) -> &[String] {
        &self.settings.about_link_keywords
    }
}
