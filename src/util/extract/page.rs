//! 页面文档：一次解析 HTML，供规则抽取与简介选择共用

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static BLOCK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, p, div").expect("block selector should parse")
});
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("link selector should parse"));

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// 文本块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// 标题，层级 1..=5
    Heading(u8),
    Paragraph,
    Division,
}

impl BlockKind {
    pub fn is_body(&self) -> bool {
        matches!(self, BlockKind::Paragraph | BlockKind::Division)
    }
}

/// 按文档顺序排列的文本块
#[derive(Debug, Clone, PartialEq)]
pub struct PageBlock {
    pub kind: BlockKind,
    pub text: String,
}

/// 页面中的超链接（已解析为绝对地址）
#[derive(Debug, Clone, PartialEq)]
pub struct PageLink {
    pub text: String,
    pub href: String,
}

/// 一个候选页面
#[derive(Debug, Clone, PartialEq)]
pub struct PageDocument {
    pub url: String,
    /// 扁平化全文（去掉 script/style/noscript，空白已压缩）
    pub text: String,
    pub blocks: Vec<PageBlock>,
    pub links: Vec<PageLink>,
}

impl PageDocument {
    pub fn from_html(url: impl Into<String>, html: &str) -> Self {
        let url = url.into();
        let document = Html::parse_document(html);
        let text = element_text(document.root_element());

        let blocks = document
            .select(&BLOCK_SELECTOR)
            .filter_map(|element| {
                let kind = match element.value().name() {
                    "h1" => BlockKind::Heading(1),
                    "h2" => BlockKind::Heading(2),
                    "h3" => BlockKind::Heading(3),
                    "h4" => BlockKind::Heading(4),
                    "h5" => BlockKind::Heading(5),
                    "p" => BlockKind::Paragraph,
                    "div" => BlockKind::Division,
                    _ => return None,
                };
                Some(PageBlock {
                    kind,
                    text: element_text(element),
                })
            })
            .collect();

        let base = Url::parse(&url).ok();
        let links = document
            .select(&LINK_SELECTOR)
            .filter_map(|element| {
                let href = element.value().attr("href")?.trim();
                if href.is_empty() {
                    return None;
                }
                let absolute = resolve_href(base.as_ref(), href)?;
                Some(PageLink {
                    text: element_text(element),
                    href: absolute,
                })
            })
            .collect();

        Self {
            url,
            text,
            blocks,
            links,
        }
    }

    /// 纯文本页面：每个非空行视为一个段落
    pub fn from_text(url: impl Into<String>, text: &str) -> Self {
        let blocks = text
            .lines()
            .map(normalize_whitespace)
            .filter(|line| !line.is_empty())
            .map(|line| PageBlock {
                kind: BlockKind::Paragraph,
                text: line,
            })
            .collect();
        Self {
            url: url.into(),
            text: normalize_whitespace(text),
            blocks,
            links: Vec::new(),
        }
    }

    pub fn headings(&self, level: u8) -> impl Iterator<Item = (usize, &PageBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .filter(move |(_, block)| block.kind == BlockKind::Heading(level))
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &PageBlock> {
        self.blocks
            .iter()
            .filter(|block| block.kind == BlockKind::Paragraph)
    }

    /// 链接文字包含任一关键词的链接地址，按出现顺序去重
    pub fn links_matching(&self, keywords: &[String]) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for link in &self.links {
            if keywords.iter().any(|kw| link.text.contains(kw.as_str()))
                && !found.contains(&link.href)
            {
                found.push(link.href.clone());
            }
        }
        found
    }
}

/// 空白压缩：连续空白折叠为一个空格并去掉首尾空白
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 元素下全部可见文本节点以空格连接，并压缩空白
fn element_text(root: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    normalize_whitespace(&parts.join(" "))
}

fn resolve_href(base: Option<&Url>, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    base?.join(href).ok().map(|u| u.to_string())
}
