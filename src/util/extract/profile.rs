//! 简介文本选择

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::page::{normalize_whitespace, PageDocument};
use crate::util::rules::defaults;

/// 简介选择参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSettings {
    /// 概况类标题关键词
    pub heading_keywords: Vec<String>,
    /// 概况类 URL 关键词，命中时使用较低的长度门槛
    pub overview_url_keywords: Vec<String>,
    /// 标题之后最多收集的 p/div 块数
    pub follow_block_limit: usize,
    /// 短于该长度的片段丢弃
    pub fragment_floor: usize,
    /// 标题段落拼接结果需长于该值；最长段落需不短于该值
    pub block_min_length: usize,
    pub preferred_url_threshold: usize,
    pub default_url_threshold: usize,
    /// 写回表格的摘要截断长度
    pub snippet_max_chars: usize,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            heading_keywords: defaults::profile_heading_keywords(),
            overview_url_keywords: defaults::overview_url_keywords(),
            follow_block_limit: 40,
            fragment_floor: 50,
            block_min_length: 150,
            preferred_url_threshold: 150,
            default_url_threshold: 250,
            snippet_max_chars: 800,
        }
    }
}

/// 命中的选择阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStage {
    Heading,
    Paragraph,
    WholeText,
}

impl ProfileStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileStage::Heading => "heading",
            ProfileStage::Paragraph => "paragraph",
            ProfileStage::WholeText => "whole_text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSelection {
    pub text: String,
    pub source_url: String,
    pub stage: ProfileStage,
}

impl ProfileSelection {
    /// 按字符截断的摘要
    pub fn snippet(&self, max_chars: usize) -> String {
        self.text.chars().take(max_chars).collect()
    }
}

/// 从候选页面中挑出最像“学校概况”的一段文本
///
/// 三个阶段依次在全部页面上尝试，先到先得：
/// 1. 概况类标题（h1..h5，按层级）之后的 p/div 块拼接；
/// 2. 单页最长的 `<p>`；
/// 3. 整页扁平文本。
///
/// 每个阶段的候选都要通过 URL 长度门槛：URL 含概况关键词时需长于
/// `preferred_url_threshold`，否则需长于 `default_url_threshold`。
/// 同一页上有多个概况标题时，逐个尝试其后的文本块。
#[derive(Debug, Clone)]
pub struct ProfileSelector {
    settings: ProfileSettings,
}

impl ProfileSelector {
    pub fn new(settings: ProfileSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProfileSettings {
        &self.settings
    }

    pub fn is_preferred_url(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.settings
            .overview_url_keywords
            .iter()
            .any(|kw| lower.contains(kw.as_str()))
    }

    fn passes_url_gate(&self, url: &str, text: &str) -> bool {
        let threshold = if self.is_preferred_url(url) {
            self.settings.preferred_url_threshold
        } else {
            self.settings.default_url_threshold
        };
        char_len(text) > threshold
    }

    pub fn select(&self, pages: &[PageDocument]) -> Option<ProfileSelection> {
        let stages: [(ProfileStage, fn(&Self, &PageDocument) -> Vec<String>); 3] = [
            (ProfileStage::Heading, Self::heading_blocks),
            (ProfileStage::Paragraph, Self::longest_paragraph),
            (ProfileStage::WholeText, Self::whole_text),
        ];

        for (stage, candidate) in stages {
            for page in pages {
                for text in candidate(self, page) {
                    if !self.passes_url_gate(&page.url, &text) {
                        debug!(
                            event = "profile.url_gate_rejected",
                            stage = stage.as_str(),
                            url = %page.url,
                            length = char_len(&text)
                        );
                        continue;
                    }
                    debug!(
                        event = "profile.selected",
                        stage = stage.as_str(),
                        url = %page.url,
                        length = char_len(&text)
                    );
                    return Some(ProfileSelection {
                        text,
                        source_url: page.url.clone(),
                        stage,
                    });
                }
            }
        }
        None
    }

    /// 按标题层级顺序返回所有够长的标题后文本块
    fn heading_blocks(&self, page: &PageDocument) -> Vec<String> {
        let mut blocks = Vec::new();
        for level in 1..=5u8 {
            for (index, heading) in page.headings(level) {
                let matched = self
                    .settings
                    .heading_keywords
                    .iter()
                    .any(|kw| heading.text.contains(kw.as_str()));
                if !matched {
                    continue;
                }

                let fragments: Vec<&str> = page.blocks[index + 1..]
                    .iter()
                    .filter(|block| block.kind.is_body())
                    .take(self.settings.follow_block_limit)
                    .map(|block| block.text.as_str())
                    .filter(|text| char_len(text) >= self.settings.fragment_floor)
                    .collect();
                let joined = normalize_whitespace(&fragments.join(" "));
                if char_len(&joined) > self.settings.block_min_length {
                    blocks.push(joined);
                }
            }
        }
        blocks
    }

    fn longest_paragraph(&self, page: &PageDocument) -> Vec<String> {
        let mut best: Option<&str> = None;
        for paragraph in page.paragraphs() {
            if best.map_or(true, |b| char_len(&paragraph.text) > char_len(b)) {
                best = Some(paragraph.text.as_str());
            }
        }
        best.filter(|text| char_len(text) >= self.settings.block_min_length)
            .map(normalize_whitespace)
            .into_iter()
            .collect()
    }

    fn whole_text(&self, page: &PageDocument) -> Vec<String> {
        let text = normalize_whitespace(&page.text);
        if text.is_empty() {
            Vec::new()
        } else {
            vec![text]
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> ProfileSelector {
        ProfileSelector::new(ProfileSettings::default())
    }

    fn sentence(n: usize) -> String {
        "学校坚持应用型办学定位".repeat(n)
    }

    #[test]
    fn test_heading_stage_wins() {
        let body = sentence(10);
        let html = format!(
            "<h1>首页</h1><h3>学校简介</h3><p>短</p><p>{}</p><p>{}</p>",
            body, body
        );
        let page = PageDocument::from_html("https://www.a.edu.cn/xxgk/", &html);
        let selection = selector().select(&[page]).unwrap();
        assert_eq!(selection.stage, ProfileStage::Heading);
        assert_eq!(selection.text, format!("{} {}", body, body));
        assert_eq!(selection.source_url, "https://www.a.edu.cn/xxgk/");
    }

    #[test]
    fn test_heading_stage_across_pages_before_paragraph_stage() {
        let long = sentence(30);
        let first = PageDocument::from_html(
            "https://www.a.edu.cn/news/",
            &format!("<p>{}</p>", long),
        );
        let second = PageDocument::from_html(
            "https://www.a.edu.cn/gk/",
            &format!("<h2>学院概况</h2><div>{}</div>", sentence(20)),
        );
        let selection = selector().select(&[first, second]).unwrap();
        assert_eq!(selection.stage, ProfileStage::Heading);
        assert_eq!(selection.source_url, "https://www.a.edu.cn/gk/");
    }

    #[test]
    fn test_paragraph_stage_respects_url_threshold() {
        // 220 字符：概况 URL 通过（>150），普通 URL 不通过（需 >250）
        let para = sentence(20);
        let plain = PageDocument::from_html("https://www.a.edu.cn/list/", &format!("<p>{}</p>", para));
        let about = PageDocument::from_html("https://www.a.edu.cn/about/", &format!("<p>{}</p>", para));

        assert!(selector().select(&[plain.clone()]).is_none());
        let selection = selector().select(&[plain, about]).unwrap();
        assert_eq!(selection.stage, ProfileStage::Paragraph);
        assert_eq!(selection.source_url, "https://www.a.edu.cn/about/");
    }

    #[test]
    fn test_heading_block_below_default_url_threshold() {
        // 220 字符的标题块：概况 URL 在标题阶段命中，普通 URL 被门槛拒绝且无后备
        let html = format!("<h2>学校简介</h2><p>{}</p>", sentence(20));
        let plain = PageDocument::from_html("https://www.a.edu.cn/list/", &html);
        assert!(selector().select(&[plain.clone()]).is_none());

        let about = PageDocument::from_html("https://www.a.edu.cn/xxgk/", &html);
        let selection = selector().select(&[plain, about]).unwrap();
        assert_eq!(selection.stage, ProfileStage::Heading);
        assert_eq!(selection.source_url, "https://www.a.edu.cn/xxgk/");
    }

    #[test]
    fn test_rejected_heading_tries_other_headings_on_page() {
        let body = sentence(20);
        let html = format!(
            "<h3>学校简介</h3><p>{}</p><h2>学院概况</h2><p>{}</p>",
            body, body
        );
        let page = PageDocument::from_html("https://www.a.edu.cn/list/", &html);
        let selection = selector().select(&[page]).unwrap();
        assert_eq!(selection.stage, ProfileStage::Heading);
        assert_eq!(selection.text, format!("{} {}", body, body));
    }

    #[test]
    fn test_whole_text_fallback() {
        let text = "概况 ".repeat(100);
        let page = PageDocument::from_text("https://www.a.edu.cn/jianjie.htm", &text);
        let selection = selector().select(&[page]).unwrap();
        // 纯文本页面的段落是按行切分的，这里只有一行，会在段落阶段命中
        assert_eq!(selection.stage, ProfileStage::Paragraph);

        let html = format!("<span>{}</span>", text);
        let page = PageDocument::from_html("https://www.a.edu.cn/jianjie.htm", &html);
        let selection = selector().select(&[page]).unwrap();
        assert_eq!(selection.stage, ProfileStage::WholeText);
    }

    #[test]
    fn test_no_pages_or_short_pages() {
        assert!(selector().select(&[]).is_none());
        let page = PageDocument::from_html("https://www.a.edu.cn/", "<p>太短</p>");
        assert!(selector().select(&[page]).is_none());
    }

    #[test]
    fn test_snippet_truncates_by_chars() {
        let selection = ProfileSelection {
            text: "国际化".repeat(400),
            source_url: String::new(),
            stage: ProfileStage::WholeText,
        };
        assert_eq!(selection.snippet(800).chars().count(), 800);
    }
}
