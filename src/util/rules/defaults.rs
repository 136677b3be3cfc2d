//! 内置规则与词表（配置文件未覆盖时使用）

use super::model::{Coercion, ExtractionRule, RuleSet, ValueGuard};
use crate::util::extract::tagger::TagLabel;

/// 基础办学指标抽取规则
pub fn basic_metric_rules() -> RuleSet {
    RuleSet::new(vec![
        ExtractionRule::new("founded_year", Coercion::Integer)
            .pattern(r"(始建于|建校于|创建于|创办于)\s*(\d{4})\s*年", 2)
            .guard(ValueGuard::between(1900.0, 2100.0)),
        ExtractionRule::new("students_total", Coercion::Magnitude)
            .pattern(
                r"(现有在校生|在校生|在校学生|全日制在校生)[^0-9万]{0,10}([\d,，\.万]+)\s*人",
                2,
            )
            .pattern(r"(全日制本专科生|全日制本科生)[^0-9万]{0,10}([\d,，\.万]+)\s*人", 2)
            .guard(ValueGuard::positive()),
        ExtractionRule::new("teachers", Coercion::Magnitude)
            .default_target("teachers_total")
            .pattern(r"(专任教师)[^0-9万]{0,10}([\d,，\.万]+)\s*人", 2)
            // 总数模式不匹配“专任教师”
            .pattern(r"(教职工|(?:^|[^任])教师)[^0-9万]{0,10}([\d,，\.万]+)\s*人", 2)
            .route(1, "专任", "fulltime_teachers")
            .guard(ValueGuard::positive()),
        ExtractionRule::new("campus_count", Coercion::ChineseNumeral)
            .pattern(
                r"(设有|拥有|现有)[^校区\d一二两三四五六七八九十]{0,5}(\d+|一|二|两|三|四|五|六|七|八|九|十)\s*个?校区",
                2,
            )
            .guard(ValueGuard::positive()),
        ExtractionRule::new("college_count", Coercion::Integer)
            .pattern(r"(设有|下设|建有)[^学院\d]{0,5}(\d+)\s*个?(二级)?学院", 2)
            .guard(ValueGuard::positive()),
        ExtractionRule::new("major_count", Coercion::Integer)
            .pattern(r"(开设|设有|拥有)[^专业\d]{0,5}(\d+)\s*个?(本科)?专业", 2)
            .guard(ValueGuard::positive()),
        ExtractionRule::new("campus_area_mu", Coercion::Magnitude)
            .pattern(r"占地面积[^0-9万]{0,10}([\d,，\.万]+)\s*亩", 1)
            .guard(ValueGuard::positive()),
        ExtractionRule::new("campus_area_m2", Coercion::Magnitude)
            .pattern(r"占地面积[^0-9万]{0,10}([\d,，\.万]+)\s*万?\s*平方米", 1)
            .guard(ValueGuard::positive()),
        ExtractionRule::new("library_books", Coercion::Magnitude)
            .pattern(r"(馆藏|藏书|图书馆)[^0-9万]{0,10}([\d,，\.万]+)\s*册", 2)
            .guard(ValueGuard::positive()),
        ExtractionRule::new("labs_count", Coercion::Integer)
            .pattern(r"(实验室|实训室|实训基地)[^0-9]{0,8}(\d+)\s*个", 2)
            .guard(ValueGuard::positive()),
        ExtractionRule::new("student_teacher_ratio", Coercion::Float)
            .pattern(r"师生比\s*为?\s*([0-9\.]+)\s*[:：]\s*1", 1)
            .guard(ValueGuard::positive()),
    ])
}

/// 办学定位分类表
pub fn positioning_taxonomy() -> Vec<TagLabel> {
    vec![
        TagLabel::new(
            "应用型",
            &["应用型", "应用技术型", "应用型本科", "实践教学", "产教融合", "校企合作"],
        ),
        TagLabel::new(
            "国际化",
            &[
                "国际化",
                "international",
                "海外交流",
                "境外交流",
                "海外高校",
                "联合培养",
                "中外合作办学",
            ],
        ),
        TagLabel::new(
            "东盟",
            &["东盟", "asean", "一带一路", "rcep", "澜湄合作", "泛北部湾"],
        ),
        TagLabel::new(
            "外语特色",
            &["外国语", "外语学院", "翻译", "口译", "笔译", "小语种", "语言类"],
        ),
        TagLabel::new(
            "商科/经管",
            &["商学院", "经济管理", "经管", "工商管理", "会计学", "金融学", "市场营销"],
        ),
        TagLabel::new("师范", &["师范", "教师教育", "教育学院", "教师培养"]),
        TagLabel::new(
            "医学健康",
            &["医学院", "护理学", "医学", "康复", "健康管理"],
        ),
        TagLabel::new(
            "信息技术",
            &["信息工程", "计算机科学", "软件工程", "大数据", "人工智能", "网络技术"],
        ),
    ]
}

/// 文本国际化打分词表
pub fn tli_keywords() -> Vec<String> {
    [
        "国际化", "国际", "全球", "全球化", "国际视野", "外国语", "外语", "多语种", "多语言",
        "跨文化", "跨国", "国际合作", "海外交流", "境外交流", "访学", "交换生", "留学生",
        "国际学生", "东盟", "东南亚", "RCEP", "一带一路",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// 概况类标题关键词
pub fn profile_heading_keywords() -> Vec<String> {
    to_strings(&[
        "学校概况",
        "学院概况",
        "学校简介",
        "学院简介",
        "学校介绍",
        "学院介绍",
        "校情总览",
    ])
}

/// 概况类链接文字关键词（用于在官网首页发现概况页）
pub fn about_link_keywords() -> Vec<String> {
    let mut keywords = profile_heading_keywords();
    keywords.extend(to_strings(&["信息公开", "学校概览"]));
    keywords
}

/// 概况类 URL 关键词
pub fn overview_url_keywords() -> Vec<String> {
    to_strings(&["gk", "gaikuang", "jianjie", "about", "xxgk"])
}

/// 系统/登录类 URL 关键词
pub fn blocked_url_keywords() -> Vec<String> {
    to_strings(&[
        "jwgl", "jwglxt", "jwc", "ids", "caslogin", "login", "vpn", "webvpn", "sso", "oa.",
        "mail.", "webmail", "ecard", "xsgl", "student", "teacher", "portal",
    ])
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
