use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 规则装载错误
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule '{rule}': invalid pattern `{pattern}`: {source}")]
    InvalidRegex {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule '{rule}': pattern `{pattern}` has no capture group {group}")]
    UnknownGroup {
        rule: String,
        pattern: String,
        group: usize,
    },
    #[error("rule '{rule}' declares no patterns")]
    NoPatterns { rule: String },
    #[error("rule set cannot be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 匹配文本到字段值的转换方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Coercion {
    /// 纯整数
    Integer,
    /// 带“万”、千分位的数量
    #[default]
    Magnitude,
    /// 中文数字 一..十、两 或阿拉伯数字
    ChineseNumeral,
    Float,
}

/// 取值合法区间（开区间）；匹配成功但越界视为未匹配
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ValueGuard {
    #[serde(default)]
    pub min_exclusive: Option<f64>,
    #[serde(default)]
    pub max_exclusive: Option<f64>,
}

impl ValueGuard {
    pub fn positive() -> Self {
        Self {
            min_exclusive: Some(0.0),
            max_exclusive: None,
        }
    }

    pub fn between(min_exclusive: f64, max_exclusive: f64) -> Self {
        Self {
            min_exclusive: Some(min_exclusive),
            max_exclusive: Some(max_exclusive),
        }
    }

    pub fn accepts(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        if let Some(min) = self.min_exclusive {
            if value <= min {
                return false;
            }
        }
        if let Some(max) = self.max_exclusive {
            if value >= max {
                return false;
            }
        }
        true
    }
}

/// 限定词路由：指定捕获组包含 `contains` 时写入 `target`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifierRoute {
    #[serde(default = "default_qualifier_group")]
    pub group: usize,
    pub contains: String,
    pub target: String,
}

fn default_qualifier_group() -> usize {
    1
}

/// 单条正则及其取值捕获组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePattern {
    pub regex: String,
    #[serde(default = "default_value_group")]
    pub value_group: usize,
}

fn default_value_group() -> usize {
    1
}

impl RulePattern {
    pub fn new(regex: impl Into<String>, value_group: usize) -> Self {
        Self {
            regex: regex.into(),
            value_group,
        }
    }
}

/// 一个指标的抽取规则
///
/// 模式按声明顺序尝试，“第一个被接受的匹配获胜”：某个模式匹配但取值
/// 无法解析或未通过 `guard` 时，继续尝试下一个模式。配置了 `routes`
/// 时，同一规则可以按限定词写入不同字段，每个字段各自先到先得。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub name: String,
    /// 默认目标字段，缺省与 `name` 相同
    #[serde(default)]
    pub target: Option<String>,
    pub patterns: Vec<RulePattern>,
    #[serde(default)]
    pub coercion: Coercion,
    #[serde(default)]
    pub guard: ValueGuard,
    #[serde(default)]
    pub routes: Vec<QualifierRoute>,
}

impl ExtractionRule {
    pub fn new(name: impl Into<String>, coercion: Coercion) -> Self {
        Self {
            name: name.into(),
            target: None,
            patterns: Vec::new(),
            coercion,
            guard: ValueGuard::default(),
            routes: Vec::new(),
        }
    }

    pub fn pattern(mut self, regex: impl Into<String>, value_group: usize) -> Self {
        self.patterns.push(RulePattern::new(regex, value_group));
        self
    }

    pub fn guard(mut self, guard: ValueGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn route(mut self, group: usize, contains: impl Into<String>, target: impl Into<String>) -> Self {
        self.routes.push(QualifierRoute {
            group,
            contains: contains.into(),
            target: target.into(),
        });
        self
    }

    pub fn default_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn target_field(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.name)
    }

    /// 本规则可能写入的全部字段（默认目标在前，去重）
    pub fn target_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.target_field()];
        for route in &self.routes {
            if !fields.contains(&route.target.as_str()) {
                fields.push(route.target.as_str());
            }
        }
        fields
    }
}

/// 有序规则集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<ExtractionRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ExtractionRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 全部目标字段，按规则声明顺序
    pub fn target_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for rule in &self.rules {
            for field in rule.target_fields() {
                if !fields.iter().any(|f| f == field) {
                    fields.push(field.to_string());
                }
            }
        }
        fields
    }

    /// 覆盖同名规则，或追加到末尾
    pub fn with_rule(mut self, rule: ExtractionRule) -> Self {
        match self.rules.iter_mut().find(|r| r.name == rule.name) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
        self
    }
}
