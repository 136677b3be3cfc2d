use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 稀疏字段表：字段名 -> 值
pub type FieldMap = BTreeMap<String, FieldValue>;

/// 单个字段值（整数 / 浮点 / 文本 / 空）
///
/// 序列化时与 JSON 原生类型一一对应，`null` 对应 [`FieldValue::Null`]。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// 空值判定：`Null`、NaN、空白字符串都视为空
    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Float(v) => v.is_nan(),
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Int(_) => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        match self {
            FieldValue::Int(_) => true,
            FieldValue::Float(v) => !v.is_nan(),
            _ => false,
        }
    }

    /// 数值视图；文本按宽松规则解析，失败返回 None
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) if v.is_finite() => Some(*v),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 由浮点数构造：整值浮点保留为浮点，NaN 转为空
    pub fn from_f64(v: f64) -> Self {
        if v.is_nan() {
            FieldValue::Null
        } else {
            FieldValue::Float(v)
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Int(i64::from(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else {
                    n.as_f64().map(FieldValue::from_f64).unwrap_or_default()
                }
            }
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            other => FieldValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Int(v) => serde_json::Value::from(*v),
            FieldValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::from_f64(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_detection() {
        assert!(FieldValue::Null.is_null());
        assert!(FieldValue::Float(f64::NAN).is_null());
        assert!(FieldValue::Text("  ".into()).is_null());
        assert!(!FieldValue::Int(0).is_null());
    }

    #[test]
    fn test_json_shapes() {
        let parsed: FieldMap =
            serde_json::from_str(r#"{"a": 1, "b": 2.5, "c": "x", "d": null}"#).unwrap();
        assert_eq!(parsed["a"], FieldValue::Int(1));
        assert_eq!(parsed["b"], FieldValue::Float(2.5));
        assert_eq!(parsed["c"], FieldValue::Text("x".into()));
        assert_eq!(parsed["d"], FieldValue::Null);
    }

    #[test]
    fn test_text_as_number() {
        assert_eq!(FieldValue::Text(" 12.5 ".into()).as_f64(), Some(12.5));
        assert_eq!(FieldValue::Text("英语".into()).as_f64(), None);
    }
}
