//! 数值解析：带中文单位、千分位的数字文本转为整数

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::FieldValue;

static WAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?|\.\d+)万").expect("wan regex compile should succeed"));

/// 解析 `"3,456人"`、`"约1.2万名"`、`"80万平方米"` 之类的数量文本
///
/// - 去掉半角/全角逗号与空白，全角数字按半角处理；
/// - 含 `<小数>万` 时乘以 10000 后截断取整；
/// - 否则丢弃全部非数字字符，剩余部分按整数解析；
/// - 无数字或溢出时返回 None，从不报错。
pub fn parse_magnitude(text: &str) -> Option<i64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '，')
        .map(to_half_width_digit)
        .collect();

    if let Some(caps) = WAN_RE.captures(&cleaned) {
        let base: f64 = caps.get(1)?.as_str().parse().ok()?;
        let scaled = base * 10_000.0;
        if !scaled.is_finite() || scaled > i64::MAX as f64 {
            return None;
        }
        // 先按 6 位小数取整再截断，吸收 1.2 * 10000 = 11999.999... 一类误差
        let rounded = (scaled * 1e6).round() / 1e6;
        return Some(rounded.trunc() as i64);
    }

    let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok()
}

/// 严格整数解析（允许全角数字与首尾空白）
pub fn parse_integer(text: &str) -> Option<i64> {
    let normalized: String = text.trim().chars().map(to_half_width_digit).collect();
    if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    normalized.parse().ok()
}

/// 对任意字段值做数量解析：整数原样返回，非文本的其它值返回 None
pub fn parse_magnitude_value(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Int(v) => Some(*v),
        FieldValue::Text(s) => parse_magnitude(s),
        _ => None,
    }
}

/// 中文数字 一..十、两 以及阿拉伯数字
pub fn parse_chinese_numeral(text: &str) -> Option<i64> {
    if let Some(value) = parse_integer(text) {
        return Some(value);
    }
    let value = match text.trim() {
        "一" => 1,
        "二" | "两" => 2,
        "三" => 3,
        "四" => 4,
        "五" => 5,
        "六" => 6,
        "七" => 7,
        "八" => 8,
        "九" => 9,
        "十" => 10,
        _ => return None,
    };
    Some(value)
}

/// 宽松浮点解析，兼容全角数字与 `18:1` 形式的比值
pub fn parse_float(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .map(to_half_width_digit)
        .map(|c| if c == '：' { ':' } else { c })
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '，')
        .collect();
    let head = match cleaned.split_once(':') {
        Some((left, right)) => {
            let denominator: f64 = right.parse().ok()?;
            let numerator: f64 = left.parse().ok()?;
            if denominator == 0.0 {
                return None;
            }
            return Some(numerator / denominator).filter(|v| v.is_finite());
        }
        None => cleaned,
    };
    let head = head.trim_end_matches('%');
    head.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn to_half_width_digit(c: char) -> char {
    match c {
        '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
        '．' => '.',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_magnitude_examples() {
        assert_eq!(parse_magnitude("1,234"), Some(1234));
        assert_eq!(parse_magnitude("1.2万"), Some(12000));
        assert_eq!(parse_magnitude("80万"), Some(800000));
        assert_eq!(parse_magnitude("abc"), None);
    }

    #[test]
    fn test_parse_magnitude_noise() {
        assert_eq!(parse_magnitude("3,456人"), Some(3456));
        assert_eq!(parse_magnitude("约 1.2 万名"), Some(12000));
        assert_eq!(parse_magnitude("１２，０００"), Some(12000));
        assert_eq!(parse_magnitude("1.05万"), Some(10500));
        assert_eq!(parse_magnitude(""), None);
        assert_eq!(parse_magnitude("99999999999999999999999"), None);
    }

    #[test]
    fn test_parse_magnitude_value() {
        assert_eq!(parse_magnitude_value(&FieldValue::Int(7)), Some(7));
        assert_eq!(parse_magnitude_value(&FieldValue::Text("2万".into())), Some(20000));
        assert_eq!(parse_magnitude_value(&FieldValue::Null), None);
        assert_eq!(parse_magnitude_value(&FieldValue::Float(1.5)), None);
    }

    #[test]
    fn test_parse_integer_strict() {
        assert_eq!(parse_integer(" 42 "), Some(42));
        assert_eq!(parse_integer("４２"), Some(42));
        assert_eq!(parse_integer("42个"), None);
    }

    #[test]
    fn test_chinese_numeral() {
        assert_eq!(parse_chinese_numeral("两"), Some(2));
        assert_eq!(parse_chinese_numeral("十"), Some(10));
        assert_eq!(parse_chinese_numeral("3"), Some(3));
        assert_eq!(parse_chinese_numeral("百"), None);
    }

    #[test]
    fn test_parse_float_ratio() {
        assert_eq!(parse_float("18:1"), Some(18.0));
        assert_eq!(parse_float("17.5"), Some(17.5));
        assert_eq!(parse_float("95%"), Some(95.0));
        assert_eq!(parse_float("x"), None);
        assert_eq!(parse_float("1:0"), None);
    }
}
