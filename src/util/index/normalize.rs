//! 列级数值变换：缺失率、中位数填补、log1p、min-max、排名

/// 非空比例；空列返回 0
pub fn non_null_fraction(column: &[Option<f64>]) -> f64 {
    if column.is_empty() {
        return 0.0;
    }
    let present = column.iter().filter(|v| v.is_some()).count();
    present as f64 / column.len() as f64
}

/// 中位数；偶数个取中间两数的平均
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// 用非空值的中位数填补空值，返回填补后的列与所用中位数
pub fn impute_median(column: &[Option<f64>]) -> Option<(Vec<f64>, f64)> {
    let present: Vec<f64> = column.iter().flatten().copied().collect();
    let fill = median(&present)?;
    Some((column.iter().map(|v| v.unwrap_or(fill)).collect(), fill))
}

/// `ln(1 + x)`，负值按 0 处理
pub fn log1p_clamped(value: f64) -> f64 {
    value.max(0.0).ln_1p()
}

/// min-max 归一化到 [0, 1]；常数列（含空列）全部为 0
pub fn minmax(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if !span.is_finite() || span <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / span).collect()
}

/// 降序“最小”排名：rank = 1 + 严格大于自身的分数个数
pub fn rank_min_desc(scores: &[f64]) -> Vec<i64> {
    let mut sorted: Vec<f64> = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    scores
        .iter()
        .map(|score| {
            let greater = sorted.partition_point(|other| other > score);
            greater as i64 + 1
        })
        .collect()
}

/// z-score（总体标准差）；零方差列全部为 0
pub fn zscore(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std <= f64::EPSILON * mean.abs().max(1.0) {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minmax_constant_column() {
        assert_eq!(minmax(&[5.0, 5.0, 5.0]), vec![0.0, 0.0, 0.0]);
        assert!(minmax(&[]).is_empty());
    }

    #[test]
    fn test_minmax_range() {
        assert_eq!(minmax(&[2.0, 4.0, 6.0]), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_rank_min_ties() {
        assert_eq!(rank_min_desc(&[0.9, 0.9, 0.5]), vec![1, 1, 3]);
        assert_eq!(rank_min_desc(&[0.1, 0.7, 0.7, 0.9]), vec![4, 2, 2, 1]);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_impute_and_fraction() {
        let column = vec![Some(1.0), None, Some(3.0), None, None];
        assert!((non_null_fraction(&column) - 0.4).abs() < 1e-12);
        let (filled, fill) = impute_median(&column).unwrap();
        assert_eq!(fill, 2.0);
        assert_eq!(filled, vec![1.0, 2.0, 3.0, 2.0, 2.0]);
        assert!(impute_median(&[None, None]).is_none());
    }

    #[test]
    fn test_log1p_clamped() {
        assert_eq!(log1p_clamped(0.0), 0.0);
        assert_eq!(log1p_clamped(-4.0), 0.0);
        assert!((log1p_clamped(std::f64::consts::E - 1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zscore_population() {
        let z = zscore(&[1.0, 3.0]);
        assert_eq!(z, vec![-1.0, 1.0]);
        assert_eq!(zscore(&[7.0, 7.0, 7.0]), vec![0.0, 0.0, 0.0]);
    }
}
