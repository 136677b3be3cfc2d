//! 主成分分析：标准化 + 协方差矩阵 Jacobi 特征分解

use super::normalize::zscore;

const MAX_SWEEPS: usize = 100;
const OFF_DIAGONAL_EPS: f64 = 1e-20;

/// PCA 拟合结果，成分按特征值降序排列
#[derive(Debug, Clone, PartialEq)]
pub struct PcaFit {
    pub eigenvalues: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
    /// `loadings[k][j]`：第 k 个成分在第 j 个输入列上的载荷
    pub loadings: Vec<Vec<f64>>,
    /// `scores[i][k]`：第 i 行在第 k 个成分上的得分
    pub scores: Vec<Vec<f64>>,
}

impl PcaFit {
    /// 第 `component` 个成分（从 0 开始）的全部行得分
    pub fn component_scores(&self, component: usize) -> Option<Vec<f64>> {
        if component >= self.eigenvalues.len() {
            return None;
        }
        Some(self.scores.iter().map(|row| row[component]).collect())
    }
}

/// 对 `columns`（每个元素是一列，长度一致且无缺失）做 PCA
///
/// 每列先做总体标准差的 z-score；协方差以 n-1 为分母。
/// 每个特征向量的符号取“绝对值最大的载荷为正”。
pub fn fit(columns: &[Vec<f64>]) -> Result<PcaFit, String> {
    let features = columns.len();
    if features == 0 {
        return Err("no input columns".to_string());
    }
    let rows = columns[0].len();
    if rows < 2 {
        return Err(format!("need at least 2 rows, got {}", rows));
    }
    if let Some(bad) = columns.iter().position(|c| c.len() != rows) {
        return Err(format!("column {} has {} rows, expected {}", bad, columns[bad].len(), rows));
    }

    let standardized: Vec<Vec<f64>> = columns.iter().map(|c| zscore(c)).collect();

    let mut covariance = vec![vec![0.0; features]; features];
    for a in 0..features {
        for b in a..features {
            let sum: f64 = (0..rows)
                .map(|i| standardized[a][i] * standardized[b][i])
                .sum();
            let value = sum / (rows as f64 - 1.0);
            covariance[a][b] = value;
            covariance[b][a] = value;
        }
    }

    let (values, vectors) = jacobi_eigen(covariance);

    let mut order: Vec<usize> = (0..features).collect();
    order.sort_by(|&x, &y| values[y].total_cmp(&values[x]));

    let eigenvalues: Vec<f64> = order.iter().map(|&k| values[k].max(0.0)).collect();
    let total: f64 = eigenvalues.iter().sum();
    let explained_variance_ratio = eigenvalues
        .iter()
        .map(|v| if total > 0.0 { v / total } else { 0.0 })
        .collect();

    let loadings: Vec<Vec<f64>> = order
        .iter()
        .map(|&k| {
            let mut vector: Vec<f64> = (0..features).map(|j| vectors[j][k]).collect();
            let pivot = vector
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            if pivot < 0.0 {
                vector.iter_mut().for_each(|v| *v = -*v);
            }
            vector
        })
        .collect();

    let scores = (0..rows)
        .map(|i| {
            loadings
                .iter()
                .map(|vector| (0..features).map(|j| standardized[j][i] * vector[j]).sum())
                .collect()
        })
        .collect();

    Ok(PcaFit {
        eigenvalues,
        explained_variance_ratio,
        loadings,
        scores,
    })
}

/// 对称矩阵的循环 Jacobi 特征分解，返回 (特征值, 特征向量按列存放)
fn jacobi_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v = vec![vec![0.0; n]; n];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for _ in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum();
        if off < OFF_DIAGONAL_EPS {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q].abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[k][p];
                    let akq = a[k][q];
                    a[k][p] = c * akp - s * akq;
                    a[k][q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[p][k];
                    let aqk = a[q][k];
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let vkp = row[p];
                    let vkq = row[q];
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let values = (0..n).map(|i| a[i][i]).collect();
    (values, v)
}
