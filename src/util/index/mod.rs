//! 综合指数构建
//!
//! 流程固定：列筛选 → 中位数填补 →（可选）PCA → log1p 变换 → min-max 归一化
//! → 子指数加权 → 综合指数加权 → 排名。输入是冻结的记录表快照，输出为新表。

pub mod normalize;
pub mod pca;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{FieldValue, RecordTable};
use normalize::{impute_median, log1p_clamped, minmax, non_null_fraction, rank_min_desc};

/// 权重和允许的误差
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("required column '{0}' is absent from the table")]
    MissingColumn(String),
    #[error("weights of {scope} sum to {sum}, expected 1.0")]
    InvalidWeights { scope: String, sum: f64 },
    #[error("composite references unknown sub-index '{0}'")]
    UnknownSubIndex(String),
    #[error("table has no records")]
    EmptyTable,
    #[error("pca failed: {0}")]
    Pca(String),
}

/// 分量的预处理变换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    None,
    Log1p,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub column: String,
    pub weight: f64,
    #[serde(default)]
    pub transform: Transform,
}

impl ComponentSpec {
    pub fn new(column: &str, weight: f64, transform: Transform) -> Self {
        Self {
            column: column.to_string(),
            weight,
            transform,
        }
    }

    /// 归一化结果写入的列名
    pub fn output_column(&self) -> String {
        match self.transform {
            Transform::None => format!("{}_norm", self.column),
            Transform::Log1p => format!("{}_log_norm", self.column),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubIndexSpec {
    pub name: String,
    pub components: Vec<ComponentSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSpec {
    pub sub_index: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeSpec {
    pub name: String,
    pub rank_column: String,
    pub weights: Vec<WeightSpec>,
}

impl Default for CompositeSpec {
    fn default() -> Self {
        Self {
            name: "IACI".to_string(),
            rank_column: "IACI_rank".to_string(),
            weights: ["LRI", "ICI", "ARII", "TLI"]
                .iter()
                .map(|name| WeightSpec {
                    sub_index: name.to_string(),
                    weight: 0.25,
                })
                .collect(),
        }
    }
}

/// PCA 阶段：输入列为空时自动选用表中全部数值列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaSpec {
    pub inputs: Vec<String>,
    /// 取第几个主成分（从 1 开始）
    pub component: usize,
    pub output_column: String,
}

impl Default for PcaSpec {
    fn default() -> Self {
        Self {
            inputs: [
                "founded_year",
                "students_total",
                "teachers_total",
                "fulltime_teachers",
                "campus_count",
                "college_count",
                "major_count",
                "campus_area_mu",
                "campus_area_m2",
                "library_books",
                "labs_count",
                "student_teacher_ratio",
                "employment_rate_2024",
                "employment_rate_2025",
                "further_study_rate_2025",
                "intl_partner_universities_count",
                "intl_partner_countries_count",
                "studyabroad_students_annual",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            component: 4,
            output_column: "intl_score_raw".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// 非空比例低于该值的列在填补前丢弃
    pub non_null_threshold: f64,
    pub exclude_columns: Vec<String>,
    pub pca: Option<PcaSpec>,
    pub sub_indices: Vec<SubIndexSpec>,
    pub composite: CompositeSpec,
    /// 合成前对每个子指数再做一次 min-max
    pub renormalize_sub_indices: bool,
    pub rank_sub_indices: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            non_null_threshold: 0.5,
            exclude_columns: vec!["school_code".to_string(), "year".to_string()],
            pca: Some(PcaSpec::default()),
            sub_indices: vec![
                SubIndexSpec {
                    name: "LRI".to_string(),
                    components: vec![
                        ComponentSpec::new("languages_offered_count", 0.6, Transform::Log1p),
                        ComponentSpec::new("foreign_major_count", 0.4, Transform::Log1p),
                    ],
                },
                SubIndexSpec {
                    name: "ICI".to_string(),
                    components: vec![ComponentSpec::new("intl_score_raw", 1.0, Transform::None)],
                },
                SubIndexSpec {
                    name: "ARII".to_string(),
                    components: vec![
                        ComponentSpec::new("asean_partner_universities_count", 0.4, Transform::None),
                        ComponentSpec::new("asean_partner_countries_count", 0.3, Transform::None),
                        ComponentSpec::new("asean_program_count", 0.3, Transform::None),
                    ],
                },
                SubIndexSpec {
                    name: "TLI".to_string(),
                    components: vec![ComponentSpec::new("raw_tli_score", 1.0, Transform::None)],
                },
            ],
            composite: CompositeSpec::default(),
            renormalize_sub_indices: true,
            rank_sub_indices: false,
        }
    }
}

impl IndexSettings {
    /// 权重与引用检查（不依赖数据）
    pub fn check(&self) -> Result<(), IndexError> {
        let mut names = HashSet::new();
        for sub in &self.sub_indices {
            names.insert(sub.name.as_str());
            let sum: f64 = sub.components.iter().map(|c| c.weight).sum();
            check_weight_sum(&format!("sub-index '{}'", sub.name), sum)?;
        }
        for weight in &self.composite.weights {
            if !names.contains(weight.sub_index.as_str()) {
                return Err(IndexError::UnknownSubIndex(weight.sub_index.clone()));
            }
        }
        let sum: f64 = self.composite.weights.iter().map(|w| w.weight).sum();
        check_weight_sum(&format!("composite '{}'", self.composite.name), sum)
    }

    fn pca_output(&self) -> Option<&str> {
        self.pca.as_ref().map(|p| p.output_column.as_str())
    }

    /// 本构建器会写入的全部列
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        if let Some(out) = self.pca_output() {
            columns.push(out.to_string());
        }
        for sub in &self.sub_indices {
            columns.extend(sub.components.iter().map(ComponentSpec::output_column));
            columns.push(sub.name.clone());
            columns.push(format!("{}_norm", sub.name));
            columns.push(format!("{}_rank", sub.name));
        }
        columns.push(self.composite.name.clone());
        columns.push(self.composite.rank_column.clone());
        columns
    }
}

fn check_weight_sum(scope: &str, sum: f64) -> Result<(), IndexError> {
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(IndexError::InvalidWeights {
            scope: scope.to_string(),
            sum,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedColumn {
    pub column: String,
    pub non_null_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PcaReport {
    pub inputs: Vec<String>,
    pub component: usize,
    pub output_column: String,
    pub explained_variance_ratio: Vec<f64>,
    /// 所选成分在各输入列上的载荷
    pub loadings: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubIndexReport {
    pub name: String,
    pub weights: Vec<(String, f64)>,
    pub dropped_components: Vec<String>,
}

/// 构建过程摘要
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct IndexReport {
    pub rows: usize,
    pub kept_columns: Vec<String>,
    pub dropped_columns: Vec<DroppedColumn>,
    pub medians: BTreeMap<String, f64>,
    pub pca: Option<PcaReport>,
    pub sub_indices: Vec<SubIndexReport>,
    pub removed_sub_indices: Vec<String>,
    pub composite_weights: Vec<(String, f64)>,
}

/// 综合指数构建器；配置在构造时校验
pub struct IndexBuilder {
    settings: IndexSettings,
}

impl IndexBuilder {
    pub fn new(settings: IndexSettings) -> Result<Self, IndexError> {
        settings.check()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// `build_composite(table)`：返回附加了归一化列、子指数、综合指数与排名的新表
    pub fn build(&self, table: &RecordTable) -> Result<(RecordTable, IndexReport), IndexError> {
        if table.is_empty() {
            return Err(IndexError::EmptyTable);
        }
        let settings = &self.settings;
        let pca_output = settings.pca_output();
        let rows = table.len();
        let mut report = IndexReport {
            rows,
            ..Default::default()
        };

        // 1. 必需列与候选列
        let mut candidates: Vec<String> = Vec::new();
        for sub in &settings.sub_indices {
            for component in &sub.components {
                if Some(component.column.as_str()) == pca_output {
                    continue;
                }
                if !table.has_column(&component.column) {
                    return Err(IndexError::MissingColumn(component.column.clone()));
                }
                push_unique(&mut candidates, &component.column);
            }
        }
        let pca_inputs = match &settings.pca {
            Some(spec) => self.pca_candidates(table, spec),
            None => Vec::new(),
        };
        for column in &pca_inputs {
            push_unique(&mut candidates, column);
        }
        candidates.retain(|c| !settings.exclude_columns.contains(c));

        // 2. 列筛选 + 3. 中位数填补
        let mut working: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for column in &candidates {
            let values = table.numeric_column(column).unwrap_or_default();
            let fraction = non_null_fraction(&values);
            if fraction < settings.non_null_threshold {
                info!(
                    event = "index.column_dropped",
                    column = %column,
                    non_null_fraction = fraction
                );
                report.dropped_columns.push(DroppedColumn {
                    column: column.clone(),
                    non_null_fraction: fraction,
                });
                continue;
            }
            let Some((filled, fill)) = impute_median(&values) else {
                continue;
            };
            report.kept_columns.push(column.clone());
            report.medians.insert(column.clone(), fill);
            working.insert(column.clone(), filled);
        }

        let mut output = table.clone();

        // 4. PCA
        if let Some(spec) = &settings.pca {
            let inputs: Vec<String> = pca_inputs
                .iter()
                .filter(|c| working.contains_key(*c))
                .cloned()
                .collect();
            let pca_report = run_pca(spec, &inputs, &working)?;
            let scores = pca_report.1;
            output.set_column(
                &spec.output_column,
                scores.iter().copied().map(FieldValue::from_f64).collect(),
            );
            working.insert(spec.output_column.clone(), scores);
            report.pca = Some(pca_report.0);
        }

        // 5. 子指数
        let mut sub_values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for sub in &settings.sub_indices {
            let mut used: Vec<(&ComponentSpec, &Vec<f64>)> = Vec::new();
            let mut dropped = Vec::new();
            for component in &sub.components {
                match working.get(&component.column) {
                    Some(values) => used.push((component, values)),
                    None => dropped.push(component.column.clone()),
                }
            }

            let weight_sum: f64 = used.iter().map(|(c, _)| c.weight).sum();
            if used.is_empty() || weight_sum <= 0.0 {
                warn!(
                    event = "index.sub_index_removed",
                    sub_index = %sub.name,
                    dropped = ?dropped
                );
                report.removed_sub_indices.push(sub.name.clone());
                continue;
            }
            if !dropped.is_empty() {
                warn!(
                    event = "index.weights_renormalized",
                    sub_index = %sub.name,
                    dropped = ?dropped,
                    remaining_weight = weight_sum
                );
            }

            let mut combined = vec![0.0; rows];
            let mut weights = Vec::new();
            for (component, values) in used {
                let transformed: Vec<f64> = match component.transform {
                    Transform::None => values.clone(),
                    Transform::Log1p => values.iter().copied().map(log1p_clamped).collect(),
                };
                let normalized = minmax(&transformed);
                let weight = component.weight / weight_sum;
                for (acc, v) in combined.iter_mut().zip(&normalized) {
                    *acc += weight * v;
                }
                output.set_column(&component.output_column(), to_values(&normalized));
                weights.push((component.column.clone(), weight));
            }

            output.set_column(&sub.name, to_values(&combined));
            let effective = if settings.renormalize_sub_indices {
                let renormalized = minmax(&combined);
                output.set_column(&format!("{}_norm", sub.name), to_values(&renormalized));
                renormalized
            } else {
                combined
            };
            if settings.rank_sub_indices {
                output.set_column(&format!("{}_rank", sub.name), to_ranks(&effective));
            }
            report.sub_indices.push(SubIndexReport {
                name: sub.name.clone(),
                weights,
                dropped_components: dropped,
            });
            sub_values.insert(sub.name.clone(), effective);
        }

        // 6. 综合指数 + 7. 排名
        let active: Vec<(&WeightSpec, &Vec<f64>)> = settings
            .composite
            .weights
            .iter()
            .filter_map(|w| sub_values.get(&w.sub_index).map(|v| (w, v)))
            .collect();
        let total: f64 = active.iter().map(|(w, _)| w.weight).sum();
        if active.len() < settings.composite.weights.len() {
            warn!(
                event = "index.composite_renormalized",
                composite = %settings.composite.name,
                remaining_weight = total
            );
        }

        let mut composite = vec![0.0; rows];
        if total > 0.0 {
            for (weight, values) in &active {
                let w = weight.weight / total;
                for (acc, v) in composite.iter_mut().zip(values.iter()) {
                    *acc += w * v;
                }
                report.composite_weights.push((weight.sub_index.clone(), w));
            }
        }
        output.set_column(&settings.composite.name, to_values(&composite));
        output.set_column(&settings.composite.rank_column, to_ranks(&composite));

        info!(
            event = "index.built",
            rows = rows,
            kept = report.kept_columns.len(),
            dropped = report.dropped_columns.len(),
            sub_indices = report.sub_indices.len()
        );
        Ok((output, report))
    }

    fn pca_candidates(&self, table: &RecordTable, spec: &PcaSpec) -> Vec<String> {
        if !spec.inputs.is_empty() {
            let mut present = Vec::new();
            for column in &spec.inputs {
                if table.has_column(column) {
                    present.push(column.clone());
                } else {
                    warn!(event = "index.pca_input_absent", column = %column);
                }
            }
            return present;
        }

        let outputs: HashSet<String> = self.settings.output_columns().into_iter().collect();
        table
            .columns()
            .iter()
            .filter(|c| !outputs.contains(*c) && !self.settings.exclude_columns.contains(c))
            .filter(|c| is_numeric_column(table, c))
            .cloned()
            .collect()
    }
}

fn run_pca(
    spec: &PcaSpec,
    inputs: &[String],
    working: &BTreeMap<String, Vec<f64>>,
) -> Result<(PcaReport, Vec<f64>), IndexError> {
    if spec.component == 0 || spec.component > inputs.len() {
        return Err(IndexError::Pca(format!(
            "component {} requested but only {} usable input columns",
            spec.component,
            inputs.len()
        )));
    }
    let matrix: Vec<Vec<f64>> = inputs
        .iter()
        .filter_map(|c| working.get(c).cloned())
        .collect();
    let fit = pca::fit(&matrix).map_err(IndexError::Pca)?;
    let index = spec.component - 1;
    let scores = fit
        .component_scores(index)
        .ok_or_else(|| IndexError::Pca(format!("component {} unavailable", spec.component)))?;

    info!(
        event = "index.pca_fitted",
        inputs = inputs.len(),
        component = spec.component,
        explained = fit.explained_variance_ratio[index]
    );

    let report = PcaReport {
        inputs: inputs.to_vec(),
        component: spec.component,
        output_column: spec.output_column.clone(),
        explained_variance_ratio: fit.explained_variance_ratio.clone(),
        loadings: inputs
            .iter()
            .cloned()
            .zip(fit.loadings[index].iter().copied())
            .collect(),
    };
    Ok((report, scores))
}

/// 至少一个非空值，且全部非空值都是数值类型
fn is_numeric_column(table: &RecordTable, column: &str) -> bool {
    let mut seen = false;
    for record in table.records() {
        if let Some(value) = record.get(column) {
            if !value.is_numeric() {
                return false;
            }
            seen = true;
        }
    }
    seen
}

fn push_unique(columns: &mut Vec<String>, column: &str) {
    if !columns.iter().any(|c| c == column) {
        columns.push(column.to_string());
    }
}

fn to_values(values: &[f64]) -> Vec<FieldValue> {
    values.iter().copied().map(FieldValue::from_f64).collect()
}

fn to_ranks(scores: &[f64]) -> Vec<FieldValue> {
    rank_min_desc(scores).into_iter().map(FieldValue::Int).collect()
}
