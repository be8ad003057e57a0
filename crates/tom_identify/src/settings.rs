//! 辨识配置
//!
//! 所有字段都有默认值, JSON 配置文件中只需写出要覆盖的部分。

use std::path::Path;

use serde::{Deserialize, Serialize};

use tom_core::{Result, TomError};

use crate::optimizer::{GeneticConfig, GradientDescentConfig};
use crate::parameter::ParameterScope;

/// 优化器选择
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    GradientDescent,
    Genetic,
}

impl std::str::FromStr for OptimizerKind {
    type Err = TomError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gd" | "gradient" | "gradient_descent" => Ok(OptimizerKind::GradientDescent),
            "ga" | "genetic" => Ok(OptimizerKind::Genetic),
            other => Err(TomError::InvalidSettings(format!("unknown optimizer: {}", other))),
        }
    }
}

/// 辨识配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentificationSettings {
    pub optimizer: OptimizerKind,
    pub gradient: GradientDescentConfig,
    pub genetic: GeneticConfig,
    /// 参与辨识的参数范围 (ALL / VAR_BY_VAR 模式使用)
    pub scope: ParameterScope,
    /// 整体辨识阶段的独立运行次数
    pub bulk_runs: usize,
    /// VAR_BY_VAR 每个节点的运行次数下限
    pub min_runs: usize,
    /// VAR_BY_VAR 每个节点的运行次数上限
    pub max_runs: usize,
    /// 多步预测的各步权重; 长度 1 或 2
    pub horizon_weights: Vec<f64>,
    /// 近优运行池: 相对容差
    pub near_optimal_tolerance: f64,
    /// 近优运行池: 绝对容差
    pub near_optimal_abs_tolerance: f64,
    /// 方差不超过该值的参数视为已辨识
    pub variance_threshold: f64,
    /// 保守时间步: 驱动偏差的情绪绝对值须小于该值
    pub conservative_threshold: f64,
    /// 热启动时除第一次运行外的随机扰动幅度 (相对取值范围)
    pub warm_start_jitter: f64,
    /// 同一批次的运行是否并行
    pub parallel: bool,
    /// 每批运行数
    pub batch_size: usize,
    /// 根随机种子
    pub seed: u64,
    /// 重放观测时是否插入虚拟观测
    pub interpolate: bool,
}

impl Default for IdentificationSettings {
    fn default() -> Self {
        Self {
            optimizer: OptimizerKind::default(),
            gradient: GradientDescentConfig::default(),
            genetic: GeneticConfig::default(),
            scope: ParameterScope::default(),
            bulk_runs: 20,
            min_runs: 5,
            max_runs: 100,
            horizon_weights: vec![1.0],
            near_optimal_tolerance: 0.05,
            near_optimal_abs_tolerance: 1e-6,
            variance_threshold: 1e-3,
            conservative_threshold: 0.5,
            warm_start_jitter: 0.05,
            parallel: false,
            batch_size: 8,
            seed: 42,
            interpolate: false,
        }
    }
}

impl IdentificationSettings {
    /// 从 JSON 文本解析
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.horizon_weights.is_empty() || self.horizon_weights.len() > 2 {
            return Err(TomError::InvalidSettings(format!(
                "prediction horizon must be 1 or 2 steps, got {} weights",
                self.horizon_weights.len()
            )));
        }
        if self.batch_size == 0 {
            return Err(TomError::InvalidSettings("batch size must be positive".into()));
        }
        if self.bulk_runs == 0 || self.min_runs == 0 {
            return Err(TomError::InvalidSettings("run counts must be positive".into()));
        }
        if self.min_runs > self.max_runs {
            return Err(TomError::InvalidSettings(format!(
                "min_runs ({}) exceeds max_runs ({})",
                self.min_runs, self.max_runs
            )));
        }
        match self.optimizer {
            OptimizerKind::GradientDescent => self.gradient.validate(),
            OptimizerKind::Genetic => self.genetic.validate(),
        }
    }

    /// VAR_BY_VAR 下 n 个参数的运行次数: clip(n³, min, max)
    pub fn runs_for(&self, n_parameters: usize) -> usize {
        n_parameters.saturating_pow(3).clamp(self.min_runs, self.max_runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json() {
        let json = r#"{"bulk_runs": 4, "gradient": {"n_iterations": 10}}"#;
        let s = IdentificationSettings::from_json(json).unwrap();
        assert_eq!(s.bulk_runs, 4);
        assert_eq!(s.gradient.n_iterations, 10);
        assert_eq!(s.gradient.learning_rate, GradientDescentConfig::default().learning_rate);
        assert_eq!(s.horizon_weights, vec![1.0]);
    }

    #[test]
    fn test_invalid_horizon() {
        let json = r#"{"horizon_weights": [0.5, 0.3, 0.2]}"#;
        let err = IdentificationSettings::from_json(json).unwrap_err();
        assert!(matches!(err, TomError::InvalidSettings(_)));
    }

    #[test]
    fn test_invalid_genetic_counts() {
        let json = r#"{
            "optimizer": "genetic",
            "genetic": {"n_solutions": 10, "n_elite": 2, "n_crossover": 2, "n_mutation": 2}
        }"#;
        assert!(IdentificationSettings::from_json(json).is_err());
    }

    #[test]
    fn test_runs_for() {
        let s = IdentificationSettings::default();
        assert_eq!(s.runs_for(1), 5);
        assert_eq!(s.runs_for(3), 27);
        assert_eq!(s.runs_for(10), 100);
    }

    #[test]
    fn test_optimizer_from_str() {
        assert_eq!("GA".parse::<OptimizerKind>().unwrap(), OptimizerKind::Genetic);
        assert_eq!("gd".parse::<OptimizerKind>().unwrap(), OptimizerKind::GradientDescent);
        assert!("simplex".parse::<OptimizerKind>().is_err());
    }
}
