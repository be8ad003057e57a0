//! 优化器
//!
//! 两种优化器共享同一个代价函数接口, 均只依赖代价值, 不需要解析梯度。

pub mod genetic;
pub mod gradient;

use serde::{Deserialize, Serialize};

use tom_core::Result;

pub use genetic::{GeneticAlgorithm, GeneticConfig, Population, Selection};
pub use gradient::{GradientDescent, GradientDescentConfig};

/// 代价函数: 参数向量 -> 非负标量
pub trait CostFunction: Send {
    fn evaluate(&mut self, values: &[f64]) -> Result<f64>;
}

impl<F> CostFunction for F
where
    F: FnMut(&[f64]) -> f64 + Send,
{
    fn evaluate(&mut self, values: &[f64]) -> Result<f64> {
        Ok(self(values))
    }
}

/// 单次优化运行的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// 最终参数向量
    pub values: Vec<f64>,
    /// 最终训练代价
    pub final_cost: f64,
    /// 代价轨迹 (梯度下降: 每次迭代; 遗传算法: 每代最优)
    pub cost_trace: Vec<f64>,
    /// 是否被半程剪枝提前终止
    pub pruned: bool,
    /// 实际执行的迭代/代数
    pub iterations: usize,
}
