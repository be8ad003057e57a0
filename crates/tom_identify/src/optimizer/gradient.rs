//! 数值梯度下降
//!
//! 梯度由对称有限差分估计; 某个参数的估计梯度恰好为 0 时,
//! 其差分步长翻倍重试, 直到达到上限。学习率按指数衰减:
//! `rate = learning_rate · exp(decay · k)`。

use serde::{Deserialize, Serialize};
use tracing::debug;

use tom_core::{Result, TomError};

use super::{CostFunction, RunOutcome};
use crate::parameter::Parameter;

/// 梯度下降配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientDescentConfig {
    /// 最大迭代次数
    pub n_iterations: usize,
    /// 初始学习率
    pub learning_rate: f64,
    /// 学习率指数衰减系数 (通常为负)
    pub decay: f64,
    /// 初始差分步长
    pub initial_step: f64,
    /// 差分步长上限
    pub max_step: f64,
    /// 最近两次代价变化均小于该值时停止; 0 表示关闭
    pub epsilon: f64,
    /// 半程剪枝: 代价高于已完成批次最优值的相对容差
    pub half_time_tolerance: f64,
    /// 半程剪枝的绝对容差下限
    pub half_time_abs_tolerance: f64,
    /// 是否启用半程剪枝
    pub half_time_pruning: bool,
}

impl Default for GradientDescentConfig {
    fn default() -> Self {
        Self {
            n_iterations: 200,
            learning_rate: 0.05,
            decay: -0.005,
            initial_step: 1e-3,
            max_step: 0.1,
            epsilon: 1e-9,
            half_time_tolerance: 0.1,
            half_time_abs_tolerance: 1e-6,
            half_time_pruning: true,
        }
    }
}

impl GradientDescentConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        let steps_ok = self.initial_step > 0.0
            && self.max_step.is_finite()
            && self.max_step >= self.initial_step;
        if !steps_ok {
            return Err(TomError::InvalidSettings(format!(
                "finite difference step must satisfy 0 < initial ({}) <= max ({})",
                self.initial_step, self.max_step
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TomError::InvalidSettings(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// 梯度下降优化器
#[derive(Debug, Clone, Default)]
pub struct GradientDescent {
    config: GradientDescentConfig,
}

impl GradientDescent {
    pub fn new(config: GradientDescentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GradientDescentConfig {
        &self.config
    }

    /// 从参数当前值出发优化
    ///
    /// `prune_threshold` 为已完成批次中的最优代价; 运行到一半时
    /// 代价仍明显高于它则提前终止并标记为剪枝。
    pub fn run<C: CostFunction + ?Sized>(
        &self,
        params: &[Parameter],
        cost: &mut C,
        prune_threshold: Option<f64>,
    ) -> Result<RunOutcome> {
        self.config.validate()?;
        let cfg = &self.config;
        let mut values: Vec<f64> = params.iter().map(|p| p.clamp(p.value)).collect();
        let mut steps = vec![cfg.initial_step; values.len()];
        let mut current = cost.evaluate(&values)?;
        let mut trace = vec![current];
        let half = cfg.n_iterations / 2;
        let mut pruned = false;
        let mut iterations = 0;

        for k in 0..cfg.n_iterations {
            let rate = cfg.learning_rate * (cfg.decay * k as f64).exp();
            let gradient = self.gradient(params, &values, &mut steps, cost)?;
            for ((v, g), p) in values.iter_mut().zip(&gradient).zip(params) {
                *v = p.clamp(*v - rate * g);
            }

            current = cost.evaluate(&values)?;
            trace.push(current);
            iterations = k + 1;

            if cfg.epsilon > 0.0 && converged(&trace, cfg.epsilon) {
                debug!(iteration = iterations, cost = current, "gradient descent converged");
                break;
            }

            if cfg.half_time_pruning && iterations == half {
                if let Some(best) = prune_threshold {
                    let limit =
                        best * (1.0 + cfg.half_time_tolerance) + cfg.half_time_abs_tolerance;
                    if current > limit {
                        debug!(cost = current, best, "run pruned at half time");
                        pruned = true;
                        break;
                    }
                }
            }
        }

        Ok(RunOutcome {
            values,
            final_cost: current,
            cost_trace: trace,
            pruned,
            iterations,
        })
    }

    /// 对称有限差分梯度, 边界处单侧截断
    fn gradient<C: CostFunction + ?Sized>(
        &self,
        params: &[Parameter],
        values: &[f64],
        steps: &mut [f64],
        cost: &mut C,
    ) -> Result<Vec<f64>> {
        let mut shifted = values.to_vec();
        let mut gradient = vec![0.0; values.len()];

        for i in 0..values.len() {
            loop {
                let h = steps[i];
                let up = params[i].clamp(values[i] + h);
                let down = params[i].clamp(values[i] - h);
                let g = if up > down {
                    shifted[i] = up;
                    let f_up = cost.evaluate(&shifted)?;
                    shifted[i] = down;
                    let f_down = cost.evaluate(&shifted)?;
                    (f_up - f_down) / (up - down)
                } else {
                    0.0
                };
                shifted[i] = values[i];

                if g == 0.0 && h < self.config.max_step {
                    steps[i] = (h * 2.0).min(self.config.max_step);
                    continue;
                }
                gradient[i] = g;
                break;
            }
        }
        Ok(gradient)
    }
}

/// 最近两次代价变化均小于 epsilon
fn converged(trace: &[f64], epsilon: f64) -> bool {
    match trace {
        [.., a, b, c] => (a - b).abs() < epsilon && (b - c).abs() < epsilon,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterTarget;
    use tom_fcm::NodeId;

    fn param(value: f64, minimum: f64, maximum: f64) -> Parameter {
        Parameter {
            value,
            minimum,
            maximum,
            name: "x".to_string(),
            target: ParameterTarget::SlowValue { node: NodeId(0) },
            perception: false,
        }
    }

    #[test]
    fn test_quadratic_converges() {
        let gd = GradientDescent::default();
        let mut cost = |x: &[f64]| (x[0] - 3.0).powi(2);
        let outcome = gd.run(&[param(0.0, -10.0, 10.0)], &mut cost, None).unwrap();

        assert!((outcome.values[0] - 3.0).abs() < 0.05, "got {}", outcome.values[0]);
        assert!(!outcome.pruned);
        for w in outcome.cost_trace.windows(2) {
            assert!(w[1] <= w[0] + 1e-12);
        }
    }

    #[test]
    fn test_respects_bounds() {
        let gd = GradientDescent::default();
        let mut cost = |x: &[f64]| (x[0] - 3.0).powi(2);
        let outcome = gd.run(&[param(0.0, -1.0, 1.0)], &mut cost, None).unwrap();
        assert!(outcome.values[0] <= 1.0);
        assert!((outcome.values[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_flat_region_grows_step() {
        // 右侧 0.05 之外才有坡度, 初始步长 1e-3 探测不到, 翻倍后可以
        let gd = GradientDescent::default();
        let mut cost = |x: &[f64]| if x[0] < 0.55 { 1.0 } else { 1.0 + (x[0] - 0.55) };
        let outcome = gd.run(&[param(0.5, -1.0, 1.0)], &mut cost, None).unwrap();
        assert!(outcome.values[0] < 0.5);
        assert_eq!(outcome.final_cost, 1.0);
    }

    #[test]
    fn test_half_time_pruning() {
        let config = GradientDescentConfig {
            n_iterations: 20,
            learning_rate: 1e-4,
            decay: 0.0,
            ..Default::default()
        };
        let gd = GradientDescent::new(config);
        let mut cost = |x: &[f64]| (x[0] - 3.0).powi(2);
        let outcome = gd.run(&[param(0.0, -10.0, 10.0)], &mut cost, Some(0.0)).unwrap();
        assert!(outcome.pruned);
        assert_eq!(outcome.iterations, 10);

        let outcome = gd.run(&[param(0.0, -10.0, 10.0)], &mut cost, None).unwrap();
        assert!(!outcome.pruned);
        assert_eq!(outcome.iterations, 20);
    }

    #[test]
    fn test_epsilon_stops_early() {
        let gd = GradientDescent::default();
        let mut cost = |_: &[f64]| 1.0;
        let outcome = gd.run(&[param(0.0, -1.0, 1.0)], &mut cost, None).unwrap();
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.cost_trace.len(), 3);
    }

    #[test]
    fn test_invalid_config_rejected_by_run() {
        let mut cost = |_: &[f64]| 1.0;
        let params = [param(0.0, -1.0, 1.0)];
        let invalid = [
            GradientDescentConfig {
                initial_step: 0.0,
                ..Default::default()
            },
            GradientDescentConfig {
                max_step: f64::NAN,
                ..Default::default()
            },
            GradientDescentConfig {
                max_step: f64::INFINITY,
                ..Default::default()
            },
            GradientDescentConfig {
                learning_rate: f64::NAN,
                ..Default::default()
            },
        ];
        for config in invalid {
            let err = GradientDescent::new(config).run(&params, &mut cost, None).unwrap_err();
            assert!(matches!(err, TomError::InvalidSettings(_)), "{:?}", err);
        }
    }
}
