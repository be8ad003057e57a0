//! 多次独立运行执行器
//!
//! 每次运行的随机种子由根种子顺序派生, 运行按批次执行; 同一批次内可并行。
//! 半程剪枝只参考已完成批次的最优代价, 因此结果与是否并行无关。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::info;

use tom_core::{Result, TomError};

use crate::optimizer::{CostFunction, GeneticAlgorithm, GradientDescent};
use crate::parameter::{uniform, Parameter};
use crate::results::RunResult;
use crate::settings::{IdentificationSettings, OptimizerKind};

/// 多次运行执行器
#[derive(Debug, Clone, Copy)]
pub struct MultiRunExecutor<'a> {
    settings: &'a IdentificationSettings,
}

impl<'a> MultiRunExecutor<'a> {
    pub fn new(settings: &'a IdentificationSettings) -> Self {
        Self { settings }
    }

    /// 执行 n_runs 次独立优化
    ///
    /// 给定热启动时, 第 0 次运行从热启动值出发, 其余运行在其附近随机扰动;
    /// 否则所有运行在参数边界内随机初始化。
    pub fn execute<C>(
        &self,
        template: &C,
        params: &[Parameter],
        n_runs: usize,
        warm_start: Option<&[f64]>,
        seed: u64,
    ) -> Result<Vec<RunResult>>
    where
        C: CostFunction + Clone + Sync,
    {
        if let Some(ws) = warm_start {
            if ws.len() != params.len() {
                return Err(TomError::ParameterCountMismatch {
                    expected: params.len(),
                    got: ws.len(),
                });
            }
        }

        let mut root = StdRng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..n_runs).map(|_| root.gen()).collect();
        let batch_size = self.settings.batch_size.max(1);
        let mut results = Vec::with_capacity(n_runs);
        let mut best: Option<f64> = None;

        for (b, chunk) in seeds.chunks(batch_size).enumerate() {
            let start = b * batch_size;
            let threshold = best;
            let task = |(offset, seed): (usize, u64)| {
                self.run_one(template, params, start + offset, seed, warm_start, threshold)
            };

            let batch: Vec<RunResult> = if self.settings.parallel {
                chunk.par_iter().copied().enumerate().map(&task).collect::<Result<_>>()?
            } else {
                chunk.iter().copied().enumerate().map(&task).collect::<Result<_>>()?
            };

            for run in batch.iter().filter(|r| !r.pruned) {
                best = Some(best.map_or(run.final_cost, |c| c.min(run.final_cost)));
            }
            info!(
                "Batch {} done: {}/{} runs, {} pruned, best cost {:?}",
                b + 1,
                start + batch.len(),
                n_runs,
                batch.iter().filter(|r| r.pruned).count(),
                best
            );
            results.extend(batch);
        }
        Ok(results)
    }

    fn run_one<C>(
        &self,
        template: &C,
        params: &[Parameter],
        run_index: usize,
        seed: u64,
        warm_start: Option<&[f64]>,
        threshold: Option<f64>,
    ) -> Result<RunResult>
    where
        C: CostFunction + Clone,
    {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cost = template.clone();
        let mut start = params.to_vec();
        let jitter = self.settings.warm_start_jitter;

        for (i, p) in start.iter_mut().enumerate() {
            p.value = match warm_start {
                Some(ws) if run_index == 0 => p.clamp(ws[i]),
                Some(ws) => p.clamp(ws[i] + uniform(&mut rng, -jitter, jitter) * p.span()),
                None => uniform(&mut rng, p.minimum, p.maximum),
            };
        }

        let outcome = match self.settings.optimizer {
            OptimizerKind::GradientDescent => GradientDescent::new(self.settings.gradient.clone())
                .run(&start, &mut cost, threshold)?,
            OptimizerKind::Genetic => GeneticAlgorithm::new(self.settings.genetic.clone())
                .run(&start, &mut cost, &mut rng)?,
        };

        Ok(RunResult {
            run_index,
            seed,
            final_cost: outcome.final_cost,
            parameters: outcome.values,
            cost_trace: outcome.cost_trace,
            pruned: outcome.pruned,
            test_cost: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterTarget;
    use tom_fcm::NodeId;

    fn params() -> Vec<Parameter> {
        (0..2)
            .map(|i| Parameter {
                value: 0.0,
                minimum: -1.0,
                maximum: 1.0,
                name: format!("p{}", i),
                target: ParameterTarget::SlowValue { node: NodeId(i) },
                perception: false,
            })
            .collect()
    }

    fn bowl(x: &[f64]) -> f64 {
        (x[0] - 0.4).powi(2) + (x[1] + 0.2).powi(2)
    }

    fn settings(parallel: bool) -> IdentificationSettings {
        IdentificationSettings {
            parallel,
            batch_size: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let seq = settings(false);
        let par = settings(true);
        let cost = bowl as fn(&[f64]) -> f64;
        let a = MultiRunExecutor::new(&seq).execute(&cost, &params(), 7, None, 11).unwrap();
        let b = MultiRunExecutor::new(&par).execute(&cost, &params(), 7, None, 11).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 7);
        assert_eq!(a.iter().map(|r| r.run_index).collect::<Vec<_>>(), (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_warm_start_first_run() {
        let s = IdentificationSettings {
            gradient: crate::optimizer::GradientDescentConfig {
                n_iterations: 0,
                ..Default::default()
            },
            ..settings(false)
        };
        let cost = bowl as fn(&[f64]) -> f64;
        let runs = MultiRunExecutor::new(&s)
            .execute(&cost, &params(), 3, Some(&[0.4, -0.2]), 1)
            .unwrap();
        assert_eq!(runs[0].parameters, vec![0.4, -0.2]);
        assert!(runs[1..].iter().all(|r| (r.parameters[0] - 0.4).abs() <= 0.1 + 1e-12));

        let err = MultiRunExecutor::new(&s).execute(&cost, &params(), 3, Some(&[0.4]), 1);
        assert!(matches!(err, Err(TomError::ParameterCountMismatch { .. })));
    }

    #[test]
    fn test_genetic_runs() {
        let s = IdentificationSettings {
            optimizer: OptimizerKind::Genetic,
            genetic: crate::optimizer::GeneticConfig {
                n_iterations: 30,
                ..Default::default()
            },
            ..settings(true)
        };
        let cost = bowl as fn(&[f64]) -> f64;
        let runs = MultiRunExecutor::new(&s).execute(&cost, &params(), 4, None, 3).unwrap();
        assert!(runs.iter().all(|r| r.final_cost < 0.05));
    }
}
