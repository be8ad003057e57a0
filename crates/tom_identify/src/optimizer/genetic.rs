//! 遗传算法
//!
//! 每一代: 精英直接保留, 其余由交叉与变异产生, 种群规模保持不变。
//! 适应度 = 1/代价, 代价为 0 时取一个很大的哨兵值。

use std::cmp::Ordering;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tom_core::{Result, TomError};

use super::{CostFunction, RunOutcome};
use crate::parameter::{uniform, Parameter};

/// 代价为 0 时的适应度
pub const ZERO_COST_FITNESS: f64 = 1e12;

/// 父代选择方式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// 锦标赛选择
    Tournament { size: usize },
    /// 适应度比例 (轮盘赌) 选择
    FitnessProportional,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Tournament { size: 3 }
    }
}

/// 遗传算法配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticConfig {
    /// 种群规模
    pub n_solutions: usize,
    /// 精英数量
    pub n_elite: usize,
    /// 每代交叉产生的个体数
    pub n_crossover: usize,
    /// 每代变异产生的个体数
    pub n_mutation: usize,
    /// 代数
    pub n_iterations: usize,
    pub selection: Selection,
    /// 变异幅度 (相对参数取值范围)
    pub mutation_scale: f64,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            n_solutions: 40,
            n_elite: 4,
            n_crossover: 24,
            n_mutation: 12,
            n_iterations: 100,
            selection: Selection::default(),
            mutation_scale: 0.2,
        }
    }
}

impl GeneticConfig {
    /// 校验: 精英 + 交叉 + 变异 必须等于种群规模
    pub fn validate(&self) -> Result<()> {
        if self.n_solutions == 0 {
            return Err(TomError::InvalidSettings("population must not be empty".into()));
        }
        if self.n_elite + self.n_crossover + self.n_mutation != self.n_solutions {
            return Err(TomError::InvalidSettings(format!(
                "n_elite ({}) + n_crossover ({}) + n_mutation ({}) must equal n_solutions ({})",
                self.n_elite, self.n_crossover, self.n_mutation, self.n_solutions
            )));
        }
        if let Selection::Tournament { size: 0 } = self.selection {
            return Err(TomError::InvalidSettings("tournament size must be at least 1".into()));
        }
        Ok(())
    }
}

/// 适应度
pub fn fitness(cost: f64) -> f64 {
    if cost == 0.0 {
        ZERO_COST_FITNESS
    } else {
        1.0 / cost
    }
}

/// 种群个体
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub genes: Vec<f64>,
    pub cost: f64,
}

impl Candidate {
    pub fn fitness(&self) -> f64 {
        fitness(self.cost)
    }
}

/// 种群, 按适应度降序保存
#[derive(Debug, Clone)]
pub struct Population {
    members: Vec<Candidate>,
}

impl Population {
    /// 初始种群: 第一个个体取参数当前值, 其余在边界内随机
    pub fn initialize<C, R>(
        params: &[Parameter],
        size: usize,
        cost: &mut C,
        rng: &mut R,
    ) -> Result<Self>
    where
        C: CostFunction + ?Sized,
        R: Rng,
    {
        let mut members = Vec::with_capacity(size);
        for i in 0..size {
            let genes: Vec<f64> = if i == 0 {
                params.iter().map(|p| p.clamp(p.value)).collect()
            } else {
                params.iter().map(|p| uniform(rng, p.minimum, p.maximum)).collect()
            };
            let c = cost.evaluate(&genes)?;
            members.push(Candidate { genes, cost: c });
        }
        let mut population = Self { members };
        population.sort();
        Ok(population)
    }

    /// 进化一代
    pub fn evolve<C, R>(
        &mut self,
        params: &[Parameter],
        config: &GeneticConfig,
        cost: &mut C,
        rng: &mut R,
    ) -> Result<()>
    where
        C: CostFunction + ?Sized,
        R: Rng,
    {
        let mut next: Vec<Candidate> = self.members.iter().take(config.n_elite).cloned().collect();
        let mut children: Vec<Vec<f64>> =
            Vec::with_capacity(config.n_crossover + config.n_mutation);

        while children.len() < config.n_crossover {
            let a = self.select(config.selection, rng);
            let b = self.select(config.selection, rng);
            let (c1, c2) = crossover(&a.genes, &b.genes, rng);
            children.push(c1);
            if children.len() < config.n_crossover {
                children.push(c2);
            }
        }

        for _ in 0..config.n_mutation {
            let parent = self.select(config.selection, rng);
            children.push(mutate(&parent.genes, params, config.mutation_scale, rng));
        }

        for genes in children {
            let c = cost.evaluate(&genes)?;
            next.push(Candidate { genes, cost: c });
        }

        self.members = next;
        self.sort();
        Ok(())
    }

    /// 最优个体
    pub fn best(&self) -> Option<&Candidate> {
        self.members.first()
    }

    pub fn members(&self) -> &[Candidate] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn sort(&mut self) {
        self.members
            .sort_by(|a, b| b.fitness().partial_cmp(&a.fitness()).unwrap_or(Ordering::Equal));
    }

    fn select<R: Rng>(&self, selection: Selection, rng: &mut R) -> &Candidate {
        let n = self.members.len();
        match selection {
            Selection::Tournament { size } => {
                let mut best = &self.members[rng.gen_range(0..n)];
                for _ in 1..size {
                    let other = &self.members[rng.gen_range(0..n)];
                    if other.fitness() > best.fitness() {
                        best = other;
                    }
                }
                best
            }
            Selection::FitnessProportional => {
                let total: f64 = self.members.iter().map(Candidate::fitness).sum();
                if !total.is_finite() || total <= 0.0 {
                    return &self.members[rng.gen_range(0..n)];
                }
                let mut target = rng.gen::<f64>() * total;
                for m in &self.members {
                    target -= m.fitness();
                    if target <= 0.0 {
                        return m;
                    }
                }
                &self.members[n - 1]
            }
        }
    }
}

/// 单点算术交叉
fn crossover<R: Rng>(a: &[f64], b: &[f64], rng: &mut R) -> (Vec<f64>, Vec<f64>) {
    let mut c1 = a.to_vec();
    let mut c2 = b.to_vec();
    if a.is_empty() {
        return (c1, c2);
    }
    let locus = rng.gen_range(0..a.len());
    let alpha: f64 = rng.gen();
    c1[locus] = alpha * a[locus] + (1.0 - alpha) * b[locus];
    c2[locus] = (1.0 - alpha) * a[locus] + alpha * b[locus];
    (c1, c2)
}

/// 单点有界变异
fn mutate<R: Rng>(genes: &[f64], params: &[Parameter], scale: f64, rng: &mut R) -> Vec<f64> {
    let mut child = genes.to_vec();
    if child.is_empty() {
        return child;
    }
    let locus = rng.gen_range(0..child.len());
    let p = &params[locus];
    let offset = rng.gen_range(-1.0..=1.0) * scale * p.span();
    child[locus] = p.clamp(child[locus] + offset);
    child
}

/// 遗传算法优化器
#[derive(Debug, Clone, Default)]
pub struct GeneticAlgorithm {
    config: GeneticConfig,
}

impl GeneticAlgorithm {
    pub fn new(config: GeneticConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    /// 运行全部代数, 返回最优个体
    pub fn run<C, R>(&self, params: &[Parameter], cost: &mut C, rng: &mut R) -> Result<RunOutcome>
    where
        C: CostFunction + ?Sized,
        R: Rng,
    {
        self.config.validate()?;
        let mut population = Population::initialize(params, self.config.n_solutions, cost, rng)?;
        let mut trace = Vec::with_capacity(self.config.n_iterations + 1);
        trace.extend(population.best().map(|c| c.cost));

        for generation in 0..self.config.n_iterations {
            population.evolve(params, &self.config, cost, rng)?;
            if let Some(best) = population.best() {
                trace.push(best.cost);
                debug!(generation, cost = best.cost, "generation evolved");
            }
        }

        let best = population
            .best()
            .cloned()
            .ok_or_else(|| TomError::Optimization("empty population".into()))?;
        Ok(RunOutcome {
            values: best.genes,
            final_cost: best.cost,
            cost_trace: trace,
            pruned: false,
            iterations: self.config.n_iterations,
        })
    }
}
