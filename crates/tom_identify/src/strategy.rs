//! 分阶段辨识策略
//!
//! - ALL: 一次性辨识范围内的全部参数
//! - VAR_BY_VAR: 逐节点辨识其入边与取值, 运行次数随参数个数的立方增长
//! - SEP_PER_1: 先在保守时间步上辨识感知侧, 再辨识认知侧
//! - SEP_PER_2: 先在全部训练步上辨识感知侧, 再认知侧, 最后以两者结果热启动整体辨识
//! - SEP_PER_3: 同 SEP_PER_1, 最后再做一次热启动整体辨识
//!
//! 每个阶段结束后, 最优运行的参数写回模型, 后续阶段在此基础上继续。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use tom_core::{Result, TomError};
use tom_fcm::{ModelBlueprint, ModelPropagator, NodeId, ToMModel};

use crate::cost::{OneStepCost, TrainingData};
use crate::dataset::InteractionDataset;
use crate::optimizer::CostFunction;
use crate::parameter::{ParameterScope, ParameterTarget, ParametersManager};
use crate::results::{ParameterReport, ResultsTable};
use crate::runner::MultiRunExecutor;
use crate::settings::IdentificationSettings;
use crate::split::{SplitStrategy, TrainTestSplit};

/// 辨识模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentificationMode {
    All,
    VarByVar,
    #[serde(rename = "SEP_PER_1")]
    SepPer1,
    #[serde(rename = "SEP_PER_2")]
    SepPer2,
    #[serde(rename = "SEP_PER_3")]
    SepPer3,
}

impl IdentificationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentificationMode::All => "ALL",
            IdentificationMode::VarByVar => "VAR_BY_VAR",
            IdentificationMode::SepPer1 => "SEP_PER_1",
            IdentificationMode::SepPer2 => "SEP_PER_2",
            IdentificationMode::SepPer3 => "SEP_PER_3",
        }
    }
}

impl fmt::Display for IdentificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentificationMode {
    type Err = TomError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "all" => Ok(IdentificationMode::All),
            "varbyvar" => Ok(IdentificationMode::VarByVar),
            "sepper1" => Ok(IdentificationMode::SepPer1),
            "sepper2" => Ok(IdentificationMode::SepPer2),
            "sepper3" => Ok(IdentificationMode::SepPer3),
            _ => Err(TomError::InvalidSettings(format!("unknown identification mode: {}", s))),
        }
    }
}

/// 单个阶段的报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub name: String,
    pub scope: ParameterScope,
    /// 参与本阶段的训练步数
    pub training_steps: usize,
    pub best_cost: f64,
    /// 最优运行的测试代价
    pub test_cost: Option<f64>,
    pub parameters: Vec<ParameterReport>,
    pub table: ResultsTable,
}

/// 完整辨识报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationReport {
    pub id: Uuid,
    pub participant: String,
    pub mode: IdentificationMode,
    pub created_at: DateTime<Utc>,
    pub phases: Vec<PhaseReport>,
    pub parameter_names: Vec<String>,
    pub final_parameters: Vec<f64>,
    pub train_cost: f64,
    pub test_cost: Option<f64>,
    /// 最近一次出现时未能辨识的参数
    pub unidentified: Vec<String>,
}

impl IdentificationReport {
    /// 按名称查找最终参数值
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameter_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.final_parameters.get(i).copied())
    }
}

/// 辨识器: 持有模型、训练数据与划分, 按模式运行各阶段
#[derive(Debug, Clone)]
pub struct Identifier {
    participant: String,
    model: ToMModel,
    data: Arc<TrainingData>,
    split: TrainTestSplit,
    settings: IdentificationSettings,
    phases_run: u64,
}

impl Identifier {
    pub fn new(
        participant: impl Into<String>,
        model: ToMModel,
        data: TrainingData,
        split: TrainTestSplit,
        settings: IdentificationSettings,
    ) -> Result<Self> {
        settings.validate()?;
        if split.train.is_empty() {
            return Err(TomError::InvalidSettings("training set is empty".into()));
        }
        let targets = model.ground_truth_nodes();
        let missing: Vec<&str> = targets
            .iter()
            .filter(|id| !data.is_recorded(**id))
            .map(|id| data.name(*id))
            .collect();
        if missing.len() == targets.len() {
            let node = if missing.is_empty() {
                "<no belief, goal or emotion node>".to_string()
            } else {
                missing.join(", ")
            };
            return Err(TomError::MissingGroundTruth { node, step: 0 });
        }
        if !missing.is_empty() {
            warn!("No ground truth for {:?}, their parameters are reported unidentified", missing);
        }
        Ok(Self {
            participant: participant.into(),
            model,
            data: Arc::new(data),
            split,
            settings,
            phases_run: 0,
        })
    }

    /// 由蓝图与数据集构建: 以初始权重重放全部会话得到记录值, 再按会话划分
    pub fn from_dataset(
        blueprint: &ModelBlueprint,
        dataset: &InteractionDataset,
        split: &SplitStrategy,
        settings: IdentificationSettings,
    ) -> Result<Self> {
        let log = dataset.observation_log(settings.interpolate)?;
        let mut propagator = ModelPropagator::new(blueprint.build()?);
        let steps = propagator.replay(&log, false);
        let model = propagator.into_model();
        info!("Replayed {} steps for participant {}", steps, dataset.participant);

        let data = TrainingData::from_model(&model, &dataset.ground_truth)?;
        let split = split.split(&dataset.session_ranges(settings.interpolate))?;
        info!("Split: {} training steps, {} test steps", split.train.len(), split.test.len());
        Self::new(dataset.participant.clone(), model, data, split, settings)
    }

    pub fn model(&self) -> &ToMModel {
        &self.model
    }

    pub fn into_model(self) -> ToMModel {
        self.model
    }

    pub fn split(&self) -> &TrainTestSplit {
        &self.split
    }

    pub fn settings(&self) -> &IdentificationSettings {
        &self.settings
    }

    /// 按模式运行辨识
    pub fn run(&mut self, mode: IdentificationMode) -> Result<IdentificationReport> {
        info!("Identifying participant {} with mode {}", self.participant, mode);
        let all: Vec<NodeId> = self.model.graph().ids().collect();
        let train = self.split.train.clone();
        let bulk = self.settings.bulk_runs;
        let mut phases = Vec::new();

        let final_scope = match mode {
            IdentificationMode::All => {
                phases.extend(self.phase("all", &all, self.settings.scope, &train, bulk, None)?);
                self.settings.scope
            }
            IdentificationMode::VarByVar => {
                let scope = self.settings.scope;
                let manager = ParametersManager::new(scope);
                for id in &all {
                    let (p, c) = manager.count_parameters(self.model.graph(), &[*id]);
                    if p + c == 0 {
                        continue;
                    }
                    let runs = self.settings.runs_for(p + c);
                    let name = format!("var_{}", self.model.graph().name_of(*id));
                    phases.extend(self.phase(&name, &[*id], scope, &train, runs, None)?);
                }
                scope
            }
            IdentificationMode::SepPer1
            | IdentificationMode::SepPer2
            | IdentificationMode::SepPer3 => {
                let perception_steps = if mode == IdentificationMode::SepPer2 {
                    train.clone()
                } else {
                    let emotions =
                        self.model.cognition().bias_driving_emotions(self.model.graph());
                    let threshold = self.settings.conservative_threshold;
                    let steps = self.data.conservative_indices(&train, &emotions, threshold);
                    if steps.is_empty() {
                        warn!("No conservative training steps, perception uses all of them");
                        train.clone()
                    } else {
                        steps
                    }
                };

                phases.extend(self.phase(
                    "perception",
                    &all,
                    ParameterScope::perception_only(),
                    &perception_steps,
                    bulk,
                    None,
                )?);
                phases.extend(self.phase(
                    "cognition",
                    &all,
                    ParameterScope::cognitive_only(),
                    &train,
                    bulk,
                    None,
                )?);

                if mode != IdentificationMode::SepPer1 {
                    let warm = ParametersManager::new(ParameterScope::ALL)
                        .read_values(self.model.graph(), &all);
                    let joint = ParameterScope::ALL;
                    phases.extend(self.phase("joint", &all, joint, &train, bulk, Some(warm))?);
                }
                ParameterScope::ALL
            }
        };

        let manager = ParametersManager::new(final_scope);
        let parameter_names = manager.parameter_names(self.model.graph(), &all);
        let final_parameters = manager.read_values(self.model.graph(), &all);
        let train_cost = self.cost_on(&train, &all, manager).evaluate(&final_parameters)?;
        let test_cost = if self.split.test.is_empty() {
            None
        } else {
            let test = self.split.test.clone();
            Some(self.cost_on(&test, &all, manager).evaluate(&final_parameters)?)
        };

        // 每个参数以最后一次出现的阶段为准
        let mut verdicts: BTreeMap<String, bool> = BTreeMap::new();
        for phase in &phases {
            for p in &phase.parameters {
                verdicts.insert(p.name.clone(), p.identified);
            }
        }
        let unidentified: Vec<String> = parameter_names
            .iter()
            .filter(|n| verdicts.get(*n) == Some(&false))
            .cloned()
            .collect();
        if !unidentified.is_empty() {
            warn!("{} parameters not identifiable: {:?}", unidentified.len(), unidentified);
        }
        info!("Identification finished: train cost {:.6}, test cost {:?}", train_cost, test_cost);

        Ok(IdentificationReport {
            id: Uuid::new_v4(),
            participant: self.participant.clone(),
            mode,
            created_at: Utc::now(),
            phases,
            parameter_names,
            final_parameters,
            train_cost,
            test_cost,
            unidentified,
        })
    }

    fn cost_on(
        &self,
        indices: &[usize],
        subset: &[NodeId],
        manager: ParametersManager,
    ) -> OneStepCost {
        OneStepCost::new(
            self.model.clone(),
            Arc::clone(&self.data),
            indices,
            subset.to_vec(),
            manager,
            self.settings.horizon_weights.clone(),
        )
    }

    /// 运行一个阶段; 范围内没有参数时跳过
    fn phase(
        &mut self,
        name: &str,
        subset: &[NodeId],
        scope: ParameterScope,
        indices: &[usize],
        n_runs: usize,
        warm_start: Option<Vec<f64>>,
    ) -> Result<Option<PhaseReport>> {
        let manager = ParametersManager::new(scope);
        let params = manager.enumerate(self.model.graph(), subset);
        if params.is_empty() {
            warn!("Phase {} has no parameters, skipped", name);
            return Ok(None);
        }

        let cost = self.cost_on(indices, subset, manager);
        let training_steps = cost.indices().len();
        let seed = self.settings.seed.wrapping_add(self.phases_run);
        self.phases_run += 1;
        info!(
            "Phase {}: {} parameters, {} runs, {} training steps",
            name,
            params.len(),
            n_runs,
            training_steps
        );

        let runs = MultiRunExecutor::new(&self.settings).execute(
            &cost,
            &params,
            n_runs,
            warm_start.as_deref(),
            seed,
        )?;

        let names = params.iter().map(|p| p.name.clone()).collect();
        let mut table = ResultsTable::new(format!("{}_{}", self.participant, name), names);
        for run in runs {
            table.push(run);
        }

        if !self.split.test.is_empty() {
            let mut test = self.cost_on(&self.split.test, subset, manager);
            let costs = table
                .runs
                .iter()
                .map(|r| Ok((r.run_index, test.evaluate(&r.parameters)?)))
                .collect::<Result<Vec<_>>>()?;
            table.set_test_costs(&costs);
        }

        let best = table
            .best()
            .cloned()
            .ok_or_else(|| TomError::Optimization(format!("phase {} produced no runs", name)))?;
        manager.set_values(self.model.graph_mut(), &best.parameters, subset)?;

        let mut parameters = table.identifiability(
            self.settings.near_optimal_tolerance,
            self.settings.near_optimal_abs_tolerance,
            self.settings.variance_threshold,
        );
        // 没有真实记录的节点, 其入边只被模型自身的重放约束
        for (param, report) in params.iter().zip(parameters.iter_mut()) {
            if let ParameterTarget::EdgeSegment { node, .. } = param.target {
                if !self.data.is_recorded(node) {
                    report.identified = false;
                }
            }
        }
        info!("Phase {} best cost {:.6} (run {})", name, best.final_cost, best.run_index);

        Ok(Some(PhaseReport {
            name: name.to_string(),
            scope,
            training_steps,
            best_cost: best.final_cost,
            test_cost: best.test_cost,
            parameters,
            table,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("all".parse::<IdentificationMode>().unwrap(), IdentificationMode::All);
        let mode: IdentificationMode = "VAR_BY_VAR".parse().unwrap();
        assert_eq!(mode, IdentificationMode::VarByVar);
        assert_eq!("sep-per-3".parse::<IdentificationMode>().unwrap(), IdentificationMode::SepPer3);
        assert!("sep_per_4".parse::<IdentificationMode>().is_err());
        assert_eq!(IdentificationMode::SepPer2.to_string(), "SEP_PER_2");
    }

    #[test]
    fn test_mode_serde() {
        let json = serde_json::to_string(&IdentificationMode::SepPer1).unwrap();
        assert_eq!(json, "\"SEP_PER_1\"");
        let mode: IdentificationMode = serde_json::from_str("\"VAR_BY_VAR\"").unwrap();
        assert_eq!(mode, IdentificationMode::VarByVar);
    }
}
