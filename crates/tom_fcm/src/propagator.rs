//! 模型传播器
//!
//! 两种工作方式:
//! - 回放: 按观测日志推进权威模型, 可在相邻观测之间插入虚拟观测;
//! - 预测: 在并行的预测模型上施加候选动作并前瞻 1~2 步, 供动作评分。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tom_core::{NodeKind, Observation, ObservationLog, Result, TomError};

use crate::model::ToMModel;
use crate::snapshot::ModelSnapshot;

/// 机器人导师的候选动作
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TutorAction {
    /// 下一个谜题的难度
    pub difficulty: f64,
    /// 是否给予奖励
    pub give_reward: bool,
}

impl TutorAction {
    pub fn new(difficulty: f64, give_reward: bool) -> Self {
        Self {
            difficulty,
            give_reward,
        }
    }

    /// 由上一条观测推出执行本动作后的观测
    ///
    /// 只改写难度与奖励相关字段; 提示次数、错误尝试与用时沿用上一个谜题,
    /// 即假设参与者在下一个谜题上表现不变。
    pub fn apply_to(&self, last: &Observation) -> Observation {
        Observation {
            difficulty: self.difficulty,
            robot_offering_reward: self.give_reward,
            reward_given: self.give_reward,
            skipped: false,
            ..last.clone()
        }
    }
}

/// 前瞻结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// 动作
    pub action: TutorAction,
    /// 目标/情绪节点的前瞻轨迹, 每个元素对应一步
    pub trajectories: BTreeMap<String, Vec<f64>>,
}

impl Forecast {
    /// 某节点最后一步的预测值
    pub fn final_value(&self, name: &str) -> Option<f64> {
        self.trajectories.get(name).and_then(|t| t.last().copied())
    }
}

/// 模型传播器
#[derive(Debug, Clone)]
pub struct ModelPropagator {
    /// 权威模型
    model: ToMModel,
    /// 预测模型
    predictive: ToMModel,
}

impl ModelPropagator {
    /// 创建传播器
    pub fn new(model: ToMModel) -> Self {
        let predictive = model.clone();
        Self { model, predictive }
    }

    pub fn model(&self) -> &ToMModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ToMModel {
        &mut self.model
    }

    pub fn into_model(self) -> ToMModel {
        self.model
    }

    pub fn predictive_model(&self) -> &ToMModel {
        &self.predictive
    }

    /// 权威模型前进一步
    pub fn step(&mut self, obs: &Observation) {
        self.model.step(obs);
    }

    /// 回放观测日志, 返回推进的步数
    pub fn replay(&mut self, log: &ObservationLog, interpolate: bool) -> usize {
        let log = if interpolate {
            log.with_midpoints()
        } else {
            log.clone()
        };
        for entry in log.iter() {
            self.model.step(&entry.observation);
        }
        tracing::debug!(
            "Replayed {} steps ({} interpolated)",
            log.len(),
            log.iter().filter(|e| e.interpolated).count()
        );
        log.len()
    }

    /// 用权威模型的当前取值与历史覆盖预测模型
    pub fn reset_predictive_model(&mut self) {
        if self.predictive.graph().revision() != self.model.graph().revision()
            || self.predictive.graph().len() != self.model.graph().len()
        {
            // 权重已改写, 需要连同边一起复制
            self.predictive = self.model.clone();
        } else {
            self.predictive
                .graph_mut()
                .sync_state_from(self.model.graph());
        }
    }

    /// 在预测模型上施加动作并前瞻 `lookahead` 步 (1 或 2)
    pub fn run_predictive_model_with_action(
        &mut self,
        action: TutorAction,
        last_observation: &Observation,
        lookahead: usize,
    ) -> Result<Forecast> {
        if !(1..=2).contains(&lookahead) {
            return Err(TomError::InvalidSettings(format!(
                "lookahead must be 1 or 2, got {}",
                lookahead
            )));
        }

        let obs = action.apply_to(last_observation);
        let tracked: Vec<_> = self
            .predictive
            .graph()
            .ids()
            .filter(|id| {
                matches!(
                    self.predictive.graph().nodes()[id.0].kind,
                    NodeKind::Goal | NodeKind::Emotion
                )
            })
            .collect();

        let mut trajectories: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for _ in 0..lookahead {
            self.predictive.step(&obs);
            for id in &tracked {
                let node = &self.predictive.graph().nodes()[id.0];
                trajectories
                    .entry(node.name.clone())
                    .or_default()
                    .push(node.value);
            }
        }

        Ok(Forecast {
            action,
            trajectories,
        })
    }

    /// 依次评估所有候选动作, 每个动作都从同一起点出发
    pub fn evaluate_actions(
        &mut self,
        actions: &[TutorAction],
        last_observation: &Observation,
        lookahead: usize,
    ) -> Result<Vec<Forecast>> {
        self.reset_predictive_model();
        let start = ModelSnapshot::capture(self.predictive.graph());

        let mut forecasts = Vec::with_capacity(actions.len());
        for action in actions {
            start.restore(self.predictive.graph_mut())?;
            let forecast =
                self.run_predictive_model_with_action(*action, last_observation, lookahead)?;
            forecasts.push(forecast);
        }
        start.restore(self.predictive.graph_mut())?;
        Ok(forecasts)
    }
}
