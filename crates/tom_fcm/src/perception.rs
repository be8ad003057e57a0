//! 感知模块
//!
//! 将原始交互观测转换为理性感知知识 (RPK) 节点取值,
//! 再由 RPK 与认知偏差共同决定感知知识 (PK) 节点取值。

use serde::{Deserialize, Serialize};

use tom_core::{NodeKind, Observation};

use crate::graph::{NodeGraph, NodeId};

/// RPK 节点绑定的观测特征
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputFeature {
    Hints,
    WrongAttempts,
    Difficulty,
    RevealedMoves,
    TimeToSolve,
    RobotHelping,
    RobotOfferingReward,
    RewardGiven,
    Skipped,
}

impl InputFeature {
    /// 提取归一化到 [0,1] 的特征值
    pub fn extract(self, obs: &Observation, config: &PerceptionConfig) -> f64 {
        let raw = match self {
            InputFeature::Hints => obs.hints as f64 / config.max_hints,
            InputFeature::WrongAttempts => {
                obs.total_wrong_attempts() / config.max_wrong_attempts
            }
            InputFeature::Difficulty => obs.difficulty / config.max_difficulty,
            InputFeature::RevealedMoves => obs.revealed_moves,
            InputFeature::TimeToSolve => obs.time_to_solve / config.max_time_to_solve,
            InputFeature::RobotHelping => flag(obs.robot_helping),
            InputFeature::RobotOfferingReward => flag(obs.robot_offering_reward),
            InputFeature::RewardGiven => flag(obs.reward_given),
            InputFeature::Skipped => flag(obs.skipped),
        };
        if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// 感知归一化配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// 提示次数上限
    pub max_hints: f64,
    /// 错误尝试总数上限
    pub max_wrong_attempts: f64,
    /// 难度等级上限
    pub max_difficulty: f64,
    /// 解题用时上限 (秒)
    pub max_time_to_solve: f64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            max_hints: 3.0,
            max_wrong_attempts: 6.0,
            max_difficulty: 5.0,
            max_time_to_solve: 300.0,
        }
    }
}

/// 感知模块
#[derive(Debug, Clone, Default)]
pub struct PerceptionModule {
    /// RPK 节点及其特征
    inputs: Vec<(NodeId, InputFeature)>,
    /// PK 节点
    perceived: Vec<NodeId>,
    /// 归一化配置
    config: PerceptionConfig,
}

impl PerceptionModule {
    /// 创建感知模块
    pub fn new(
        inputs: Vec<(NodeId, InputFeature)>,
        graph: &NodeGraph,
        config: PerceptionConfig,
    ) -> Self {
        Self {
            inputs,
            perceived: graph.ids_of_kind(NodeKind::PerceivedKnowledge),
            config,
        }
    }

    /// 写入当前观测 (RPK 取值与历史)
    pub fn set_current_input(&self, graph: &mut NodeGraph, obs: &Observation) {
        for (id, feature) in &self.inputs {
            let value = feature.extract(obs, &self.config);
            if let Ok(node) = graph.node_mut(*id) {
                node.set_input(value);
            }
        }
    }

    /// 传播 PK 节点 (两阶段), 偏差须已在本步更新
    pub fn compute_and_update(&self, graph: &mut NodeGraph) {
        graph.propagate(&self.perceived);
    }

    /// RPK 节点
    pub fn rationally_perceived(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs.iter().map(|(id, _)| *id)
    }

    /// PK 节点
    pub fn perceived(&self) -> &[NodeId] {
        &self.perceived
    }

    /// 归一化配置
    pub fn config(&self) -> &PerceptionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_normalises() {
        let config = PerceptionConfig::default();
        let obs = Observation {
            hints: 6,
            wrong_attempts: vec![1.0, 2.0],
            difficulty: 4.0,
            revealed_moves: 0.25,
            time_to_solve: 150.0,
            robot_helping: true,
            ..Default::default()
        };
        assert_eq!(InputFeature::Hints.extract(&obs, &config), 1.0);
        assert_eq!(InputFeature::WrongAttempts.extract(&obs, &config), 0.5);
        assert_eq!(InputFeature::Difficulty.extract(&obs, &config), 0.8);
        assert_eq!(InputFeature::RevealedMoves.extract(&obs, &config), 0.25);
        assert_eq!(InputFeature::TimeToSolve.extract(&obs, &config), 0.5);
        assert_eq!(InputFeature::RobotHelping.extract(&obs, &config), 1.0);
        assert_eq!(InputFeature::Skipped.extract(&obs, &config), 0.0);
    }
}
