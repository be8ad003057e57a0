//! 模型蓝图 - 可序列化的模型结构配置
//!
//! 蓝图描述节点 (名称/类型/初始值/更新规则/约束) 与影响边,
//! `build` 时逐条检查影响白名单。

use serde::{Deserialize, Serialize};

use tom_core::{NodeKind, Result, TomError};

use crate::graph::NodeGraph;
use crate::model::ToMModel;
use crate::node::{BoundMethod, CognitiveNode, UpdateMode};
use crate::perception::{InputFeature, PerceptionConfig};
use crate::weight::{EdgeWeight, InfluenceEdge, ScheduledWeight};

/// 节点描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub initial: f64,
    #[serde(default = "default_rate")]
    pub update_rate: f64,
    #[serde(default)]
    pub mode: UpdateMode,
    #[serde(default)]
    pub bound: BoundMethod,
    /// RPK 节点绑定的观测特征
    #[serde(default)]
    pub input: Option<InputFeature>,
}

fn default_rate() -> f64 {
    1.0
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, kind: NodeKind, initial: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            initial,
            update_rate: 1.0,
            mode: UpdateMode::Absolute,
            bound: BoundMethod::None,
            input: None,
        }
    }

    /// RPK 输入节点
    pub fn input(name: impl Into<String>, feature: InputFeature) -> Self {
        let mut spec = Self::new(name, NodeKind::RationallyPerceivedKnowledge, 0.0);
        spec.input = Some(feature);
        spec
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.update_rate = rate;
        self
    }

    pub fn mode(mut self, mode: UpdateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn bound(mut self, bound: BoundMethod) -> Self {
        self.bound = bound;
        self
    }

    /// 常用: [-1,1] 截断
    pub fn clipped(self) -> Self {
        self.bound(BoundMethod::Clip { min: -1.0, max: 1.0 })
    }
}

/// 权重描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightSpec {
    Scalar(f64),
    Scheduled { breakpoints: Vec<f64>, weights: Vec<f64> },
}

impl WeightSpec {
    fn build(&self) -> Result<EdgeWeight> {
        Ok(match self {
            WeightSpec::Scalar(w) => EdgeWeight::Scalar(*w),
            WeightSpec::Scheduled {
                breakpoints,
                weights,
            } => EdgeWeight::Scheduled(ScheduledWeight::new(breakpoints.clone(), weights.clone())?),
        })
    }
}

/// 边描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub influenced: String,
    pub influencer: String,
    pub weight: WeightSpec,
    #[serde(default)]
    pub side_linkage: Option<String>,
    #[serde(default = "default_bounds")]
    pub bounds: (f64, f64),
    /// 固定权重, 不参与辨识
    #[serde(default)]
    pub fixed: bool,
}

fn default_bounds() -> (f64, f64) {
    (-1.0, 1.0)
}

impl EdgeSpec {
    pub fn new(influenced: impl Into<String>, influencer: impl Into<String>, weight: f64) -> Self {
        Self {
            influenced: influenced.into(),
            influencer: influencer.into(),
            weight: WeightSpec::Scalar(weight),
            side_linkage: None,
            bounds: default_bounds(),
            fixed: false,
        }
    }

    pub fn scheduled(
        influenced: impl Into<String>,
        influencer: impl Into<String>,
        breakpoints: Vec<f64>,
        weights: Vec<f64>,
    ) -> Self {
        let mut spec = Self::new(influenced, influencer, 0.0);
        spec.weight = WeightSpec::Scheduled {
            breakpoints,
            weights,
        };
        spec
    }

    pub fn side(mut self, side: impl Into<String>) -> Self {
        self.side_linkage = Some(side.into());
        self
    }

    pub fn bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = (min, max);
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

/// 模型蓝图
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelBlueprint {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
    #[serde(default)]
    pub perception: PerceptionConfig,
}

impl ModelBlueprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, spec: NodeSpec) -> Self {
        self.nodes.push(spec);
        self
    }

    pub fn edge(mut self, spec: EdgeSpec) -> Self {
        self.edges.push(spec);
        self
    }

    /// 从 JSON 文本加载
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// 构建模型
    pub fn build(&self) -> Result<ToMModel> {
        let mut graph = NodeGraph::new();
        let mut inputs = Vec::new();

        for spec in &self.nodes {
            let node = CognitiveNode::new(spec.name.clone(), spec.kind, spec.initial)
                .with_update_rate(spec.update_rate)
                .with_mode(spec.mode)
                .with_bound(spec.bound);
            let id = graph.add_node(node)?;

            match (spec.kind, spec.input) {
                (NodeKind::RationallyPerceivedKnowledge, Some(feature)) => {
                    inputs.push((id, feature))
                }
                (NodeKind::RationallyPerceivedKnowledge, None) => {
                    return Err(TomError::InvalidSettings(format!(
                        "input node {} has no observation feature",
                        spec.name
                    )))
                }
                (_, Some(_)) => {
                    return Err(TomError::InvalidSettings(format!(
                        "only rationally perceived knowledge nodes take inputs, {} is {}",
                        spec.name, spec.kind
                    )))
                }
                _ => {}
            }
        }

        for spec in &self.edges {
            let influenced = graph.id(&spec.influenced)?;
            let influencer = graph.id(&spec.influencer)?;
            let mut edge = InfluenceEdge::new(influencer, spec.weight.build()?)
                .with_bounds(spec.bounds.0, spec.bounds.1);
            if let Some(side) = &spec.side_linkage {
                edge = edge.with_side_linkage(graph.id(side)?);
            }
            if spec.fixed {
                edge = edge.fixed();
            }
            graph.connect(influenced, edge)?;
        }

        tracing::debug!(
            "Built model with {} nodes and {} edges",
            graph.len(),
            self.edges.len()
        );
        Ok(ToMModel::new(graph, inputs, self.perception.clone()))
    }

    /// 内置的国际象棋谜题导师 ToM 模型
    pub fn chess_tutor() -> Self {
        use InputFeature::*;
        use NodeKind::*;

        let slow = |name: &str, kind: NodeKind, v: f64| NodeSpec::new(name, kind, v).clipped();
        let inc = |name: &str, kind: NodeKind| {
            NodeSpec::new(name, kind, 0.0)
                .mode(UpdateMode::Incremental)
                .bound(BoundMethod::Tanh)
                .rate(0.7)
        };

        Self::new()
            // 理性感知知识
            .node(NodeSpec::input("rpk_difficulty", Difficulty))
            .node(NodeSpec::input("rpk_mistakes", WrongAttempts))
            .node(NodeSpec::input("rpk_hints", Hints))
            .node(NodeSpec::input("rpk_revealed", RevealedMoves))
            .node(NodeSpec::input("rpk_time", TimeToSolve))
            .node(NodeSpec::input("rpk_robot_help", RobotHelping))
            .node(NodeSpec::input("rpk_reward_offer", RobotOfferingReward))
            .node(NodeSpec::input("rpk_reward", RewardGiven))
            .node(NodeSpec::input("rpk_skipped", Skipped))
            // 慢变量
            .node(slow("pref_challenge", GeneralPreference, 0.5))
            .node(slow("pref_autonomy", GeneralPreference, 0.3))
            .node(slow("trait_conscientiousness", PersonalityTrait, 0.6))
            .node(slow("trait_neuroticism", PersonalityTrait, 0.2))
            .node(slow("gwk_chess_knowledge", GeneralWorldKnowledge, 0.4))
            // 偏差
            .node(NodeSpec::new("bias_pessimism", Bias, 0.0).bound(BoundMethod::Tanh))
            // 感知知识
            .node(NodeSpec::new("pk_difficulty", PerceivedKnowledge, 0.0).clipped())
            .node(NodeSpec::new("pk_performance", PerceivedKnowledge, 0.0).clipped())
            .node(NodeSpec::new("pk_help", PerceivedKnowledge, 0.0).clipped())
            .node(NodeSpec::new("pk_reward", PerceivedKnowledge, 0.0).clipped())
            // 信念
            .node(inc("belief_puzzle_difficulty", Belief))
            .node(inc("belief_own_skill", Belief))
            .node(inc("belief_robot_helpful", Belief))
            .node(NodeSpec::new("belief_reward_expected", Belief, 0.0).clipped())
            // 目标
            .node(NodeSpec::new("goal_solve_puzzle", Goal, 0.5).clipped().rate(0.8))
            .node(NodeSpec::new("goal_seek_help", Goal, 0.0).clipped().rate(0.8))
            // 情绪
            .node(inc("emotion_boredom", Emotion))
            .node(inc("emotion_frustration", Emotion))
            .node(inc("emotion_joy", Emotion))
            // 偏差
            .edge(EdgeSpec::new("bias_pessimism", "emotion_frustration", 0.5))
            .edge(EdgeSpec::new("bias_pessimism", "emotion_joy", -0.4))
            .edge(EdgeSpec::new("bias_pessimism", "trait_neuroticism", 0.3))
            // 感知
            .edge(EdgeSpec::new("pk_difficulty", "rpk_difficulty", 0.9).bounds(0.0, 1.5))
            .edge(EdgeSpec::new("pk_difficulty", "bias_pessimism", 0.2))
            .edge(EdgeSpec::new("pk_performance", "rpk_mistakes", -0.5))
            .edge(EdgeSpec::new("pk_performance", "rpk_hints", -0.3))
            .edge(EdgeSpec::new("pk_performance", "rpk_revealed", -0.4))
            .edge(EdgeSpec::new("pk_performance", "rpk_time", -0.2))
            .edge(EdgeSpec::new("pk_performance", "rpk_skipped", -0.6))
            .edge(EdgeSpec::new("pk_performance", "bias_pessimism", -0.3))
            .edge(EdgeSpec::new("pk_help", "rpk_robot_help", 0.7))
            .edge(EdgeSpec::new("pk_help", "rpk_hints", 0.3))
            .edge(EdgeSpec::new("pk_reward", "rpk_reward", 0.6))
            .edge(EdgeSpec::new("pk_reward", "rpk_reward_offer", 0.4))
            // 信念
            .edge(EdgeSpec::new("belief_puzzle_difficulty", "pk_difficulty", 0.6))
            .edge(EdgeSpec::new("belief_own_skill", "pk_performance", 0.5))
            .edge(EdgeSpec::new("belief_own_skill", "gwk_chess_knowledge", 0.2))
            .edge(EdgeSpec::new("belief_robot_helpful", "pk_help", 0.5))
            .edge(EdgeSpec::new("belief_reward_expected", "pk_reward", 0.8))
            .edge(EdgeSpec::new("belief_reward_expected", "belief_reward_expected", 0.2))
            // 目标
            .edge(EdgeSpec::new("goal_solve_puzzle", "belief_own_skill", 0.4))
            .edge(EdgeSpec::scheduled(
                "goal_solve_puzzle",
                "emotion_frustration",
                vec![0.5],
                vec![0.1, -0.6],
            ))
            .edge(EdgeSpec::new("goal_solve_puzzle", "trait_conscientiousness", 0.5))
            .edge(EdgeSpec::new("goal_seek_help", "belief_robot_helpful", 0.6))
            .edge(EdgeSpec::new("goal_seek_help", "belief_own_skill", -0.4))
            .edge(EdgeSpec::new("goal_seek_help", "pref_autonomy", -0.5))
            // 情绪
            .edge(
                EdgeSpec::new("emotion_boredom", "belief_puzzle_difficulty", -0.6)
                    .side("pref_challenge"),
            )
            .edge(EdgeSpec::new("emotion_boredom", "belief_own_skill", 0.2))
            .edge(EdgeSpec::scheduled(
                "emotion_frustration",
                "belief_puzzle_difficulty",
                vec![0.5],
                vec![0.1, 0.6],
            ))
            .edge(EdgeSpec::new("emotion_frustration", "belief_own_skill", -0.4))
            .edge(EdgeSpec::new("emotion_frustration", "goal_solve_puzzle", 0.3))
            .edge(EdgeSpec::new("emotion_joy", "belief_own_skill", 0.4))
            .edge(EdgeSpec::new("emotion_joy", "belief_reward_expected", 0.5))
            .edge(EdgeSpec::new("emotion_joy", "goal_solve_puzzle", 0.2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chess_tutor_builds() {
        let model = ModelBlueprint::chess_tutor().build().unwrap();
        assert_eq!(model.perception().rationally_perceived().count(), 9);
        assert_eq!(model.perception().perceived().len(), 4);
        assert_eq!(model.cognition().beliefs().len(), 4);
        assert_eq!(model.cognition().goals().len(), 2);
        assert_eq!(model.cognition().emotions().len(), 3);
        assert_eq!(model.cognition().biases().len(), 1);
        assert_eq!(model.cognition().slow().len(), 5);
        assert_eq!(
            model.cognition().bias_driving_emotions(model.graph()).len(),
            2
        );
    }

    #[test]
    fn test_blueprint_rejects_bad_edge() {
        let bp = ModelBlueprint::new()
            .node(NodeSpec::new("joy", NodeKind::Emotion, 0.0))
            .node(NodeSpec::new("skill", NodeKind::Belief, 0.0))
            .edge(EdgeSpec::new("skill", "joy", 0.5));
        assert!(matches!(bp.build(), Err(TomError::InfluencerNotAllowed { .. })));
    }

    #[test]
    fn test_blueprint_json_round_trip() {
        let bp = ModelBlueprint::chess_tutor();
        let text = serde_json::to_string(&bp).unwrap();
        let back = ModelBlueprint::from_json(&text).unwrap();
        assert_eq!(bp, back);
    }

    #[test]
    fn test_input_node_requires_feature() {
        let bp = ModelBlueprint::new().node(NodeSpec::new(
            "rpk",
            NodeKind::RationallyPerceivedKnowledge,
            0.0,
        ));
        assert!(bp.build().is_err());
    }
}
