//! 节点类型与影响白名单

use std::fmt;

use serde::{Deserialize, Serialize};

/// 认知节点类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    /// 信念
    Belief,
    /// 目标
    Goal,
    /// 情绪
    Emotion,
    /// 认知偏差 (无时间延迟)
    Bias,
    /// 感知知识
    PerceivedKnowledge,
    /// 理性感知知识 (直接由观测给出)
    RationallyPerceivedKnowledge,
    /// 一般偏好 (慢变量)
    GeneralPreference,
    /// 人格特质 (慢变量)
    PersonalityTrait,
    /// 一般世界知识 (慢变量)
    GeneralWorldKnowledge,
}

impl NodeKind {
    /// 所有类型, 按固定顺序
    pub const ALL: [NodeKind; 9] = [
        NodeKind::Belief,
        NodeKind::Goal,
        NodeKind::Emotion,
        NodeKind::Bias,
        NodeKind::PerceivedKnowledge,
        NodeKind::RationallyPerceivedKnowledge,
        NodeKind::GeneralPreference,
        NodeKind::PersonalityTrait,
        NodeKind::GeneralWorldKnowledge,
    ];

    /// 允许影响本类型节点的影响者类型
    pub fn allowed_influencers(self) -> &'static [NodeKind] {
        use NodeKind::*;
        match self {
            Belief => &[PerceivedKnowledge, Belief, GeneralWorldKnowledge],
            Goal => &[Belief, Goal, Emotion, GeneralPreference, PersonalityTrait],
            Emotion => &[Belief, Goal, Emotion, GeneralPreference, PersonalityTrait],
            Bias => &[Emotion, PersonalityTrait],
            PerceivedKnowledge => &[RationallyPerceivedKnowledge, Bias],
            RationallyPerceivedKnowledge
            | GeneralPreference
            | PersonalityTrait
            | GeneralWorldKnowledge => &[],
        }
    }

    /// 检查 `influencer` 是否可以影响本类型
    pub fn accepts(self, influencer: NodeKind) -> bool {
        self.allowed_influencers().contains(&influencer)
    }

    /// 慢变量 (偏好/特质/世界知识), 其取值本身是可辨识参数
    pub fn is_slow(self) -> bool {
        matches!(
            self,
            NodeKind::GeneralPreference
                | NodeKind::PersonalityTrait
                | NodeKind::GeneralWorldKnowledge
        )
    }

    /// 属于感知模块
    pub fn is_perception(self) -> bool {
        matches!(
            self,
            NodeKind::PerceivedKnowledge | NodeKind::RationallyPerceivedKnowledge
        )
    }

    /// 有记录真值的类型 (信念/目标/情绪)
    pub fn has_ground_truth(self) -> bool {
        matches!(self, NodeKind::Belief | NodeKind::Goal | NodeKind::Emotion)
    }

    /// 获取类型名称
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Belief => "belief",
            NodeKind::Goal => "goal",
            NodeKind::Emotion => "emotion",
            NodeKind::Bias => "bias",
            NodeKind::PerceivedKnowledge => "perceived_knowledge",
            NodeKind::RationallyPerceivedKnowledge => "rationally_perceived_knowledge",
            NodeKind::GeneralPreference => "general_preference",
            NodeKind::PersonalityTrait => "personality_trait",
            NodeKind::GeneralWorldKnowledge => "general_world_knowledge",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
