//! 认知节点
//!
//! 节点的更新分为两阶段: 先由所有节点读取上一步取值计算 `next_value`,
//! 再统一提交。提交时按更新率混合并写入历史。

use serde::{Deserialize, Serialize};

use tom_core::NodeKind;

use crate::weight::InfluenceEdge;

/// 有界节点的增量衰减系数
pub const DECAY_BOUNDED: f64 = 1.0;
/// 无界节点的增量衰减系数
pub const DECAY_UNBOUNDED: f64 = 0.9;
/// 慢增量节点的衰减系数
pub const DECAY_SLOW: f64 = 0.8;

/// 取值约束方式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum BoundMethod {
    /// 无约束
    #[default]
    None,
    /// 截断到 [min, max]
    Clip { min: f64, max: f64 },
    /// 双曲正切压缩到 (-1, 1)
    Tanh,
}

impl BoundMethod {
    /// 应用约束
    pub fn apply(self, x: f64) -> f64 {
        match self {
            BoundMethod::None => x,
            BoundMethod::Clip { min, max } => x.clamp(min, max),
            BoundMethod::Tanh => x.tanh(),
        }
    }

    /// 是否有界
    pub fn is_bounded(self) -> bool {
        !matches!(self, BoundMethod::None)
    }

    /// 取值范围
    pub fn range(self) -> (f64, f64) {
        match self {
            BoundMethod::None => (f64::NEG_INFINITY, f64::INFINITY),
            BoundMethod::Clip { min, max } => (min, max),
            BoundMethod::Tanh => (-1.0, 1.0),
        }
    }
}

/// 更新方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UpdateMode {
    /// next = Σ(weight·influencer)
    #[default]
    Absolute,
    /// next = decay·current + Σ(weight·influencer)
    Incremental,
    /// 与 Incremental 相同, 衰减系数为 DECAY_SLOW
    IncrementalSlow,
}

/// 认知节点
#[derive(Debug, Clone)]
pub struct CognitiveNode {
    /// 节点名称 (单次运行内唯一)
    pub name: String,
    /// 节点类型
    pub kind: NodeKind,
    /// 当前取值
    pub value: f64,
    /// 本步暂存取值
    pub next_value: f64,
    /// 历史取值 (只增不减)
    pub history: Vec<f64>,
    /// 更新率 [0,1]
    pub update_rate: f64,
    /// 更新方式
    pub mode: UpdateMode,
    /// 约束方式
    pub bound: BoundMethod,
    /// 入边 (存于被影响节点一侧)
    pub edges: Vec<InfluenceEdge>,
}

impl CognitiveNode {
    /// 创建新节点, 初始值写入历史
    pub fn new(name: impl Into<String>, kind: NodeKind, initial: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            value: initial,
            next_value: initial,
            history: vec![initial],
            update_rate: 1.0,
            mode: UpdateMode::Absolute,
            bound: BoundMethod::None,
            edges: Vec::new(),
        }
    }

    /// 设置更新率
    pub fn with_update_rate(mut self, rate: f64) -> Self {
        self.update_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// 设置更新方式
    pub fn with_mode(mut self, mode: UpdateMode) -> Self {
        self.mode = mode;
        self
    }

    /// 设置约束方式, 当前取值同时被约束
    pub fn with_bound(mut self, bound: BoundMethod) -> Self {
        self.bound = bound;
        self.value = bound.apply(self.value);
        self.next_value = self.value;
        if let Some(first) = self.history.first_mut() {
            *first = self.value;
        }
        self
    }

    /// 增量模式的衰减系数; 绝对模式返回 None
    pub fn decay(&self) -> Option<f64> {
        match self.mode {
            UpdateMode::Absolute => None,
            UpdateMode::Incremental if self.bound.is_bounded() => Some(DECAY_BOUNDED),
            UpdateMode::Incremental => Some(DECAY_UNBOUNDED),
            UpdateMode::IncrementalSlow => Some(DECAY_SLOW),
        }
    }

    /// 基于所有节点的当前取值计算下一步取值, 不修改任何状态
    pub fn evaluate(&self, nodes: &[CognitiveNode]) -> f64 {
        if self.kind.is_slow() || self.kind == NodeKind::RationallyPerceivedKnowledge {
            return self.value;
        }

        let sum: f64 = self.edges.iter().map(|e| e.contribution(nodes)).sum();
        let next = match self.decay() {
            Some(decay) => decay * self.value + sum,
            None => sum,
        };
        self.bound.apply(next)
    }

    /// 暂存下一步取值
    pub fn stage(&mut self, next: f64) {
        self.next_value = next;
    }

    /// 提交暂存值: value = rate·next + (1-rate)·value, 并写入历史
    pub fn commit(&mut self) {
        self.value = self.update_rate * self.next_value + (1.0 - self.update_rate) * self.value;
        self.history.push(self.value);
    }

    /// 直接写入输入值 (理性感知知识), 同时写入历史
    pub fn set_input(&mut self, value: f64) {
        self.value = self.bound.apply(value);
        self.next_value = self.value;
        self.history.push(self.value);
    }

    /// 覆盖当前取值, 不写入历史
    pub fn reset_value(&mut self, value: f64) {
        self.value = value;
        self.next_value = value;
    }

    /// 取历史第 step 步的值
    pub fn value_at(&self, step: usize) -> Option<f64> {
        self.history.get(step).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_apply() {
        assert_eq!(BoundMethod::Clip { min: -1.0, max: 1.0 }.apply(5.0), 1.0);
        assert_eq!(BoundMethod::Tanh.apply(5.0), 5.0_f64.tanh());
        assert_eq!(BoundMethod::None.apply(5.0), 5.0);
    }

    #[test]
    fn test_decay_constants() {
        let node = CognitiveNode::new("b", NodeKind::Belief, 0.0);
        assert_eq!(node.decay(), None);

        let node = node.with_mode(UpdateMode::Incremental);
        assert_eq!(node.decay(), Some(DECAY_UNBOUNDED));

        let node = node.with_bound(BoundMethod::Tanh);
        assert_eq!(node.decay(), Some(DECAY_BOUNDED));

        let node = node.with_mode(UpdateMode::IncrementalSlow);
        assert_eq!(node.decay(), Some(DECAY_SLOW));
    }

    #[test]
    fn test_commit_blends_and_records() {
        let mut node = CognitiveNode::new("e", NodeKind::Emotion, 0.2).with_update_rate(0.5);
        node.stage(1.0);
        assert_eq!(node.value, 0.2);
        node.commit();
        assert!((node.value - 0.6).abs() < 1e-12);
        assert_eq!(node.history.len(), 2);
        assert_eq!(node.history[1], node.value);
    }

    #[test]
    fn test_slow_node_keeps_value() {
        let node = CognitiveNode::new("t", NodeKind::PersonalityTrait, 0.4);
        assert_eq!(node.evaluate(&[]), 0.4);
    }
}
