//! 认知模块
//!
//! 信念、目标、情绪、偏差与慢变量节点的集合。
//! 偏差没有时间延迟, 由 `update_biases` 在读取前单独更新。

use tom_core::NodeKind;

use crate::graph::{NodeGraph, NodeId};

/// 认知模块
#[derive(Debug, Clone, Default)]
pub struct CognitiveModule {
    beliefs: Vec<NodeId>,
    goals: Vec<NodeId>,
    emotions: Vec<NodeId>,
    biases: Vec<NodeId>,
    /// 偏好 / 特质 / 世界知识
    slow: Vec<NodeId>,
    /// 每步同步传播的节点: 信念, 目标, 情绪, 慢变量
    dynamic: Vec<NodeId>,
}

impl CognitiveModule {
    /// 从节点图按类型收集
    pub fn from_graph(graph: &NodeGraph) -> Self {
        let beliefs = graph.ids_of_kind(NodeKind::Belief);
        let goals = graph.ids_of_kind(NodeKind::Goal);
        let emotions = graph.ids_of_kind(NodeKind::Emotion);
        let biases = graph.ids_of_kind(NodeKind::Bias);
        let slow: Vec<NodeId> = graph
            .ids()
            .filter(|id| graph.nodes()[id.0].kind.is_slow())
            .collect();

        let mut dynamic: Vec<NodeId> = beliefs
            .iter()
            .chain(&goals)
            .chain(&emotions)
            .chain(&slow)
            .copied()
            .collect();
        dynamic.sort();

        Self {
            beliefs,
            goals,
            emotions,
            biases,
            slow,
            dynamic,
        }
    }

    /// 立即计算并提交所有偏差
    pub fn update_biases(&self, graph: &mut NodeGraph) {
        graph.propagate(&self.biases);
    }

    /// 计算阶段
    pub fn compute(&self, graph: &mut NodeGraph) {
        graph.compute_next_values(&self.dynamic);
    }

    /// 提交阶段
    pub fn commit(&self, graph: &mut NodeGraph) {
        graph.commit(&self.dynamic);
    }

    /// 一步同步传播: 先全部计算, 再全部提交
    pub fn step(&self, graph: &mut NodeGraph) {
        self.compute(graph);
        self.commit(graph);
    }

    pub fn beliefs(&self) -> &[NodeId] {
        &self.beliefs
    }

    pub fn goals(&self) -> &[NodeId] {
        &self.goals
    }

    pub fn emotions(&self) -> &[NodeId] {
        &self.emotions
    }

    pub fn biases(&self) -> &[NodeId] {
        &self.biases
    }

    pub fn slow(&self) -> &[NodeId] {
        &self.slow
    }

    /// 指定类型的节点
    pub fn of_kind(&self, kind: NodeKind) -> &[NodeId] {
        match kind {
            NodeKind::Belief => &self.beliefs,
            NodeKind::Goal => &self.goals,
            NodeKind::Emotion => &self.emotions,
            NodeKind::Bias => &self.biases,
            _ => &[],
        }
    }

    /// 驱动偏差的情绪节点
    pub fn bias_driving_emotions(&self, graph: &NodeGraph) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .biases
            .iter()
            .flat_map(|b| graph.nodes()[b.0].edges.iter())
            .map(|e| e.influencer)
            .filter(|id| graph.nodes()[id.0].kind == NodeKind::Emotion)
            .collect();
        out.sort();
        out.dedup();
        out
    }
}
