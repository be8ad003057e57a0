//! 节点图 - 所有节点的存储区
//!
//! 节点按插入顺序存放, 这一顺序即参数枚举所用的固定节点顺序。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use tom_core::{NodeKind, Result, TomError};

use crate::node::CognitiveNode;
use crate::weight::InfluenceEdge;

/// 节点 ID (存储区下标)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 节点图
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    /// 所有节点
    nodes: Vec<CognitiveNode>,
    /// 名称索引
    name_index: HashMap<String, NodeId>,
    /// 权重修订号, 每次写入参数后递增
    revision: u64,
}

impl NodeGraph {
    /// 创建空图
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加节点
    pub fn add_node(&mut self, node: CognitiveNode) -> Result<NodeId> {
        if self.name_index.contains_key(&node.name) {
            return Err(TomError::DuplicateNode(node.name));
        }
        let id = NodeId(self.nodes.len());
        self.name_index.insert(node.name.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    /// 添加影响边, 影响者与侧联节点的类型都必须在白名单内
    pub fn connect(&mut self, influenced: NodeId, edge: InfluenceEdge) -> Result<()> {
        let target = self.node(influenced)?;
        let target_name = target.name.clone();
        let target_kind = target.kind;

        let mut sources = vec![edge.influencer];
        sources.extend(edge.side_linkage);
        for source in sources {
            let src = self.node(source)?;
            if !target_kind.accepts(src.kind) {
                return Err(TomError::InfluencerNotAllowed {
                    influenced: target_name,
                    influenced_kind: target_kind,
                    influencer: src.name.clone(),
                    influencer_kind: src.kind,
                });
            }
        }

        self.nodes[influenced.0].edges.push(edge);
        Ok(())
    }

    /// 通过名称查找节点
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.name_index.get(name).copied()
    }

    /// 通过名称查找节点, 不存在时报错
    pub fn id(&self, name: &str) -> Result<NodeId> {
        self.find(name)
            .ok_or_else(|| TomError::UnknownNode(name.to_string()))
    }

    /// 获取节点
    pub fn node(&self, id: NodeId) -> Result<&CognitiveNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| TomError::UnknownNode(id.to_string()))
    }

    /// 获取可变节点
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut CognitiveNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| TomError::UnknownNode(id.to_string()))
    }

    /// 所有节点
    pub fn nodes(&self) -> &[CognitiveNode] {
        &self.nodes
    }

    /// 所有节点 (可变)
    pub fn nodes_mut(&mut self) -> &mut [CognitiveNode] {
        &mut self.nodes
    }

    /// 按固定顺序遍历节点 ID
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// 指定类型的节点 ID
    pub fn ids_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.ids().filter(|id| self.nodes[id.0].kind == kind).collect()
    }

    /// 节点名称, 未知时返回 ID 字符串
    pub fn name_of(&self, id: NodeId) -> String {
        self.nodes
            .get(id.0)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// 计算阶段: 所有节点只读取上一步取值, 结果暂存于 next_value
    pub fn compute_next_values(&mut self, ids: &[NodeId]) {
        for id in ids {
            let next = self.nodes[id.0].evaluate(&self.nodes);
            self.nodes[id.0].stage(next);
        }
    }

    /// 提交阶段
    pub fn commit(&mut self, ids: &[NodeId]) {
        for id in ids {
            self.nodes[id.0].commit();
        }
    }

    /// 计算并提交 (两阶段)
    pub fn propagate(&mut self, ids: &[NodeId]) {
        self.compute_next_values(ids);
        self.commit(ids);
    }

    /// 当前所有取值
    pub fn values(&self) -> Vec<f64> {
        self.nodes.iter().map(|n| n.value).collect()
    }

    /// 覆盖节点取值, 不写入历史
    pub fn set_value(&mut self, id: NodeId, value: f64) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.reset_value(value);
        }
    }

    /// 权重修订号
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// 标记权重已被改写
    pub fn bump_revision(&mut self) {
        self.revision += 1;
    }

    /// 从另一张结构相同的图复制取值与历史 (边保持不变)
    pub fn sync_state_from(&mut self, other: &NodeGraph) {
        for (dst, src) in self.nodes.iter_mut().zip(&other.nodes) {
            dst.value = src.value;
            dst.next_value = src.next_value;
            dst.history.clone_from(&src.history);
        }
    }

    /// 节点数量
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weight::EdgeWeight;

    fn cycle() -> (NodeGraph, [NodeId; 3]) {
        let mut g = NodeGraph::new();
        let a = g.add_node(CognitiveNode::new("a", NodeKind::Emotion, 1.0)).unwrap();
        let b = g.add_node(CognitiveNode::new("b", NodeKind::Emotion, 2.0)).unwrap();
        let c = g.add_node(CognitiveNode::new("c", NodeKind::Emotion, 3.0)).unwrap();
        g.connect(b, InfluenceEdge::new(a, EdgeWeight::Scalar(0.5))).unwrap();
        g.connect(c, InfluenceEdge::new(b, EdgeWeight::Scalar(0.25))).unwrap();
        g.connect(a, InfluenceEdge::new(c, EdgeWeight::Scalar(-1.0))).unwrap();
        (g, [a, b, c])
    }

    #[test]
    fn test_two_phase_isolation() {
        let (mut g, ids) = cycle();
        g.compute_next_values(&ids);

        // 计算阶段不改变任何 value
        assert_eq!(g.values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(g.nodes()[0].next_value, -3.0);
        assert_eq!(g.nodes()[1].next_value, 0.5);
        assert_eq!(g.nodes()[2].next_value, 0.5);

        g.commit(&ids);
        assert_eq!(g.values(), vec![-3.0, 0.5, 0.5]);
    }

    #[test]
    fn test_propagation_determinism() {
        let (mut g1, ids) = cycle();
        let mut g2 = g1.clone();
        for _ in 0..10 {
            g1.propagate(&ids);
            g2.propagate(&ids);
        }
        for (n1, n2) in g1.nodes().iter().zip(g2.nodes()) {
            assert_eq!(n1.history, n2.history);
        }
        assert_eq!(g1.nodes()[0].history.len(), 11);
    }

    #[test]
    fn test_connect_rejects_disallowed_influencer() {
        let mut g = NodeGraph::new();
        let belief = g.add_node(CognitiveNode::new("belief", NodeKind::Belief, 0.0)).unwrap();
        let joy = g.add_node(CognitiveNode::new("joy", NodeKind::Emotion, 0.0)).unwrap();
        let err = g
            .connect(belief, InfluenceEdge::new(joy, EdgeWeight::Scalar(1.0)))
            .unwrap_err();
        assert!(matches!(err, TomError::InfluencerNotAllowed { .. }));
        assert!(g.nodes()[0].edges.is_empty());
    }

    #[test]
    fn test_connect_checks_side_linkage() {
        let mut g = NodeGraph::new();
        let pk = g.add_node(CognitiveNode::new("pk", NodeKind::PerceivedKnowledge, 0.0)).unwrap();
        let belief = g.add_node(CognitiveNode::new("belief", NodeKind::Belief, 0.0)).unwrap();
        let pref = g
            .add_node(CognitiveNode::new("pref", NodeKind::GeneralPreference, 0.0))
            .unwrap();
        let edge = InfluenceEdge::new(pk, EdgeWeight::Scalar(1.0)).with_side_linkage(pref);
        assert!(g.connect(belief, edge).is_err());
    }

    #[test]
    fn test_duplicate_name() {
        let mut g = NodeGraph::new();
        g.add_node(CognitiveNode::new("x", NodeKind::Goal, 0.0)).unwrap();
        assert!(g.add_node(CognitiveNode::new("x", NodeKind::Goal, 0.0)).is_err());
        assert_eq!(g.id("x").unwrap(), NodeId(0));
        assert!(g.id("y").is_err());
    }

    #[test]
    fn test_side_linkage_and_bounds() {
        let mut g = NodeGraph::new();
        let diff = g.add_node(CognitiveNode::new("difficulty", NodeKind::Belief, 0.5)).unwrap();
        let pref = g
            .add_node(CognitiveNode::new("challenge", NodeKind::GeneralPreference, 0.4))
            .unwrap();
        let clip = g
            .add_node(
                CognitiveNode::new("boredom", NodeKind::Emotion, 0.0)
                    .with_bound(crate::node::BoundMethod::Clip { min: -1.0, max: 1.0 }),
            )
            .unwrap();
        let edge = InfluenceEdge::new(diff, EdgeWeight::Scalar(20.0)).with_side_linkage(pref);
        g.connect(clip, edge).unwrap();
        g.propagate(&[clip]);
        // 20·0.5·0.4 = 4 -> 截断为 1
        assert_eq!(g.nodes()[clip.0].value, 1.0);
    }

    #[test]
    fn test_tanh_bound() {
        let mut g = NodeGraph::new();
        let src = g.add_node(CognitiveNode::new("src", NodeKind::Belief, 1.0)).unwrap();
        let dst = g
            .add_node(
                CognitiveNode::new("dst", NodeKind::Belief, 0.0)
                    .with_bound(crate::node::BoundMethod::Tanh),
            )
            .unwrap();
        g.connect(dst, InfluenceEdge::new(src, EdgeWeight::Scalar(5.0))).unwrap();
        g.propagate(&[dst]);
        assert_eq!(g.nodes()[dst.0].value, 5.0_f64.tanh());
    }
}
