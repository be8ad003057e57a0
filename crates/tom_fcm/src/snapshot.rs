//! 模型快照
//!
//! 只记录每个节点的 (取值, 历史长度); 边结构在快照与恢复之间不变,
//! 权重修订号不一致时拒绝恢复。

use tom_core::{Result, TomError};

use crate::graph::NodeGraph;

/// 快照
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSnapshot {
    /// 节点取值
    values: Vec<f64>,
    /// 节点历史长度
    history_lens: Vec<usize>,
    /// 拍摄时的权重修订号
    revision: u64,
}

impl ModelSnapshot {
    /// 拍摄快照
    pub fn capture(graph: &NodeGraph) -> Self {
        Self {
            values: graph.nodes().iter().map(|n| n.value).collect(),
            history_lens: graph.nodes().iter().map(|n| n.history.len()).collect(),
            revision: graph.revision(),
        }
    }

    /// 恢复取值并截断快照之后追加的历史
    ///
    /// 图的权重在拍摄后被改写过时返回 [`TomError::StaleSnapshot`], 图保持不变。
    pub fn restore(&self, graph: &mut NodeGraph) -> Result<()> {
        if graph.revision() != self.revision || graph.len() != self.values.len() {
            return Err(TomError::StaleSnapshot {
                captured: self.revision,
                current: graph.revision(),
            });
        }
        for ((node, value), len) in graph
            .nodes_mut()
            .iter_mut()
            .zip(&self.values)
            .zip(&self.history_lens)
        {
            node.reset_value(*value);
            node.history.truncate(*len);
        }
        Ok(())
    }

    /// 拍摄时的权重修订号
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// 节点数量
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use crate::node::CognitiveNode;
    use crate::weight::{EdgeWeight, InfluenceEdge};
    use tom_core::NodeKind;

    #[test]
    fn test_snapshot_restore() {
        let mut g = NodeGraph::new();
        let a = g.add_node(CognitiveNode::new("a", NodeKind::Goal, 0.5)).unwrap();
        g.connect(a, InfluenceEdge::new(a, EdgeWeight::Scalar(0.5))).unwrap();

        let snap = ModelSnapshot::capture(&g);
        g.propagate(&[a]);
        g.propagate(&[a]);
        assert_eq!(g.nodes()[0].history.len(), 3);

        snap.restore(&mut g).unwrap();
        assert_eq!(g.nodes()[0].value, 0.5);
        assert_eq!(g.nodes()[0].history, vec![0.5]);
        assert_eq!(snap.len(), 1);
        assert_eq!(g.id("a").unwrap(), NodeId(0));
    }

    #[test]
    fn test_restore_rejects_rewritten_weights() {
        let mut g = NodeGraph::new();
        let a = g.add_node(CognitiveNode::new("a", NodeKind::Goal, 0.5)).unwrap();
        g.connect(a, InfluenceEdge::new(a, EdgeWeight::Scalar(0.5))).unwrap();

        let snap = ModelSnapshot::capture(&g);
        g.propagate(&[a]);
        g.bump_revision();

        let err = snap.restore(&mut g).unwrap_err();
        assert!(matches!(
            err,
            TomError::StaleSnapshot { captured, current } if current == captured + 1
        ));
        assert_eq!(g.nodes()[0].history.len(), 2);
        assert_eq!(snap.revision() + 1, g.revision());
    }
}
