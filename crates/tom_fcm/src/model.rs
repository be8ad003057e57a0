//! ToM 模型 - 感知模块 + 认知模块

use tom_core::{NodeKind, Observation, Result};

use crate::cognitive::CognitiveModule;
use crate::graph::{NodeGraph, NodeId};
use crate::perception::{InputFeature, PerceptionConfig, PerceptionModule};

/// ToM 模型
#[derive(Debug, Clone)]
pub struct ToMModel {
    graph: NodeGraph,
    perception: PerceptionModule,
    cognition: CognitiveModule,
}

impl ToMModel {
    /// 由节点图与 RPK 特征绑定构造
    pub fn new(
        graph: NodeGraph,
        inputs: Vec<(NodeId, InputFeature)>,
        config: PerceptionConfig,
    ) -> Self {
        let perception = PerceptionModule::new(inputs, &graph, config);
        let cognition = CognitiveModule::from_graph(&graph);
        Self {
            graph,
            perception,
            cognition,
        }
    }

    /// 输入一条观测并前进一步
    pub fn step(&mut self, obs: &Observation) {
        self.perception.set_current_input(&mut self.graph, obs);
        self.advance();
    }

    /// 以当前 RPK 取值前进一步:
    /// 偏差 -> 感知知识 -> 信念/目标/情绪 (同步两阶段)
    pub fn advance(&mut self) {
        self.cognition.update_biases(&mut self.graph);
        self.perception.compute_and_update(&mut self.graph);
        self.cognition.step(&mut self.graph);
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut NodeGraph {
        &mut self.graph
    }

    pub fn perception(&self) -> &PerceptionModule {
        &self.perception
    }

    pub fn cognition(&self) -> &CognitiveModule {
        &self.cognition
    }

    /// 已记录的步数 (不含初始值)
    pub fn steps(&self) -> usize {
        self.graph
            .nodes()
            .first()
            .map(|n| n.history.len().saturating_sub(1))
            .unwrap_or(0)
    }

    /// 有记录真值的节点 (信念/目标/情绪)
    pub fn ground_truth_nodes(&self) -> Vec<NodeId> {
        self.graph
            .ids()
            .filter(|id| self.graph.nodes()[id.0].kind.has_ground_truth())
            .collect()
    }

    /// 指定类型节点
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.graph.ids_of_kind(kind)
    }

    /// 节点历史
    pub fn trajectory(&self, name: &str) -> Result<&[f64]> {
        let id = self.graph.id(name)?;
        Ok(&self.graph.node(id)?.history)
    }
}
