//! 参数与参数管理器
//!
//! 参数顺序是固定且确定的: 先认知侧, 后感知侧;
//! 每一侧内按节点图顺序遍历子集中的节点,
//! 对每条非偏差影响者的可辨识边, 再按断点顺序遍历权重段。
//! 慢变量节点贡献其取值本身。
//! 辨识过程按位置读写参数向量, 依赖这一顺序。

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use tom_core::{NodeKind, Result, TomError};
use tom_fcm::{NodeGraph, NodeId};

/// 参数对应的模型位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterTarget {
    /// 某节点第 edge 条入边的第 segment 段权重
    EdgeSegment {
        node: NodeId,
        edge: usize,
        segment: usize,
    },
    /// 慢变量节点的取值
    SlowValue { node: NodeId },
}

/// 单个可辨识标量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub value: f64,
    pub minimum: f64,
    pub maximum: f64,
    /// 诊断用名称
    pub name: String,
    pub target: ParameterTarget,
    /// 是否属于感知侧
    pub perception: bool,
}

impl Parameter {
    /// 截断到 [minimum, maximum]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.minimum, self.maximum)
    }

    /// 取值范围宽度
    pub fn span(&self) -> f64 {
        self.maximum - self.minimum
    }
}

/// 参与辨识的参数范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterScope {
    pub cognitive: bool,
    pub perception: bool,
}

impl ParameterScope {
    pub const ALL: ParameterScope = ParameterScope {
        cognitive: true,
        perception: true,
    };

    pub fn cognitive_only() -> Self {
        Self {
            cognitive: true,
            perception: false,
        }
    }

    pub fn perception_only() -> Self {
        Self {
            cognitive: false,
            perception: true,
        }
    }
}

impl Default for ParameterScope {
    fn default() -> Self {
        Self::ALL
    }
}

/// 参数管理器
#[derive(Debug, Clone, Copy, Default)]
pub struct ParametersManager {
    scope: ParameterScope,
}

impl ParametersManager {
    /// 创建管理器
    pub fn new(scope: ParameterScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> ParameterScope {
        self.scope
    }

    /// 按固定顺序枚举子集上的参数 (取当前值)
    pub fn enumerate(&self, graph: &NodeGraph, subset: &[NodeId]) -> Vec<Parameter> {
        let members: HashSet<NodeId> = subset.iter().copied().collect();
        let mut params = Vec::new();

        let passes = [(false, self.scope.cognitive), (true, self.scope.perception)];
        for (perception, enabled) in passes {
            if !enabled {
                continue;
            }
            for id in graph.ids().filter(|id| members.contains(id)) {
                let node = &graph.nodes()[id.0];
                if node.kind.is_perception() != perception {
                    continue;
                }
                if node.kind.is_slow() {
                    let (lo, hi) = slow_bounds(node.bound.range());
                    params.push(Parameter {
                        value: node.value,
                        minimum: lo,
                        maximum: hi,
                        name: node.name.clone(),
                        target: ParameterTarget::SlowValue { node: id },
                        perception,
                    });
                    continue;
                }
                for (e, edge) in node.edges.iter().enumerate() {
                    if !edge.tunable || graph.nodes()[edge.influencer.0].kind == NodeKind::Bias {
                        continue;
                    }
                    let segments = edge.weight.segments();
                    for s in 0..segments {
                        let name = if segments > 1 {
                            format!("{}<-{}[{}]", node.name, graph.name_of(edge.influencer), s)
                        } else {
                            format!("{}<-{}", node.name, graph.name_of(edge.influencer))
                        };
                        params.push(Parameter {
                            value: edge.weight.segment(s).unwrap_or(0.0),
                            minimum: edge.bounds.0,
                            maximum: edge.bounds.1,
                            name,
                            target: ParameterTarget::EdgeSegment {
                                node: id,
                                edge: e,
                                segment: s,
                            },
                            perception,
                        });
                    }
                }
            }
        }
        params
    }

    /// 枚举参数并在边界内均匀随机初始化 (不写回模型)
    pub fn initialize_parameters<R: Rng>(
        &self,
        graph: &NodeGraph,
        subset: &[NodeId],
        rng: &mut R,
    ) -> Vec<Parameter> {
        let mut params = self.enumerate(graph, subset);
        for p in &mut params {
            p.value = uniform(rng, p.minimum, p.maximum);
        }
        params
    }

    /// 按相同顺序将取值写回模型
    pub fn set_values(
        &self,
        graph: &mut NodeGraph,
        values: &[f64],
        subset: &[NodeId],
    ) -> Result<()> {
        let params = self.enumerate(graph, subset);
        if params.len() != values.len() {
            return Err(TomError::ParameterCountMismatch {
                expected: params.len(),
                got: values.len(),
            });
        }

        for (p, v) in params.iter().zip(values) {
            match p.target {
                ParameterTarget::EdgeSegment {
                    node,
                    edge,
                    segment,
                } => {
                    let n = graph.node_mut(node)?;
                    let name = n.name.clone();
                    let written = n
                        .edges
                        .get_mut(edge)
                        .map(|e| e.weight.set_segment(segment, *v))
                        .unwrap_or(false);
                    if !written {
                        return Err(TomError::UnknownNode(format!(
                            "{}: edge {} segment {}",
                            name, edge, segment
                        )));
                    }
                }
                ParameterTarget::SlowValue { node } => {
                    graph.node_mut(node)?.reset_value(*v);
                }
            }
        }
        graph.bump_revision();
        Ok(())
    }

    /// 读取当前取值
    pub fn read_values(&self, graph: &NodeGraph, subset: &[NodeId]) -> Vec<f64> {
        self.enumerate(graph, subset).iter().map(|p| p.value).collect()
    }

    /// 参数名称
    pub fn parameter_names(&self, graph: &NodeGraph, subset: &[NodeId]) -> Vec<String> {
        self.enumerate(graph, subset).into_iter().map(|p| p.name).collect()
    }

    /// 统计 (感知侧, 认知侧) 参数数量, 不修改状态
    pub fn count_parameters(&self, graph: &NodeGraph, subset: &[NodeId]) -> (usize, usize) {
        let params = self.enumerate(graph, subset);
        let perception = params.iter().filter(|p| p.perception).count();
        (perception, params.len() - perception)
    }
}

fn slow_bounds(range: (f64, f64)) -> (f64, f64) {
    let (lo, hi) = range;
    (
        if lo.is_finite() { lo } else { -1.0 },
        if hi.is_finite() { hi } else { 1.0 },
    )
}

/// [lo, hi] 上的均匀采样, 区间退化时返回 lo
pub fn uniform<R: Rng>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}
