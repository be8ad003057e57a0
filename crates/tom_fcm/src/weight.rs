//! 影响边与调度权重

use serde::{Deserialize, Serialize};

use tom_core::{Result, TomError};

use crate::graph::NodeId;
use crate::node::CognitiveNode;

/// 分段常数权重: N 个断点定义 N+1 段
///
/// 取第一个满足 `x < breakpoint` 的段, 都不满足时取最后一段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledWeight {
    breakpoints: Vec<f64>,
    weights: Vec<f64>,
}

impl ScheduledWeight {
    /// 创建调度权重, 断点必须递增且权重数 = 断点数 + 1
    pub fn new(breakpoints: Vec<f64>, weights: Vec<f64>) -> Result<Self> {
        if weights.len() != breakpoints.len() + 1 {
            return Err(TomError::InvalidSettings(format!(
                "scheduled weight needs {} segments for {} breakpoints, got {}",
                breakpoints.len() + 1,
                breakpoints.len(),
                weights.len()
            )));
        }
        if breakpoints.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TomError::InvalidSettings(
                "scheduled weight breakpoints must be strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            breakpoints,
            weights,
        })
    }

    /// 影响者取值对应的段索引
    pub fn segment_of(&self, x: f64) -> usize {
        self.breakpoints
            .iter()
            .position(|b| x < *b)
            .unwrap_or(self.breakpoints.len())
    }

    /// 影响者取值对应的权重
    pub fn select(&self, x: f64) -> f64 {
        self.weights[self.segment_of(x)]
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// 边权重
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EdgeWeight {
    /// 单一标量权重
    Scalar(f64),
    /// 分段调度权重
    Scheduled(ScheduledWeight),
}

impl EdgeWeight {
    /// 给定影响者取值时的权重
    pub fn at(&self, x: f64) -> f64 {
        match self {
            EdgeWeight::Scalar(w) => *w,
            EdgeWeight::Scheduled(s) => s.select(x),
        }
    }

    /// 段数 (标量为 1)
    pub fn segments(&self) -> usize {
        match self {
            EdgeWeight::Scalar(_) => 1,
            EdgeWeight::Scheduled(s) => s.weights.len(),
        }
    }

    /// 读取第 i 段
    pub fn segment(&self, i: usize) -> Option<f64> {
        match self {
            EdgeWeight::Scalar(w) if i == 0 => Some(*w),
            EdgeWeight::Scalar(_) => None,
            EdgeWeight::Scheduled(s) => s.weights.get(i).copied(),
        }
    }

    /// 写入第 i 段
    pub fn set_segment(&mut self, i: usize, value: f64) -> bool {
        match self {
            EdgeWeight::Scalar(w) if i == 0 => {
                *w = value;
                true
            }
            EdgeWeight::Scalar(_) => false,
            EdgeWeight::Scheduled(s) => match s.weights.get_mut(i) {
                Some(w) => {
                    *w = value;
                    true
                }
                None => false,
            },
        }
    }
}

/// 影响边, 存于被影响节点
#[derive(Debug, Clone)]
pub struct InfluenceEdge {
    /// 影响者
    pub influencer: NodeId,
    /// 侧联节点, 其取值乘以本边贡献
    pub side_linkage: Option<NodeId>,
    /// 权重
    pub weight: EdgeWeight,
    /// 辨识时允许的权重范围 (min, max)
    pub bounds: (f64, f64),
    /// 是否参与辨识
    pub tunable: bool,
}

impl InfluenceEdge {
    /// 创建标量权重边
    pub fn new(influencer: NodeId, weight: EdgeWeight) -> Self {
        Self {
            influencer,
            side_linkage: None,
            weight,
            bounds: (-1.0, 1.0),
            tunable: true,
        }
    }

    /// 设置侧联节点
    pub fn with_side_linkage(mut self, side: NodeId) -> Self {
        self.side_linkage = Some(side);
        self
    }

    /// 设置权重范围
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = (min, max);
        self
    }

    /// 固定权重, 不参与辨识
    pub fn fixed(mut self) -> Self {
        self.tunable = false;
        self
    }

    /// 本边贡献: weight(x)·x·side
    pub fn contribution(&self, nodes: &[CognitiveNode]) -> f64 {
        let x = nodes[self.influencer.0].value;
        let side = self
            .side_linkage
            .map(|s| nodes[s.0].value)
            .unwrap_or(1.0);
        self.weight.at(x) * x * side
    }
}
