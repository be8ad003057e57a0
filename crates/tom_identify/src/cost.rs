//! 一步前向预测代价
//!
//! 对每个训练时间步 t: 将所有有状态节点重置为 t-1 时刻的记录值,
//! 将 RPK 输入设为 t 时刻的记录值, 前进一步, 再在信念/目标/情绪节点上
//! 累加与 t 时刻记录值的平方误差。可选两步预测, 各步误差按权重累加。

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use tom_core::{NodeKind, Result, TomError};
use tom_fcm::{ModelSnapshot, NodeId, ToMModel};

use crate::optimizer::CostFunction;
use crate::parameter::ParametersManager;

/// 训练数据: 每个节点按步索引记录的取值
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    series: Vec<Vec<f64>>,
    names: Vec<String>,
    /// 该节点的记录是否来自真实数据 (而非模型自身的重放)
    recorded: Vec<bool>,
}

impl TrainingData {
    /// 以模型重放后的历史为底, 用记录的真值覆盖对应节点
    ///
    /// 信念/目标/情绪节点只有在 `ground_truth` 中给出时才算有记录;
    /// 其余节点的重放历史本身就是其记录值。
    pub fn from_model(
        model: &ToMModel,
        ground_truth: &BTreeMap<String, Vec<f64>>,
    ) -> Result<Self> {
        let graph = model.graph();
        let mut data = Self::replayed(model);
        for (i, node) in graph.nodes().iter().enumerate() {
            data.recorded[i] = !node.kind.has_ground_truth();
        }
        for (name, values) in ground_truth {
            let id = graph.id(name)?;
            if !graph.nodes()[id.0].kind.has_ground_truth() {
                return Err(TomError::Dataset(format!(
                    "ground truth given for {} node {}",
                    graph.nodes()[id.0].kind,
                    name
                )));
            }
            data.series[id.0] = values.clone();
            data.recorded[id.0] = true;
        }
        Ok(data)
    }

    /// 把模型的重放历史整体当作记录 (模拟参与者)
    pub fn replayed(model: &ToMModel) -> Self {
        let nodes = model.graph().nodes();
        Self {
            series: nodes.iter().map(|n| n.history.clone()).collect(),
            names: nodes.iter().map(|n| n.name.clone()).collect(),
            recorded: vec![true; nodes.len()],
        }
    }

    /// 节点是否有真实记录
    pub fn is_recorded(&self, id: NodeId) -> bool {
        self.recorded.get(id.0).copied().unwrap_or(false)
    }

    /// 节点在某步的记录值
    pub fn value(&self, id: NodeId, step: usize) -> Option<f64> {
        self.series.get(id.0).and_then(|s| s.get(step)).copied()
    }

    /// 节点的完整记录
    pub fn series(&self, id: NodeId) -> &[f64] {
        self.series.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 节点名称
    pub fn name(&self, id: NodeId) -> &str {
        self.names.get(id.0).map(String::as_str).unwrap_or("?")
    }

    /// 最长记录的步数 (不含初始值)
    pub fn steps(&self) -> usize {
        self.series.iter().map(Vec::len).max().unwrap_or(0).saturating_sub(1)
    }

    /// 保守时间步: t-1 时刻所有给定情绪的绝对值都小于阈值
    pub fn conservative_indices(
        &self,
        indices: &[usize],
        emotions: &[NodeId],
        threshold: f64,
    ) -> Vec<usize> {
        indices
            .iter()
            .copied()
            .filter(|&t| {
                t >= 1
                    && emotions.iter().all(|e| {
                        self.value(*e, t - 1)
                            .map(|v| v.abs() < threshold)
                            .unwrap_or(false)
                    })
            })
            .collect()
    }
}

/// 一步 (或两步) 前向预测代价
#[derive(Debug, Clone)]
pub struct OneStepCost {
    model: ToMModel,
    data: Arc<TrainingData>,
    indices: Vec<usize>,
    subset: Vec<NodeId>,
    manager: ParametersManager,
    horizon: Vec<f64>,
    /// 计算误差的节点
    targets: Vec<NodeId>,
    /// 每步开始时需要重置的节点 (非慢变量, 非输入)
    stateful: Vec<NodeId>,
    inputs: Vec<NodeId>,
}

impl OneStepCost {
    /// 创建代价函数; 缺少记录数据的时间步会被跳过并记录警告,
    /// 没有真实记录的信念/目标/情绪节点不参与误差计算
    pub fn new(
        model: ToMModel,
        data: Arc<TrainingData>,
        indices: &[usize],
        subset: Vec<NodeId>,
        manager: ParametersManager,
        horizon: Vec<f64>,
    ) -> Self {
        let graph = model.graph();
        let targets: Vec<NodeId> = model
            .ground_truth_nodes()
            .into_iter()
            .filter(|id| {
                let recorded = data.is_recorded(*id);
                if !recorded {
                    warn!(node = %data.name(*id), "no recorded ground truth, excluded from cost");
                }
                recorded
            })
            .collect();
        let stateful: Vec<NodeId> = graph
            .ids()
            .filter(|id| {
                let kind = graph.nodes()[id.0].kind;
                !kind.is_slow() && kind != NodeKind::RationallyPerceivedKnowledge
            })
            .collect();
        let inputs = graph.ids_of_kind(NodeKind::RationallyPerceivedKnowledge);

        let mut cost = Self {
            model,
            data,
            indices: Vec::new(),
            subset,
            manager,
            horizon,
            targets,
            stateful,
            inputs,
        };
        cost.indices = indices
            .iter()
            .copied()
            .filter(|&t| match cost.check_step(t) {
                Ok(()) => true,
                Err(err) => {
                    warn!(step = t, error = %err, "skipping training step");
                    false
                }
            })
            .collect();
        if cost.indices.is_empty() && !indices.is_empty() {
            warn!("no usable training steps, cost is identically zero");
        }
        cost
    }

    /// 实际参与计算的时间步
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// 参与误差计算的节点
    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    pub fn model(&self) -> &ToMModel {
        &self.model
    }

    /// 检查某步所需的记录数据是否齐全
    fn check_step(&self, t: usize) -> Result<()> {
        let prev = t.checked_sub(1).ok_or(TomError::MissingGroundTruth {
            node: "<initial state>".into(),
            step: t,
        })?;
        for id in &self.stateful {
            self.require(*id, prev)?;
        }
        for h in 0..self.horizon.len() {
            for id in self.inputs.iter().chain(&self.targets) {
                self.require(*id, t + h)?;
            }
        }
        Ok(())
    }

    fn require(&self, id: NodeId, step: usize) -> Result<f64> {
        self.data.value(id, step).ok_or_else(|| TomError::MissingGroundTruth {
            node: self.data.name(id).to_string(),
            step,
        })
    }

    /// 在当前参数下计算某步的加权平方误差
    fn step_error(&mut self, t: usize) -> Result<f64> {
        for i in 0..self.stateful.len() {
            let id = self.stateful[i];
            let v = self.require(id, t - 1)?;
            self.model.graph_mut().set_value(id, v);
        }

        let mut error = 0.0;
        for h in 0..self.horizon.len() {
            for i in 0..self.inputs.len() {
                let id = self.inputs[i];
                let v = self.require(id, t + h)?;
                self.model.graph_mut().node_mut(id)?.set_input(v);
            }
            self.model.advance();

            let mut sq = 0.0;
            for id in &self.targets {
                let predicted = self.model.graph().nodes()[id.0].value;
                let d = predicted - self.require(*id, t + h)?;
                sq += d * d;
            }
            error += self.horizon[h] * sq;
        }
        Ok(error)
    }
}

impl CostFunction for OneStepCost {
    fn evaluate(&mut self, values: &[f64]) -> Result<f64> {
        self.manager.set_values(self.model.graph_mut(), values, &self.subset)?;
        let snapshot = ModelSnapshot::capture(self.model.graph());

        let mut total = 0.0;
        for i in 0..self.indices.len() {
            let t = self.indices[i];
            match self.step_error(t) {
                Ok(e) => total += e,
                Err(err) => debug!(step = t, error = %err, "step skipped"),
            }
            snapshot.restore(self.model.graph_mut())?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterScope;
    use tom_core::Observation;
    use tom_fcm::{EdgeSpec, InputFeature, ModelBlueprint, NodeSpec};

    fn model() -> ToMModel {
        ModelBlueprint::new()
            .node(NodeSpec::input("rpk", InputFeature::Difficulty))
            .node(NodeSpec::new("pk", NodeKind::PerceivedKnowledge, 0.0))
            .node(NodeSpec::new("belief", NodeKind::Belief, 0.5))
            .edge(EdgeSpec::new("pk", "rpk", 1.0).fixed())
            .edge(EdgeSpec::new("belief", "pk", 0.6))
            .edge(EdgeSpec::new("belief", "belief", 0.3))
            .build()
            .unwrap()
    }

    fn replayed(model: &ToMModel) -> ToMModel {
        let mut m = model.clone();
        for d in [5.0, 1.0, 4.0, 2.0] {
            m.step(&Observation {
                difficulty: d,
                ..Default::default()
            });
        }
        m
    }

    fn cost_for(model: &ToMModel, indices: &[usize]) -> OneStepCost {
        let data = Arc::new(TrainingData::replayed(&replayed(model)));
        let subset = model.graph().ids().collect();
        OneStepCost::new(
            model.clone(),
            data,
            indices,
            subset,
            ParametersManager::new(ParameterScope::ALL),
            vec![1.0],
        )
    }

    #[test]
    fn test_zero_cost_at_true_parameters() {
        let m = model();
        let mut cost = cost_for(&m, &[1, 2, 3, 4]);
        assert_eq!(cost.evaluate(&[0.6, 0.3]).unwrap(), 0.0);
        assert!(cost.evaluate(&[0.1, 0.3]).unwrap() > 0.0);
    }

    #[test]
    fn test_evaluation_leaves_state_untouched() {
        let m = model();
        let mut cost = cost_for(&m, &[1, 2, 3, 4]);
        let lens = |c: &OneStepCost| -> Vec<usize> {
            c.model().graph().nodes().iter().map(|n| n.history.len()).collect()
        };
        let before = lens(&cost);
        let first = cost.evaluate(&[0.2, -0.4]).unwrap();
        let after = lens(&cost);
        assert_eq!(before, after);
        assert_eq!(cost.evaluate(&[0.2, -0.4]).unwrap(), first);
    }

    #[test]
    fn test_missing_steps_skipped() {
        let m = model();
        // 0 没有前一步, 9 超出记录
        let cost = cost_for(&m, &[0, 1, 2, 9]);
        assert_eq!(cost.indices(), &[1, 2]);
    }

    #[test]
    fn test_ground_truth_for_input_rejected() {
        let m = replayed(&model());
        let mut truth = BTreeMap::new();
        truth.insert("rpk".to_string(), vec![0.0; 5]);
        assert!(TrainingData::from_model(&m, &truth).is_err());
    }

    #[test]
    fn test_unrecorded_target_excluded() {
        let m = model();
        let data = Arc::new(TrainingData::from_model(&replayed(&m), &BTreeMap::new()).unwrap());
        let belief = m.graph().id("belief").unwrap();
        assert!(!data.is_recorded(belief));
        assert!(data.is_recorded(m.graph().id("pk").unwrap()));

        let subset = m.graph().ids().collect();
        let manager = ParametersManager::new(ParameterScope::ALL);
        let mut cost = OneStepCost::new(m.clone(), data, &[1, 2, 3], subset, manager, vec![1.0]);
        assert!(cost.targets().is_empty());
        assert_eq!(cost.evaluate(&[0.1, -0.9]).unwrap(), 0.0);

        let mut truth = BTreeMap::new();
        truth.insert("belief".to_string(), vec![0.5; 5]);
        let data = TrainingData::from_model(&replayed(&m), &truth).unwrap();
        assert!(data.is_recorded(belief));
        assert_eq!(data.series(belief), &[0.5; 5]);
    }

    #[test]
    fn test_conservative_indices() {
        let m = replayed(&model());
        let data = TrainingData::replayed(&m);
        let belief = m.graph().id("belief").unwrap();
        let all = data.conservative_indices(&[1, 2, 3, 4], &[belief], 10.0);
        assert_eq!(all, vec![1, 2, 3, 4]);
        let none = data.conservative_indices(&[1, 2, 3, 4], &[belief], 0.0);
        assert!(none.is_empty());
    }
}
