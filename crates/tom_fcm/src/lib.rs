//! # tom_fcm - ToMLoom Fuzzy Cognitive Map Engine
//!
//! 模糊认知图传播引擎：认知节点、带调度权重与侧联的影响边、
//! 感知模块与认知模块、同步两阶段传播、快照/恢复以及预测传播器。

pub mod blueprint;
pub mod cognitive;
pub mod graph;
pub mod model;
pub mod node;
pub mod perception;
pub mod propagator;
pub mod snapshot;
pub mod weight;

pub use blueprint::{EdgeSpec, ModelBlueprint, NodeSpec, WeightSpec};
pub use cognitive::CognitiveModule;
pub use graph::{NodeGraph, NodeId};
pub use model::ToMModel;
pub use node::{BoundMethod, CognitiveNode, UpdateMode};
pub use perception::{InputFeature, PerceptionConfig, PerceptionModule};
pub use propagator::{Forecast, ModelPropagator, TutorAction};
pub use snapshot::ModelSnapshot;
pub use weight::{EdgeWeight, InfluenceEdge, ScheduledWeight};
