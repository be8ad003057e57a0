//! # tom_identify - ToMLoom Parameter Identification
//!
//! 参数辨识子系统：参数管理器、数值梯度下降与遗传算法、
//! 一步前向预测代价函数、训练/测试划分、多次独立运行执行器、
//! 分阶段辨识策略 (ALL / VAR_BY_VAR / SEP_PER_1..3) 以及结果表持久化。

pub mod cost;
pub mod dataset;
pub mod optimizer;
pub mod parameter;
pub mod results;
pub mod runner;
pub mod settings;
pub mod split;
pub mod strategy;

pub use cost::{OneStepCost, TrainingData};
pub use dataset::InteractionDataset;
pub use optimizer::{
    CostFunction, GeneticAlgorithm, GeneticConfig, GradientDescent, GradientDescentConfig,
    RunOutcome, Selection,
};
pub use parameter::{Parameter, ParameterScope, ParameterTarget, ParametersManager};
pub use results::{ParameterReport, ResultsStore, ResultsTable, RunResult};
pub use runner::MultiRunExecutor;
pub use settings::{IdentificationSettings, OptimizerKind};
pub use split::{SplitStrategy, TrainTestSplit};
pub use strategy::{IdentificationMode, IdentificationReport, Identifier, PhaseReport};
