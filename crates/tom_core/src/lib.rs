//! # tom_core - ToMLoom Core Primitives
//!
//! 核心原语层，定义节点类型与影响白名单、交互观测记录、全局错误处理机制。
//! 此 crate 是整个项目的基础依赖，不依赖其他业务 crate。

pub mod error;
pub mod kind;
pub mod observation;

pub use error::{Result, TomError};
pub use kind::NodeKind;
pub use observation::{LogEntry, Observation, ObservationLog, StepKey};
